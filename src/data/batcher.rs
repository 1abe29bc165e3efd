// ============================================================
// Layer 4 — Seq2Seq Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<EncodedExample>
// into tensors for one forward pass.
//
//   Input:  N examples, encoder length S, decoder length T
//   Output: Seq2SeqBatch with
//             input_ids, attention_mask     [N, S]
//             decoder_input_ids, labels     [N, T]
//
// All examples are pre-padded by the EncodingAdapter, so the
// batcher only flattens and reshapes. Labels keep the -100
// sentinel; the loss masks those positions out.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::encoder::EncodedExample;

// ─── Seq2SeqBatch ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct Seq2SeqBatch<B: Backend> {
    /// Encoder token ids (shape [batch_size, input_len])
    pub input_ids: Tensor<B, 2, Int>,

    /// 1 = real token, 0 = padding (shape [batch_size, input_len])
    pub attention_mask: Tensor<B, 2, Int>,

    /// Teacher-forced decoder input (shape [batch_size, target_len])
    pub decoder_input_ids: Tensor<B, 2, Int>,

    /// Target ids with padding as -100 (shape [batch_size, target_len])
    pub labels: Tensor<B, 2, Int>,
}

impl<B: Backend> Seq2SeqBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.input_ids.dims()[0]
    }
}

// ─── Seq2SeqBatcher ───────────────────────────────────────────────────────────
/// Holds the target device so tensors are created on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct Seq2SeqBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> Seq2SeqBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack<T: Copy>(
        &self,
        rows:    &[&[T]],
        convert: impl Fn(T) -> i32,
    ) -> Tensor<B, 2, Int> {
        let batch_size = rows.len();
        let seq_len    = rows.first().map(|r| r.len()).unwrap_or(0);
        let flat: Vec<i32> = rows
            .iter()
            .flat_map(|r| r.iter().map(|&x| convert(x)))
            .collect();

        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len])
    }
}

impl<B: Backend> Batcher<B, EncodedExample, Seq2SeqBatch<B>> for Seq2SeqBatcher<B> {
    fn batch(&self, items: Vec<EncodedExample>, _device: &B::Device) -> Seq2SeqBatch<B> {
        let input_rows:   Vec<&[u32]> = items.iter().map(|e| e.input_ids.as_slice()).collect();
        let mask_rows:    Vec<&[u32]> = items.iter().map(|e| e.attention_mask.as_slice()).collect();
        let decoder_rows: Vec<&[u32]> = items.iter().map(|e| e.decoder_input_ids.as_slice()).collect();
        let label_rows:   Vec<&[i64]> = items.iter().map(|e| e.labels.as_slice()).collect();

        Seq2SeqBatch {
            input_ids:         self.stack(&input_rows,   |x| x as i32),
            attention_mask:    self.stack(&mask_rows,    |x| x as i32),
            decoder_input_ids: self.stack(&decoder_rows, |x| x as i32),
            labels:            self.stack(&label_rows,   |x| x as i32),
        }
    }
}
