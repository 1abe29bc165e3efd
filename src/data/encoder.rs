// ============================================================
// Layer 4 — Encoding Adapter
// ============================================================
// Turns one (input_text, target_text) Sample into fixed-length
// integer sequences for seq2seq training:
//
//   input_ids          [max_input_length]   prompt tokens + padding
//   attention_mask     [max_input_length]   1 = real token, 0 = padding
//   labels             [max_target_length]  target tokens, padding → -100
//   decoder_input_ids  [max_target_length]  labels shifted right by one
//
// Example (max_len = 6, pad = 0, </s> = 1, start = 0):
//   target ids         [17, 42,  9,    1,    0,    0]
//   labels             [17, 42,  9,    1, -100, -100]
//   decoder_input_ids  [ 0, 17, 42,    9,    1,    0]
//
// Every pad position in the labels becomes IGNORE_INDEX so the
// loss never counts padding.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::domain::sample::Sample;

/// Label value the loss skips entirely
pub const IGNORE_INDEX: i64 = -100;

/// Default truncation/padding length for both sides
pub const DEFAULT_MAX_LENGTH: usize = 160;

/// Token ids the adapter and generator need to agree on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    pub pad: u32,
    pub eos: u32,
    pub decoder_start: u32,
}

/// One fully tokenised, padded training example
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedExample {
    pub input_ids:         Vec<u32>,
    pub attention_mask:    Vec<u32>,
    pub labels:            Vec<i64>,
    pub decoder_input_ids: Vec<u32>,
}

pub struct EncodingAdapter<'a> {
    tokenizer:         &'a Tokenizer,
    special:           SpecialTokens,
    max_input_length:  usize,
    max_target_length: usize,
}

impl<'a> EncodingAdapter<'a> {
    pub fn new(
        tokenizer:         &'a Tokenizer,
        special:           SpecialTokens,
        max_input_length:  usize,
        max_target_length: usize,
    ) -> Self {
        Self { tokenizer, special, max_input_length, max_target_length }
    }

    pub fn encode(&self, sample: &Sample) -> Result<EncodedExample> {
        let (input_ids, attention_mask) =
            self.encode_padded(&sample.input_text, self.max_input_length)?;
        let (target_ids, _) =
            self.encode_padded(&sample.target_text, self.max_target_length)?;

        let labels            = mask_padding(&target_ids, self.special.pad);
        let decoder_input_ids = shift_right(&labels, self.special.decoder_start, self.special.pad);

        Ok(EncodedExample { input_ids, attention_mask, labels, decoder_input_ids })
    }

    pub fn encode_all(&self, samples: &[Sample]) -> Result<Vec<EncodedExample>> {
        samples.iter().map(|s| self.encode(s)).collect()
    }

    /// Tokenise `text` (with special tokens), truncate and pad to `max_len`.
    fn encode_padded(&self, text: &str, max_len: usize) -> Result<(Vec<u32>, Vec<u32>)> {
        let enc = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

        let ids  = truncate_keep_eos(enc.get_ids().to_vec(), max_len, self.special.eos);
        let real = ids.len();

        let mut input_ids = ids;
        input_ids.resize(max_len, self.special.pad);

        let mut mask = vec![1u32; real];
        mask.resize(max_len, 0);

        Ok((input_ids, mask))
    }
}

/// Truncate to `max_len`; if the sequence ended in `eos`, the
/// truncated sequence ends in `eos` too.
pub fn truncate_keep_eos(mut ids: Vec<u32>, max_len: usize, eos: u32) -> Vec<u32> {
    if ids.len() <= max_len {
        return ids;
    }
    let ended_with_eos = ids.last() == Some(&eos);
    ids.truncate(max_len);
    if ended_with_eos {
        if let Some(last) = ids.last_mut() {
            *last = eos;
        }
    }
    ids
}

/// Rewrite every pad id to IGNORE_INDEX
pub fn mask_padding(ids: &[u32], pad: u32) -> Vec<i64> {
    ids.iter()
        .map(|&id| if id == pad { IGNORE_INDEX } else { id as i64 })
        .collect()
}

/// Teacher-forcing decoder input: `[start] + labels[..n-1]`,
/// with IGNORE_INDEX mapped back to `pad`.
pub fn shift_right(labels: &[i64], decoder_start: u32, pad: u32) -> Vec<u32> {
    if labels.is_empty() {
        return Vec::new();
    }
    std::iter::once(decoder_start)
        .chain(
            labels[..labels.len() - 1]
                .iter()
                .map(|&l| if l == IGNORE_INDEX { pad } else { l as u32 }),
        )
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tokenizer_store::TokenizerStore;

    fn tokenizer() -> Tokenizer {
        let texts = vec![
            "plan my day".to_string(),
            "walk then read a book".to_string(),
        ];
        TokenizerStore::build_word_level(&texts, 64).unwrap()
    }

    fn special() -> SpecialTokens {
        SpecialTokens { pad: 0, eos: 1, decoder_start: 0 }
    }

    #[test]
    fn test_shapes_and_mask() {
        let tok     = tokenizer();
        let adapter = EncodingAdapter::new(&tok, special(), 8, 10);
        let ex      = adapter.encode(&Sample::new("plan my day", "walk then read")).unwrap();

        assert_eq!(ex.input_ids.len(), 8);
        assert_eq!(ex.attention_mask.len(), 8);
        assert_eq!(ex.labels.len(), 10);
        assert_eq!(ex.decoder_input_ids.len(), 10);

        // 3 words + </s>
        assert_eq!(ex.attention_mask, vec![1, 1, 1, 1, 0, 0, 0, 0]);
        assert_eq!(ex.input_ids[3], 1);
        assert!(ex.input_ids[4..].iter().all(|&id| id == 0));
    }

    #[test]
    fn test_labels_never_contain_pad_id() {
        let tok     = tokenizer();
        let adapter = EncodingAdapter::new(&tok, special(), 8, 12);
        let samples = vec![
            Sample::new("plan my day", "walk"),
            Sample::new("read", "walk then read a book"),
            Sample::new("a", "plan my day then walk then read a book a book"),
        ];
        for ex in adapter.encode_all(&samples).unwrap() {
            assert!(!ex.labels.contains(&0));
            assert!(ex.labels.iter().all(|&l| l == IGNORE_INDEX || l > 0));
        }
    }

    #[test]
    fn test_decoder_inputs_are_shifted_labels() {
        let tok     = tokenizer();
        let adapter = EncodingAdapter::new(&tok, special(), 8, 6);
        let ex      = adapter.encode(&Sample::new("plan", "walk then")).unwrap();

        assert_eq!(ex.decoder_input_ids[0], 0);
        for i in 1..ex.labels.len() {
            let expected = if ex.labels[i - 1] == IGNORE_INDEX { 0 } else { ex.labels[i - 1] as u32 };
            assert_eq!(ex.decoder_input_ids[i], expected);
        }
    }

    #[test]
    fn test_truncation_keeps_eos() {
        assert_eq!(truncate_keep_eos(vec![5, 6, 7, 1], 3, 1), vec![5, 6, 1]);
        assert_eq!(truncate_keep_eos(vec![5, 6, 7, 8], 3, 1), vec![5, 6, 7]);
        assert_eq!(truncate_keep_eos(vec![5, 1], 3, 1), vec![5, 1]);
    }

    #[test]
    fn test_mask_and_shift_helpers() {
        let labels = mask_padding(&[17, 42, 9, 1, 0, 0], 0);
        assert_eq!(labels, vec![17, 42, 9, 1, IGNORE_INDEX, IGNORE_INDEX]);
        assert_eq!(shift_right(&labels, 0, 0), vec![0, 17, 42, 9, 1, 0]);
        assert!(shift_right(&[], 0, 0).is_empty());
    }
}
