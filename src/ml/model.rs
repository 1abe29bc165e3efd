use burn::{
    nn::{
        attention::generate_autoregressive_mask,
        transformer::{
            TransformerDecoder, TransformerDecoderConfig, TransformerDecoderInput,
            TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput,
        },
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::data::encoder::{SpecialTokens, IGNORE_INDEX};
use crate::domain::error::PipelineError;

// #[derive(Config)] already implements Clone, Serialize and Deserialize.
#[derive(Config, Debug)]
pub struct Seq2SeqConfig {
    pub vocab_size: usize,
    #[config(default = 256)]
    pub d_model: usize,
    #[config(default = 1024)]
    pub d_ff: usize,
    #[config(default = 8)]
    pub num_heads: usize,
    #[config(default = 4)]
    pub num_encoder_layers: usize,
    #[config(default = 4)]
    pub num_decoder_layers: usize,
    /// Longest sequence either side of the model can embed
    #[config(default = 512)]
    pub max_position: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = 0)]
    pub pad_token_id: u32,
    #[config(default = 1)]
    pub eos_token_id: u32,
    #[config(default = 0)]
    pub decoder_start_token_id: u32,
}

impl Seq2SeqConfig {
    pub fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens {
            pad:           self.pad_token_id,
            eos:           self.eos_token_id,
            decoder_start: self.decoder_start_token_id,
        }
    }

    /// Shapes the attention layers can actually be built with.
    /// Multi-head attention splits d_model evenly across the heads.
    pub fn check_architecture(&self) -> Result<(), PipelineError> {
        let non_zero = [
            ("vocab_size", self.vocab_size),
            ("d_model", self.d_model),
            ("d_ff", self.d_ff),
            ("num_heads", self.num_heads),
            ("num_encoder_layers", self.num_encoder_layers),
            ("num_decoder_layers", self.num_decoder_layers),
            ("max_position", self.max_position),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(PipelineError::Config(format!("{name} must be greater than zero")));
        }
        if self.d_model % self.num_heads != 0 {
            return Err(PipelineError::Config(format!(
                "d_model ({}) must be divisible by num_heads ({})",
                self.d_model, self.num_heads
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PipelineError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Seq2SeqModel<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_position, self.d_model).init(device);
        let encoder = TransformerEncoderConfig::new(
            self.d_model, self.d_ff, self.num_heads, self.num_encoder_layers,
        )
        .with_dropout(self.dropout)
        .with_norm_first(true)
        .init(device);
        let decoder = TransformerDecoderConfig::new(
            self.d_model, self.d_ff, self.num_heads, self.num_decoder_layers,
        )
        .with_dropout(self.dropout)
        .with_norm_first(true)
        .init(device);
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let lm_head    = LinearConfig::new(self.d_model, self.vocab_size).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        Seq2SeqModel {
            token_embedding, position_embedding, encoder, decoder,
            final_norm, lm_head, dropout,
            max_position: self.max_position,
        }
    }
}

#[derive(Module, Debug)]
pub struct Seq2SeqModel<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub encoder:            TransformerEncoder<B>,
    pub decoder:            TransformerDecoder<B>,
    pub final_norm:         LayerNorm<B>,
    pub lm_head:            Linear<B>,
    pub dropout:            Dropout,
    pub max_position:       usize,
}

impl<B: Backend> Seq2SeqModel<B> {
    /// Token + learned position embeddings: [batch, seq_len] → [batch, seq_len, d_model]
    fn embed(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = ids.dims();
        let tok_emb = self.token_embedding.forward(ids);

        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        self.dropout.forward(tok_emb + pos_emb)
    }

    /// Encoder pass. `pad_mask` is true where the input is padding.
    pub fn encode(
        &self,
        input_ids: Tensor<B, 2, Int>,
        pad_mask:  Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let x = self.embed(input_ids);
        self.encoder.forward(TransformerEncoderInput::new(x).mask_pad(pad_mask))
    }

    /// Full causal decoder pass over `decoder_ids` → logits [batch, tgt_len, vocab].
    /// No incremental cache: every call recomputes the whole prefix.
    pub fn decode(
        &self,
        decoder_ids:     Tensor<B, 2, Int>,
        memory:          Tensor<B, 3>,
        memory_pad_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let [batch_size, tgt_len] = decoder_ids.dims();
        let causal = generate_autoregressive_mask::<B>(batch_size, tgt_len, &memory.device());

        let x     = self.embed(decoder_ids);
        let input = TransformerDecoderInput::new(x, memory)
            .target_mask_attn(causal)
            .memory_mask_pad(memory_pad_mask);
        let hidden = self.decoder.forward(input);

        self.lm_head.forward(self.final_norm.forward(hidden))
    }

    /// Teacher-forced forward pass → logits [batch, tgt_len, vocab]
    pub fn forward(
        &self,
        input_ids:         Tensor<B, 2, Int>,
        attention_mask:    Tensor<B, 2, Int>,
        decoder_input_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let pad_mask = attention_mask.equal_elem(0);
        let memory   = self.encode(input_ids, pad_mask.clone());
        self.decode(decoder_input_ids, memory, pad_mask)
    }

    /// Mean token cross-entropy over the non-ignored label positions
    pub fn forward_loss(
        &self,
        input_ids:         Tensor<B, 2, Int>,
        attention_mask:    Tensor<B, 2, Int>,
        decoder_input_ids: Tensor<B, 2, Int>,
        labels:            Tensor<B, 2, Int>,
    ) -> Tensor<B, 1> {
        let logits = self.forward(input_ids, attention_mask, decoder_input_ids);
        masked_cross_entropy(logits, labels)
    }
}

/// Cross-entropy that skips every position labelled IGNORE_INDEX.
///
/// logits: [batch, len, vocab], labels: [batch, len] → scalar [1]
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    labels: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let [batch_size, seq_len, vocab] = logits.dims();
    let n = batch_size * seq_len;

    let log_probs = log_softmax(logits, 2).reshape([n, vocab]);
    let labels    = labels.reshape([n]);

    let keep    = labels.clone().not_equal_elem(IGNORE_INDEX).float();
    // Sentinel positions still need a valid gather index; their
    // contribution is zeroed by `keep` afterwards.
    let targets = labels.clamp_min(0).reshape([n, 1]);
    let picked  = log_probs.gather(1, targets).reshape([n]);

    let count = keep.clone().sum().clamp_min(1.0);
    (picked * keep).sum().neg() / count
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;

    fn tiny_config() -> Seq2SeqConfig {
        Seq2SeqConfig::new(20)
            .with_d_model(16)
            .with_d_ff(32)
            .with_num_heads(2)
            .with_num_encoder_layers(1)
            .with_num_decoder_layers(1)
            .with_max_position(32)
            .with_dropout(0.0)
    }

    #[test]
    fn test_check_architecture() {
        assert!(tiny_config().check_architecture().is_ok());
        assert!(Seq2SeqConfig::new(100).check_architecture().is_ok());

        let uneven = tiny_config().with_d_model(10).with_num_heads(4);
        let err    = uneven.check_architecture().unwrap_err();
        assert!(matches!(err, PipelineError::Config(ref m) if m.contains("divisible")));

        assert!(tiny_config().with_num_heads(0).check_architecture().is_err());
        assert!(tiny_config().with_dropout(1.0).check_architecture().is_err());
    }

    fn ints<B: Backend>(rows: &[&[i32]], device: &B::Device) -> Tensor<B, 2, Int> {
        let flat: Vec<i32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([rows.len(), rows[0].len()])
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);

        let input   = ints::<TestBackend>(&[&[5, 6, 1, 0], &[7, 1, 0, 0]], &device);
        let mask    = ints::<TestBackend>(&[&[1, 1, 1, 0], &[1, 1, 0, 0]], &device);
        let decoder = ints::<TestBackend>(&[&[0, 8, 9], &[0, 10, 1]], &device);

        let logits = model.forward(input, mask, decoder);
        assert_eq!(logits.dims(), [2, 3, 20]);
    }

    #[test]
    fn test_loss_ignores_sentinel_positions() {
        let device = Default::default();
        // Uniform logits → every kept position costs ln(vocab)
        let logits = Tensor::<TestBackend, 3>::zeros([1, 4, 10], &device);
        let labels = ints::<TestBackend>(&[&[3, 4, -100, -100]], &device);

        let loss: f32 = masked_cross_entropy(logits, labels).into_scalar().elem();
        assert!((loss - (10f32).ln()).abs() < 1e-4);
    }

    #[test]
    fn test_loss_all_ignored_is_zero() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 3>::zeros([1, 2, 5], &device);
        let labels = ints::<TestBackend>(&[&[-100, -100]], &device);

        let loss: f32 = masked_cross_entropy(logits, labels).into_scalar().elem();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_loss_backward_runs() {
        type Ad = Autodiff<NdArray>;
        let device = Default::default();
        let model  = tiny_config().init::<Ad>(&device);

        let loss = model.forward_loss(
            ints::<Ad>(&[&[5, 6, 1]], &device),
            ints::<Ad>(&[&[1, 1, 1]], &device),
            ints::<Ad>(&[&[0, 8, 1]], &device),
            ints::<Ad>(&[&[8, 1, -100]], &device),
        );
        let value: f32 = loss.clone().into_scalar().elem();
        assert!(value.is_finite() && value > 0.0);
        let _grads = loss.backward();
    }
}
