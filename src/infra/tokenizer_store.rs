// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads and saves `tokenizer.json` for a model directory, and
// can build a small word-level tokenizer for a base scaffold.
//
// The built tokenizer uses the seq2seq conventions the model
// expects:
//   <pad> = 0   padding and decoder start
//   </s>  = 1   end of sequence, appended by the post-processor
//   <unk> = 2   unknown word
//
// In tokenizers 0.15 the trainer API wants a ModelWrapper, so
// the tokenizer JSON is built directly with serde_json and
// parsed back with FromStr.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    path::PathBuf,
    str::FromStr,
};
use tokenizers::Tokenizer;

use crate::data::encoder::SpecialTokens;
use crate::domain::error::PipelineError;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const PAD_TOKEN:      &str = "<pad>";
pub const EOS_TOKEN:      &str = "</s>";
pub const UNK_TOKEN:      &str = "<unk>";

const RESERVED: usize = 3;

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load `tokenizer.json` from the directory
    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        if !path.is_file() {
            return Err(PipelineError::Config(format!(
                "tokenizer not found at '{}'",
                path.display()
            ))
            .into());
        }
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    /// Write `tokenizer.json`, creating the directory if needed
    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.path();
        tokenizer
            .save(&path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write tokenizer to '{}': {}", path.display(), e))?;
        tracing::debug!("Tokenizer saved to '{}'", path.display());
        Ok(())
    }

    /// Build a lowercase word-level tokenizer from a corpus.
    ///
    /// Words are ranked by frequency (ties alphabetical) and the
    /// vocabulary is capped at `vocab_size` including the three
    /// special tokens.
    pub fn build_word_level(texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        // ── Step 1: Count words ───────────────────────────────────────────────
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for word in split_words(&text.to_lowercase()) {
                *freq.entry(word).or_insert(0) += 1;
            }
        }

        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(RESERVED));

        // ── Step 2: Vocab with fixed special ids ──────────────────────────────
        let mut vocab = serde_json::json!({
            "<pad>": 0,
            "</s>":  1,
            "<unk>": 2,
        });
        for (id, (word, _)) in words.iter().enumerate() {
            vocab[word.as_str()] = serde_json::json!(id + RESERVED);
        }

        // ── Step 3: Tokenizer JSON in HuggingFace format ──────────────────────
        let special = |id: u32, content: &str| serde_json::json!({
            "id": id, "content": content, "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true
        });
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [special(0, PAD_TOKEN), special(1, EOS_TOKEN), special(2, UNK_TOKEN)],
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": {
                "type": "TemplateProcessing",
                "single": [
                    { "Sequence":     { "id": "A",       "type_id": 0 } },
                    { "SpecialToken": { "id": EOS_TOKEN, "type_id": 0 } }
                ],
                "pair": [
                    { "Sequence":     { "id": "A",       "type_id": 0 } },
                    { "SpecialToken": { "id": EOS_TOKEN, "type_id": 0 } },
                    { "Sequence":     { "id": "B",       "type_id": 0 } },
                    { "SpecialToken": { "id": EOS_TOKEN, "type_id": 0 } }
                ],
                "special_tokens": {
                    "</s>": { "id": EOS_TOKEN, "ids": [1], "tokens": [EOS_TOKEN] }
                }
            },
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let tokenizer = Tokenizer::from_str(&tokenizer_json.to_string())
            .map_err(|e| anyhow::anyhow!("Cannot build word-level tokenizer: {e}"))?;
        tracing::info!(
            "Word-level tokenizer built: {} entries",
            tokenizer.get_vocab_size(true)
        );
        Ok(tokenizer)
    }
}

/// Special ids as the tokenizer defines them. Falls back to `</s>`
/// for padding when the tokenizer has no `<pad>` token.
pub fn resolve_special_tokens(tokenizer: &Tokenizer) -> Result<SpecialTokens> {
    let eos = tokenizer.token_to_id(EOS_TOKEN).ok_or_else(|| {
        PipelineError::Config(format!("tokenizer has no '{EOS_TOKEN}' token"))
    })?;
    let pad = match tokenizer.token_to_id(PAD_TOKEN) {
        Some(id) => id,
        None => {
            tracing::warn!("Tokenizer has no '{}' token, padding with '{}'", PAD_TOKEN, EOS_TOKEN);
            eos
        }
    };
    Ok(SpecialTokens { pad, eos, decoder_start: pad })
}

/// Same split as the `Whitespace` pre-tokenizer: runs of word
/// characters, or runs of other non-space characters.
fn split_words(text: &str) -> Vec<String> {
    let mut out     = Vec::new();
    let mut current = String::new();
    let mut in_word = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        let is_word = c.is_alphanumeric() || c == '_';
        if !current.is_empty() && is_word != in_word {
            out.push(std::mem::take(&mut current));
        }
        in_word = is_word;
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
