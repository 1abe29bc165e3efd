// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the raw .jsonl file to tensor batches:
//
//   dataset.jsonl
//       │
//       ▼
//   JsonlLoader       → parses lines, drops malformed/incomplete records
//       │
//       ▼
//   split_train_val   → seeded shuffle, 90/10 split
//       │
//       ▼
//   EncodingAdapter   → input_ids, attention_mask, labels (-100 on padding)
//       │
//       ▼
//   Seq2SeqDataset    → implements Burn's Dataset trait
//       │
//       ▼
//   Seq2SeqBatcher    → stacks examples into tensor batches
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads prompt/response samples from newline-delimited JSON
pub mod loader;

/// Seeded shuffle and train/validation split
pub mod splitter;

/// Tokenises samples into fixed-length id sequences with label masking
pub mod encoder;

/// Implements Burn's Dataset trait for encoded examples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
