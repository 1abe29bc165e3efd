// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Filesystem concerns shared by training and serving:
//
//   checkpoint.rs      — Model directory I/O: config.json +
//                        model.mpk artifact, rotated
//                        checkpoint-{step}/ directories, run
//                        config and evaluation results
//
//   tokenizer_store.rs — tokenizer.json load/save, word-level
//                        scaffold tokenizer, special-token ids
//
//   metrics.rs         — Step metrics CSV
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model artifact and checkpoint persistence
pub mod checkpoint;

/// Tokenizer persistence and scaffold construction
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;
