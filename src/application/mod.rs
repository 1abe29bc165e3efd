// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one goal at a time.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Base model scaffolding
pub mod init_base_use_case;

// The fine-tuning workflow
pub mod train_use_case;

// One suggestion request
pub mod suggest_use_case;

// Interactive prompt loop
pub mod chat_use_case;
