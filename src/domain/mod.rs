// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that define the core
// concepts of the system: a training sample, a suggestion
// request/response, and the error taxonomy.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// One prompt/response pair from the dataset
pub mod sample;

// The inference boundary: request, response, request errors
pub mod suggestion;

// Pipeline error taxonomy (config, data, training, persistence)
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
