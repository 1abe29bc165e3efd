// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples with a fixed seed and splits them into:
//   - Training set:   used to update model weights
//   - Validation set: used for the final evaluation pass
//
// The shuffle is seeded (StdRng::seed_from_u64), so the same
// input file and seed always produce the same partition.
//
// Split index = floor(train_fraction × N). No stratification,
// no deduplication; every sample lands in exactly one side.
//
// Reference: Rust Book §8 (Vectors)
//            rand crate documentation

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Fraction of samples used for training (90/10 split)
pub const TRAIN_FRACTION: f64 = 0.9;

/// Shuffle `samples` deterministically and split into (train, validation).
///
/// # Arguments
/// * `samples`        - All available samples (consumed by this function)
/// * `train_fraction` - Proportion for training, e.g. 0.9 = 90%
/// * `seed`           - Shuffle seed; same seed → same partition
pub fn split_train_val<T>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    seed:           u64,
) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).floor() as usize;
    let split_at = split_at.min(total);

    // After this: samples = [0..split_at], val = [split_at..total]
    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation (seed {})",
        samples.len(),
        val.len(),
        seed,
    );

    (samples, val)
}
