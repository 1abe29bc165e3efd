use burn::data::dataset::Dataset;

use crate::data::encoder::EncodedExample;

/// Encoded examples held in memory; implements Burn's Dataset so
/// the DataLoader can call `get(index)` and `len()`.
pub struct Seq2SeqDataset {
    examples: Vec<EncodedExample>,
}

impl Seq2SeqDataset {
    pub fn new(examples: Vec<EncodedExample>) -> Self { Self { examples } }
}

impl Dataset<EncodedExample> for Seq2SeqDataset {
    fn get(&self, index: usize) -> Option<EncodedExample> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
