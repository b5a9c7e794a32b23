//! LT fountain generator.
//!
//! Emits an unbounded stream of [`EncodedBlock`]s over one [`SourceBuffer`].
//! In systematic mode (the default) the first `k` blocks are the source
//! blocks themselves, in order; every block after that XORs a random subset
//! whose size is drawn from the robust soliton distribution.

use crate::block::{BlockError, EncodedBlock, SourceBuffer};
use crate::distribution::DegreeGenerator;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),
    #[error("Cannot encode an empty payload")]
    EmptyPayload,
    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Fountain generator over one payload
pub struct Encoder<R: Rng = StdRng> {
    source: SourceBuffer,
    degree_generator: DegreeGenerator,
    rng: R,
    /// Emit the source blocks verbatim before mixing
    systematic: bool,
    /// Number of blocks emitted so far
    emitted: usize,
}

impl Encoder<StdRng> {
    /// Create an encoder seeded from the operating system
    pub fn new(data: &[u8], block_size: usize) -> Result<Self, EncoderError> {
        Self::with_rng(data, block_size, StdRng::from_entropy())
    }

    /// Create an encoder with a fixed seed, for reproducible streams
    pub fn with_seed(data: &[u8], block_size: usize, seed: u64) -> Result<Self, EncoderError> {
        Self::with_rng(data, block_size, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Encoder<R> {
    pub fn with_rng(data: &[u8], block_size: usize, rng: R) -> Result<Self, EncoderError> {
        if block_size == 0 {
            return Err(EncoderError::InvalidBlockSize(block_size));
        }
        if data.is_empty() {
            return Err(EncoderError::EmptyPayload);
        }

        let source = SourceBuffer::new(data, block_size)?;
        let degree_generator = DegreeGenerator::new(source.block_count());

        Ok(Self {
            source,
            degree_generator,
            rng,
            systematic: true,
            emitted: 0,
        })
    }

    /// Toggle the systematic prefix
    pub fn systematic(mut self, systematic: bool) -> Self {
        self.systematic = systematic;
        self
    }

    /// Total number of source blocks (`k`)
    pub fn source_block_count(&self) -> usize {
        self.source.block_count()
    }

    /// Original payload length
    pub fn byte_length(&self) -> usize {
        self.source.byte_length()
    }

    pub fn block_size(&self) -> usize {
        self.source.block_size()
    }

    /// Number of blocks emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Generate the next encoded block
    pub fn next_block(&mut self) -> Result<EncodedBlock, EncoderError> {
        let k = self.source.block_count();
        let indices = if self.systematic && self.emitted < k {
            BTreeSet::from([self.emitted])
        } else {
            self.choose_indices()
        };
        self.emitted += 1;

        let data = self.source.combine(&indices)?;
        Ok(EncodedBlock::new(k, self.source.byte_length(), indices, data))
    }

    /// Pick `d` distinct source blocks uniformly, `d` from the degree distribution
    fn choose_indices(&mut self) -> BTreeSet<usize> {
        let k = self.source.block_count();
        let degree = self.degree_generator.next_degree(&mut self.rng).min(k);
        index::sample(&mut self.rng, k, degree).into_iter().collect()
    }
}

impl<R: Rng> Iterator for Encoder<R> {
    type Item = EncodedBlock;

    fn next(&mut self) -> Option<Self::Item> {
        // Indices always come from 0..k, so combining cannot fail here
        self.next_block().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_creation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9];
        let encoder = Encoder::new(&data, 4).unwrap();
        assert_eq!(encoder.source_block_count(), 3);
        assert_eq!(encoder.block_size(), 4);
        assert_eq!(encoder.byte_length(), 9);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            Encoder::new(&[1, 2, 3, 4], 0),
            Err(EncoderError::InvalidBlockSize(0))
        ));
        assert!(matches!(
            Encoder::new(&[], 4),
            Err(EncoderError::EmptyPayload)
        ));
    }

    #[test]
    fn test_block_larger_than_payload() {
        let mut encoder = Encoder::new(&[7, 7, 7], 200).unwrap();
        assert_eq!(encoder.source_block_count(), 1);

        let block = encoder.next_block().unwrap();
        assert_eq!(block.data.len(), 200);
        assert_eq!(block.bytes, 3);
        assert_eq!(block.index_key(), vec![0]);
    }

    #[test]
    fn test_systematic_prefix() {
        let data: Vec<u8> = (0..=255).collect();
        let mut encoder = Encoder::with_seed(&data, 32, 1).unwrap();

        for i in 0..8 {
            let block = encoder.next_block().unwrap();
            assert_eq!(block.index_key(), vec![i]);
            assert_eq!(&block.data[..], &data[i * 32..(i + 1) * 32]);
        }
    }

    #[test]
    fn test_block_generation() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 31 % 251) as u8).collect();
        let encoder = Encoder::with_seed(&data, 200, 9).unwrap().systematic(false);

        for block in encoder.take(200) {
            assert_eq!(block.k, 25);
            assert_eq!(block.bytes, 5000);
            assert_eq!(block.data.len(), 200);
            assert!(block.degree() >= 1 && block.degree() <= 25);
            assert!(block.indices.iter().all(|&i| i < 25));
            assert!(block.verify());
        }
    }

    #[test]
    fn test_seeded_streams_are_reproducible() {
        let data = vec![42u8; 1000];
        let a: Vec<_> = Encoder::with_seed(&data, 50, 3).unwrap().take(60).collect();
        let b: Vec<_> = Encoder::with_seed(&data, 50, 3).unwrap().take(60).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mixed_blocks_xor_their_sources() {
        let data: Vec<u8> = (0..100).collect();
        let source = SourceBuffer::new(&data, 10).unwrap();
        let encoder = Encoder::with_seed(&data, 10, 11).unwrap().systematic(false);

        for block in encoder.take(50) {
            let mut expected = vec![0u8; 10];
            for &i in &block.indices {
                crate::block::xor_into(&mut expected, source.block(i).unwrap());
            }
            assert_eq!(&block.data[..], &expected[..]);
        }
    }
}
