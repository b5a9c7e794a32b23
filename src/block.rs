use bytes::{Bytes, BytesMut};
use std::collections::BTreeSet;
use thiserror::Error;

/// Default source block size, sized so one encoded packet fits a QR code
pub const DEFAULT_BLOCK_SIZE: usize = 200;

/// Length in hex characters of the per-block checksum
pub const CHECKSUM_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),
    #[error("Source buffer is empty")]
    EmptySource,
    #[error("Block index {index} out of range for {k} source blocks")]
    IndexOutOfRange { index: usize, k: usize },
    #[error("Encoded block combines no source blocks")]
    NoIndices,
}

/// An immutable payload split into equally sized, zero padded source blocks
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    /// Length of the payload before padding
    byte_length: usize,
    /// Size of every source block in bytes
    block_size: usize,
    /// Padded source blocks
    blocks: Vec<Bytes>,
}

impl SourceBuffer {
    /// Split `data` into `ceil(len / block_size)` blocks, padding the last one
    pub fn new(data: &[u8], block_size: usize) -> Result<Self, BlockError> {
        if block_size == 0 {
            return Err(BlockError::InvalidBlockSize(block_size));
        }
        if data.is_empty() {
            return Err(BlockError::EmptySource);
        }

        let blocks = data
            .chunks(block_size)
            .map(|chunk| {
                let mut block = BytesMut::with_capacity(block_size);
                block.extend_from_slice(chunk);
                block.resize(block_size, 0);
                block.freeze()
            })
            .collect();

        Ok(Self {
            byte_length: data.len(),
            block_size,
            blocks,
        })
    }

    /// Number of source blocks (`k`)
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block(&self, index: usize) -> Option<&Bytes> {
        self.blocks.get(index)
    }

    /// XOR the selected source blocks together
    pub fn combine(&self, indices: &BTreeSet<usize>) -> Result<Bytes, BlockError> {
        if indices.is_empty() {
            return Err(BlockError::NoIndices);
        }

        let mut data = BytesMut::zeroed(self.block_size);
        for &index in indices {
            let block = self.blocks.get(index).ok_or(BlockError::IndexOutOfRange {
                index,
                k: self.blocks.len(),
            })?;
            xor_into(&mut data, block);
        }
        Ok(data.freeze())
    }
}

/// A fountain-encoded block: the XOR of the source blocks named by `indices`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    /// Total number of source blocks in the session
    pub k: usize,
    /// Payload length before padding
    pub bytes: usize,
    /// Source block indices combined into `data`
    pub indices: BTreeSet<usize>,
    /// Integrity digest over `data`
    pub checksum: String,
    /// XOR-combined payload, one block long
    pub data: Bytes,
}

impl EncodedBlock {
    /// Build a block and stamp its checksum
    pub fn new(k: usize, bytes: usize, indices: BTreeSet<usize>, data: Bytes) -> Self {
        let checksum = checksum(&data);
        Self {
            k,
            bytes,
            indices,
            checksum,
            data,
        }
    }

    /// Number of source blocks combined into this one
    pub fn degree(&self) -> usize {
        self.indices.len()
    }

    /// Whether `checksum` still matches `data`
    pub fn verify(&self) -> bool {
        checksum(&self.data) == self.checksum
    }

    /// Indices in ascending order, used as the duplicate-suppression key
    pub fn index_key(&self) -> Vec<usize> {
        self.indices.iter().copied().collect()
    }
}

/// Truncated blake3 digest rendered as lowercase hex
pub fn checksum(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex().as_str()[..CHECKSUM_LEN].to_string()
}

/// XOR `src` into `dst` over their common length
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_buffer_partition() {
        let data: Vec<u8> = (0..250u16).map(|i| i as u8).collect();
        let buffer = SourceBuffer::new(&data, 100).unwrap();

        assert_eq!(buffer.block_count(), 3);
        assert_eq!(buffer.byte_length(), 250);
        assert_eq!(buffer.block(2).unwrap().len(), 100);
        assert_eq!(&buffer.block(2).unwrap()[..50], &data[200..]);
        assert!(buffer.block(2).unwrap()[50..].iter().all(|&b| b == 0));
        assert!(buffer.block(3).is_none());
    }

    #[test]
    fn test_exact_multiple_has_no_padding_block() {
        let buffer = SourceBuffer::new(&[1u8; 400], 200).unwrap();
        assert_eq!(buffer.block_count(), 2);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            SourceBuffer::new(&[1, 2, 3], 0),
            Err(BlockError::InvalidBlockSize(0))
        ));
        assert!(matches!(
            SourceBuffer::new(&[], 10),
            Err(BlockError::EmptySource)
        ));
    }

    #[test]
    fn test_combine_xors_selected_blocks() {
        let buffer = SourceBuffer::new(&[0b1100, 0b1010, 0b0110, 0b0001], 1).unwrap();
        let indices: BTreeSet<usize> = [0, 1, 3].into_iter().collect();
        let combined = buffer.combine(&indices).unwrap();
        assert_eq!(&combined[..], &[0b1100 ^ 0b1010 ^ 0b0001]);

        let out_of_range: BTreeSet<usize> = [4].into_iter().collect();
        assert!(matches!(
            buffer.combine(&out_of_range),
            Err(BlockError::IndexOutOfRange { index: 4, k: 4 })
        ));
        assert!(matches!(
            buffer.combine(&BTreeSet::new()),
            Err(BlockError::NoIndices)
        ));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let indices: BTreeSet<usize> = [2].into_iter().collect();
        let mut block = EncodedBlock::new(4, 10, indices, Bytes::from_static(b"abc"));
        assert_eq!(block.checksum.len(), CHECKSUM_LEN);
        assert!(block.verify());

        block.data = Bytes::from_static(b"abd");
        assert!(!block.verify());
    }
}
