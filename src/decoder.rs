//! Incremental fountain decoder.
//!
//! Blocks arrive in any order, possibly repeated, possibly from a different
//! transmit session encoding the same payload. Each accepted block is
//! reduced against the resolved source blocks; anything left with a single
//! unknown resolves it, and the resolution cascades through the pending
//! blocks until nothing more can be peeled. When peeling stalls with enough
//! equations on hand, GF(2) elimination over the pending set takes over.

use crate::block::{xor_into, EncodedBlock};
use crate::linear_algebra::BinaryMatrix;
use bytes::Bytes;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Upper bound on `k` accepted from an untrusted first block
pub const MAX_SOURCE_BLOCKS: usize = 1 << 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecoderError {
    #[error("Checksum mismatch for block {indices:?}")]
    ChecksumMismatch { indices: Vec<usize> },
    #[error("Block declares k={k}, bytes={bytes} but the session has k={expected_k}, bytes={expected_bytes}")]
    ParameterMismatch {
        k: usize,
        bytes: usize,
        expected_k: usize,
        expected_bytes: usize,
    },
    #[error("Block length {found} does not match session block length {expected}")]
    BlockLengthMismatch { found: usize, expected: usize },
    #[error("Invalid session parameters: k={k}, bytes={bytes}, block length {block_len}")]
    InvalidParameters {
        k: usize,
        bytes: usize,
        block_len: usize,
    },
    #[error("Block index {index} out of range for {k} source blocks")]
    IndexOutOfRange { index: usize, k: usize },
    #[error("Encoded block combines no source blocks")]
    NoIndices,
    #[error("Decoding incomplete: {resolved} of {k} source blocks resolved")]
    Incomplete { resolved: usize, k: usize },
}

/// Parameters latched from the first accepted block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionParams {
    k: usize,
    bytes: usize,
    block_len: usize,
}

/// An accepted block still covering two or more unresolved indices
#[derive(Debug, Clone)]
struct PendingBlock {
    unknowns: BTreeSet<usize>,
    data: Vec<u8>,
}

/// Stateful decoder for one transfer
#[derive(Debug, Default)]
pub struct Decoder {
    session: Option<SessionParams>,
    /// Source block index -> resolved bytes
    resolved: Vec<Option<Bytes>>,
    resolved_count: usize,
    pending: Vec<PendingBlock>,
    /// Index sets already applied
    seen: HashSet<Vec<usize>>,
    applied: usize,
    allow_duplicates: bool,
    /// Rank still missing after the last elimination
    rank_deficit: usize,
    /// Blocks applied since the last elimination
    since_elimination: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reprocess blocks whose index set was already applied
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    /// Feed one block. Returns `true` exactly when the payload is complete.
    ///
    /// A rejected block leaves the decoder untouched.
    pub fn add_block(&mut self, block: &EncodedBlock) -> Result<bool, DecoderError> {
        if self.is_complete() {
            return Ok(true);
        }

        let params = self.validate(block)?;

        let key = block.index_key();
        if !self.allow_duplicates && self.seen.contains(&key) {
            debug!("ignoring duplicate block {:?}", key);
            return Ok(false);
        }

        if self.session.is_none() {
            debug!(
                "latched session parameters k={}, bytes={}, block length {}",
                params.k, params.bytes, params.block_len
            );
            self.session = Some(params);
            self.resolved = vec![None; params.k];
        }
        self.seen.insert(key);
        self.applied += 1;

        let mut data = block.data.to_vec();
        let mut unknowns = BTreeSet::new();
        for &index in &block.indices {
            match &self.resolved[index] {
                Some(known) => xor_into(&mut data, known),
                None => {
                    unknowns.insert(index);
                }
            }
        }

        match unknowns.len() {
            0 => {}
            1 => {
                if let Some(&index) = unknowns.first() {
                    if self.mark_resolved(index, Bytes::from(data)) {
                        self.propagate(vec![index]);
                    }
                }
            }
            _ => self.pending.push(PendingBlock { unknowns, data }),
        }

        self.since_elimination += 1;
        if self.elimination_due(params.k) {
            self.eliminate(params.k);
        }

        if self.is_complete() {
            info!(
                "decoded {} source blocks from {} applied blocks",
                params.k, self.applied
            );
        }
        Ok(self.is_complete())
    }

    fn validate(&self, block: &EncodedBlock) -> Result<SessionParams, DecoderError> {
        if block.indices.is_empty() {
            return Err(DecoderError::NoIndices);
        }
        if !block.verify() {
            warn!("checksum mismatch on block {:?}", block.index_key());
            return Err(DecoderError::ChecksumMismatch {
                indices: block.index_key(),
            });
        }

        let params = match self.session {
            Some(session) => {
                if block.k != session.k || block.bytes != session.bytes {
                    return Err(DecoderError::ParameterMismatch {
                        k: block.k,
                        bytes: block.bytes,
                        expected_k: session.k,
                        expected_bytes: session.bytes,
                    });
                }
                if block.data.len() != session.block_len {
                    return Err(DecoderError::BlockLengthMismatch {
                        found: block.data.len(),
                        expected: session.block_len,
                    });
                }
                session
            }
            None => {
                let block_len = block.data.len();
                let capacity = block.k.checked_mul(block_len).unwrap_or(usize::MAX);
                if block.k == 0
                    || block.k > MAX_SOURCE_BLOCKS
                    || block_len == 0
                    || block.bytes == 0
                    || block.bytes > capacity
                {
                    return Err(DecoderError::InvalidParameters {
                        k: block.k,
                        bytes: block.bytes,
                        block_len,
                    });
                }
                SessionParams {
                    k: block.k,
                    bytes: block.bytes,
                    block_len,
                }
            }
        };

        if let Some(&index) = block.indices.iter().find(|&&i| i >= params.k) {
            return Err(DecoderError::IndexOutOfRange { index, k: params.k });
        }
        Ok(params)
    }

    /// Record a source block, returning whether it was newly resolved
    fn mark_resolved(&mut self, index: usize, data: Bytes) -> bool {
        if self.resolved[index].is_some() {
            return false;
        }
        self.resolved[index] = Some(data);
        self.resolved_count += 1;
        true
    }

    /// Cascade newly resolved indices through the pending blocks to a fixed point
    fn propagate(&mut self, mut queue: Vec<usize>) {
        while let Some(solved) = queue.pop() {
            let Some(value) = self.resolved[solved].clone() else {
                continue;
            };

            let mut i = 0;
            while i < self.pending.len() {
                let block = &mut self.pending[i];
                if block.unknowns.remove(&solved) {
                    xor_into(&mut block.data, &value);
                }

                match block.unknowns.len() {
                    0 => {
                        self.pending.swap_remove(i);
                    }
                    1 => {
                        let block = self.pending.swap_remove(i);
                        if let Some(&index) = block.unknowns.first() {
                            if self.mark_resolved(index, Bytes::from(block.data)) {
                                queue.push(index);
                            }
                        }
                    }
                    _ => i += 1,
                }
            }
        }
    }

    /// Whether the pending set could now pin down every unresolved index.
    ///
    /// Each applied block raises the rank of the whole system by at most one,
    /// so elimination is skipped until enough blocks have arrived to cover
    /// the deficit the previous run left.
    fn elimination_due(&self, k: usize) -> bool {
        !self.is_complete()
            && !self.pending.is_empty()
            && self.pending.len() + self.resolved_count >= k
            && self.since_elimination >= self.rank_deficit
    }

    /// Solve the pending set by elimination when peeling has stalled
    fn eliminate(&mut self, k: usize) {
        let matrix = BinaryMatrix::from_equations(
            self.pending
                .iter()
                .map(|block| (&block.unknowns, block.data.as_slice())),
        );
        debug!(
            "peeling stalled, eliminating {} x {} system",
            matrix.rows(),
            matrix.cols()
        );

        let (rank, solved) = matrix.solve_ranked();
        self.rank_deficit = k.saturating_sub(self.resolved_count + rank);
        self.since_elimination = 0;

        let mut queue = Vec::new();
        for (index, data) in solved {
            if self.mark_resolved(index, Bytes::from(data)) {
                queue.push(index);
            }
        }
        self.propagate(queue);
    }

    /// Whether every source block is resolved
    pub fn is_complete(&self) -> bool {
        matches!(self.session, Some(session) if self.resolved_count == session.k)
    }

    /// The reconstructed payload, trimmed to its original length
    pub fn decoded(&self) -> Result<Vec<u8>, DecoderError> {
        let Some(session) = self.session.filter(|_| self.is_complete()) else {
            return Err(DecoderError::Incomplete {
                resolved: self.resolved_count,
                k: self.session.map(|s| s.k).unwrap_or(0),
            });
        };

        let mut payload = Vec::with_capacity(session.k * session.block_len);
        for block in self.resolved.iter().flatten() {
            payload.extend_from_slice(block);
        }
        payload.truncate(session.bytes);
        Ok(payload)
    }

    /// Discard all state and start over
    pub fn reset(&mut self) {
        let allow_duplicates = self.allow_duplicates;
        *self = Self {
            allow_duplicates,
            ..Self::default()
        };
    }

    /// Total source blocks, once known
    pub fn source_block_count(&self) -> Option<usize> {
        self.session.map(|s| s.k)
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved_count
    }

    /// Distinct blocks applied so far
    pub fn applied_blocks(&self) -> usize {
        self.applied
    }

    pub fn pending_blocks(&self) -> usize {
        self.pending.len()
    }
}
