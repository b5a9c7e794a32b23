//! Linear algebra over GF(2) for the decoder's elimination fallback.
//!
//! Each row is one encoded block reduced against the already resolved
//! source blocks: a bit per still unknown source index plus the XOR payload
//! on the right-hand side. Gauss-Jordan elimination recovers every unknown
//! the system pins down, even when no row has degree one.

use crate::block::xor_into;
use std::collections::{BTreeSet, HashMap};

const WORD_BITS: usize = 64;

/// Augmented matrix over GF(2): bit-packed coefficient rows and payloads
#[derive(Debug, Clone)]
pub struct BinaryMatrix {
    /// Source index for every column
    columns: Vec<usize>,
    /// Coefficient rows, `words` u64s each
    rows: Vec<Vec<u64>>,
    /// Right-hand side payload for every row
    payloads: Vec<Vec<u8>>,
    words: usize,
}

impl BinaryMatrix {
    /// Build the system from `(unknown indices, payload)` equations
    pub fn from_equations<'a, I>(equations: I) -> Self
    where
        I: IntoIterator<Item = (&'a BTreeSet<usize>, &'a [u8])>,
    {
        let equations: Vec<_> = equations.into_iter().collect();
        let columns: Vec<usize> = equations
            .iter()
            .flat_map(|(unknowns, _)| unknowns.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let column_of: HashMap<usize, usize> =
            columns.iter().enumerate().map(|(c, &i)| (i, c)).collect();
        let words = columns.len().div_ceil(WORD_BITS).max(1);

        let mut rows = Vec::with_capacity(equations.len());
        let mut payloads = Vec::with_capacity(equations.len());
        for (unknowns, payload) in equations {
            let mut row = vec![0u64; words];
            for index in unknowns {
                let col = column_of[index];
                row[col / WORD_BITS] |= 1 << (col % WORD_BITS);
            }
            rows.push(row);
            payloads.push(payload.to_vec());
        }

        Self {
            columns,
            rows,
            payloads,
            words,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    fn bit(&self, row: usize, col: usize) -> bool {
        self.rows[row][col / WORD_BITS] & (1 << (col % WORD_BITS)) != 0
    }

    /// XOR row `src` into row `dst`, coefficients and payload alike
    fn add_row(&mut self, src: usize, dst: usize) {
        for w in 0..self.words {
            let word = self.rows[src][w];
            self.rows[dst][w] ^= word;
        }
        let payload = std::mem::take(&mut self.payloads[src]);
        xor_into(&mut self.payloads[dst], &payload);
        self.payloads[src] = payload;
    }

    /// Reduce to reduced row echelon form, returning the number of pivots
    pub fn gaussian_elimination(&mut self) -> usize {
        let mut pivot_row = 0;

        for col in 0..self.cols() {
            if pivot_row == self.rows() {
                break;
            }

            let Some(found) = (pivot_row..self.rows()).find(|&r| self.bit(r, col)) else {
                continue;
            };
            self.rows.swap(found, pivot_row);
            self.payloads.swap(found, pivot_row);

            for r in 0..self.rows() {
                if r != pivot_row && self.bit(r, col) {
                    self.add_row(pivot_row, r);
                }
            }
            pivot_row += 1;
        }

        pivot_row
    }

    /// Run elimination and return every source index it determines
    pub fn solve(self) -> Vec<(usize, Vec<u8>)> {
        self.solve_ranked().1
    }

    /// Like [`BinaryMatrix::solve`], also returning the rank of the system
    pub fn solve_ranked(mut self) -> (usize, Vec<(usize, Vec<u8>)>) {
        let rank = self.gaussian_elimination();
        let mut solved = Vec::new();

        for r in 0..rank {
            let ones: u32 = self.rows[r].iter().map(|w| w.count_ones()).sum();
            if ones != 1 {
                continue;
            }
            let Some(col) = (0..self.cols()).find(|&c| self.bit(r, c)) else {
                continue;
            };
            solved.push((self.columns[col], std::mem::take(&mut self.payloads[r])));
        }

        (rank, solved)
    }
}
