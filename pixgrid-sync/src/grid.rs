//! Local mirror of the server's grid.
//!
//! Holds exactly `cell_count` booleans. Snapshots longer than the grid are
//! truncated (their padding bits mean nothing); shorter ones leave the
//! remaining cells off.

use crate::codec::{self, BitOrder};

/// Current grid contents. No history is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridState {
    cells: Vec<bool>,
}

impl GridState {
    /// An all-off grid of `cell_count` cells.
    pub fn new(cell_count: usize) -> Self {
        Self {
            cells: vec![false; cell_count],
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Side length of the grid, if the cell count is a perfect square.
    pub fn dimension(&self) -> Option<usize> {
        let n = (self.cells.len() as f64).sqrt().round() as usize;
        (n * n == self.cells.len()).then_some(n)
    }

    /// Replace every cell from an authoritative snapshot.
    pub fn replace_all(&mut self, bits: &[bool]) {
        let n = self.cells.len();
        let take = bits.len().min(n);
        self.cells[..take].copy_from_slice(&bits[..take]);
        self.cells[take..].fill(false);
    }

    /// Set one cell. Out-of-range indices are ignored; returns whether the
    /// index was in range.
    pub fn set_cell(&mut self, index: usize, value: bool) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => {
                log::debug!(
                    "Ignoring update for cell {index} (grid has {} cells)",
                    self.cells.len()
                );
                false
            }
        }
    }

    /// Value of one cell; `None` when out of range.
    pub fn get(&self, index: usize) -> Option<bool> {
        self.cells.get(index).copied()
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    pub fn count_on(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Pack the grid back into wire bytes.
    pub fn to_bytes(&self, order: BitOrder) -> Vec<u8> {
        codec::encode_bits(&self.cells, order)
    }

    /// Cell index for `(row, col)` on a square grid.
    pub fn index_of(&self, row: usize, col: usize) -> Option<usize> {
        let n = self.dimension()?;
        (row < n && col < n).then(|| row * n + col)
    }

    /// `(row, col)` for a cell index on a square grid.
    pub fn coords_of(&self, index: usize) -> Option<(usize, usize)> {
        let n = self.dimension()?;
        (index < self.cells.len() && n > 0).then(|| (index / n, index % n))
    }
}
