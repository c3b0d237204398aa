// In-memory grid built from persisted cell rows.

use crate::db::Cell;

/// An N×N grid where each position holds the owning team id, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    size: usize,
    owners: Vec<Option<i64>>,
}

impl Board {
    /// An empty board with no owned positions.
    pub fn empty(size: usize) -> Self {
        Self {
            size,
            owners: vec![None; size * size],
        }
    }

    /// Build a board from cell rows. Cells whose coordinates fall outside
    /// `[0, size)` are ignored.
    pub fn from_cells(size: usize, cells: &[Cell]) -> Self {
        let mut board = Self::empty(size);
        for cell in cells {
            if let Some(team_id) = cell.captured_by_team_id {
                board.set_owner(cell.row, cell.col, team_id);
            }
        }
        board
    }

    /// Board side length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Owner of `(row, col)`; `None` for unowned or out-of-range positions.
    pub fn owner(&self, row: usize, col: usize) -> Option<i64> {
        if row >= self.size || col >= self.size {
            return None;
        }
        self.owners[row * self.size + col]
    }

    /// Mark `(row, col)` as owned. Out-of-range coordinates are ignored.
    pub fn set_owner(&mut self, row: i64, col: i64, team_id: i64) {
        let (Ok(row), Ok(col)) = (usize::try_from(row), usize::try_from(col)) else {
            return;
        };
        if row < self.size && col < self.size {
            self.owners[row * self.size + col] = Some(team_id);
        }
    }
}
