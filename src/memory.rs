use std::collections::HashMap;

/// Sparse auxiliary memory, unbounded in both directions.
///
/// Unwritten addresses read as zero. Zero writes remove the cell, so the map
/// only ever holds non-zero cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Memory {
    cells: HashMap<i64, i64>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn read(&self, address: i64) -> i64 {
        self.cells.get(&address).copied().unwrap_or(0)
    }

    #[inline]
    pub fn write(&mut self, address: i64, value: i64) {
        if value == 0 {
            self.cells.remove(&address);
        } else {
            self.cells.insert(address, value);
        }
    }

    /// Number of non-zero cells (the tape diagnostic checksum).
    pub fn checksum(&self) -> usize {
        self.cells.len()
    }

    /// Non-zero cells in address order.
    pub fn cells(&self) -> Vec<(i64, i64)> {
        let mut cells: Vec<_> = self.cells.iter().map(|(&a, &v)| (a, v)).collect();
        cells.sort_unstable();
        cells
    }
}
