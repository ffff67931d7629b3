use std::num::NonZeroU64;

use crate::formats::RowRange;

/// Split of `[0, total_rows)` into consecutive chunks of `chunk_size` rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_rows: u64,
    pub chunk_size: NonZeroU64,
}

/// One planned chunk; `index` is 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    pub index: u64,
    pub total: u64,
    pub range: RowRange,
}

impl ChunkSpec {
    /// The first chunk creates the table, every later one appends to it
    pub fn is_first(&self) -> bool {
        self.index == 1
    }
}

impl ChunkPlan {
    pub fn new(total_rows: u64, chunk_size: NonZeroU64) -> Self {
        Self {
            total_rows,
            chunk_size,
        }
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_rows.div_ceil(self.chunk_size.get())
    }

    /// Chunks in ascending order
    pub fn chunks(&self) -> impl Iterator<Item = ChunkSpec> + use<> {
        let total = self.total_chunks();
        let total_rows = self.total_rows;
        let chunk_size = self.chunk_size.get();

        (1..=total).map(move |index| {
            let start = (index - 1) * chunk_size;
            let end = start.saturating_add(chunk_size).min(total_rows);
            ChunkSpec {
                index,
                total,
                range: RowRange::new(start, end),
            }
        })
    }
}
