//! MIX main memory.
//!
//! 4000 words, addressed 0..=3999. Every access is bounds-checked; an
//! address outside memory is reported as an error and never wrapped.

use std::ops::Range;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use crate::binary::Word;

/// The number of memory cells.
pub const MEMORY_SIZE: usize = 4000;

/// MIX memory: 4000 words.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<Word>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![Word::ZERO; MEMORY_SIZE],
        }
    }

    /// Validate a signed address and convert it to a cell index.
    pub fn index(addr: i64) -> Result<usize, MemoryError> {
        if addr < 0 || addr >= MEMORY_SIZE as i64 {
            return Err(MemoryError::AddressOutOfRange(addr));
        }
        Ok(addr as usize)
    }

    /// Validate a block of `len` cells starting at `start`.
    pub fn block(start: i64, len: usize) -> Result<Range<usize>, MemoryError> {
        let first = Self::index(start)?;
        if len > 0 {
            Self::index(start + len as i64 - 1)?;
        }
        Ok(first..first + len)
    }

    /// Read a cell.
    #[inline]
    pub fn read(&self, addr: usize) -> Result<Word, MemoryError> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange(addr as i64))
    }

    /// Write a cell.
    #[inline]
    pub fn write(&mut self, addr: usize, value: Word) -> Result<(), MemoryError> {
        let cell = self
            .cells
            .get_mut(addr)
            .ok_or(MemoryError::AddressOutOfRange(addr as i64))?;
        *cell = value;
        Ok(())
    }

    /// Borrow a validated block of cells.
    pub fn slice(&self, range: Range<usize>) -> Result<&[Word], MemoryError> {
        let end = range.end;
        self.cells
            .get(range)
            .ok_or(MemoryError::AddressOutOfRange(end as i64))
    }

    /// Mutably borrow a validated block of cells.
    pub fn slice_mut(&mut self, range: Range<usize>) -> Result<&mut [Word], MemoryError> {
        let end = range.end;
        self.cells
            .get_mut(range)
            .ok_or(MemoryError::AddressOutOfRange(end as i64))
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(Word::ZERO);
    }

    /// Place a run of words starting at `start`.
    pub fn load_words(&mut self, start: usize, words: &[Word]) -> Result<(), MemoryError> {
        if start >= MEMORY_SIZE && !words.is_empty() {
            return Err(MemoryError::AddressOutOfRange(i64::try_from(start).unwrap_or(i64::MAX)));
        }
        let end = start
            .checked_add(words.len())
            .filter(|&end| end <= MEMORY_SIZE)
            .ok_or(MemoryError::ProgramTooLarge {
                size: words.len(),
                available: MEMORY_SIZE.saturating_sub(start),
            })?;
        self.slice_mut(start..end)?.copy_from_slice(words);
        Ok(())
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(MEMORY_SIZE);
        (start.min(end)..end)
            .map(|i| (i, self.cells[i]))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|cell| !cell.is_zero()).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory address {0} out of range (0-3999)")]
    AddressOutOfRange(i64),

    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}
