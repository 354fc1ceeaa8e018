//! Memory budget.

use std::fmt;
use std::str::FromStr;

use bytesize::{ByteSize, GIB, KIB, MIB};
use log;

use crate::sort::SortError;

/// Smallest read/write buffer handed to a merge stream.
/// A buffer with zero capacity would look like an exhausted stream.
pub const MIN_STREAM_BUFFER_SIZE: usize = 512;

/// Working memory budget in bytes.
///
/// The budget bounds the size of a single block during the split phase and is shared between all the
/// streams (every block plus the output) during the merge phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    bytes: u64,
}

impl MemoryBudget {
    /// Creates a budget of `bytes` bytes. The budget must not be zero.
    pub fn new(bytes: u64) -> Result<Self, SortError> {
        if bytes == 0 {
            return Err(SortError::InvalidBudget);
        }

        return Ok(MemoryBudget { bytes });
    }

    /// Returns the budget in bytes.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the maximum size of a block.
    pub fn block_size(&self) -> u64 {
        self.bytes
    }

    /// Estimates the number of blocks an input of `input_len` bytes will be split into.
    pub fn estimate_blocks(&self, input_len: u64) -> u64 {
        input_len / self.bytes + 1
    }

    /// Returns the read buffer size of every merge stream when `blocks` blocks are merged.
    /// The budget is divided between the block streams and the output stream.
    /// The result is never less than [`MIN_STREAM_BUFFER_SIZE`], so merging too many blocks
    /// may take more memory than the budget.
    pub fn stream_buffer_size(&self, blocks: usize) -> usize {
        let participants = blocks as u64 + 1;
        let size = usize::try_from(self.bytes / participants).unwrap_or(usize::MAX);

        if size < MIN_STREAM_BUFFER_SIZE {
            log::warn!(
                "memory budget {} is too small to merge {} blocks, using {} per stream ({} in total)",
                self,
                blocks,
                ByteSize(MIN_STREAM_BUFFER_SIZE as u64),
                ByteSize(MIN_STREAM_BUFFER_SIZE as u64 * participants),
            );
            return MIN_STREAM_BUFFER_SIZE;
        }

        return size;
    }
}

impl FromStr for MemoryBudget {
    type Err = SortError;

    /// Parses a byte count optionally followed by a `K`, `M` or `G` suffix (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let invalid = || SortError::InvalidSizeFormat(s.to_string());

        let (digits, multiplier) = match value.chars().last() {
            None => return Err(invalid()),
            Some('k') | Some('K') => (&value[..value.len() - 1], KIB),
            Some('m') | Some('M') => (&value[..value.len() - 1], MIB),
            Some('g') | Some('G') => (&value[..value.len() - 1], GIB),
            Some(_) => (value, 1),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let bytes = digits
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier))
            .ok_or_else(invalid)?;

        MemoryBudget::new(bytes)
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ByteSize(self.bytes))
    }
}
