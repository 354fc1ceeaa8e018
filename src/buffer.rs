//! Block buffer.

use rayon;

/// In-memory buffer of records limited by their total size in bytes.
/// Accumulates records of a single block before the block is sorted and saved.
pub struct BlockBuffer {
    limit: u64,
    current_size: u64,
    inner: Vec<Vec<u8>>,
}

impl BlockBuffer {
    pub fn new(limit: u64) -> Self {
        BlockBuffer {
            limit,
            current_size: 0,
            inner: Vec::new(),
        }
    }

    /// Adds a new record to the buffer.
    pub fn push(&mut self, record: Vec<u8>) {
        self.current_size += record.len() as u64;
        self.inner.push(record);
    }

    /// Returns the number of buffered records.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the total size of buffered records in bytes.
    pub fn mem_size(&self) -> u64 {
        self.current_size
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.current_size >= self.limit
    }
}

impl IntoIterator for BlockBuffer {
    type Item = Vec<u8>;
    type IntoIter = <Vec<Vec<u8>> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<Vec<u8>> for BlockBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [Vec<u8>] {
        self.inner.as_mut_slice()
    }
}
