//! Block splitter.

use std::cmp::Ordering;
use std::io;
use std::io::prelude::*;

use log;
use rayon::slice::ParallelSliceMut;

use crate::buffer::BlockBuffer;
use crate::record::{read_record, DEFAULT_TERMINATOR};
use crate::sort::SortError;
use crate::store::{BlockId, BlockStore};

/// Splits an input stream into sorted blocks of bounded size.
///
/// Records are accumulated until their total size reaches the block size, so the last record
/// of a block may push it over the limit: records are never split. A record exceeding the block size
/// by itself is saved as a one-record block unless strict mode is enabled, in which case splitting fails
/// with [`SortError::RecordTooLarge`].
///
/// Blocks always hold terminated records. If the input ends without a terminator one is appended to the
/// last record and [`BlockSplitter::input_unterminated`] reports it.
pub struct BlockSplitter<'a, S: BlockStore> {
    store: &'a S,
    thread_pool: &'a rayon::ThreadPool,
    block_size: u64,
    terminator: u8,
    strict: bool,
    rw_buf_size: Option<usize>,
    blocks: Vec<BlockId>,
    unterminated: bool,
}

impl<'a, S: BlockStore> BlockSplitter<'a, S> {
    /// Creates a new splitter.
    ///
    /// # Arguments
    /// * `store` - Storage the blocks are saved to
    /// * `thread_pool` - Thread pool blocks are sorted in
    /// * `block_size` - Maximum block size in bytes, must not be zero
    pub fn new(store: &'a S, thread_pool: &'a rayon::ThreadPool, block_size: u64) -> Result<Self, SortError> {
        if block_size == 0 {
            return Err(SortError::InvalidBudget);
        }

        return Ok(BlockSplitter {
            store,
            thread_pool,
            block_size,
            terminator: DEFAULT_TERMINATOR,
            strict: false,
            rw_buf_size: None,
            blocks: Vec::new(),
            unterminated: false,
        });
    }

    /// Sets the record terminator.
    pub fn with_terminator(mut self, terminator: u8) -> Self {
        self.terminator = terminator;
        return self;
    }

    /// Rejects records larger than the block size.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        return self;
    }

    /// Sets block write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: Option<usize>) -> Self {
        self.rw_buf_size = buf_size;
        return self;
    }

    /// Returns identifiers of all the blocks created so far, in creation order.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Checks if the last input record had no terminator.
    pub fn input_unterminated(&self) -> bool {
        self.unterminated
    }

    /// Splits the input into sorted blocks.
    /// Returns identifiers of the created blocks in the order the data was read from the input.
    ///
    /// On failure the blocks created before the error are kept and can be removed using [`BlockSplitter::cleanup`].
    ///
    /// # Arguments
    /// * `input` - Input stream
    /// * `compare` - Function to be used to compare records
    pub fn split<R, F>(&mut self, mut input: R, compare: F) -> Result<Vec<BlockId>, SortError>
    where
        R: BufRead,
        F: Fn(&[u8], &[u8]) -> Ordering + Sync + Send + Copy,
    {
        let mut buffer = BlockBuffer::new(self.block_size);

        while let Some(mut record) = read_record(&mut input, self.terminator).map_err(SortError::InputError)? {
            self.unterminated = record.last() != Some(&self.terminator);
            if self.unterminated {
                record.push(self.terminator);
            }

            if record.len() as u64 > self.block_size {
                if self.strict {
                    return Err(SortError::RecordTooLarge {
                        size: record.len(),
                        limit: self.block_size,
                    });
                }
                log::warn!(
                    "record of {} bytes exceeds block size of {} bytes",
                    record.len(),
                    self.block_size
                );

                if !buffer.is_empty() {
                    self.write_block(buffer, compare)?;
                    buffer = BlockBuffer::new(self.block_size);
                }
            }

            buffer.push(record);

            if buffer.is_full() {
                self.write_block(buffer, compare)?;
                buffer = BlockBuffer::new(self.block_size);
            }
        }

        if !buffer.is_empty() {
            self.write_block(buffer, compare)?;
        }

        log::debug!("input split into {} blocks", self.blocks.len());

        return Ok(self.blocks.clone());
    }

    fn write_block<F>(&mut self, mut buffer: BlockBuffer, compare: F) -> Result<BlockId, SortError>
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Sync + Send,
    {
        let id = BlockId(self.blocks.len());

        log::debug!(
            "sorting block {} ({} records, {} bytes) ...",
            id,
            buffer.len(),
            buffer.mem_size()
        );
        self.thread_pool.install(|| {
            buffer.par_sort_by(|a, b| compare(a.as_slice(), b.as_slice()));
        });

        log::debug!("saving block {}", id);
        let mut writer = self.store.create(id, self.rw_buf_size).map_err(SortError::IO)?;
        self.blocks.push(id);

        for record in buffer {
            writer.write_all(&record).map_err(SortError::IO)?;
        }
        self.store.finish(writer).map_err(SortError::IO)?;

        return Ok(id);
    }

    /// Removes all the blocks created by the splitter.
    /// Every block removal is attempted, the first error encountered is returned.
    pub fn cleanup(&mut self) -> io::Result<()> {
        let mut result = Ok(());

        for id in self.blocks.drain(..) {
            if let Err(err) = self.store.delete(id) {
                log::warn!("block {} removal failed: {}", id, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        return result;
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, prelude::*};

    use rstest::*;

    use super::BlockSplitter;
    use crate::sort::SortError;
    use crate::store::{BlockId, BlockStore, PlainStore};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[fixture]
    fn thread_pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn read_block(store: &PlainStore, id: BlockId) -> Vec<String> {
        let reader = store.open(id, 64).unwrap();
        reader.lines().map(Result::unwrap).collect()
    }

    fn natural(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }

    #[rstest]
    #[case(8)]
    #[case(13)]
    fn test_split_sorts_each_block(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool, #[case] block_size: u64) {
        let store = PlainStore::new(tmp_dir.path());
        let input = io::Cursor::new("banana\napple\ncherry\napple\n");

        let mut splitter = BlockSplitter::new(&store, &thread_pool, block_size).unwrap();
        let blocks = splitter.split(input, natural).unwrap();

        assert_eq!(blocks, vec![BlockId(0), BlockId(1)]);
        assert_eq!(read_block(&store, BlockId(0)), vec!["apple", "banana"]);
        assert_eq!(read_block(&store, BlockId(1)), vec!["apple", "cherry"]);
    }

    #[rstest]
    fn test_split_empty_input(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool) {
        let store = PlainStore::new(tmp_dir.path());

        let mut splitter = BlockSplitter::new(&store, &thread_pool, 16).unwrap();
        let blocks = splitter.split(io::Cursor::new(""), natural).unwrap();

        assert!(blocks.is_empty());
        assert_eq!(std::fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_split_final_partial_block(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool) {
        let store = PlainStore::new(tmp_dir.path());
        let input = io::Cursor::new("d\nc\nb\na\ne");

        let mut splitter = BlockSplitter::new(&store, &thread_pool, 4).unwrap();
        let blocks = splitter.split(input, natural).unwrap();

        assert_eq!(blocks.len(), 3);
        assert_eq!(read_block(&store, BlockId(0)), vec!["c", "d"]);
        assert_eq!(read_block(&store, BlockId(1)), vec!["a", "b"]);
        assert_eq!(read_block(&store, BlockId(2)), vec!["e"]);

        // the unterminated last line gets a terminator
        assert_eq!(std::fs::read(store.path(BlockId(2))).unwrap(), b"e\n");
        assert!(splitter.input_unterminated());
    }

    #[rstest]
    fn test_split_is_stable(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool) {
        let store = PlainStore::new(tmp_dir.path());
        let input = io::Cursor::new("b 1\na 1\nb 2\na 2\nb 3\n");

        let mut splitter = BlockSplitter::new(&store, &thread_pool, 1024).unwrap();
        splitter.split(input, |a: &[u8], b: &[u8]| a[0].cmp(&b[0])).unwrap();

        assert_eq!(read_block(&store, BlockId(0)), vec!["a 1", "a 2", "b 1", "b 2", "b 3"]);
    }

    #[rstest]
    fn test_split_oversized_record(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool) {
        let store = PlainStore::new(tmp_dir.path());
        let input = io::Cursor::new("z\nthis line is long\na\n");

        let mut splitter = BlockSplitter::new(&store, &thread_pool, 4).unwrap();
        let blocks = splitter.split(input, natural).unwrap();

        assert_eq!(blocks.len(), 3);
        assert_eq!(read_block(&store, BlockId(0)), vec!["z"]);
        assert_eq!(read_block(&store, BlockId(1)), vec!["this line is long"]);
        assert_eq!(read_block(&store, BlockId(2)), vec!["a"]);
        assert!(!splitter.input_unterminated());
    }

    #[rstest]
    fn test_split_oversized_record_strict(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool) {
        let store = PlainStore::new(tmp_dir.path());
        let input = io::Cursor::new("a\nb\nc\nthis line is long\n");

        let mut splitter = BlockSplitter::new(&store, &thread_pool, 4).unwrap().with_strict(true);
        match splitter.split(input, natural) {
            Err(SortError::RecordTooLarge { size, limit }) => {
                assert_eq!(size, 18);
                assert_eq!(limit, 4);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // blocks written before the failure are tracked and removed by cleanup
        assert_eq!(splitter.blocks(), &[BlockId(0)]);
        splitter.cleanup().unwrap();
        assert!(splitter.blocks().is_empty());
        assert_eq!(std::fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_cleanup(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool) {
        let store = PlainStore::new(tmp_dir.path());
        let input = io::Cursor::new("3\n2\n1\n");

        let mut splitter = BlockSplitter::new(&store, &thread_pool, 2).unwrap();
        splitter.split(input, natural).unwrap();
        assert_eq!(std::fs::read_dir(tmp_dir.path()).unwrap().count(), 3);

        // a block removed behind the splitter's back is not an error
        store.delete(BlockId(1)).unwrap();

        splitter.cleanup().unwrap();
        assert_eq!(std::fs::read_dir(tmp_dir.path()).unwrap().count(), 0);

        // nothing left to remove
        splitter.cleanup().unwrap();
    }

    #[rstest]
    fn test_zero_block_size(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool) {
        let store = PlainStore::new(tmp_dir.path());

        assert!(matches!(
            BlockSplitter::new(&store, &thread_pool, 0),
            Err(SortError::InvalidBudget)
        ));
    }
}
