//! K-way merger.

use std::io;
use std::io::prelude::*;

use log;

use crate::record::{Record, DEFAULT_TERMINATOR};
use crate::select::SelectionStrategy;
use crate::sort::SortError;
use crate::store::{BlockId, BlockStore};
use crate::streams::StreamBuffers;

/// Merge result. Returned only if all the blocks were merged and the output was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    /// Number of records written to the output.
    pub records: u64,
    /// Number of bytes written to the output.
    pub bytes: u64,
}

/// K-way merger implementation.
/// Merges multiple sorted blocks into a single sorted output.
/// Time complexity is *m* \* *n* in worst case where *m* is the number of records,
/// *n* is the number of blocks.
pub struct KWayMerger<'a, S: BlockStore, P: SelectionStrategy> {
    store: &'a S,
    selection: P,
    buf_size: usize,
    terminator: u8,
    unterminated: bool,
}

impl<'a, S: BlockStore, P: SelectionStrategy> KWayMerger<'a, S, P> {
    /// Creates a merger.
    ///
    /// # Arguments
    /// * `store` - Storage the blocks are read from
    /// * `selection` - Strategy choosing the next record, it must use the order the blocks were sorted by
    /// * `buf_size` - Read buffer size of every block stream and write buffer size of the output
    pub fn new(store: &'a S, selection: P, buf_size: usize) -> Self {
        KWayMerger {
            store,
            selection,
            buf_size,
            terminator: DEFAULT_TERMINATOR,
            unterminated: false,
        }
    }

    /// Sets the record terminator.
    pub fn with_terminator(mut self, terminator: u8) -> Self {
        self.terminator = terminator;
        return self;
    }

    /// Drops the terminator of the last output record, used when the sorted input didn't end with one.
    pub fn with_unterminated_output(mut self, unterminated: bool) -> Self {
        self.unterminated = unterminated;
        return self;
    }

    /// Merges the blocks writing the result to the output.
    /// Blocks are left in the storage, removing them is up to the caller.
    ///
    /// # Arguments
    /// * `blocks` - Blocks to be merged, on equal records the block listed first wins
    /// * `output` - Output stream
    pub fn merge<W: Write>(&self, blocks: &[BlockId], output: W) -> Result<MergeSummary, SortError> {
        log::debug!("merging {} blocks (buffer size: {})", blocks.len(), self.buf_size);

        let streams = blocks
            .iter()
            .map(|id| self.store.open(*id, self.buf_size))
            .collect::<io::Result<Vec<_>>>()
            .map_err(SortError::IO)?;

        let mut buffers = StreamBuffers::new(streams, self.terminator);
        let mut output = io::BufWriter::with_capacity(self.buf_size, output);
        let mut summary = MergeSummary::default();
        // the last selected record is written one step late so its terminator can be dropped
        let mut last: Option<Record> = None;

        while buffers.refresh().map_err(SortError::IO)? {
            let idx = self
                .selection
                .select(buffers.active_view().filter_map(|(idx, record)| Some((idx, record?))))?;
            let record = buffers.take(idx).ok_or(SortError::NoActiveStreams)?;

            if let Some(previous) = last.replace(record) {
                Self::write_record(&mut output, &previous, &mut summary)?;
            }
        }

        if let Some(mut record) = last {
            if self.unterminated && record.last() == Some(&self.terminator) {
                record.pop();
            }
            Self::write_record(&mut output, &record, &mut summary)?;
        }

        output.flush().map_err(SortError::IO)?;

        log::debug!("merge done ({} records, {} bytes)", summary.records, summary.bytes);

        return Ok(summary);
    }

    fn write_record<W: Write>(output: &mut W, record: &[u8], summary: &mut MergeSummary) -> Result<(), SortError> {
        output.write_all(record).map_err(SortError::IO)?;
        summary.records += 1;
        summary.bytes += record.len() as u64;

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::io::prelude::*;

    use rstest::*;

    use super::{KWayMerger, MergeSummary};
    use crate::select::MinSelection;
    use crate::sort::SortError;
    use crate::store::{BlockId, BlockStore, PlainStore};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn natural(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }

    fn save_blocks(store: &PlainStore, blocks: &Vec<Vec<&str>>) -> Vec<BlockId> {
        blocks
            .iter()
            .enumerate()
            .map(|(idx, records)| {
                let id = BlockId(idx);
                let mut writer = store.create(id, None).unwrap();
                for record in records {
                    writer.write_all(record.as_bytes()).unwrap();
                }
                store.finish(writer).unwrap();
                id
            })
            .collect()
    }

    #[rstest]
    #[case(vec![], "")]
    #[case(vec![vec![], vec![]], "")]
    #[case(vec![vec!["b\n", "c\n", "c\n"]], "b\nc\nc\n")]
    #[case(
        vec![
            vec!["apple\n", "banana\n"],
            vec!["apple\n", "cherry\n"],
        ],
        "apple\napple\nbanana\ncherry\n",
    )]
    #[case(
        vec![
            vec!["4\n", "5\n", "7\n"],
            vec!["1\n", "6\n"],
            vec!["3\n"],
            vec![],
        ],
        "1\n3\n4\n5\n6\n7\n",
    )]
    fn test_merger(tmp_dir: tempfile::TempDir, #[case] blocks: Vec<Vec<&str>>, #[case] expected: &str) {
        let store = PlainStore::new(tmp_dir.path());
        let ids = save_blocks(&store, &blocks);

        let merger = KWayMerger::new(&store, MinSelection::new(natural), 16);
        let mut output = Vec::new();
        let summary = merger.merge(&ids, &mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), expected);
        assert_eq!(
            summary,
            MergeSummary {
                records: expected.lines().count() as u64,
                bytes: expected.len() as u64,
            }
        );

        // blocks are not removed by the merger
        for id in ids {
            assert!(store.path(id).exists());
        }
    }

    #[rstest]
    fn test_merger_ties_prefer_first_block(tmp_dir: tempfile::TempDir) {
        let store = PlainStore::new(tmp_dir.path());
        let ids = save_blocks(&store, &vec![vec!["a 0\n", "b 0\n"], vec!["a 1\n", "b 1\n"], vec!["a 2\n"]]);
        let by_first_byte = |a: &[u8], b: &[u8]| a[0].cmp(&b[0]);

        for _ in 0..2 {
            let merger = KWayMerger::new(&store, MinSelection::new(by_first_byte), 16);
            let mut output = Vec::new();
            merger.merge(&ids, &mut output).unwrap();

            assert_eq!(String::from_utf8(output).unwrap(), "a 0\na 1\na 2\nb 0\nb 1\n");
        }
    }

    #[rstest]
    #[case(false, "a\nb\nc\n")]
    #[case(true, "a\nb\nc")]
    fn test_merger_unterminated_output(tmp_dir: tempfile::TempDir, #[case] unterminated: bool, #[case] expected: &str) {
        let store = PlainStore::new(tmp_dir.path());
        let ids = save_blocks(&store, &vec![vec!["b\n", "c\n"], vec!["a\n"]]);

        let merger = KWayMerger::new(&store, MinSelection::new(natural), 16).with_unterminated_output(unterminated);
        let mut output = Vec::new();
        let summary = merger.merge(&ids, &mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), expected);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.bytes, expected.len() as u64);
    }

    #[rstest]
    fn test_merger_missing_block(tmp_dir: tempfile::TempDir) {
        let store = PlainStore::new(tmp_dir.path());
        let mut ids = save_blocks(&store, &vec![vec!["a\n"]]);
        ids.push(BlockId(1));

        let merger = KWayMerger::new(&store, MinSelection::new(natural), 16);
        let mut output = Vec::new();

        assert!(matches!(merger.merge(&ids, &mut output), Err(SortError::IO(_))));
        assert!(output.is_empty());
    }
}
