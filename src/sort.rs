//! External sorter.

use log;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use bytesize::{ByteSize, MIB};

use crate::budget::MemoryBudget;
use crate::merger::{KWayMerger, MergeSummary};
use crate::record::DEFAULT_TERMINATOR;
use crate::select::MinSelection;
use crate::splitter::BlockSplitter;
use crate::store::{BlockStore, GzipStore, PlainStore};

/// Memory budget used if none is configured.
pub const DEFAULT_MEMORY_BUDGET: u64 = 100 * MIB;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Common I/O error.
    IO(io::Error),
    /// Input data stream error.
    InputError(io::Error),
    /// Memory size string can't be parsed.
    InvalidSizeFormat(String),
    /// Memory budget is zero.
    InvalidBudget,
    /// A single record exceeds the block size (strict mode only).
    RecordTooLarge { size: usize, limit: u64 },
    /// Selection requested with no stream to select from.
    NoActiveStreams,
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::InputError(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::InvalidSizeFormat(value) => write!(f, "invalid memory size format: {:?}", value),
            SortError::InvalidBudget => write!(f, "memory budget must be greater than zero"),
            SortError::RecordTooLarge { size, limit } => {
                write!(f, "record of {} bytes exceeds block size of {} bytes", size, limit)
            }
            SortError::NoActiveStreams => write!(f, "no active streams to select from"),
        }
    }
}

/// Sorting result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSummary {
    /// Number of blocks the input was split into.
    pub blocks: usize,
    /// Number of records written to the output.
    pub records: u64,
    /// Number of bytes written to the output.
    pub bytes: u64,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder {
    /// Number of threads to be used to sort blocks.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Working memory budget.
    budget: Option<MemoryBudget>,
    /// Block file write buffer size.
    rw_buf_size: Option<usize>,
    /// Block compression level, blocks are not compressed if not set.
    compression: Option<flate2::Compression>,
    /// Record terminator.
    terminator: u8,
    /// Reject records larger than the block size.
    strict: bool,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        let budget = match self.budget {
            Some(budget) => budget,
            None => MemoryBudget::new(DEFAULT_MEMORY_BUDGET)?,
        };

        let mut sorter = ExternalSorter::new(self.threads_number, self.tmp_dir.as_deref(), budget)?;
        sorter.rw_buf_size = self.rw_buf_size;
        sorter.compression = self.compression;
        sorter.terminator = self.terminator;
        sorter.strict = self.strict;

        return Ok(sorter);
    }

    /// Sets number of threads to be used to sort blocks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets working memory budget.
    pub fn with_memory_budget(mut self, budget: MemoryBudget) -> ExternalSorterBuilder {
        self.budget = Some(budget);
        return self;
    }

    /// Sets block write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Enables gzip compression of temporary blocks.
    ///
    /// # Arguments
    /// * `level` - Compression level in range 0-9
    pub fn with_compression(mut self, level: u32) -> ExternalSorterBuilder {
        self.compression = Some(flate2::Compression::new(level.min(9)));
        return self;
    }

    /// Sets record terminator.
    pub fn with_terminator(mut self, terminator: u8) -> ExternalSorterBuilder {
        self.terminator = terminator;
        return self;
    }

    /// Makes records larger than the block size an error instead of an oversized block.
    pub fn with_strict(mut self, strict: bool) -> ExternalSorterBuilder {
        self.strict = strict;
        return self;
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
            budget: None,
            rw_buf_size: None,
            compression: None,
            terminator: DEFAULT_TERMINATOR,
            strict: false,
        }
    }
}

/// External sorter.
pub struct ExternalSorter {
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store temporary data.
    tmp_dir: tempfile::TempDir,
    /// Working memory budget.
    budget: MemoryBudget,
    /// Block file write buffer size.
    rw_buf_size: Option<usize>,
    /// Block compression level.
    compression: Option<flate2::Compression>,
    /// Record terminator.
    terminator: u8,
    /// Reject records larger than the block size.
    strict: bool,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort blocks in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `budget` - Working memory budget.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        budget: MemoryBudget,
    ) -> Result<Self, SortError> {
        return Ok(ExternalSorter {
            budget,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
            rw_buf_size: None,
            compression: None,
            terminator: DEFAULT_TERMINATOR,
            strict: false,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Returns the working memory budget.
    pub fn budget(&self) -> MemoryBudget {
        self.budget
    }

    /// Sorts lines from the input in natural byte order writing them to the output.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `output` - Output stream sorted data to be written to
    pub fn sort<R, W>(&self, input: R, output: W) -> Result<SortSummary, SortError>
    where
        R: BufRead,
        W: Write,
    {
        self.sort_by(input, output, |a: &[u8], b: &[u8]| a.cmp(b))
    }

    /// Sorts lines from the input by a key extracted from every line.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `output` - Output stream sorted data to be written to
    /// * `key` - Function extracting a key from a line (terminator included)
    pub fn sort_by_key<R, W, K, Q>(&self, input: R, output: W, key: K) -> Result<SortSummary, SortError>
    where
        R: BufRead,
        W: Write,
        K: Fn(&[u8]) -> Q + Sync + Send + Copy,
        Q: Ord,
    {
        self.sort_by(input, output, move |a: &[u8], b: &[u8]| key(a).cmp(&key(b)))
    }

    /// Sorts lines from the input using a custom compare function.
    /// Lines comparing equal keep their input order.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `output` - Output stream sorted data to be written to
    /// * `compare` - Function to be used to compare lines
    pub fn sort_by<R, W, F>(&self, input: R, output: W, compare: F) -> Result<SortSummary, SortError>
    where
        R: BufRead,
        W: Write,
        F: Fn(&[u8], &[u8]) -> Ordering + Sync + Send + Copy,
    {
        // every sort gets its own directory so concurrent sorts don't share block names
        let sort_dir = tempfile::tempdir_in(self.tmp_dir.path()).map_err(|err| SortError::TempDir(err))?;

        match self.compression {
            Some(level) => self.run(&GzipStore::new(sort_dir.path(), level), input, output, compare),
            None => self.run(&PlainStore::new(sort_dir.path()), input, output, compare),
        }
    }

    /// Sorts lines of the input file in natural byte order.
    /// The output file is replaced only if sorting succeeds.
    pub fn sort_file(&self, input: &Path, output: &Path) -> Result<SortSummary, SortError> {
        self.sort_file_by(input, output, |a: &[u8], b: &[u8]| a.cmp(b))
    }

    /// Sorts lines of the input file by a key extracted from every line.
    /// The output file is replaced only if sorting succeeds.
    pub fn sort_file_by_key<K, Q>(&self, input: &Path, output: &Path, key: K) -> Result<SortSummary, SortError>
    where
        K: Fn(&[u8]) -> Q + Sync + Send + Copy,
        Q: Ord,
    {
        self.sort_file_by(input, output, move |a: &[u8], b: &[u8]| key(a).cmp(&key(b)))
    }

    /// Sorts lines of the input file using a custom compare function.
    ///
    /// Sorted data is written to a temporary file next to the output which is renamed to the output
    /// only after the merge completes, so a failed sort never leaves a partial output behind.
    pub fn sort_file_by<F>(&self, input: &Path, output: &Path, compare: F) -> Result<SortSummary, SortError>
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Sync + Send + Copy,
    {
        let input_file = fs::File::open(input).map_err(SortError::InputError)?;
        let input_metadata = input_file.metadata().map_err(SortError::InputError)?;
        let input_len = input_metadata.len();

        log::info!(
            "sorting {} ({}, estimated blocks: {}, memory budget: {})",
            input.display(),
            ByteSize(input_len),
            self.budget.estimate_blocks(input_len),
            self.budget
        );

        let output_dir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let staged = tempfile::NamedTempFile::new_in(output_dir).map_err(|err| SortError::TempDir(err))?;
        // the staging file is private (0600), the output takes the input file permissions
        staged
            .as_file()
            .set_permissions(input_metadata.permissions())
            .map_err(SortError::IO)?;

        let summary = self.sort_by(io::BufReader::new(input_file), staged.as_file(), compare)?;

        staged.persist(output).map_err(|err| SortError::IO(err.error))?;
        log::info!(
            "{} records ({}) written to {}",
            summary.records,
            ByteSize(summary.bytes),
            output.display()
        );

        return Ok(summary);
    }

    fn run<S, R, W, F>(&self, store: &S, input: R, output: W, compare: F) -> Result<SortSummary, SortError>
    where
        S: BlockStore,
        R: BufRead,
        W: Write,
        F: Fn(&[u8], &[u8]) -> Ordering + Sync + Send + Copy,
    {
        let mut splitter = BlockSplitter::new(store, &self.thread_pool, self.budget.block_size())?
            .with_terminator(self.terminator)
            .with_strict(self.strict)
            .with_rw_buf_size(self.rw_buf_size);

        let result = splitter.split(input, compare).and_then(|blocks| {
            log::debug!("external sort preparation done");

            let buf_size = self.budget.stream_buffer_size(blocks.len());
            let merger = KWayMerger::new(store, MinSelection::new(compare), buf_size)
                .with_terminator(self.terminator)
                .with_unterminated_output(splitter.input_unterminated());
            let MergeSummary { records, bytes } = merger.merge(&blocks, output)?;

            Ok(SortSummary {
                blocks: blocks.len(),
                records,
                bytes,
            })
        });

        match result {
            Ok(summary) => {
                splitter.cleanup().map_err(SortError::IO)?;
                Ok(summary)
            }
            Err(err) => {
                if let Err(cleanup_err) = splitter.cleanup() {
                    log::warn!("temporary blocks cleanup failed: {}", cleanup_err);
                }
                Err(err)
            }
        }
    }
}
