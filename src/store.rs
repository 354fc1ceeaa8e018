//! Block storage.
//!
//! Split and merge phases access temporary blocks only through the [`BlockStore`] interface,
//! so the storage medium (plain files, gzip compressed files) can be changed without touching
//! the sorting logic.

use std::fmt;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use flate2;

/// Block identifier. Blocks are numbered sequentially in the order they were split from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Block storage interface. Provides methods for creating, reading and removing blocks.
pub trait BlockStore {
    /// Block writer type.
    type Writer: Write;
    /// Block reader type.
    type Reader: BufRead;

    /// Creates a new block and returns a writer to it.
    ///
    /// # Arguments
    /// * `id` - Block identifier
    /// * `buf_size` - Write buffer size. If the parameter is [`None`] the default size is used.
    fn create(&self, id: BlockId, buf_size: Option<usize>) -> io::Result<Self::Writer>;

    /// Completes a block written by a writer obtained from [`BlockStore::create`].
    fn finish(&self, writer: Self::Writer) -> io::Result<()>;

    /// Opens a previously created block for reading.
    fn open(&self, id: BlockId, buf_size: usize) -> io::Result<Self::Reader>;

    /// Removes a block. Removing a block that doesn't exist is not an error.
    fn delete(&self, id: BlockId) -> io::Result<()>;
}

fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

/// Plain file block storage. Every block is saved as is to its own file in the storage directory.
pub struct PlainStore {
    dir: PathBuf,
}

impl PlainStore {
    pub fn new(dir: &Path) -> Self {
        PlainStore { dir: dir.into() }
    }

    /// Returns a path of the file the block is stored in.
    pub fn path(&self, id: BlockId) -> PathBuf {
        self.dir.join(format!("block_{}.dat", id))
    }
}

impl BlockStore for PlainStore {
    type Writer = io::BufWriter<fs::File>;
    type Reader = io::BufReader<fs::File>;

    fn create(&self, id: BlockId, buf_size: Option<usize>) -> io::Result<Self::Writer> {
        let file = fs::File::create(self.path(id))?;

        return Ok(match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        });
    }

    fn finish(&self, mut writer: Self::Writer) -> io::Result<()> {
        writer.flush()
    }

    fn open(&self, id: BlockId, buf_size: usize) -> io::Result<Self::Reader> {
        let file = fs::File::open(self.path(id))?;

        return Ok(io::BufReader::with_capacity(buf_size, file));
    }

    fn delete(&self, id: BlockId) -> io::Result<()> {
        remove_file(&self.path(id))
    }
}

/// Gzip compressed block storage. Trades CPU time for temporary disk space.
pub struct GzipStore {
    dir: PathBuf,
    level: flate2::Compression,
}

impl GzipStore {
    pub fn new(dir: &Path, level: flate2::Compression) -> Self {
        GzipStore { dir: dir.into(), level }
    }

    /// Returns a path of the file the block is stored in.
    pub fn path(&self, id: BlockId) -> PathBuf {
        self.dir.join(format!("block_{}.gz", id))
    }
}

impl BlockStore for GzipStore {
    type Writer = flate2::write::GzEncoder<io::BufWriter<fs::File>>;
    type Reader = io::BufReader<flate2::bufread::GzDecoder<io::BufReader<fs::File>>>;

    fn create(&self, id: BlockId, buf_size: Option<usize>) -> io::Result<Self::Writer> {
        let file = fs::File::create(self.path(id))?;
        let writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        return Ok(flate2::write::GzEncoder::new(writer, self.level));
    }

    fn finish(&self, writer: Self::Writer) -> io::Result<()> {
        // gzip trailer is written on finish only
        writer.finish()?.flush()
    }

    /// The read buffer is shared between compressed and decompressed data, half each.
    fn open(&self, id: BlockId, buf_size: usize) -> io::Result<Self::Reader> {
        let file = fs::File::open(self.path(id))?;
        let compressed_buf_size = (buf_size / 2).max(1);
        let decompressed_buf_size = (buf_size - buf_size / 2).max(1);

        let compressed = io::BufReader::with_capacity(compressed_buf_size, file);

        return Ok(io::BufReader::with_capacity(
            decompressed_buf_size,
            flate2::bufread::GzDecoder::new(compressed),
        ));
    }

    fn delete(&self, id: BlockId) -> io::Result<()> {
        remove_file(&self.path(id))
    }
}
