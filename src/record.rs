//! Line records.

use std::io;
use std::io::prelude::*;

/// Default record terminator.
pub const DEFAULT_TERMINATOR: u8 = b'\n';

/// A single line of text including its terminator.
pub type Record = Vec<u8>;

/// Reads the next record from the reader.
/// Returns [`None`] when the reader is exhausted.
///
/// # Arguments
/// * `reader` - Reader to fetch the record from
/// * `terminator` - Record terminator. The returned record includes it unless the stream ends without one.
pub fn read_record<R: BufRead>(reader: &mut R, terminator: u8) -> io::Result<Option<Record>> {
    let mut record = Vec::new();

    if reader.read_until(terminator, &mut record)? == 0 {
        return Ok(None);
    }

    return Ok(Some(record));
}
