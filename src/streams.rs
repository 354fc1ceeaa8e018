//! Merge stream buffers.

use std::io;
use std::io::prelude::*;

use crate::record::{read_record, Record};

/// Single-record lookahead over a set of sorted streams.
///
/// Every stream holds at most one pending record: the smallest record of the stream that hasn't been
/// taken yet. A stream is exhausted once a read from it returns nothing.
pub struct StreamBuffers<R: BufRead> {
    streams: Vec<R>,
    pending: Vec<Option<Record>>,
    exhausted: Vec<bool>,
    terminator: u8,
}

impl<R: BufRead> StreamBuffers<R> {
    /// Creates buffers over the streams. Stream indices follow the iteration order.
    pub fn new<I>(streams: I, terminator: u8) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        let streams = Vec::from_iter(streams);
        let count = streams.len();

        return StreamBuffers {
            streams,
            pending: vec![None; count],
            exhausted: vec![false; count],
            terminator,
        };
    }

    /// Fills every empty buffer of a non-exhausted stream with the next stream record.
    /// Returns `false` if all the streams are exhausted.
    pub fn refresh(&mut self) -> io::Result<bool> {
        for (idx, stream) in self.streams.iter_mut().enumerate() {
            if self.exhausted[idx] || self.pending[idx].is_some() {
                continue;
            }

            match read_record(stream, self.terminator)? {
                Some(record) => self.pending[idx] = Some(record),
                None => self.exhausted[idx] = true,
            }
        }

        return Ok(self.exhausted.iter().any(|exhausted| !exhausted));
    }

    /// Returns pending records of all non-exhausted streams along with the stream indices.
    /// A pending record is [`None`] if the stream buffer hasn't been refreshed since the last take.
    pub fn active_view(&self) -> impl Iterator<Item = (usize, Option<&[u8]>)> + '_ {
        self.pending
            .iter()
            .enumerate()
            .filter(move |(idx, _)| !self.exhausted[*idx])
            .map(|(idx, record)| (idx, record.as_deref()))
    }

    /// Takes the pending record of the stream leaving its buffer empty.
    pub fn take(&mut self, idx: usize) -> Option<Record> {
        self.pending[idx].take()
    }

    /// Returns the number of streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
