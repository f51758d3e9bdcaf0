//! Chunk mergers.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::io::prelude::*;

use crate::chunk::{write_line, ChunkReader};

/// Merges two sorted chunks into the writer streaming them line by line.
/// Only the two current lines are held in memory.
///
/// The smaller line is emitted first; on equality the right line goes first.
/// Once one side is exhausted the rest of the other one is copied through unchanged.
pub fn merge_pair<L, R, W>(left: &mut ChunkReader<L>, right: &mut ChunkReader<R>, out: &mut W) -> io::Result<()>
where
    L: BufRead,
    R: BufRead,
    W: Write + ?Sized,
{
    let mut left_line = Vec::new();
    let mut right_line = Vec::new();

    let mut has_left = left.read_line(&mut left_line)?;
    let mut has_right = right.read_line(&mut right_line)?;

    while has_left && has_right {
        if left_line < right_line {
            write_line(out, &left_line)?;
            has_left = left.read_line(&mut left_line)?;
        } else {
            write_line(out, &right_line)?;
            has_right = right.read_line(&mut right_line)?;
        }
    }

    // hanging line from the last comparison
    if has_left {
        write_line(out, &left_line)?;
        left.copy_remaining(out)?;
    } else if has_right {
        write_line(out, &right_line)?;
        right.copy_remaining(out)?;
    }

    return Ok(());
}

/// Binary heap merger implementation.
/// Merges multiple sorted chunks into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of lines,
/// *n* is the number of chunks (inputs). Equal lines are emitted in the order of their chunks.
pub struct HeapMerger<R: BufRead> {
    // binary heap is max-heap by default so we reverse it to convert it to min-heap
    items: BinaryHeap<Reverse<(Vec<u8>, usize)>>,
    chunks: Vec<ChunkReader<R>>,
    initiated: bool,
}

impl<R: BufRead> HeapMerger<R> {
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk lines should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = ChunkReader<R>>,
    {
        let chunks = Vec::from_iter(chunks);
        let items = BinaryHeap::with_capacity(chunks.len());

        return HeapMerger {
            chunks,
            items,
            initiated: false,
        };
    }

    /// Writes all merged lines to the writer.
    pub fn write_to<W: Write + ?Sized>(self, out: &mut W) -> io::Result<()> {
        for line in self {
            write_line(out, &line?)?;
        }

        return Ok(());
    }

    fn pull(&mut self, idx: usize) -> io::Result<()> {
        if let Some(line) = self.chunks[idx].next() {
            self.items.push(Reverse((line?, idx)));
        }

        return Ok(());
    }
}

impl<R: BufRead> Iterator for HeapMerger<R> {
    type Item = io::Result<Vec<u8>>;

    /// Returns the next line from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            for idx in 0..self.chunks.len() {
                if let Err(err) = self.pull(idx) {
                    return Some(Err(err));
                }
            }
            self.initiated = true;
        }

        let Reverse((line, idx)) = self.items.pop()?;
        if let Err(err) = self.pull(idx) {
            return Some(Err(err));
        }

        return Some(Ok(line));
    }
}
