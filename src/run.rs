//! Single sorting run: chunk queue, split and merge phases, finalization and cleanup.

use std::collections::VecDeque;
use std::fs;
use std::io::prelude::*;
use std::mem;
use std::path::Path;

use log;

use crate::buffer::LineBuffer;
use crate::chunk::{read_line, Chunk, ChunkId, ChunkWriter, LineEnd};
use crate::merger::{merge_pair, HeapMerger};
use crate::sort::{ExternalSorter, MergeStrategy, SortError};

/// State of a single sorting run.
///
/// The queue is the only record of live chunks: every chunk in it is removed from the file system
/// when the run is dropped, whatever the run outcome is.
pub struct SortRun<'a> {
    sorter: &'a ExternalSorter,
    /// Live chunks, oldest first.
    queue: VecDeque<Chunk>,
    next_id: ChunkId,
    /// The source ended with a line missing its terminator.
    unterminated: bool,
}

impl<'a> SortRun<'a> {
    pub fn new(sorter: &'a ExternalSorter) -> Self {
        SortRun {
            sorter,
            queue: VecDeque::new(),
            next_id: 0,
            unterminated: false,
        }
    }

    /// Returns live chunks, oldest first.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.queue.iter()
    }

    /// Splits the input into sorted chunks of at most `chunk_size` bytes each.
    /// Returns the number of chunks created.
    pub fn split<R: BufRead>(&mut self, mut input: R) -> Result<usize, SortError> {
        let mut buffer = LineBuffer::new(self.sorter.chunk_size());
        let mut line = Vec::new();
        let mut created = 0;

        while let Some(line_end) = read_line(&mut input, &mut line).map_err(|err| SortError::Input(err))? {
            if line_end == LineEnd::Eof {
                self.unterminated = true;
            }

            if !buffer.fits(&line) {
                let full = mem::replace(&mut buffer, LineBuffer::new(self.sorter.chunk_size()));
                self.create_chunk(full)?;
                created += 1;
            }
            buffer.push(mem::take(&mut line));
        }

        if !buffer.is_empty() {
            self.create_chunk(buffer)?;
            created += 1;
        }

        return Ok(created);
    }

    fn create_chunk(&mut self, mut buffer: LineBuffer) -> Result<(), SortError> {
        log::debug!("sorting chunk data ({} lines, {} bytes) ...", buffer.len(), buffer.mem_size());
        buffer.sort(self.sorter.thread_pool());

        let mut writer = self.new_writer()?;
        for line in buffer {
            writer.write_line(&line).map_err(|err| SortError::IO(err))?;
        }
        let chunk = writer.commit().map_err(|err| SortError::IO(err))?;

        log::debug!("chunk {} saved", chunk.id());
        self.queue.push_back(chunk);

        return Ok(());
    }

    fn new_writer(&mut self) -> Result<ChunkWriter, SortError> {
        let writer = ChunkWriter::create(self.sorter.tmp_dir(), self.next_id, self.sorter.rw_buf_size())
            .map_err(|err| SortError::IO(err))?;
        self.next_id += 1;

        return Ok(writer);
    }

    /// Merges the oldest chunks into a new one appended to the queue.
    /// Input chunks are removed only after the new chunk is committed.
    /// Returns `false` if there is nothing to merge.
    pub fn merge_step(&mut self) -> Result<bool, SortError> {
        if self.queue.len() < 2 {
            return Ok(false);
        }
        let fan_in = match self.sorter.merge_strategy() {
            MergeStrategy::Pairwise => 2,
            MergeStrategy::Heap { fan_in } => fan_in.min(self.queue.len()),
        };

        let buf_size = self.sorter.rw_buf_size();
        let mut writer = self.new_writer()?;

        match self.sorter.merge_strategy() {
            MergeStrategy::Pairwise => {
                let mut left = self.queue[0].open(buf_size).map_err(|err| SortError::IO(err))?;
                let mut right = self.queue[1].open(buf_size).map_err(|err| SortError::IO(err))?;
                merge_pair(&mut left, &mut right, &mut writer).map_err(|err| SortError::IO(err))?;
            }
            MergeStrategy::Heap { .. } => {
                let mut readers = Vec::with_capacity(fan_in);
                for chunk in self.queue.iter().take(fan_in) {
                    readers.push(chunk.open(buf_size).map_err(|err| SortError::IO(err))?);
                }
                HeapMerger::new(readers)
                    .write_to(&mut writer)
                    .map_err(|err| SortError::IO(err))?;
            }
        }

        let merged = writer.commit().map_err(|err| SortError::IO(err))?;
        log::debug!(
            "chunks {:?} merged into chunk {}",
            Vec::from_iter(self.queue.iter().take(fan_in).map(Chunk::id)),
            merged.id()
        );
        self.queue.push_back(merged);

        for _ in 0..fan_in {
            // a chunk leaves the queue only once its file is gone
            if let Some(chunk) = self.queue.front() {
                chunk.remove().map_err(|err| SortError::IO(err))?;
            }
            self.queue.pop_front();
        }

        return Ok(true);
    }

    /// Merges chunks until at most one is left. Returns the number of merge steps performed.
    pub fn merge(&mut self) -> Result<usize, SortError> {
        let mut steps = 0;
        while self.merge_step()? {
            steps += 1;
        }

        return Ok(steps);
    }

    /// Moves the last remaining chunk to the result path merging pending chunks first.
    /// If no chunks were created an empty result file is created.
    pub fn finalize(&mut self, result: &Path) -> Result<(), SortError> {
        self.merge()?;

        let chunk = match self.queue.front() {
            Some(chunk) => chunk,
            None => {
                fs::File::create(result).map_err(|err| SortError::Output(err))?;
                return Ok(());
            }
        };

        if self.unterminated {
            // chunk lines are always terminated, the source's last line was not
            let file = fs::OpenOptions::new()
                .write(true)
                .open(chunk.path())
                .map_err(|err| SortError::IO(err))?;
            let len = file.metadata().map_err(|err| SortError::IO(err))?.len();
            file.set_len(len.saturating_sub(1)).map_err(|err| SortError::IO(err))?;
        }

        fs::rename(chunk.path(), result).map_err(|err| SortError::Output(err))?;
        log::debug!("chunk {} moved to {}", chunk.id(), result.display());
        self.queue.pop_front();

        return Ok(());
    }

    /// Removes all live chunks. Chunks that cannot be removed stay in the queue.
    /// Returns the number of removed chunks.
    pub fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        let mut failed = VecDeque::new();

        while let Some(chunk) = self.queue.pop_front() {
            match chunk.remove() {
                Ok(()) => removed += 1,
                Err(err) => {
                    log::warn!("chunk {} removal failed: {}", chunk.id(), err);
                    failed.push_back(chunk);
                }
            }
        }
        self.queue = failed;

        return removed;
    }
}

impl Drop for SortRun<'_> {
    fn drop(&mut self) {
        let removed = self.cleanup();
        if removed > 0 {
            log::debug!("{} chunks removed on teardown", removed);
        }
    }
}
