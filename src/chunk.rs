//! Chunks: sorted runs of lines persisted to the file system.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use log;
use tempfile;

/// Chunk identifier.
pub type ChunkId = u64;

/// Outcome of a single line read.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineEnd {
    /// The line was terminated by a newline character.
    Newline,
    /// The line was the last one of the input and had no terminator.
    Eof,
}

/// Reads a single line into `buf` stripping its terminator.
/// Returns [`None`] if the input is exhausted.
pub fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<LineEnd>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        Ok(Some(LineEnd::Newline))
    } else {
        Ok(Some(LineEnd::Eof))
    }
}

/// Sorted run of lines backed by the file `chunk_<id>.data`.
#[derive(Debug, PartialEq, Eq)]
pub struct Chunk {
    id: ChunkId,
    path: PathBuf,
}

impl Chunk {
    /// Returns the backing file path of the chunk with the provided id.
    pub fn path_for(dir: &Path, id: ChunkId) -> PathBuf {
        dir.join(format!("chunk_{}.data", id))
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the chunk size in bytes.
    pub fn size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Opens the chunk for reading.
    pub fn open(&self, buf_size: Option<usize>) -> io::Result<ChunkReader> {
        let file = fs::File::open(&self.path)?;
        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        Ok(ChunkReader::new(reader))
    }

    /// Deletes the chunk backing file. A file that is already gone is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::debug!("chunk {} removed", self.id);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Chunk writer. Lines are written to an anonymous temporary file in the chunk directory
/// that becomes the chunk file only when committed, so a failed or abandoned write leaves nothing behind.
pub struct ChunkWriter {
    id: ChunkId,
    path: PathBuf,
    writer: io::BufWriter<tempfile::NamedTempFile>,
}

impl ChunkWriter {
    /// Creates a writer for the chunk `id` located in `dir`.
    pub fn create(dir: &Path, id: ChunkId, buf_size: Option<usize>) -> io::Result<Self> {
        let tmp_file = tempfile::Builder::new()
            .prefix("chunk_")
            .suffix(".tmp")
            .tempfile_in(dir)?;

        let writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, tmp_file),
            None => io::BufWriter::new(tmp_file),
        };

        return Ok(ChunkWriter {
            id,
            path: Chunk::path_for(dir, id),
            writer,
        });
    }

    /// Writes a line followed by a newline character.
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        write_line(&mut self.writer, line)
    }

    /// Flushes written data and moves it to the chunk file.
    pub fn commit(self) -> io::Result<Chunk> {
        let tmp_file = self.writer.into_inner().map_err(|err| err.into_error())?;
        tmp_file.persist(&self.path).map_err(|err| err.error)?;

        return Ok(Chunk {
            id: self.id,
            path: self.path,
        });
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Writes a line followed by a newline character.
pub fn write_line<W: Write + ?Sized>(writer: &mut W, line: &[u8]) -> io::Result<()> {
    writer.write_all(line)?;
    writer.write_all(b"\n")
}

/// Sequential reader of chunk lines.
pub struct ChunkReader<R: BufRead = io::BufReader<fs::File>> {
    reader: R,
}

impl<R: BufRead> ChunkReader<R> {
    pub fn new(reader: R) -> Self {
        ChunkReader { reader }
    }

    /// Reads the next line into `buf` without its terminator. Returns `false` if the chunk is exhausted.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        Ok(read_line(&mut self.reader, buf)?.is_some())
    }

    /// Copies the remaining chunk content to the writer as is.
    pub fn copy_remaining<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<u64> {
        io::copy(&mut self.reader, writer)
    }
}

impl<R: BufRead> Iterator for ChunkReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = Vec::new();
        match self.read_line(&mut line) {
            Ok(true) => Some(Ok(line)),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
