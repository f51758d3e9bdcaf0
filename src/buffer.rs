//! Byte limited line buffer.

use rayon;
use rayon::slice::ParallelSliceMut;

/// Buffer collecting the lines of a single chunk. The limit bounds the number of bytes the lines
/// occupy once stored in a chunk, i.e. the line content plus one terminator byte per line.
pub struct LineBuffer {
    limit: u64,
    current_size: u64,
    inner: Vec<Vec<u8>>,
}

impl LineBuffer {
    pub fn new(limit: u64) -> Self {
        LineBuffer {
            limit,
            current_size: 0,
            inner: Vec::new(),
        }
    }

    /// Stored size of a line (terminator included).
    pub fn line_size(line: &[u8]) -> u64 {
        line.len() as u64 + 1
    }

    /// Checks if the line can be added without exceeding the limit.
    /// An empty buffer accepts any line, so a line larger than the limit still forms a chunk of its own.
    pub fn fits(&self, line: &[u8]) -> bool {
        self.inner.is_empty() || self.current_size + Self::line_size(line) <= self.limit
    }

    /// Adds a new line to the buffer.
    pub fn push(&mut self, line: Vec<u8>) {
        self.current_size += Self::line_size(&line);
        self.inner.push(line);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn mem_size(&self) -> u64 {
        self.current_size
    }

    /// Sorts buffered lines in byte order using the provided thread pool.
    pub fn sort(&mut self, thread_pool: &rayon::ThreadPool) {
        thread_pool.install(|| {
            self.par_sort();
        });
    }
}

impl IntoIterator for LineBuffer {
    type Item = Vec<u8>;
    type IntoIter = <Vec<Vec<u8>> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<Vec<u8>> for LineBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [Vec<u8>] {
        self.inner.as_mut_slice()
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::LineBuffer;

    #[fixture]
    fn thread_pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    #[test]
    fn test_line_buffer_limit() {
        let mut buffer = LineBuffer::new(8);

        assert_eq!(buffer.fits(b"abc"), true);
        buffer.push(b"abc".to_vec());
        assert_eq!(buffer.mem_size(), 4);

        assert_eq!(buffer.fits(b"def"), true);
        buffer.push(b"def".to_vec());
        assert_eq!(buffer.mem_size(), 8);

        assert_eq!(buffer.fits(b""), false);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_oversized_line_accepted_by_empty_buffer() {
        let mut buffer = LineBuffer::new(4);

        assert_eq!(buffer.fits(b"much longer than four bytes"), true);
        buffer.push(b"much longer than four bytes".to_vec());
        assert_eq!(buffer.fits(b"x"), false);
        assert_eq!(buffer.len(), 1);
    }

    #[rstest]
    fn test_line_buffer_sort(thread_pool: rayon::ThreadPool) {
        let mut buffer = LineBuffer::new(u64::MAX);
        for line in ["banana", "apple", "cherry", "apple", "a\tb", "a"] {
            buffer.push(line.as_bytes().to_vec());
        }

        buffer.sort(&thread_pool);

        let actual = Vec::from_iter(buffer);
        let expected: Vec<Vec<u8>> = ["a", "a\tb", "apple", "apple", "banana", "cherry"]
            .iter()
            .map(|line| line.as_bytes().to_vec())
            .collect();
        assert_eq!(actual, expected);
    }
}
