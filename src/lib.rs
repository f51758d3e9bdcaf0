//! `ext-line-sort` sorts lines of text files that do not fit into memory.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two phases. During the
//! split phase the source file is read in slices bounded by the chunk size, each slice is sorted in memory and
//! saved as a chunk. During the merge phase the oldest chunks are merged into a new one until a single chunk is
//! left, which then becomes the result file. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Byte order:**
//!   lines are compared as raw bytes, no encoding is assumed. The result contains exactly the source lines,
//!   a missing terminator of the last source line is preserved.
//! * **Bounded memory:**
//!   the split phase keeps at most `chunk_size` bytes of lines in memory, merging streams chunks line by line.
//! * **Merge strategies:**
//!   chunks are merged either pairwise or up to `fan_in` at a time using a binary heap.
//! * **Cleanup:**
//!   chunk files (`chunk_<id>.data` in the chunk directory) are removed when sorting completes or fails.
//!
//! # Example
//!
//! ```no_run
//! use std::path;
//!
//! use ext_line_sort::{ExternalSorter, ExternalSorterBuilder, MergeStrategy};
//!
//! fn main() {
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_chunk_size(50_000_000)
//!         .with_merge_strategy(MergeStrategy::Heap { fan_in: 16 })
//!         .build()
//!         .unwrap();
//!
//!     sorter.sort(path::Path::new("input.txt"), path::Path::new("output.txt")).unwrap();
//! }
//! ```

use std::path::Path;

pub mod buffer;
pub mod chunk;
pub mod merger;
pub mod run;
pub mod sort;

pub use buffer::LineBuffer;
pub use chunk::{Chunk, ChunkId, ChunkReader, ChunkWriter};
pub use merger::{merge_pair, HeapMerger};
pub use run::SortRun;
pub use sort::{ExternalSorter, ExternalSorterBuilder, MergeStrategy, SortError};

/// Sorts lines of the `source` file into the `result` file using the current working directory for chunks.
///
/// # Arguments
/// * `source` - File to be sorted
/// * `result` - File sorted lines are saved to
/// * `chunk_size` - Maximum number of bytes sorted in memory at once
pub fn sort(source: &Path, result: &Path, chunk_size: u64) -> Result<(), SortError> {
    let sorter = ExternalSorterBuilder::new().with_chunk_size(chunk_size).build()?;
    sorter.sort(source, result)
}
