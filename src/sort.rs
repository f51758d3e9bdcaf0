//! External line sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::run::SortRun;

/// Default split budget in bytes.
pub const DEFAULT_CHUNK_SIZE: u64 = 100_000_000;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Chunk directory is missing or is not a directory.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Sorter configuration is invalid.
    InvalidConfig(String),
    /// Source file opening or reading error.
    Input(io::Error),
    /// Chunk I/O error.
    IO(io::Error),
    /// Result file creation error.
    Output(io::Error),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::InvalidConfig(_) => None,
            SortError::Input(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::Output(err) => Some(err),
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "chunk directory not usable: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::InvalidConfig(msg) => write!(f, "invalid sorter configuration: {}", msg),
            SortError::Input(err) => write!(f, "source file reading error: {}", err),
            SortError::IO(err) => write!(f, "chunk I/O operation failed: {}", err),
            SortError::Output(err) => write!(f, "result file creation error: {}", err),
        }
    }
}

/// Chunk merging strategy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Two oldest chunks are merged at a time with a two-cursor merge.
    Pairwise,
    /// Up to `fan_in` oldest chunks are merged at a time using a binary heap.
    Heap { fan_in: usize },
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::Pairwise
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone, Debug)]
pub struct ExternalSorterBuilder {
    /// Number of threads to be used to sort a chunk in memory.
    threads_number: Option<usize>,
    /// Directory to be used to store chunks.
    tmp_dir: Option<PathBuf>,
    /// Maximum chunk size in bytes.
    chunk_size: u64,
    /// Source, chunk and result file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Chunk merging strategy.
    merge_strategy: MergeStrategy,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        ExternalSorter::new(
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.chunk_size,
            self.rw_buf_size,
            self.merge_strategy,
        )
    }

    /// Sets number of threads to be used to sort a chunk in memory.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store chunks.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets maximum chunk size in bytes.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> ExternalSorterBuilder {
        self.chunk_size = chunk_size;
        return self;
    }

    /// Sets file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets chunk merging strategy.
    pub fn with_merge_strategy(mut self, merge_strategy: MergeStrategy) -> ExternalSorterBuilder {
        self.merge_strategy = merge_strategy;
        return self;
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            rw_buf_size: None,
            merge_strategy: MergeStrategy::default(),
        }
    }
}

/// External sorter.
pub struct ExternalSorter {
    /// Chunk sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store chunks.
    tmp_dir: PathBuf,
    /// Maximum chunk size in bytes.
    chunk_size: u64,
    /// File read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Chunk merging strategy.
    merge_strategy: MergeStrategy,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort a chunk in memory. If the parameter is [`None`]
    ///   a single thread is used.
    /// * `tmp_path` - Directory to be used to store chunks. If the parameter is [`None`] the current working
    ///   directory is used.
    /// * `chunk_size` - Maximum number of bytes a chunk created from the source may occupy.
    /// * `rw_buf_size` - File read/write buffer size.
    /// * `merge_strategy` - Chunk merging strategy.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        chunk_size: u64,
        rw_buf_size: Option<usize>,
        merge_strategy: MergeStrategy,
    ) -> Result<Self, SortError> {
        if chunk_size == 0 {
            return Err(SortError::InvalidConfig("chunk size must be positive".to_string()));
        }
        if let MergeStrategy::Heap { fan_in } = merge_strategy {
            if fan_in < 2 {
                return Err(SortError::InvalidConfig(format!("merge fan-in {} is less than 2", fan_in)));
            }
        }
        if rw_buf_size == Some(0) {
            return Err(SortError::InvalidConfig("read/write buffer size must be positive".to_string()));
        }

        return Ok(ExternalSorter {
            chunk_size,
            rw_buf_size,
            merge_strategy,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let threads_number = threads_number.unwrap_or(1);
        log::info!("initializing thread-pool (threads: {})", threads_number);

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads_number)
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<PathBuf, SortError> {
        let tmp_dir = tmp_path.unwrap_or(Path::new(".")).to_path_buf();

        let metadata = fs::metadata(&tmp_dir).map_err(|err| SortError::TempDir(err))?;
        if !metadata.is_dir() {
            return Err(SortError::TempDir(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is not a directory", tmp_dir.display()),
            )));
        }

        log::info!("using {} as a chunk directory", tmp_dir.display());

        return Ok(tmp_dir);
    }

    pub fn thread_pool(&self) -> &rayon::ThreadPool {
        &self.thread_pool
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn rw_buf_size(&self) -> Option<usize> {
        self.rw_buf_size
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.merge_strategy
    }

    /// Sorts lines of the source file and saves them to the result file.
    /// Either the result is completely written or the file at the result path is left untouched.
    /// Chunks created during the call are removed in both cases.
    ///
    /// # Arguments
    /// * `source` - File to be sorted
    /// * `result` - File sorted lines are saved to
    pub fn sort(&self, source: &Path, result: &Path) -> Result<(), SortError> {
        log::info!(
            "sorting {} into {} (chunk size: {} bytes)",
            source.display(),
            result.display(),
            self.chunk_size
        );

        let file = fs::File::open(source).map_err(|err| SortError::Input(err))?;
        let input = match self.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        let mut run = SortRun::new(self);
        let chunks = run.split(input)?;
        log::debug!("split phase done ({} chunks)", chunks);

        let steps = run.merge()?;
        log::debug!("merge phase done ({} steps)", steps);

        run.finalize(result)?;
        log::info!("{} sorted", source.display());

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io;
    use std::path::Path;

    use rand::distributions::Alphanumeric;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    use super::{ExternalSorter, ExternalSorterBuilder, MergeStrategy, SortError};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn sorter(dir: &Path, chunk_size: u64, merge_strategy: MergeStrategy) -> ExternalSorter {
        ExternalSorterBuilder::new()
            .with_tmp_dir(dir)
            .with_chunk_size(chunk_size)
            .with_merge_strategy(merge_strategy)
            .with_rw_buf_size(16)
            .with_threads_number(2)
            .build()
            .unwrap()
    }

    fn leftover_chunks(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("chunk_"))
            .collect()
    }

    fn sort_data(dir: &Path, data: &[u8], chunk_size: u64, merge_strategy: MergeStrategy) -> Vec<u8> {
        let source = dir.join("source.txt");
        let result = dir.join("result.txt");
        fs::write(&source, data).unwrap();

        sorter(dir, chunk_size, merge_strategy).sort(&source, &result).unwrap();

        assert!(leftover_chunks(dir).is_empty());
        fs::read(&result).unwrap()
    }

    #[rstest]
    #[case(&b"banana\napple\ncherry\n"[..], 1024, &b"apple\nbanana\ncherry\n"[..])]
    #[case(&b"e\nd\nc\nb\na\n"[..], 4, &b"a\nb\nc\nd\ne\n"[..])]
    #[case(&b""[..], 4, &b""[..])]
    #[case(&b"dup\nb\nz\ndup\n"[..], 8, &b"b\ndup\ndup\nz\n"[..])]
    #[case(&b"b\na"[..], 1024, &b"a\nb"[..])]
    #[case(&b"b\na"[..], 2, &b"a\nb"[..])]
    #[case(&b"\n\nb\n\na\n"[..], 3, &b"\n\n\na\nb\n"[..])]
    #[case(&b"a very long line\nb\na\n"[..], 2, &b"a\na very long line\nb\n"[..])]
    fn test_sort_examples(
        tmp_dir: tempfile::TempDir,
        #[case] input: &[u8],
        #[case] chunk_size: u64,
        #[case] expected: &[u8],
    ) {
        for merge_strategy in [MergeStrategy::Pairwise, MergeStrategy::Heap { fan_in: 3 }] {
            let actual = sort_data(tmp_dir.path(), input, chunk_size, merge_strategy);
            assert_eq!(
                String::from_utf8_lossy(&actual),
                String::from_utf8_lossy(expected),
                "strategy={:?}",
                merge_strategy
            );
        }
    }

    #[rstest]
    #[case(MergeStrategy::Pairwise, 64)]
    #[case(MergeStrategy::Pairwise, 1000)]
    #[case(MergeStrategy::Heap { fan_in: 2 }, 64)]
    #[case(MergeStrategy::Heap { fan_in: 16 }, 100)]
    fn test_sort_random(tmp_dir: tempfile::TempDir, #[case] merge_strategy: MergeStrategy, #[case] chunk_size: u64) {
        let mut rng = rand::thread_rng();
        let mut lines: Vec<String> = (0..500)
            .map(|_| {
                let len = rng.gen_range(0..12);
                (&mut rng).sample_iter(Alphanumeric).take(len).map(char::from).collect()
            })
            .collect();
        // duplicates spread over different chunks
        lines.extend(lines.clone().into_iter().take(50));
        lines.shuffle(&mut rng);

        let input: String = lines.iter().map(|line| format!("{}\n", line)).collect();
        let actual = sort_data(tmp_dir.path(), input.as_bytes(), chunk_size, merge_strategy);

        lines.sort();
        let expected: String = lines.iter().map(|line| format!("{}\n", line)).collect();
        assert_eq!(String::from_utf8(actual).unwrap(), expected);
    }

    #[rstest]
    #[case(&b"a\nb\nc\n"[..])]
    #[case(&b"a\nb\nc"[..])]
    #[case(&b"\n\n"[..])]
    fn test_sorted_input_reproduced(tmp_dir: tempfile::TempDir, #[case] input: &[u8]) {
        let actual = sort_data(tmp_dir.path(), input, 2, MergeStrategy::Pairwise);
        assert_eq!(actual, input);
    }

    #[rstest]
    fn test_missing_source(tmp_dir: tempfile::TempDir) {
        let result = tmp_dir.path().join("result.txt");
        let err = sorter(tmp_dir.path(), 16, MergeStrategy::Pairwise)
            .sort(&tmp_dir.path().join("missing.txt"), &result)
            .unwrap_err();

        assert!(matches!(err, SortError::Input(ref err) if err.kind() == io::ErrorKind::NotFound));
        assert!(!result.exists());
        assert!(leftover_chunks(tmp_dir.path()).is_empty());
    }

    #[rstest]
    fn test_unwritable_result(tmp_dir: tempfile::TempDir) {
        let source = tmp_dir.path().join("source.txt");
        fs::write(&source, b"c\nb\na\n").unwrap();
        let result = tmp_dir.path().join("missing").join("result.txt");

        let err = sorter(tmp_dir.path(), 2, MergeStrategy::Pairwise)
            .sort(&source, &result)
            .unwrap_err();

        assert!(matches!(err, SortError::Output(_)));
        assert!(leftover_chunks(tmp_dir.path()).is_empty());
    }

    #[rstest]
    fn test_existing_result_replaced(tmp_dir: tempfile::TempDir) {
        let source = tmp_dir.path().join("source.txt");
        let result = tmp_dir.path().join("result.txt");
        fs::write(&source, b"b\na\n").unwrap();
        fs::write(&result, b"previous content\n").unwrap();

        sorter(tmp_dir.path(), 2, MergeStrategy::Pairwise).sort(&source, &result).unwrap();

        assert_eq!(fs::read(&result).unwrap(), b"a\nb\n");
    }

    #[rstest]
    fn test_sort_in_place(tmp_dir: tempfile::TempDir) {
        let source = tmp_dir.path().join("source.txt");
        fs::write(&source, b"b\nc\na\n").unwrap();

        sorter(tmp_dir.path(), 2, MergeStrategy::Pairwise).sort(&source, &source).unwrap();

        assert_eq!(fs::read(&source).unwrap(), b"a\nb\nc\n");
    }

    #[rstest]
    #[case(0, MergeStrategy::Pairwise, None)]
    #[case(16, MergeStrategy::Heap { fan_in: 1 }, None)]
    #[case(16, MergeStrategy::Pairwise, Some(0))]
    fn test_invalid_config(
        tmp_dir: tempfile::TempDir,
        #[case] chunk_size: u64,
        #[case] merge_strategy: MergeStrategy,
        #[case] rw_buf_size: Option<usize>,
    ) {
        let mut builder = ExternalSorterBuilder::new()
            .with_tmp_dir(tmp_dir.path())
            .with_chunk_size(chunk_size)
            .with_merge_strategy(merge_strategy);
        if let Some(rw_buf_size) = rw_buf_size {
            builder = builder.with_rw_buf_size(rw_buf_size);
        }
        let result = builder.build();

        assert!(matches!(result, Err(SortError::InvalidConfig(_))));
    }

    #[rstest]
    fn test_missing_tmp_dir(tmp_dir: tempfile::TempDir) {
        let result = ExternalSorterBuilder::new()
            .with_tmp_dir(&tmp_dir.path().join("missing"))
            .build();

        assert!(matches!(result, Err(SortError::TempDir(_))));
    }
}
