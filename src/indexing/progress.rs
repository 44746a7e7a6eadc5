//! Progress reporting for indexing operations

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Progress scale shared by every reporter.
pub const PROGRESS_TOTAL: u64 = 100;

/// Errors kept in [`BuildStats`]; further failures are only counted.
const MAX_RECORDED_ERRORS: usize = 100;

/// Pipeline stage, used in progress messages and stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    Discovery,
    Extraction,
    Chunking,
    Embedding,
    KeywordIndexing,
    Clustering,
    Summarization,
    Finalization,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Extraction => "extraction",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::KeywordIndexing => "keyword indexing",
            Self::Clustering => "clustering",
            Self::Summarization => "summarization",
            Self::Finalization => "finalization",
        }
    }
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback receiving `(current, total, message)`.
pub type ProgressCallback = dyn Fn(u64, u64, Option<&str>) + Send + Sync;

/// Monotonic progress on a 0..=100 scale.
///
/// A report below the highest value seen so far is raised to it, so the
/// callback never observes progress going backwards. The high-water mark is
/// a lock-free atomic.
pub struct ProgressReporter {
    callback: Option<Box<ProgressCallback>>,
    high_water: AtomicU64,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("current", &self.current())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl ProgressReporter {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(u64, u64, Option<&str>) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
            high_water: AtomicU64::new(0),
        }
    }

    /// A reporter that only tracks the high-water mark.
    pub fn silent() -> Self {
        Self {
            callback: None,
            high_water: AtomicU64::new(0),
        }
    }

    /// Report `current` (clamped to 100 and to the high-water mark).
    pub fn report(&self, current: u64, message: Option<&str>) {
        let current = current.min(PROGRESS_TOTAL);
        let previous = self.high_water.fetch_max(current, Ordering::SeqCst);
        if let Some(callback) = &self.callback {
            callback(previous.max(current), PROGRESS_TOTAL, message);
        }
    }

    /// Report `done` of `total` units mapped into the `start..=end` range.
    pub fn report_range(&self, start: u64, end: u64, done: usize, total: usize, message: Option<&str>) {
        let span = end.saturating_sub(start);
        let offset = if total == 0 {
            span
        } else {
            span * (done.min(total) as u64) / total as u64
        };
        self.report(start + offset, message);
    }

    /// Re-emit the current value with a message.
    pub fn message(&self, message: &str) {
        self.report(self.current(), Some(message));
    }

    pub fn current(&self) -> u64 {
        self.high_water.load(Ordering::SeqCst)
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}

/// Statistics collected during indexing
#[derive(Debug, Default)]
pub struct BuildStats {
    pub files_discovered: usize,

    /// Number of files that produced at least one chunk
    pub files_indexed: usize,

    /// Number of files skipped because extraction failed or gave no text
    pub files_failed: usize,

    pub chunk_count: usize,

    pub cluster_count: usize,

    /// Time elapsed during indexing
    pub elapsed: Duration,

    /// Errors encountered (limited to first N errors)
    pub errors: Vec<(PathBuf, String)>,

    /// Start time of indexing
    start_time: Option<Instant>,
}

impl BuildStats {
    /// Create new stats and start timing
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Stop timing and record elapsed time
    pub fn stop_timing(&mut self) {
        if let Some(start) = self.start_time {
            self.elapsed = start.elapsed();
            self.start_time = None;
        }
    }

    /// Add an error (limited to first 100 errors)
    pub fn add_error(&mut self, path: PathBuf, error: String) {
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push((path, error));
        }
        self.files_failed += 1;
    }

    /// Display the statistics in a human-readable format
    pub fn display(&self) {
        println!("\nIndexing Complete:");
        println!("  Files discovered: {}", self.files_discovered);
        println!("  Files indexed: {}", self.files_indexed);
        println!("  Files skipped: {}", self.files_failed);
        println!("  Chunks: {}", self.chunk_count);
        println!("  Clusters: {}", self.cluster_count);
        println!("  Time elapsed: {:.2}s", self.elapsed.as_secs_f64());

        if self.files_indexed > 0 && self.elapsed.as_secs_f64() > 0.0 {
            let chunks_per_sec = self.chunk_count as f64 / self.elapsed.as_secs_f64();
            println!("  Performance: {chunks_per_sec:.0} chunks/second");

            let chunks_per_file = self.chunk_count as f64 / self.files_indexed as f64;
            println!("  Average chunks/file: {chunks_per_file:.1}");
        }

        if !self.errors.is_empty() {
            println!("\nSkipped files (showing first {}):", self.errors.len().min(5));
            for (path, error) in &self.errors[..5.min(self.errors.len())] {
                println!("  {}: {}", path.display(), error);
            }
            if self.files_failed > 5 {
                println!("  ... and {} more", self.files_failed - 5);
            }
        }
    }
}
