pub mod builder;
pub mod file_info;
pub mod progress;
pub mod walker;

pub use builder::{BuildOutcome, IndexBuilder};
pub use file_info::{FileInfo, calculate_hash, get_utc_timestamp};
pub use progress::{BuildStage, BuildStats, PROGRESS_TOTAL, ProgressCallback, ProgressReporter};
pub use walker::FileWalker;
