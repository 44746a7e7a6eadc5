//! Terminal output for the CLI: styled tables, progress bars and themed messages.

pub mod progress;
pub mod tables;
pub mod theme;

pub use progress::{bar_reporter, create_progress_bar, create_spinner, with_spinner};
pub use tables::{
    TableBuilder, create_cache_table, create_results_table, create_stats_table, snippet,
};
pub use theme::{Status, THEME, Theme};
