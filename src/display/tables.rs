//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::storage::IndexManifest;
use crate::types::{CacheStats, SearchResult};

/// Characters of chunk text shown per result row.
const SNIPPET_CHARS: usize = 120;

fn styled_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    // Apply rounded corners
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
        .collect()
}

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        Self {
            table: styled_table(),
        }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        self.table.set_header(header(&headers));
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// One-line preview of a chunk.
pub fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > SNIPPET_CHARS {
        let head: String = collapsed.chars().take(SNIPPET_CHARS).collect();
        format!("{head}…")
    } else {
        collapsed
    }
}

/// Ranked search hits.
pub fn create_results_table(results: &[SearchResult]) -> String {
    let mut table = styled_table();
    table.set_header(header(&["#", "File", "Score", "Signals", "Text"]));

    for (rank, result) in results.iter().enumerate() {
        let signals: Vec<&str> = result
            .tags
            .iter()
            .map(String::as_str)
            .filter(|t| matches!(*t, "Semantic" | "Keyword"))
            .collect();
        let signal_color = if signals.len() > 1 {
            Color::Green
        } else {
            Color::Reset
        };
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(&result.file_name),
            Cell::new(format!("{:.4}", result.score)),
            Cell::new(signals.join("+")).fg(signal_color),
            Cell::new(snippet(&result.document)),
        ]);
    }

    table.to_string()
}

/// Index manifest and store counters.
pub fn create_stats_table(
    manifest: &IndexManifest,
    file_rows: u64,
    chunk_total: u64,
    cache: &CacheStats,
) -> String {
    let mut table = styled_table();
    table.set_header(header(&["Metric", "Value"]));

    table.add_row(vec!["Format version".to_string(), manifest.version.to_string()]);
    table.add_row(vec!["Embedding model".to_string(), manifest.model_id.clone()]);
    table.add_row(vec!["Dimension".to_string(), manifest.dimension.to_string()]);
    table.add_row(vec!["Chunks".to_string(), manifest.chunk_count.to_string()]);
    table.add_row(vec!["Clusters".to_string(), manifest.cluster_count.to_string()]);
    table.add_row(vec!["Files".to_string(), manifest.file_count.to_string()]);

    // Store and artifacts disagree after a crash between persist and commit
    let consistent = u64::from(manifest.chunk_count) == chunk_total
        && u64::from(manifest.file_count) == file_rows;
    let (status, color) = if consistent {
        ("✓ in sync".to_string(), Color::Green)
    } else {
        (
            format!("⚠ store has {file_rows} files / {chunk_total} chunks"),
            Color::Yellow,
        )
    };
    table.add_row(vec![
        Cell::new("Metadata store"),
        Cell::new(status).fg(color).add_attribute(Attribute::Bold),
    ]);

    table.add_row(vec!["Cached responses".to_string(), cache.entries.to_string()]);
    table.add_row(vec!["Cache hits".to_string(), cache.total_hits.to_string()]);

    table.to_string()
}

/// Response cache counters by response type.
pub fn create_cache_table(stats: &CacheStats) -> String {
    let mut table = styled_table();
    table.set_header(header(&["Response type", "Entries"]));

    for (response_type, count) in &stats.by_type {
        table.add_row(vec![response_type.clone(), count.to_string()]);
    }
    table.add_row(vec![
        Cell::new("TOTAL").add_attribute(Attribute::Bold),
        Cell::new(stats.entries).add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("Hits"),
        Cell::new(stats.total_hits),
    ]);

    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkPosition;
    use std::path::PathBuf;

    #[test]
    fn test_table_builder() {
        let table = TableBuilder::new()
            .set_headers(vec!["Column 1", "Column 2"])
            .add_row(vec!["Value 1".to_string(), "Value 2".to_string()])
            .build();

        assert!(table.contains("Column 1"));
        assert!(table.contains("Value 1"));
    }

    #[test]
    fn test_results_table() {
        let results = vec![SearchResult {
            document: "Jupiter   is\nthe largest planet".to_string(),
            file_path: PathBuf::from("/docs/jupiter.txt"),
            file_name: "jupiter.txt".to_string(),
            position: ChunkPosition::new(0),
            tags: vec!["Semantic".into(), "Keyword".into(), "txt".into()],
            score: 0.0328,
        }];
        let table = create_results_table(&results);
        assert!(table.contains("jupiter.txt"));
        assert!(table.contains("Semantic+Keyword"));
        assert!(table.contains("Jupiter is the largest planet"));
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "word ".repeat(100);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 1);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn test_stats_table_flags_drift() {
        let mut manifest = IndexManifest::new();
        manifest.update_counts(10, 2, 3);
        let cache = CacheStats::default();

        assert!(create_stats_table(&manifest, 3, 10, &cache).contains("in sync"));
        assert!(create_stats_table(&manifest, 1, 4, &cache).contains("store has 1 files"));
        assert!(create_cache_table(&cache).contains("TOTAL"));
    }
}
