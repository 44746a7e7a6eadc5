// Reciprocal Rank Fusion (RRF) and the post-fusion filters

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::indexing::calculate_hash;
use crate::types::{Chunk, ChunkPosition, SearchCandidate, SignalSource};

/// Standard RRF k parameter value.
///
/// Smaller k puts more weight on the top of each list; 60 is the value from
/// Cormack, Clarke and Buettcher (SIGIR 2009).
pub const RRF_K: f32 = 60.0;

/// Add one ranked list's RRF contributions to `candidates`.
///
/// Each item at 0-based `rank` contributes `1 / (k + rank + 1)`. Vector
/// lists record the distance, keyword lists the BM25 score.
pub fn accumulate(
    candidates: &mut HashMap<ChunkPosition, SearchCandidate>,
    ranked: &[(ChunkPosition, f32)],
    source: SignalSource,
    k: f32,
) {
    for (rank, (position, signal)) in ranked.iter().enumerate() {
        let candidate = candidates
            .entry(*position)
            .or_insert_with(|| SearchCandidate::new(*position));
        candidate.fused_score += 1.0 / (k + rank as f32 + 1.0);
        candidate.sources.insert(source);
        match source {
            SignalSource::Semantic => candidate.vector_distance = Some(*signal),
            SignalSource::Keyword => candidate.keyword_score = Some(*signal),
        }
    }
}

/// Fuse the semantic (distance ascending) and keyword (score descending) lists.
pub fn reciprocal_rank_fusion(
    semantic: &[(ChunkPosition, f32)],
    keyword: &[(ChunkPosition, f32)],
    k: f32,
) -> Vec<SearchCandidate> {
    let mut candidates = HashMap::new();
    accumulate(&mut candidates, semantic, SignalSource::Semantic, k);
    accumulate(&mut candidates, keyword, SignalSource::Keyword, k);
    candidates.into_values().collect()
}

/// Append cluster members missing from `hits` at `placeholder` distance,
/// then stable-sort by distance so genuine hits stay in front.
pub fn merge_cluster_members(
    mut hits: Vec<(ChunkPosition, f32)>,
    members: impl IntoIterator<Item = ChunkPosition>,
    placeholder: f32,
) -> Vec<(ChunkPosition, f32)> {
    let mut seen: HashSet<ChunkPosition> = hits.iter().map(|(p, _)| *p).collect();
    for member in members {
        if seen.insert(member) {
            hits.push((member, placeholder));
        }
    }
    hits.sort_by(|a, b| a.1.total_cmp(&b.1));
    hits
}

/// Raw query words that look like names: capitalized and longer than two chars.
pub fn proper_nouns(query: &str) -> Vec<&str> {
    query
        .split_whitespace()
        .filter(|word| word.chars().count() > 2)
        .filter(|word| word.chars().next().is_some_and(char::is_uppercase))
        .collect()
}

/// Multiply a candidate's score by `boost` once per noun found verbatim in its text.
pub fn apply_identity_boost(
    candidates: &mut [SearchCandidate],
    chunks: &[Chunk],
    nouns: &[&str],
    boost: f32,
) {
    if nouns.is_empty() {
        return;
    }
    for candidate in candidates.iter_mut() {
        let Some(chunk) = chunks.get(candidate.position.index()) else {
            continue;
        };
        for noun in nouns {
            if chunk.text.contains(noun) {
                candidate.fused_score *= boost;
            }
        }
    }
}

/// Fused score descending, position ascending on ties.
pub fn rank(candidates: &mut [SearchCandidate]) {
    candidates.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.position.cmp(&b.position))
    });
}

/// Hash of the first `prefix_chars` chars of the lower-cased text.
pub fn prefix_hash(text: &str, prefix_chars: usize) -> String {
    let prefix: String = text.to_lowercase().chars().take(prefix_chars).collect();
    calculate_hash(&prefix)
}

/// Walk ranked candidates and keep at most `top_k`, one per text prefix and
/// one per source file. Only a kept candidate claims its prefix and file.
pub fn select_distinct(
    ranked: Vec<SearchCandidate>,
    chunks: &[Chunk],
    top_k: usize,
    prefix_chars: usize,
) -> Vec<SearchCandidate> {
    let mut seen_prefixes = HashSet::new();
    let mut seen_files: HashSet<&Path> = HashSet::new();
    let mut selected = Vec::with_capacity(top_k.min(ranked.len()));

    for candidate in ranked {
        if selected.len() >= top_k {
            break;
        }
        let Some(chunk) = chunks.get(candidate.position.index()) else {
            continue;
        };
        let prefix = prefix_hash(&chunk.text, prefix_chars);
        let file = chunk.source_path.as_path();
        if seen_prefixes.contains(&prefix) || seen_files.contains(file) {
            continue;
        }
        seen_prefixes.insert(prefix);
        seen_files.insert(file);
        selected.push(candidate);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pos(p: u32) -> ChunkPosition {
        ChunkPosition::new(p)
    }

    fn chunk(p: u32, text: &str, file: &str) -> Chunk {
        Chunk::new(text.to_string(), PathBuf::from(file), pos(p))
    }

    #[test]
    fn test_rrf_zero_based_ranks() {
        let fused = reciprocal_rank_fusion(&[(pos(1), 0.1)], &[], RRF_K);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].fused_score - 1.0 / 61.0).abs() < 1e-7);
        assert_eq!(fused[0].vector_distance, Some(0.1));
        assert!(fused[0].keyword_score.is_none());
    }

    #[test]
    fn test_rrf_multi_signal_dominates() {
        // Position 3 is only third in each list but appears in both.
        let semantic = vec![(pos(1), 0.1), (pos(2), 0.2), (pos(3), 0.3)];
        let keyword = vec![(pos(4), 9.0), (pos(5), 8.0), (pos(3), 7.0)];
        let mut fused = reciprocal_rank_fusion(&semantic, &keyword, RRF_K);
        rank(&mut fused);

        assert_eq!(fused[0].position, pos(3));
        assert_eq!(
            fused[0].sources.iter().copied().collect::<Vec<_>>(),
            vec![SignalSource::Semantic, SignalSource::Keyword]
        );
        // Ties between single-list rank 0 hits break by position
        assert_eq!(fused[1].position, pos(1));
        assert_eq!(fused[2].position, pos(4));
    }

    #[test]
    fn test_merge_cluster_members_places_injected_last() {
        let hits = vec![(pos(7), 0.5), (pos(2), 0.1)];
        let merged = merge_cluster_members(hits, [pos(2), pos(9), pos(4)], 100.0);
        assert_eq!(
            merged,
            vec![(pos(2), 0.1), (pos(7), 0.5), (pos(9), 100.0), (pos(4), 100.0)]
        );
    }

    #[test]
    fn test_proper_nouns() {
        assert_eq!(
            proper_nouns("who is Siddhesh at Acme in NY"),
            vec!["Siddhesh", "Acme"]
        );
        assert!(proper_nouns("lowercase only").is_empty());
    }

    #[test]
    fn test_identity_boost_is_case_sensitive_and_compounds() {
        let chunks = vec![
            chunk(0, "Siddhesh worked at Acme", "/a.txt"),
            chunk(1, "siddhesh in lower case", "/b.txt"),
        ];
        let mut candidates = vec![SearchCandidate::new(pos(0)), SearchCandidate::new(pos(1))];
        candidates[0].fused_score = 1.0;
        candidates[1].fused_score = 1.0;

        apply_identity_boost(&mut candidates, &chunks, &["Siddhesh", "Acme"], 1.5);
        assert!((candidates[0].fused_score - 2.25).abs() < 1e-6);
        assert_eq!(candidates[1].fused_score, 1.0);
    }

    #[test]
    fn test_select_distinct_skips_duplicate_prefix_and_file() {
        let chunks = vec![
            chunk(0, "Jupiter is a gas giant", "/a.txt"),
            chunk(1, "JUPITER IS A GAS GIANT", "/b.txt"),
            chunk(2, "A different chunk of a.txt", "/a.txt"),
            chunk(3, "Mars is red", "/c.txt"),
        ];
        let ranked: Vec<SearchCandidate> = (0..4).map(|p| SearchCandidate::new(pos(p))).collect();

        let selected = select_distinct(ranked.clone(), &chunks, 10, 200);
        let positions: Vec<u32> = selected.iter().map(|c| c.position.get()).collect();
        assert_eq!(positions, vec![0, 3]);

        assert_eq!(select_distinct(ranked, &chunks, 1, 200).len(), 1);
    }

    #[test]
    fn test_skipped_candidate_does_not_reserve_its_prefix() {
        let chunks = vec![
            chunk(0, "Alpha intro", "/a.txt"),
            chunk(1, "Shared boilerplate", "/a.txt"),
            chunk(2, "Shared boilerplate", "/b.txt"),
        ];
        let ranked: Vec<SearchCandidate> = (0..3).map(|p| SearchCandidate::new(pos(p))).collect();

        let selected = select_distinct(ranked, &chunks, 10, 200);
        let positions: Vec<u32> = selected.iter().map(|c| c.position.get()).collect();
        assert_eq!(positions, vec![0, 2]);
    }
}
