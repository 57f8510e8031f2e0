//! Scoring functions for candidate selection.
//!
//! This module contains:
//! - Indel-based similarity ratio (0-100)
//! - Token-set ratio for word-order-insensitive comparisons
//! - LRCLIB candidate scoring and best-candidate selection

use rustc_hash::FxHashSet;

use crate::normalize::fold_text;

// ============================================================================
// Score Thresholds
// ============================================================================

/// Below this, a channel name is not considered the same artist as a title segment.
pub const CHANNEL_MATCH_THRESHOLD: f64 = 70.0;

/// Minimum token-set score for a fuzzy scraped-site title hit.
pub const FUZZY_TITLE_CUTOFF: f64 = 82.0;

// ============================================================================
// Ratios
// ============================================================================

/// Length of the longest common subsequence, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Insertion/deletion distance (no substitutions).
fn indel_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    a.len() + b.len() - 2 * lcs_len(&a, &b)
}

/// Turns a distance over `len_sum` characters into a 0-100 similarity.
fn norm_distance(dist: usize, len_sum: usize) -> f64 {
    if len_sum == 0 {
        return 100.0;
    }
    100.0 - 100.0 * dist as f64 / len_sum as f64
}

/// Normalized Indel similarity in [0, 100]. Two empty strings score 100.
pub fn ratio(a: &str, b: &str) -> f64 {
    let len_sum = a.chars().count() + b.chars().count();
    norm_distance(indel_distance(a, b), len_sum)
}

/// Token-set similarity in [0, 100].
///
/// Shared tokens count as a full match for either side, so
/// "artist name" vs "artist name official" scores 100. Inputs are compared
/// as given; callers fold case/width first.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: FxHashSet<&str> = a.split_whitespace().collect();
    let tokens_b: FxHashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let mut intersect: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let mut diff_ab: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let mut diff_ba: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    intersect.sort_unstable();
    diff_ab.sort_unstable();
    diff_ba.sort_unstable();

    let diff_ab_joined = diff_ab.join(" ");
    let diff_ba_joined = diff_ba.join(" ");
    let ab_len = diff_ab_joined.chars().count();
    let ba_len = diff_ba_joined.chars().count();
    let sect_len = intersect.join(" ").chars().count();
    let sep = usize::from(sect_len != 0);

    let sect_ab_len = sect_len + sep + ab_len;
    let sect_ba_len = sect_len + sep + ba_len;

    let result = norm_distance(
        indel_distance(&diff_ab_joined, &diff_ba_joined),
        sect_ab_len + sect_ba_len,
    );
    if sect_len == 0 {
        return result;
    }

    // The intersection alone vs. intersection + each side's remainder.
    let sect_ab_ratio = norm_distance(sep + ab_len, sect_len + sect_ab_len);
    let sect_ba_ratio = norm_distance(sep + ba_len, sect_len + sect_ba_len);

    result.max(sect_ab_ratio).max(sect_ba_ratio)
}

/// Token-set ratio after case/width folding of both sides.
pub fn folded_token_set_ratio(a: &str, b: &str) -> f64 {
    token_set_ratio(&fold_text(a), &fold_text(b))
}

// ============================================================================
// Candidate Scoring
// ============================================================================

/// Sum of folded ratios for every query field that is present on both sides.
///
/// The sum is intentionally not normalized against the number of fields: a
/// two-field candidate can outscore a perfect one-field candidate.
pub fn score_candidate(
    query_track: Option<&str>,
    query_artist: Option<&str>,
    cand_track: Option<&str>,
    cand_artist: Option<&str>,
) -> f64 {
    let mut score = 0.0;
    if let (Some(q), Some(c)) = (non_empty(query_track), non_empty(cand_track)) {
        score += ratio(&fold_text(q), &fold_text(c));
    }
    if let (Some(q), Some(c)) = (non_empty(query_artist), non_empty(cand_artist)) {
        score += ratio(&fold_text(q), &fold_text(c));
    }
    score
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.is_empty())
}

/// Index of the highest-scoring item; ties keep the earliest.
pub fn best_index<T, F>(items: &[T], mut score: F) -> Option<usize>
where
    F: FnMut(&T) -> f64,
{
    let mut best: Option<(usize, f64)> = None;
    for (i, item) in items.iter().enumerate() {
        let s = score(item);
        match best {
            Some((_, best_score)) if s <= best_score => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}
