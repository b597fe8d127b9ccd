//! Best-match selection over a candidate set.

use super::levenshtein::similarity_ratio;

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Picks the candidate closest to `query`.
///
/// Candidates are `(comparison key, value)` pairs; the value of the winner
/// is returned with its score. A case- and whitespace-insensitive exact
/// match returns immediately with score 1.0. Otherwise the best ratio wins
/// if it reaches `threshold`; among equal scores the earliest candidate
/// wins.
pub fn best_match<'a, V>(
    query: &str,
    candidates: impl IntoIterator<Item = (&'a str, V)>,
    threshold: f64,
) -> Option<(V, f64)> {
    let query = normalize(query);
    let mut best: Option<(V, f64)> = None;

    for (key, value) in candidates {
        let key = normalize(key);
        if key == query {
            return Some((value, 1.0));
        }
        let score = similarity_ratio(&query, &key);
        if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
            best = Some((value, score));
        }
    }

    best.filter(|(_, score)| *score >= threshold)
}

/// [`best_match`] over plain strings, returning the matching candidate.
pub fn best_match_str<'a>(
    query: &str,
    candidates: impl IntoIterator<Item = &'a str>,
    threshold: f64,
) -> Option<(&'a str, f64)> {
    best_match(query, candidates.into_iter().map(|c| (c, c)), threshold)
}
