use crate::paper::normalize_string;
use strsim::jaro_winkler;

/// Minimum title similarity for a provider hit to count as the same paper
pub const TITLE_MATCH_THRESHOLD: f64 = 0.93;

/// Similarity of two titles after normalization (0.0 to 1.0)
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_string(a);
    let norm_b = normalize_string(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }
    jaro_winkler(&norm_a, &norm_b)
}

/// Find the candidate whose title best matches `title`, if any is close enough
pub fn find_best_match<'a, T, F>(title: &str, candidates: &'a [T], title_of: F) -> Option<(&'a T, f64)>
where
    F: Fn(&T) -> Option<&str>,
{
    candidates
        .iter()
        .filter_map(|c| title_of(c).map(|t| (c, title_similarity(title, t))))
        .filter(|(_, sim)| *sim >= TITLE_MATCH_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}
