//! Normalized edit-similarity ratios in `[0, 1]`, case-insensitive.

use strsim::normalized_levenshtein;

/// Full-string similarity: `1 - levenshtein / max_len`.
///
/// ```
/// use skillex_match::ratio;
/// assert_eq!(ratio("Python", "python"), 1.0);
/// assert!(ratio("REST", "Restaurant management") < 0.5);
/// ```
pub fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Best similarity of the shorter string against every equal-length window of
/// the longer one.
///
/// ```
/// use skillex_match::partial_ratio;
/// assert_eq!(partial_ratio("React", "React Native"), 1.0);
/// ```
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return if long.is_empty() { 1.0 } else { 0.0 };
    }

    let needle: String = short.iter().collect();
    long.windows(short.len())
        .map(|w| normalized_levenshtein(&needle, &w.iter().collect::<String>()))
        .fold(0.0, f64::max)
}
