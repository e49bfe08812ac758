//! Text normalization shared by extraction, matching, and the n-gram index.
//!
//! Normalization lowercases, strips accents (NFD, combining marks dropped),
//! turns every character outside `[a-z0-9]` into a separator, and collapses
//! whitespace. Labels and documents go through the same function so their
//! tokens compare equal.
//!
//! All offsets in this crate are **character** offsets into the original
//! text, with exclusive ends.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// A normalized token and the character span it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Fold one character into zero or more normalized characters.
fn fold_char(c: char, out: &mut String) {
    for lower in c.to_lowercase() {
        let mut buf = [0u8; 4];
        let s: &str = lower.encode_utf8(&mut buf);
        for d in s.nfd() {
            if !is_combining_mark(d) {
                out.push(d);
            }
        }
    }
}

/// Tokenize `text` into normalized tokens with their character spans.
pub fn tokens_with_spans(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start = 0usize;
    let mut last_end = 0usize;
    let mut folded = String::new();

    for (idx, c) in text.chars().enumerate() {
        folded.clear();
        fold_char(c, &mut folded);
        if folded.is_empty() {
            // Standalone combining mark: belongs to the surrounding token.
            continue;
        }
        for f in folded.chars() {
            if f.is_ascii_alphanumeric() {
                if current.is_empty() {
                    start = idx;
                }
                current.push(f);
                last_end = idx + 1;
            } else if !current.is_empty() {
                tokens.push(Token {
                    text: std::mem::take(&mut current),
                    start,
                    end: last_end,
                });
            }
        }
    }
    if !current.is_empty() {
        tokens.push(Token {
            text: current,
            start,
            end: last_end,
        });
    }
    tokens
}

/// Normalize text: lowercase, accents stripped, punctuation as spaces, single spaces.
///
/// ```
/// use skillex_core::text::normalize;
/// assert_eq!(normalize("  Gestión de Bases-de-Datos "), "gestion de bases de datos");
/// assert_eq!(normalize("C++ / C#"), "c c");
/// ```
pub fn normalize(text: &str) -> String {
    tokens_with_spans(text)
        .into_iter()
        .map(|t| t.text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    tokens_with_spans(text).into_iter().map(|t| t.text).collect()
}

/// Dedup key for a mention: trimmed, lowercased, inner whitespace collapsed.
///
/// Unlike [`normalize`] this keeps punctuation, so "C++" and "C#" stay distinct.
pub fn mention_key(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Number of characters in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Substring by character offsets (exclusive end, clamped to the text).
pub fn char_slice(text: &str, start: usize, end: usize) -> String {
    if end <= start {
        return String::new();
    }
    text.chars().skip(start).take(end - start).collect()
}

/// Text surrounding `[start, end)` with `radius` characters on each side.
pub fn context_window(text: &str, start: usize, end: usize, radius: usize) -> String {
    let from = start.saturating_sub(radius);
    let to = end.saturating_add(radius);
    char_slice(text, from, to).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_accents_and_punctuation() {
        assert_eq!(normalize("Programación en Python!"), "programacion en python");
        assert_eq!(normalize("Node.js"), "node js");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_normalize_handles_decomposed_input() {
        // "e" followed by a combining acute accent
        let decomposed = "cafe\u{301} bar";
        assert_eq!(normalize(decomposed), "cafe bar");
    }

    #[test]
    fn test_tokens_with_spans_are_char_offsets() {
        let text = "Diseño y SQL";
        let tokens = tokens_with_spans(text);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "diseno");
        assert_eq!((tokens[0].start, tokens[0].end), (0, 6));
        assert_eq!(tokens[2].text, "sql");
        assert_eq!(char_slice(text, tokens[2].start, tokens[2].end), "SQL");
    }

    #[test]
    fn test_tokenize_matches_normalize() {
        let text = "Machine-Learning Engineer (Python)";
        assert_eq!(tokenize(text).join(" "), normalize(text));
    }

    #[test]
    fn test_mention_key_keeps_symbols() {
        assert_eq!(mention_key("  C++ "), "c++");
        assert_eq!(mention_key("Spring   Boot"), "spring boot");
        assert_ne!(mention_key("C#"), mention_key("C++"));
    }

    #[test]
    fn test_char_slice_and_context() {
        let text = "abcdefghij";
        assert_eq!(char_slice(text, 2, 5), "cde");
        assert_eq!(char_slice(text, 5, 2), "");
        assert_eq!(char_slice(text, 8, 50), "ij");
        assert_eq!(context_window(text, 4, 5, 2), "cdefg");
        assert_eq!(context_window(text, 0, 1, 50), "abcdefghij");
    }
}
