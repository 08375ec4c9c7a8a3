//! Text encoding for fuzzy catalog matching.
//!
//! Two encoders turn free-text artist/release/recording names into stable
//! ASCII keys for the TF-IDF fuzzy index:
//!
//! - [`encode`] strips non-word characters, romanizes to ASCII, lowercases,
//!   and drops any spaces/underscores the romanization step introduced.
//! - [`encode_stupid`] only strips whitespace and lowercases; it is the
//!   fallback for text that has no word characters at all (e.g. `"!!!"`),
//!   where [`encode`] would otherwise collapse to nothing.
//!
//! Both functions are pure: same input always produces the same output, no
//! I/O, no shared state. An empty string means "unindexable on that path".

use unicode_categories::UnicodeCategories;

/// Maximum length, in bytes, of an encoded key. Longer inputs are truncated;
/// truncation always lands on a `char` boundary.
pub const MAX_ENCODED_LEN: usize = 30;

/// Unicode `\w`: letters, marks, decimal numbers, and connector punctuation
/// (which includes `_`).
fn is_word_char(c: char) -> bool {
    c.is_letter() || c.is_mark() || c.is_number() || c.is_connector_punctuation()
}

/// Truncate `s` to at most `max_bytes` bytes without splitting a `char`.
fn truncate_to_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Normalize `text` to a stable ASCII index key.
///
/// Pipeline: strip non-word characters, romanize non-ASCII to ASCII,
/// lowercase, strip any residual spaces/underscores (romanization sometimes
/// introduces them), truncate to [`MAX_ENCODED_LEN`] bytes.
///
/// Returns an empty string if `text` is empty or reduces to nothing (for
/// example, a name made entirely of punctuation).
pub fn encode(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let word_chars: String = text.chars().filter(|&c| is_word_char(c)).collect();
    if word_chars.is_empty() {
        return String::new();
    }

    let romanized = deunicode::deunicode(&word_chars);
    let lowered = romanized.to_lowercase();
    let cleaned: String = lowered.chars().filter(|&c| c != ' ' && c != '_').collect();

    truncate_to_bytes(&cleaned, MAX_ENCODED_LEN)
}

/// Fallback encoder for text whose [`encode`] output would be empty (names
/// built entirely from punctuation or symbols, e.g. `"!!!"`).
///
/// Pipeline: strip whitespace, lowercase, truncate to [`MAX_ENCODED_LEN`]
/// bytes. Unlike [`encode`] this keeps punctuation, since for these names the
/// punctuation *is* the identifying content.
pub fn encode_stupid(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let no_space: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let lowered = no_space.to_lowercase();

    truncate_to_bytes(&lowered, MAX_ENCODED_LEN)
}
