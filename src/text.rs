//! Unicode-safe text normalization, shared by content hashing (4.C) and similarity
//! scoring (4.D). Operates over Unicode scalar values rather than bytes, per the
//! spec's normalization design note, so differing encodings of the same text hash
//! and score identically.

/// Lowercase (Unicode case folding), strip non-word characters, collapse whitespace.
/// Pure and idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = true; // suppress leading whitespace

    for ch in input.chars().flat_map(|c| c.to_lowercase()) {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }

    if out.ends_with(' ') {
        out.pop();
    }

    out
}

/// Tokenize already-normalized text into whitespace-separated words.
pub fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

/// Character bigrams of a normalized string, used by the Dice coefficient in
/// title similarity (spec §4.D).
pub fn bigrams(normalized: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() < 2 {
        return Vec::new();
    }
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}
