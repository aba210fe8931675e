//! Text normalization applied before every pattern test.
//!
//! Mobile input varies a lot in spacing, punctuation and case; patterns are
//! written against the normalized form only.

/// Punctuation stripped from input: full-width and half-width variants of `!?。、・,.`.
const STRIPPED: &[char] = &[
    '!', '！', '?', '？', '。', '｡', '、', '､', '・', '･', ',', '，', '.', '．',
];

/// Lower-case, drop all whitespace (including the ideographic space) and strip [`STRIPPED`].
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED.contains(c))
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_whitespace() && !STRIPPED.contains(c))
        .collect()
}
