//! Mapping of book titles and subjects onto names the vault accepts.
//!
//! Note names end up both on disk and inside `[[wiki links]]`, so characters
//! that either the filesystem or the link syntax reserves are swapped for
//! lookalike Unicode characters instead of being dropped.

const FALLBACK_NAME: &str = "Untitled";

/// Characters reserved by filesystems or link syntax, with their substitutes.
const SUBSTITUTIONS: &[(char, char)] = &[
    ('?', '？'),
    (':', '꞉'),
    ('"', '＂'),
    ('<', '‹'),
    ('>', '›'),
    ('|', '∣'),
    ('\\', '⧵'),
    ('/', '⁄'),
    ('[', '［'),
    (']', '］'),
    ('#', '＃'),
    ('^', 'ˆ'),
    ('&', '＆'),
    ('*', '∗'),
];

/// Convert a title into a safe output file basename (without extension).
///
/// The mapping is idempotent: feeding its output back in returns the same string.
pub fn to_output_basename(title: &str) -> String {
    let substituted: String = title
        .chars()
        .map(|c| {
            if c.is_control() {
                return ' ';
            }
            SUBSTITUTIONS
                .iter()
                .find(|(from, _)| *from == c)
                .map_or(c, |(_, to)| *to)
        })
        .collect();

    let trimmed = substituted.trim();
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_tag_separator(c: char) -> bool {
    matches!(c, '&' | '+' | ';' | ',' | '(' | ')' | '[' | ']' | '{' | '}')
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '/')
}

/// Convert a subject string into zero or more tag names.
///
/// Separator characters split the input, so `"Fiction & Fantasy"` yields
/// two tags. Words are joined with `-`, `/` is kept for nested tags.
pub fn to_tag_names(tag: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();

    for part in tag.split(is_tag_separator) {
        let Some(name) = tag_from_part(part) else {
            continue;
        };
        if !tags.contains(&name) {
            tags.push(name);
        }
    }

    tags
}

fn tag_from_part(part: &str) -> Option<String> {
    let joined = part
        .split('/')
        .map(|segment| segment.split_whitespace().collect::<Vec<_>>().join("-"))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    let cleaned: String = joined.chars().filter(|c| is_tag_char(*c)).collect();
    let cleaned = cleaned.trim_matches(|c| c == '-' || c == '/');
    if cleaned.is_empty() {
        return None;
    }

    // A tag made of digits alone is not recognised as a tag.
    if cleaned.chars().all(|c| c.is_ascii_digit() || c == '-' || c == '/') {
        Some(format!("_{}", cleaned))
    } else {
        Some(cleaned.to_string())
    }
}
