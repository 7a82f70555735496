//! Placeholder tokens smuggled through the HTML to Markdown converter.
//!
//! The converter knows nothing about block anchors or forced line breaks, so
//! the HTML passes embed literal tokens that come out of the converter as
//! plain text. [`decode`] is the single place that turns them back into vault
//! syntax; every token minted here has a matching pattern below.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Attribute placed on marker elements so later passes can find them again.
pub const ANCHOR_ATTR: &str = "data-anchor";

const NEWLINE_TOKEN: &str = "{{br}}";
const OPEN_BRACKET_TOKEN: &str = "{{lsqb}}";
const CLOSE_BRACKET_TOKEN: &str = "{{rsqb}}";

static ANCHOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ \t]*`?\{\{\^([A-Za-z][A-Za-z0-9-]*)\}\}`?").expect("anchor pattern is valid")
});

static NEWLINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\{\{br\}\}[ \t]*").expect("newline pattern is valid"));

static LEFTOVER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(\^[A-Za-z0-9-]+|br|lsqb|rsqb)\}\}").expect("leftover pattern is valid")
});

/// Token standing for the block anchor `^id`.
pub fn anchor_token(id: &str) -> String {
    format!("{{{{^{}}}}}", id)
}

/// Token forcing a paragraph break in the converted output.
pub fn newline_token() -> &'static str {
    NEWLINE_TOKEN
}

/// Replace square brackets in link text with tokens that decode to escaped brackets.
pub fn escape_link_text(text: &str) -> String {
    text.replace('[', OPEN_BRACKET_TOKEN)
        .replace(']', CLOSE_BRACKET_TOKEN)
}

/// Resolve every token in converter output into vault Markdown.
pub fn decode(markdown: &str) -> String {
    let anchored = ANCHOR_PATTERN.replace_all(markdown, |caps: &Captures| {
        let start = caps.get(0).map_or(0, |m| m.start());
        // A marker on a line of its own anchors the block above it.
        if start == 0 || markdown[..start].ends_with('\n') {
            format!("^{}", &caps[1])
        } else {
            format!(" ^{}", &caps[1])
        }
    });
    let broken = NEWLINE_PATTERN.replace_all(&anchored, "\n\n");

    broken
        .replace(OPEN_BRACKET_TOKEN, "\\[")
        .replace(CLOSE_BRACKET_TOKEN, "\\]")
}

/// Whether any token survived decoding.
pub fn has_leftover(markdown: &str) -> bool {
    LEFTOVER_PATTERN.is_match(markdown)
}
