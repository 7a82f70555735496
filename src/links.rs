//! Link resolution: hrefs, book-relative paths and per-page anchor ids.

use std::collections::{HashMap, HashSet};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use uuid::Uuid;

/// Characters escaped when a path is written into a Markdown link target.
const PATH_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'(')
    .add(b')')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'|')
    .add(b'\\');

/// Split an href into its path and optional fragment.
pub fn split_href(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
        Some((path, _)) => (path, None),
        None => (href, None),
    }
}

/// Whether an href leaves the book (has a URL scheme or is protocol-relative).
pub fn is_external(href: &str) -> bool {
    if href.starts_with("//") {
        return true;
    }
    let Some((scheme, _)) = href.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Decode percent escapes in an href path.
pub fn decode_href_path(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

/// Resolve `path` against `base_folder`, returning a book-relative path.
///
/// A leading `/` restarts at the book root; `.` and `..` segments are folded.
pub fn resolve_path(base_folder: &[String], path: &str) -> String {
    let mut segments: Vec<&str> = if path.starts_with('/') {
        Vec::new()
    } else {
        base_folder.iter().map(String::as_str).collect()
    };

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// Percent-encode a path for use as a Markdown link destination.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ESCAPES).to_string()
}

/// Whether `id` can follow `^` in a block reference.
pub fn is_valid_anchor_id(id: &str) -> bool {
    let mut chars = id.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Map a source id onto the block-reference alphabet, if anything usable is left.
pub fn sanitize_anchor_id(id: &str) -> Option<String> {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let out = out.trim_end_matches('-');
    is_valid_anchor_id(out).then(|| out.to_string())
}

/// Source fragment ids of one page mapped to the anchor ids emitted for them.
#[derive(Debug, Default)]
pub struct AnchorRegistry {
    by_source: HashMap<String, String>,
    used: HashSet<String>,
}

impl AnchorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.by_source.get(source_id).map(String::as_str)
    }

    pub fn insert(&mut self, source_id: &str, anchor_id: &str) {
        self.used.insert(anchor_id.to_string());
        self.by_source
            .entry(source_id.to_string())
            .or_insert_with(|| anchor_id.to_string());
    }

    pub fn is_used(&self, anchor_id: &str) -> bool {
        self.used.contains(anchor_id)
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Produce a fresh anchor id for `source_id` that no other block on the page uses.
    pub fn mint(&self, source_id: &str) -> String {
        let Some(base) = sanitize_anchor_id(source_id) else {
            return self.random_id();
        };
        if !self.is_used(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{}-{}", base, n))
            .find(|candidate| !self.is_used(candidate))
            .unwrap_or_else(|| self.random_id())
    }

    fn random_id(&self) -> String {
        loop {
            let simple = Uuid::new_v4().simple().to_string();
            let candidate = format!("ref-{}", &simple[..8]);
            if !self.is_used(&candidate) {
                return candidate;
            }
        }
    }
}
