use std::collections::HashMap;

use roxmltree::Node;
use serde_json::Value;

/// Multi-valued view of the package `<metadata>` block.
///
/// Keys are namespace-stripped element names (`title`, `creator`, ...) or the
/// `name`/`property` of `<meta>` elements. Repeated keys accumulate in order.
#[derive(Debug, Default, Clone)]
pub struct BookMetadata {
    properties: HashMap<String, Vec<String>>,
    cover_page: Option<String>,
}

impl BookMetadata {
    /// Build from the package root element.
    pub fn from_package(package: Node) -> Self {
        let mut metadata = Self::default();

        let metadata_el = package
            .children()
            .find(|child| child.is_element() && child.tag_name().name() == "metadata");
        if let Some(metadata_el) = metadata_el {
            metadata.collect(metadata_el);
        }

        if metadata.as_string("cover").is_none() {
            metadata.cover_page = package
                .descendants()
                .filter(|node| node.is_element() && node.tag_name().name() == "reference")
                .find(|node| node.attribute("type").is_some_and(|t| t.eq_ignore_ascii_case("cover")))
                .and_then(|node| node.attribute("href"))
                .map(str::to_string);
        }

        metadata
    }

    fn collect(&mut self, parent: Node) {
        for child in parent.children().filter(Node::is_element) {
            let name = child.tag_name().name();

            // OPF 2.0 wraps Dublin Core entries in `dc-metadata` / `x-metadata`.
            if name.ends_with("-metadata") {
                self.collect(child);
                continue;
            }

            if name == "meta" {
                if let (Some(key), Some(value)) = (child.attribute("name"), child.attribute("content")) {
                    self.push(key, value);
                } else if let Some(key) = child.attribute("property") {
                    self.push(key, &element_text(child));
                }
                continue;
            }

            self.push(name, &element_text(child));
        }
    }

    fn push(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        self.properties
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// All values for `key`, joined with commas.
    pub fn as_string(&self, key: &str) -> Option<String> {
        self.properties
            .get(key)
            .filter(|values| !values.is_empty())
            .map(|values| values.join(", "))
    }

    pub fn as_array(&self, key: &str) -> &[String] {
        self.properties.get(key).map_or(&[], Vec::as_slice)
    }

    /// Guide `cover` reference, only filled when no `cover` metadata exists.
    pub fn cover_page(&self) -> Option<&str> {
        self.cover_page.as_deref()
    }
}

fn element_text(node: Node) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|text| text.text())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Values written into the landing note's frontmatter.
#[derive(Debug, Default, Clone)]
pub struct FrontMatter {
    pub title: String,
    pub authors: Vec<String>,
    pub aliases: Vec<String>,
    pub publisher: Option<String>,
    pub tags: Vec<String>,
    pub cover: Option<String>,
}

fn quote(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Render a YAML frontmatter block, including the closing `---`.
pub fn format_frontmatter(fm: &FrontMatter) -> String {
    let mut lines = vec!["---".to_string()];

    lines.push(format!("title: {}", quote(&fm.title)));

    if !fm.authors.is_empty() {
        lines.push(format!("author: {}", quote(&fm.authors.join(", "))));
    }

    if !fm.aliases.is_empty() {
        lines.push("aliases:".to_string());
        lines.extend(fm.aliases.iter().map(|alias| format!("  - {}", quote(alias))));
    }

    if let Some(publisher) = &fm.publisher {
        lines.push(format!("publisher: {}", quote(publisher)));
    }

    if !fm.tags.is_empty() {
        lines.push("tags:".to_string());
        lines.extend(fm.tags.iter().map(|tag| format!("  - {}", tag)));
    }

    if let Some(cover) = &fm.cover {
        lines.push(format!("cover: {}", quote(cover)));
    }

    lines.push("---".to_string());
    lines.join("\n") + "\n"
}
