//! A content page of the book, converted to one Markdown note.

use std::fmt;

use anyhow::{Context, Result};
use kuchikiki::NodeRef;
use tracing::debug;

use crate::asset::{AssetInfo, AssetLocation, ImportTarget};
use crate::html;
use crate::links::{
    decode_href_path, encode_path, is_external, resolve_path, split_href,
    AnchorRegistry,
};

/// Lifecycle of a page. Each stage runs at most once, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PageState {
    Unparsed,
    Parsed,
    LinksReconnected,
    Imported,
}

/// Resolves links that leave the page being rewritten.
pub trait LinkTargets {
    /// Href for `fragment` on the page at book-relative `path`. `None` when
    /// `path` is not a page of the book.
    fn page_link(&mut self, path: &str, fragment: Option<&str>) -> Option<String>;
}

pub struct PageAsset {
    info: AssetInfo,
    output: AssetLocation,
    source_text: Option<String>,
    document: Option<NodeRef>,
    doc_title: Option<String>,
    nav_title: Option<String>,
    anchors: AnchorRegistry,
    is_nav: bool,
    state: PageState,
}

impl fmt::Debug for PageAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageAsset")
            .field("source", &self.info.source.path())
            .field("output", &self.output.path())
            .field("title", &self.title())
            .field("anchors", &self.anchors.len())
            .field("state", &self.state)
            .finish()
    }
}

impl PageAsset {
    /// A page whose output name is provisionally its source stem plus `.md`.
    pub fn new(info: AssetInfo, text: String) -> Self {
        let output = info.source.with_filename(format!("{}.md", info.source.stem()));
        Self {
            info,
            output,
            source_text: Some(text),
            document: None,
            doc_title: None,
            nav_title: None,
            anchors: AnchorRegistry::new(),
            is_nav: false,
            state: PageState::Unparsed,
        }
    }

    /// Mark this page as the book's navigation document.
    pub fn set_navigation(&mut self, is_nav: bool) {
        self.is_nav = is_nav;
    }

    pub fn info(&self) -> &AssetInfo {
        &self.info
    }

    pub fn output(&self) -> &AssetLocation {
        &self.output
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn document(&self) -> Option<&NodeRef> {
        self.document.as_ref()
    }

    pub fn anchors(&self) -> &AnchorRegistry {
        &self.anchors
    }

    /// Parse the source and run the DOM clean-up passes.
    pub fn parse(&mut self) {
        let Some(text) = self.source_text.take() else {
            return;
        };

        let document = html::parse_document(&text);

        self.doc_title = html::document_title(&document);
        html::normalize_mermaid(&document);
        html::normalize_code_blocks(&document);
        html::hoist_table_captions(&document);
        html::escape_angle_brackets(&document);
        if self.is_nav {
            html::flatten_nav(&document);
        }

        self.document = Some(document);
        self.state = PageState::Parsed;
    }

    /// Title from the navigation; only the first offer sticks.
    pub fn offer_nav_title(&mut self, title: &str) {
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        if self.nav_title.is_none() && !title.is_empty() {
            self.nav_title = Some(title);
        }
    }

    /// Navigation title, else the document `<title>`, else the source file stem.
    pub fn title(&self) -> String {
        self.nav_title
            .clone()
            .or_else(|| self.doc_title.clone())
            .unwrap_or_else(|| self.info.source.stem().to_string())
    }

    pub fn set_output_filename(&mut self, filename: &str) {
        self.output = self.info.source.with_filename(filename);
    }

    /// Anchor id emitted for the source fragment `source_id`, marking its
    /// block on first use. `None` if the id is not on this page.
    pub fn resolve_anchor(&mut self, source_id: &str) -> Option<String> {
        if let Some(anchor) = self.anchors.get(source_id) {
            return Some(anchor.to_string());
        }

        let document = self.document.as_ref()?;
        let Some(element) = html::find_element_by_id(document, source_id) else {
            debug!(page = %self.info.source.path(), id = source_id, "link target not found");
            return None;
        };

        let anchors = &self.anchors;
        let anchor = html::mark_link_target(&element, || anchors.mint(source_id))?;
        self.anchors.insert(source_id, &anchor);
        Some(anchor)
    }

    /// Book-relative output path, with `#^anchor` when `fragment` resolves.
    pub fn output_link(&mut self, fragment: Option<&str>) -> String {
        self.link_with_anchor(self.output.path(), fragment)
    }

    /// Same as [`output_link`](Self::output_link), percent-encoded for an href.
    pub fn href(&mut self, fragment: Option<&str>) -> String {
        self.link_with_anchor(encode_path(&self.output.path()), fragment)
    }

    fn link_with_anchor(&mut self, path: String, fragment: Option<&str>) -> String {
        match fragment.and_then(|id| self.resolve_anchor(id)) {
            Some(anchor) => format!("{}#^{}", path, anchor),
            None => path,
        }
    }

    /// Rewrite internal hrefs to point at output notes and block anchors.
    ///
    /// Links whose target is not a page stay untouched. Returns the number
    /// of links rewritten.
    pub fn reconnect_links(&mut self, others: &mut dyn LinkTargets) -> usize {
        let Some(document) = self.document.clone() else {
            return 0;
        };
        let own_path = self.info.source.path();
        let folder = self.info.source.folder().to_vec();
        let mut rewritten = 0;

        for link in html::hyperlinks(&document) {
            let Some(href) = html::attribute(&link, "href") else {
                continue;
            };
            if is_external(&href) {
                continue;
            }

            let (path, fragment) = split_href(&href);
            let target = if path.is_empty() {
                own_path.clone()
            } else {
                resolve_path(&folder, &decode_href_path(path))
            };

            let new_href = if target == own_path {
                Some(self.href(fragment))
            } else {
                others.page_link(&target, fragment)
            };

            match new_href {
                Some(new_href) => {
                    html::set_attribute(&link, "href", &new_href);
                    html::escape_link_brackets(&link);
                    rewritten += 1;
                }
                None => debug!(page = %own_path, href = %href, "link left as is"),
            }
        }

        self.state = PageState::LinksReconnected;
        rewritten
    }

    /// Book-relative path of the first image on the page.
    pub fn first_image(&self) -> Option<String> {
        let src = html::first_image_source(self.document.as_ref()?)?;
        if is_external(&src) {
            return None;
        }
        let (path, _) = split_href(&src);
        Some(resolve_path(self.info.source.folder(), &decode_href_path(path)))
    }

    pub fn import(&mut self, target: &mut ImportTarget) -> Result<()> {
        let document = self
            .document
            .as_ref()
            .with_context(|| format!("Page was never parsed: {}", self.info.source.path()))?;
        let markdown = html::convert_to_markdown(document, target.converter);
        target.write_text(&self.output, &markdown)?;
        self.state = PageState::Imported;
        Ok(())
    }
}
