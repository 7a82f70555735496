//! The OPF package document: manifest, spine and guide.

use std::collections::HashMap;

use roxmltree::{Document, Node, ParsingOptions};

use crate::error::ImportError;
use crate::links::{decode_href_path, resolve_path, split_href};
use crate::metadata::BookMetadata;

pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Book-relative path (same convention as archive entry paths).
    pub path: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

#[derive(Debug)]
pub struct PackageDocument {
    path: String,
    folder: Vec<String>,
    metadata: BookMetadata,
    items: Vec<ManifestItem>,
    spine: Vec<String>,
    toc_id: Option<String>,
}

/// Parse options shared by every XML document in the book; NCX files
/// routinely carry a DOCTYPE.
pub(crate) fn xml_options() -> ParsingOptions {
    ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    }
}

pub(crate) fn folder_of(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = path.split('/').map(str::to_string).collect();
    segments.pop();
    segments.retain(|s| !s.is_empty());
    segments
}

fn child_named<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == name)
}

impl PackageDocument {
    /// Parse the package document found at archive path `path`.
    pub fn parse(path: &str, text: &str) -> Result<Self, ImportError> {
        let doc = Document::parse_with_options(text, xml_options()).map_err(|e| {
            ImportError::InvalidPackage {
                path: path.to_string(),
                message: e.to_string(),
            }
        })?;
        let package = doc.root_element();
        let folder = folder_of(path);

        let metadata = BookMetadata::from_package(package);

        let items = child_named(package, "manifest")
            .map(|manifest| {
                manifest
                    .children()
                    .filter(|node| node.is_element() && node.tag_name().name() == "item")
                    .filter_map(|item| {
                        let href = item.attribute("href")?;
                        let (href, _) = split_href(href);
                        Some(ManifestItem {
                            id: item.attribute("id").unwrap_or_default().to_string(),
                            path: resolve_path(&folder, &decode_href_path(href)),
                            media_type: item
                                .attribute("media-type")
                                .unwrap_or_default()
                                .trim()
                                .to_ascii_lowercase(),
                            properties: item
                                .attribute("properties")
                                .unwrap_or_default()
                                .split_whitespace()
                                .map(str::to_string)
                                .collect(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let spine_el = child_named(package, "spine");
        let toc_id = spine_el.and_then(|spine| spine.attribute("toc")).map(str::to_string);
        let spine = spine_el
            .map(|spine| {
                spine
                    .children()
                    .filter(|node| node.is_element() && node.tag_name().name() == "itemref")
                    .filter_map(|itemref| itemref.attribute("idref"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            path: path.to_string(),
            folder,
            metadata,
            items,
            spine,
            toc_id,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Folder holding the package document; manifest hrefs are relative to it.
    pub fn folder(&self) -> &[String] {
        &self.folder
    }

    pub fn metadata(&self) -> &BookMetadata {
        &self.metadata
    }

    pub fn items(&self) -> &[ManifestItem] {
        &self.items
    }

    pub fn item_by_id(&self, id: &str) -> Option<&ManifestItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Declared MIME type keyed by book-relative path.
    pub fn media_types(&self) -> HashMap<String, String> {
        self.items
            .iter()
            .map(|item| (item.path.clone(), item.media_type.clone()))
            .collect()
    }

    /// Book-relative paths of the spine, in reading order.
    pub fn spine_paths(&self) -> Vec<String> {
        self.spine
            .iter()
            .filter_map(|id| self.item_by_id(id))
            .map(|item| item.path.clone())
            .collect()
    }

    /// The NCX: named by the spine's `toc` attribute, else the first item of NCX type.
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.toc_id
            .as_deref()
            .and_then(|id| self.item_by_id(id))
            .filter(|item| item.media_type == NCX_MEDIA_TYPE)
            .or_else(|| self.items.iter().find(|item| item.media_type == NCX_MEDIA_TYPE))
    }

    /// The EPUB 3 navigation document.
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.items.iter().find(|item| item.has_property("nav"))
    }

    /// Cover image declared by metadata: `<meta name="cover">` or the `cover-image` property.
    pub fn cover_image(&self) -> Option<String> {
        let from_meta = self
            .metadata
            .as_array("cover")
            .first()
            .and_then(|id| self.item_by_id(id))
            .filter(|item| item.media_type.starts_with("image/"))
            .map(|item| item.path.clone());

        from_meta.or_else(|| {
            self.items
                .iter()
                .find(|item| item.has_property("cover-image"))
                .map(|item| item.path.clone())
        })
    }

    /// Page showing the cover: the guide reference, else a manifest page with a cover id.
    pub fn cover_page(&self) -> Option<String> {
        if let Some(href) = self.metadata.cover_page() {
            let (href, _) = split_href(href);
            return Some(resolve_path(&self.folder, &decode_href_path(href)));
        }
        self.items
            .iter()
            .filter(|item| item.media_type.contains("html"))
            .find(|item| item.id.to_ascii_lowercase().contains("cover"))
            .map(|item| item.path.clone())
    }
}
