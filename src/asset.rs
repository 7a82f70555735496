//! Files of the book as importable assets.

use anyhow::{Context, Result};

use crate::markdown::MarkdownConverter;
use crate::package::NCX_MEDIA_TYPE;
use crate::page::PageAsset;
use crate::store::OutputStore;

/// Location of a file as folder segments plus a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetLocation {
    folder: Vec<String>,
    filename: String,
}

impl AssetLocation {
    pub fn new(folder: Vec<String>, filename: impl Into<String>) -> Self {
        Self {
            folder,
            filename: filename.into(),
        }
    }

    /// Split a slash-delimited path.
    pub fn from_path(path: &str) -> Self {
        let mut segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let filename = segments.pop().unwrap_or_default();
        Self::new(segments, filename)
    }

    pub fn folder(&self) -> &[String] {
        &self.folder
    }

    pub fn folder_path(&self) -> String {
        self.folder.join("/")
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        match self.filename.rfind('.') {
            Some(dot) if dot > 0 => &self.filename[..dot],
            _ => &self.filename,
        }
    }

    pub fn path(&self) -> String {
        if self.folder.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.folder_path(), self.filename)
        }
    }

    /// Same folder, different file name.
    pub fn with_filename(&self, filename: impl Into<String>) -> Self {
        Self::new(self.folder.clone(), filename)
    }
}

/// Fields shared by every asset.
#[derive(Debug, Clone)]
pub struct AssetInfo {
    pub source: AssetLocation,
    pub mimetype: String,
}

impl AssetInfo {
    pub fn new(path: &str, mimetype: &str) -> Self {
        Self {
            source: AssetLocation::from_path(path),
            mimetype: mimetype.to_string(),
        }
    }
}

/// How an archive entry takes part in the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Page,
    Media,
    TableOfContents,
    Skip(&'static str),
}

const PAGE_TYPES: &[&str] = &["application/xhtml+xml", "text/html"];

const STYLE_TYPES: &[&str] = &["text/css"];

const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "svg", "webp", "bmp", "tif", "tiff", "avif", "mp3", "m4a",
    "ogg", "oga", "wav", "mp4", "m4v", "webm", "ttf", "otf", "woff", "woff2", "pdf",
];

/// Classify an entry by its declared MIME type, falling back to its extension.
pub fn classify(mimetype: Option<&str>, extension: Option<&str>) -> AssetKind {
    let Some(mimetype) = mimetype else {
        return AssetKind::Skip("not listed in the manifest");
    };

    if PAGE_TYPES.contains(&mimetype) {
        AssetKind::Page
    } else if mimetype == NCX_MEDIA_TYPE {
        AssetKind::TableOfContents
    } else if STYLE_TYPES.contains(&mimetype) {
        AssetKind::Skip("stylesheet")
    } else if extension.is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext)) {
        AssetKind::Media
    } else {
        AssetKind::Skip("unsupported file type")
    }
}

/// Where and how assets get written.
pub struct ImportTarget<'a> {
    pub store: &'a mut dyn OutputStore,
    /// Output container folder every asset path is placed under.
    pub root: &'a str,
    pub converter: &'a dyn MarkdownConverter,
}

impl ImportTarget<'_> {
    pub fn full_path(&self, location: &AssetLocation) -> String {
        if self.root.is_empty() {
            location.path()
        } else {
            format!("{}/{}", self.root, location.path())
        }
    }

    fn ensure_folder(&mut self, location: &AssetLocation) -> Result<()> {
        let folder = if location.folder().is_empty() {
            self.root.to_string()
        } else if self.root.is_empty() {
            location.folder_path()
        } else {
            format!("{}/{}", self.root, location.folder_path())
        };
        if !folder.is_empty() {
            self.store
                .create_folder(&folder)
                .with_context(|| format!("Failed to create folder: {}", folder))?;
        }
        Ok(())
    }

    pub fn write_text(&mut self, location: &AssetLocation, text: &str) -> Result<()> {
        self.ensure_folder(location)?;
        let path = self.full_path(location);
        self.store
            .write_text(&path, text)
            .with_context(|| format!("Failed to write note: {}", path))
    }

    pub fn write_binary(&mut self, location: &AssetLocation, data: &[u8]) -> Result<()> {
        self.ensure_folder(location)?;
        let path = self.full_path(location);
        self.store
            .write_binary(&path, data)
            .with_context(|| format!("Failed to write attachment: {}", path))
    }
}

/// An image, font or other binary copied verbatim to the same relative path.
#[derive(Debug)]
pub struct MediaAsset {
    info: AssetInfo,
    data: Vec<u8>,
}

impl MediaAsset {
    pub fn new(info: AssetInfo, data: Vec<u8>) -> Self {
        Self { info, data }
    }

    pub fn info(&self) -> &AssetInfo {
        &self.info
    }

    pub fn output(&self) -> &AssetLocation {
        &self.info.source
    }

    pub fn import(&self, target: &mut ImportTarget) -> Result<()> {
        target.write_binary(self.output(), &self.data)
    }
}

/// Every asset written during an import, except the navigation.
#[derive(Debug)]
pub enum Asset {
    Page(Box<PageAsset>),
    Media(MediaAsset),
}

impl Asset {
    pub fn info(&self) -> &AssetInfo {
        match self {
            Asset::Page(page) => page.info(),
            Asset::Media(media) => media.info(),
        }
    }

    pub fn output(&self) -> &AssetLocation {
        match self {
            Asset::Page(page) => page.output(),
            Asset::Media(media) => media.output(),
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, Asset::Page(_))
    }

    pub fn as_page(&self) -> Option<&PageAsset> {
        match self {
            Asset::Page(page) => Some(&**page),
            Asset::Media(_) => None,
        }
    }

    pub fn as_page_mut(&mut self) -> Option<&mut PageAsset> {
        match self {
            Asset::Page(page) => Some(&mut **page),
            Asset::Media(_) => None,
        }
    }

    pub fn import(&mut self, target: &mut ImportTarget) -> Result<()> {
        match self {
            Asset::Page(page) => page.import(target),
            Asset::Media(media) => media.import(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_path() {
        let location = AssetLocation::from_path("OEBPS/Text/ch1.xhtml");
        assert_eq!(location.folder(), ["OEBPS", "Text"]);
        assert_eq!(location.filename(), "ch1.xhtml");
        assert_eq!(location.stem(), "ch1");
        assert_eq!(location.path(), "OEBPS/Text/ch1.xhtml");
        assert_eq!(location.with_filename("One.md").path(), "OEBPS/Text/One.md");

        let root = AssetLocation::from_path("cover.jpg");
        assert!(root.folder().is_empty());
        assert_eq!(root.path(), "cover.jpg");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Some("application/xhtml+xml"), Some("xhtml")), AssetKind::Page);
        assert_eq!(classify(Some("text/html"), Some("htm")), AssetKind::Page);
        assert_eq!(
            classify(Some(NCX_MEDIA_TYPE), Some("ncx")),
            AssetKind::TableOfContents
        );
        assert_eq!(classify(Some("image/png"), Some("png")), AssetKind::Media);
        assert!(matches!(classify(Some("text/css"), Some("css")), AssetKind::Skip(_)));
        assert!(matches!(classify(None, Some("png")), AssetKind::Skip(_)));
        assert!(matches!(
            classify(Some("application/x-custom"), Some("bin")),
            AssetKind::Skip(_)
        ));
    }
}
