//! Shared helpers: in-memory EPUBs, an in-memory store and a recording reporter.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use epub2vault::{ArchiveEntry, OutputStore, ProgressReporter};

struct Item {
    id: String,
    href: String,
    media_type: String,
    data: Vec<u8>,
    in_spine: bool,
}

/// Builds the entries of a small EPUB 2 book rooted at `OEBPS/`.
pub struct EpubBuilder {
    title: Option<String>,
    metadata: String,
    items: Vec<Item>,
    nav_points: Vec<(String, String)>,
}

impl EpubBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            metadata: String::new(),
            items: Vec::new(),
            nav_points: Vec::new(),
        }
    }

    pub fn untitled() -> Self {
        Self {
            title: None,
            ..Self::new("")
        }
    }

    /// Raw XML added to `<metadata>`.
    pub fn metadata(mut self, xml: &str) -> Self {
        self.metadata.push_str(xml);
        self
    }

    /// A spine page at `OEBPS/<href>`.
    pub fn page(mut self, id: &str, href: &str, html: &str) -> Self {
        self.items.push(Item {
            id: id.to_string(),
            href: href.to_string(),
            media_type: "application/xhtml+xml".to_string(),
            data: html.as_bytes().to_vec(),
            in_spine: true,
        });
        self
    }

    /// Any other manifest file at `OEBPS/<href>`.
    pub fn file(mut self, id: &str, href: &str, media_type: &str, data: &[u8]) -> Self {
        self.items.push(Item {
            id: id.to_string(),
            href: href.to_string(),
            media_type: media_type.to_string(),
            data: data.to_vec(),
            in_spine: false,
        });
        self
    }

    /// Top-level NCX entry; adds `OEBPS/toc.ncx` to the book.
    pub fn nav(mut self, label: &str, href: &str) -> Self {
        self.nav_points.push((label.to_string(), href.to_string()));
        self
    }

    fn opf(&self) -> String {
        let mut manifest = String::new();
        if !self.nav_points.is_empty() {
            manifest.push_str(r#"<item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#);
        }
        for item in &self.items {
            manifest.push_str(&format!(
                r#"<item id="{}" href="{}" media-type="{}"/>"#,
                item.id, item.href, item.media_type
            ));
        }
        let spine: String = self
            .items
            .iter()
            .filter(|item| item.in_spine)
            .map(|item| format!(r#"<itemref idref="{}"/>"#, item.id))
            .collect();
        let title = self
            .title
            .as_ref()
            .map(|title| format!("<dc:title>{}</dc:title>", title))
            .unwrap_or_default();
        let toc = if self.nav_points.is_empty() { "" } else { r#" toc="ncx""# };

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    {}{}
  </metadata>
  <manifest>{}</manifest>
  <spine{}>{}</spine>
</package>"#,
            title, self.metadata, manifest, toc, spine
        )
    }

    fn ncx(&self) -> String {
        let points: String = self
            .nav_points
            .iter()
            .enumerate()
            .map(|(i, (label, href))| {
                format!(
                    r#"<navPoint id="n{0}" playOrder="{0}"><navLabel><text>{1}</text></navLabel><content src="{2}"/></navPoint>"#,
                    i + 1,
                    label,
                    href
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1"><navMap>{}</navMap></ncx>"#,
            points
        )
    }

    pub fn entries(&self) -> Vec<ArchiveEntry> {
        let mut entries = vec![
            ArchiveEntry::new("mimetype", b"application/epub+zip".to_vec()),
            ArchiveEntry::new(
                "META-INF/container.xml",
                br#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#.to_vec(),
            ),
            ArchiveEntry::new("OEBPS/content.opf", self.opf().into_bytes()),
        ];
        if !self.nav_points.is_empty() {
            entries.push(ArchiveEntry::new("OEBPS/toc.ncx", self.ncx().into_bytes()));
        }
        for item in &self.items {
            entries.push(ArchiveEntry::new(
                format!("OEBPS/{}", item.href),
                item.data.clone(),
            ));
        }
        entries
    }
}

pub fn xhtml(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{}</title></head><body>{}</body></html>"#,
        title, body
    )
}

/// Store keeping everything in memory; writes to paths containing `fail_on` error out.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub files: BTreeMap<String, Vec<u8>>,
    pub folders: BTreeSet<String>,
    pub fail_on: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(pattern: &str) -> Self {
        Self {
            fail_on: Some(pattern.to_string()),
            ..Self::default()
        }
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.files
            .get(path)
            .map(|data| String::from_utf8_lossy(data).into_owned())
    }

    fn write(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        if self.fail_on.as_deref().is_some_and(|pattern| path.contains(pattern)) {
            return Err(io::Error::other("disk full"));
        }
        self.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }
}

impl OutputStore for MemoryStore {
    fn folder_exists(&self, path: &str) -> bool {
        self.folders.contains(path)
    }

    fn create_folder(&mut self, path: &str) -> io::Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            self.folders.insert(current.clone());
        }
        Ok(())
    }

    fn write_text(&mut self, path: &str, text: &str) -> io::Result<()> {
        self.write(path, text.as_bytes())
    }

    fn write_binary(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        self.write(path, data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Note(String),
    Attachment(String),
    Skipped(String, String),
    Failed(String, String),
}

/// Reporter that records every call; optionally cancels after a number of writes.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<Event>,
    pub progress: Vec<(usize, usize)>,
    pub statuses: Vec<String>,
    pub cancel_after: Option<usize>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(writes: usize) -> Self {
        Self {
            cancel_after: Some(writes),
            ..Self::default()
        }
    }

    pub fn written(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Note(_) | Event::Attachment(_)))
            .count()
    }

    pub fn failures(&self) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Failed(..)))
            .collect()
    }
}

impl ProgressReporter for RecordingReporter {
    fn status(&mut self, message: &str) {
        self.statuses.push(message.to_string());
    }

    fn progress(&mut self, processed: usize, total: usize) {
        self.progress.push((processed, total));
    }

    fn report_note(&mut self, name: &str) {
        self.events.push(Event::Note(name.to_string()));
    }

    fn report_attachment(&mut self, name: &str) {
        self.events.push(Event::Attachment(name.to_string()));
    }

    fn report_skipped(&mut self, name: &str, reason: &str) {
        self.events
            .push(Event::Skipped(name.to_string(), reason.to_string()));
    }

    fn report_failed(&mut self, name: &str, message: &str) {
        self.events
            .push(Event::Failed(name.to_string(), message.to_string()));
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_after.is_some_and(|limit| self.written() >= limit)
    }
}
