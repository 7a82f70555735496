//! The import orchestrator: one `Book` per archive.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::archive::ArchiveEntry;
use crate::asset::{classify, Asset, AssetInfo, AssetKind, AssetLocation, ImportTarget, MediaAsset};
use crate::error::{ImportError, NameCollision};
use crate::html::html_to_text;
use crate::markdown::MarkdownConverter;
use crate::metadata::{BookMetadata, FrontMatter};
use crate::package::PackageDocument;
use crate::page::{LinkTargets, PageAsset};
use crate::report::ProgressReporter;
use crate::sanitize::{to_output_basename, to_tag_names};
use crate::store::OutputStore;
use crate::toc::{render_landing, NavTargets, TocAsset, TOC_FILENAME};

/// Import progress. Each state is entered once, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BookState {
    Created,
    ManifestParsed,
    AssetsClassified,
    PagesParsed,
    LinksReconnected,
    Written,
}

/// Case-insensitive set of output paths claimed within one book.
#[derive(Debug, Default)]
pub struct FilenameRegistry {
    used: HashSet<String>,
}

impl FilenameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &str) -> String {
        path.to_lowercase()
    }

    pub fn is_registered(&self, path: &str) -> bool {
        self.used.contains(&Self::key(path))
    }

    /// Claim an exact path; fails if it is already taken.
    pub fn register(&mut self, path: &str) -> Result<(), NameCollision> {
        if self.used.insert(Self::key(path)) {
            Ok(())
        } else {
            Err(NameCollision(path.to_string()))
        }
    }

    /// Claim `stem.extension` in `folder`, numbering the stem until it is free.
    /// Returns the file name.
    pub fn claim(&mut self, folder: &[String], stem: &str, extension: &str) -> String {
        let location = |filename: &str| AssetLocation::new(folder.to_vec(), filename).path();

        let mut filename = format!("{}.{}", stem, extension);
        let mut counter = 2;
        while self.register(&location(&filename)).is_err() {
            filename = format!("{} ({}).{}", stem, counter, extension);
            counter += 1;
        }
        filename
    }
}

/// What happens to one archive entry during the write phase.
#[derive(Debug)]
enum PlanStep {
    Asset(usize),
    Toc,
    Skip { path: String, reason: &'static str },
}

/// Page lookup over the asset list, optionally excluding the page being rewritten.
struct PageLookup<'a> {
    index: &'a HashMap<String, usize>,
    before: &'a mut [Asset],
    after: &'a mut [Asset],
    current: Option<usize>,
}

impl<'a> PageLookup<'a> {
    fn all(index: &'a HashMap<String, usize>, assets: &'a mut [Asset]) -> Self {
        Self {
            index,
            before: assets,
            after: &mut [],
            current: None,
        }
    }

    fn position(&self, path: &str) -> Option<(bool, usize)> {
        let i = *self.index.get(path)?;
        let split = self.before.len();
        match (i.cmp(&split), self.current) {
            (Ordering::Less, _) => Some((true, i)),
            (Ordering::Equal, Some(_)) => None,
            (_, Some(_)) => Some((false, i - split - 1)),
            (_, None) => Some((false, i - split)),
        }
    }

    fn page(&self, path: &str) -> Option<&PageAsset> {
        let (in_before, i) = self.position(path)?;
        let asset = if in_before { self.before.get(i) } else { self.after.get(i) };
        asset?.as_page()
    }

    fn page_mut(&mut self, path: &str) -> Option<&mut PageAsset> {
        let (in_before, i) = self.position(path)?;
        let asset = if in_before {
            self.before.get_mut(i)
        } else {
            self.after.get_mut(i)
        };
        asset?.as_page_mut()
    }
}

impl LinkTargets for PageLookup<'_> {
    fn page_link(&mut self, path: &str, fragment: Option<&str>) -> Option<String> {
        Some(self.page_mut(path)?.href(fragment))
    }
}

impl NavTargets for PageLookup<'_> {
    fn offer_title(&mut self, path: &str, label: &str) {
        if let Some(page) = self.page_mut(path) {
            page.offer_nav_title(label);
        }
    }

    fn output_link(&mut self, path: &str, fragment: Option<&str>) -> Option<String> {
        Some(self.page_mut(path)?.output_link(fragment))
    }

    fn title(&self, path: &str) -> Option<String> {
        self.page(path).map(PageAsset::title)
    }
}

#[derive(Debug)]
pub struct Book {
    name: String,
    state: BookState,
    package: PackageDocument,
    assets: Vec<Asset>,
    index: HashMap<String, usize>,
    toc: TocAsset,
    plan: Vec<PlanStep>,
    filenames: FilenameRegistry,
    landing: AssetLocation,
    cover_image: Option<String>,
}

impl Book {
    /// Read the package, classify every entry, parse pages and navigation.
    ///
    /// `name` is used as the title when the package has none.
    pub fn open(name: &str, entries: Vec<ArchiveEntry>) -> Result<Self, ImportError> {
        let opf = entries
            .iter()
            .position(|entry| entry.extension().as_deref() == Some("opf"))
            .ok_or(ImportError::MissingManifest)?;
        let package = PackageDocument::parse(entries[opf].path(), &entries[opf].read_text())?;
        debug!(package = package.path(), items = package.items().len(), "package parsed");

        let media_types = package.media_types();
        let ncx_path = package.ncx_item().map(|item| item.path.clone());
        let nav_path = package.nav_item().map(|item| item.path.clone());

        let mut assets = Vec::new();
        let mut index = HashMap::new();
        let mut plan = Vec::with_capacity(entries.len());
        let mut ncx_toc = None;
        let mut nav_text = None;

        for (position, entry) in entries.into_iter().enumerate() {
            let path = entry.path().to_string();
            if position == opf {
                plan.push(PlanStep::Skip {
                    path,
                    reason: "package document",
                });
                continue;
            }

            let mimetype = media_types.get(&path).map(String::as_str);
            let kind = classify(mimetype, entry.extension().as_deref());
            let info = AssetInfo::new(&path, mimetype.unwrap_or_default());

            let asset = match kind {
                AssetKind::Page => {
                    let text = entry.read_text();
                    let is_nav = nav_path.as_deref() == Some(path.as_str());
                    if is_nav {
                        nav_text = Some(text.clone());
                    }
                    let mut page = PageAsset::new(info, text);
                    page.set_navigation(is_nav);
                    Asset::Page(Box::new(page))
                }
                AssetKind::Media => Asset::Media(MediaAsset::new(info, entry.into_data())),
                AssetKind::TableOfContents
                    if ncx_toc.is_none() && ncx_path.as_deref() == Some(path.as_str()) =>
                {
                    match TocAsset::from_ncx(info, &entry.read_text()) {
                        Ok(toc) => {
                            ncx_toc = Some(toc);
                            plan.push(PlanStep::Toc);
                        }
                        Err(e) => {
                            warn!(path = %path, "unreadable navigation: {}", e);
                            plan.push(PlanStep::Skip {
                                path,
                                reason: "unreadable navigation",
                            });
                        }
                    }
                    continue;
                }
                AssetKind::TableOfContents => {
                    plan.push(PlanStep::Skip {
                        path,
                        reason: "unused navigation file",
                    });
                    continue;
                }
                AssetKind::Skip(reason) => {
                    plan.push(PlanStep::Skip { path, reason });
                    continue;
                }
            };

            index.insert(path, assets.len());
            plan.push(PlanStep::Asset(assets.len()));
            assets.push(asset);
        }
        debug!(assets = assets.len(), steps = plan.len(), "entries classified");

        for asset in &mut assets {
            if let Some(page) = asset.as_page_mut() {
                page.parse();
            }
        }

        let toc = match (ncx_toc, nav_path, nav_text) {
            (Some(toc), _, _) => toc,
            (None, Some(path), Some(text)) => {
                TocAsset::from_nav_document(AssetInfo::new(&path, "application/xhtml+xml"), &text)
            }
            _ => TocAsset::from_spine(package.path(), &package.spine_paths()),
        };

        let mut book = Self {
            name: name.to_string(),
            state: BookState::PagesParsed,
            package,
            assets,
            index,
            toc,
            plan,
            filenames: FilenameRegistry::new(),
            landing: AssetLocation::new(Vec::new(), ""),
            cover_image: None,
        };

        book.apply_navigation();
        book.assign_output_names();
        book.resolve_navigation();
        book.cover_image = book.derive_cover();
        Ok(book)
    }

    fn apply_navigation(&mut self) {
        let mut lookup = PageLookup::all(&self.index, &mut self.assets);
        self.toc.assign_titles(&mut lookup);
    }

    fn resolve_navigation(&mut self) {
        let mut lookup = PageLookup::all(&self.index, &mut self.assets);
        self.toc.resolve(&mut lookup);
    }

    /// Landing note, TOC note, attachments, then pages in archive order.
    fn assign_output_names(&mut self) {
        let landing = format!("{}.md", self.container_name());
        self.landing = AssetLocation::new(Vec::new(), landing);
        // A fresh registry cannot reject its first name.
        let _ = self.filenames.register(&self.landing.path());

        let toc_stem = TOC_FILENAME.trim_end_matches(".md");
        let toc_name = self.filenames.claim(self.toc.output().folder(), toc_stem, "md");
        self.toc.set_output_filename(&toc_name);

        for step in &mut self.plan {
            let PlanStep::Asset(i) = *step else {
                continue;
            };
            let Asset::Media(media) = &self.assets[i] else {
                continue;
            };
            if let Err(collision) = self.filenames.register(&media.output().path()) {
                warn!("{}", collision);
                *step = PlanStep::Skip {
                    path: media.info().source.path(),
                    reason: "duplicate output path",
                };
            }
        }

        for asset in &mut self.assets {
            if let Asset::Page(page) = asset {
                let stem = to_output_basename(&page.title());
                let filename = self.filenames.claim(page.output().folder(), &stem, "md");
                page.set_output_filename(&filename);
            }
        }
    }

    fn derive_cover(&self) -> Option<String> {
        if let Some(cover) = self.package.cover_image() {
            return Some(cover);
        }
        let cover_page = self.package.cover_page()?;
        let page = self.assets.get(*self.index.get(&cover_page)?)?.as_page()?;
        page.first_image()
    }

    pub fn state(&self) -> BookState {
        self.state
    }

    pub fn metadata(&self) -> &BookMetadata {
        self.package.metadata()
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn asset(&self, path: &str) -> Option<&Asset> {
        self.assets.get(*self.index.get(path)?)
    }

    pub fn page(&self, path: &str) -> Option<&PageAsset> {
        self.asset(path)?.as_page()
    }

    pub fn toc(&self) -> &TocAsset {
        &self.toc
    }

    /// Path of the landing note inside the container.
    pub fn landing(&self) -> &AssetLocation {
        &self.landing
    }

    /// Number of archive entries, each one a step of the write phase.
    pub fn entry_count(&self) -> usize {
        self.plan.len()
    }

    pub fn title(&self) -> String {
        self.metadata()
            .as_array("title")
            .first()
            .cloned()
            .unwrap_or_else(|| self.name.clone())
    }

    /// Secondary titles.
    pub fn aliases(&self) -> Vec<String> {
        self.metadata().as_array("title").iter().skip(1).cloned().collect()
    }

    pub fn authors(&self) -> Vec<String> {
        self.metadata().as_array("creator").to_vec()
    }

    pub fn publisher(&self) -> Option<String> {
        self.metadata().as_string("publisher")
    }

    /// Description with any markup stripped.
    pub fn description(&self) -> Option<String> {
        self.metadata()
            .as_string("description")
            .map(|description| html_to_text(&description))
            .filter(|description| !description.is_empty())
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.metadata().as_array("subject").iter().flat_map(|s| to_tag_names(s)) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    /// Book-relative path of the cover image.
    pub fn cover_image(&self) -> Option<&str> {
        self.cover_image.as_deref()
    }

    /// Name of the output folder holding the whole book.
    pub fn container_name(&self) -> String {
        to_output_basename(&self.title())
    }

    pub fn frontmatter(&self) -> FrontMatter {
        FrontMatter {
            title: self.title(),
            authors: self.authors(),
            aliases: self.aliases(),
            publisher: self.publisher(),
            tags: self.tags(),
            cover: self.cover_image().map(str::to_string),
        }
    }

    /// Rewrite links on every page. Later calls do nothing.
    fn reconnect_links(&mut self) {
        if self.state >= BookState::LinksReconnected {
            return;
        }
        let mut rewritten = 0;
        for i in 0..self.assets.len() {
            let (before, rest) = self.assets.split_at_mut(i);
            let Some((current, after)) = rest.split_first_mut() else {
                continue;
            };
            let Some(page) = current.as_page_mut() else {
                continue;
            };
            let mut others = PageLookup {
                index: &self.index,
                before,
                after,
                current: Some(i),
            };
            rewritten += page.reconnect_links(&mut others);
        }
        debug!(rewritten, "links reconnected");
        self.state = BookState::LinksReconnected;
    }

    fn write_landing(&self, target: &mut ImportTarget) -> Result<()> {
        let landing = render_landing(
            &self.frontmatter(),
            self.description().as_deref(),
            self.toc.output(),
        );
        target.write_text(&self.landing, &landing)?;
        // Navigation without an NCX entry of its own is written with the landing note.
        if !self.plan.iter().any(|step| matches!(step, PlanStep::Toc)) {
            self.toc.import(target)?;
        }
        Ok(())
    }

    /// Write the book into a new container folder of `store`.
    ///
    /// Fails without writing anything when the container already exists.
    /// Failures of single entries are reported and the import goes on.
    pub fn import(
        &mut self,
        store: &mut dyn OutputStore,
        reporter: &mut dyn ProgressReporter,
        converter: &dyn MarkdownConverter,
    ) -> Result<(), ImportError> {
        let root = self.container_name();
        if store.folder_exists(&root) {
            return Err(ImportError::OutputExists(root));
        }
        store.create_folder(&root)?;

        self.reconnect_links();

        let total = self.plan.len() + 1;
        let mut processed = 0;
        reporter.status(&format!("Importing {}", self.title()));

        let mut target = ImportTarget {
            store,
            root: &root,
            converter,
        };

        if reporter.is_cancelled() {
            info!(book = %root, "import cancelled");
            return Ok(());
        }
        let landing = target.full_path(&self.landing);
        match self.write_landing(&mut target) {
            Ok(()) => reporter.report_note(&landing),
            Err(e) => reporter.report_failed(&landing, &format!("{:#}", e)),
        }
        processed += 1;
        reporter.progress(processed, total);

        for step in &self.plan {
            if reporter.is_cancelled() {
                info!(book = %root, processed, total, "import cancelled");
                return Ok(());
            }

            match step {
                PlanStep::Asset(i) => {
                    let asset = &mut self.assets[*i];
                    let name = target.full_path(asset.output());
                    match asset.import(&mut target) {
                        Ok(()) if asset.is_note() => reporter.report_note(&name),
                        Ok(()) => reporter.report_attachment(&name),
                        Err(e) => reporter.report_failed(&name, &format!("{:#}", e)),
                    }
                }
                PlanStep::Toc => {
                    let name = target.full_path(self.toc.output());
                    match self.toc.import(&mut target) {
                        Ok(()) => reporter.report_note(&name),
                        Err(e) => reporter.report_failed(&name, &format!("{:#}", e)),
                    }
                }
                PlanStep::Skip { path, reason } => reporter.report_skipped(path, reason),
            }

            processed += 1;
            reporter.progress(processed, total);
        }

        self.state = BookState::Written;
        info!(book = %root, entries = self.plan.len(), "import finished");
        Ok(())
    }
}

/// Open and import one archive, reporting a fatal error once before returning it.
pub fn import_epub(
    name: &str,
    entries: Vec<ArchiveEntry>,
    store: &mut dyn OutputStore,
    reporter: &mut dyn ProgressReporter,
    converter: &dyn MarkdownConverter,
) -> Result<(), ImportError> {
    let result = Book::open(name, entries).and_then(|mut book| book.import(store, reporter, converter));
    if let Err(e) = &result {
        reporter.report_failed(name, &e.to_string());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, text: &str) -> ArchiveEntry {
        ArchiveEntry::new(path, text.as_bytes().to_vec())
    }

    fn opf(title: &str, manifest: &str, spine: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">{}</metadata>
  <manifest>{}</manifest>
  <spine>{}</spine>
</package>"#,
            title, manifest, spine
        )
    }

    fn page_item(id: &str, href: &str) -> String {
        format!(r#"<item id="{}" href="{}" media-type="application/xhtml+xml"/>"#, id, href)
    }

    #[test]
    fn test_registry_numbers_duplicates() {
        let mut registry = FilenameRegistry::new();
        let folder = vec!["OEBPS".to_string()];
        assert_eq!(registry.claim(&folder, "Intro", "md"), "Intro.md");
        assert_eq!(registry.claim(&folder, "intro", "md"), "intro (2).md");
        assert_eq!(registry.claim(&folder, "Intro", "md"), "Intro (3).md");
        assert_eq!(registry.claim(&[], "Intro", "md"), "Intro.md");
        assert!(registry.is_registered("oebps/INTRO.md"));
    }

    #[test]
    fn test_registry_rejects_collision() {
        let mut registry = FilenameRegistry::new();
        registry.register("a/B.png").unwrap();
        assert_eq!(
            registry.register("A/b.PNG"),
            Err(NameCollision("A/b.PNG".to_string()))
        );
    }

    #[test]
    fn test_missing_manifest() {
        let err = Book::open("book", vec![entry("mimetype", "application/epub+zip")]).unwrap_err();
        assert!(matches!(err, ImportError::MissingManifest));
    }

    #[test]
    fn test_titles_and_names_from_spine() {
        let manifest = [page_item("a", "a.xhtml"), page_item("b", "b.xhtml")].concat();
        let entries = vec![
            entry("content.opf", &opf("", &manifest, r#"<itemref idref="a"/><itemref idref="b"/>"#)),
            entry("a.xhtml", "<html><head><title>Same</title></head><body><p>A</p></body></html>"),
            entry("b.xhtml", "<html><head><title>Same</title></head><body><p>B</p></body></html>"),
        ];
        let book = Book::open("My Book", entries).unwrap();

        assert_eq!(book.state(), BookState::PagesParsed);
        assert_eq!(book.title(), "My Book");
        assert_eq!(book.landing().path(), "My Book.md");
        assert_eq!(book.page("a.xhtml").unwrap().output().path(), "Same.md");
        assert_eq!(book.page("b.xhtml").unwrap().output().path(), "Same (2).md");
        assert_eq!(book.toc().entries().len(), 2);
        assert_eq!(book.entry_count(), 3);
    }

    #[test]
    fn test_metadata_accessors() {
        let metadata = r#"<dc:title>Main</dc:title><dc:title>Subtitle</dc:title>
            <dc:creator>Ann</dc:creator><dc:publisher>Press</dc:publisher>
            <dc:subject>Science Fiction</dc:subject><dc:subject>Fiction &amp; Drama</dc:subject>
            <dc:description>&lt;p&gt;A &lt;b&gt;bold&lt;/b&gt; tale.&lt;/p&gt;</dc:description>"#;
        let entries = vec![entry("OPS/book.opf", &opf(metadata, "", ""))];
        let book = Book::open("file", entries).unwrap();

        assert_eq!(book.title(), "Main");
        assert_eq!(book.aliases(), ["Subtitle"]);
        assert_eq!(book.authors(), ["Ann"]);
        assert_eq!(book.publisher().as_deref(), Some("Press"));
        assert_eq!(book.tags(), ["Science-Fiction", "Fiction", "Drama"]);
        assert_eq!(book.description().as_deref(), Some("A bold tale."));
        assert_eq!(book.cover_image(), None);
    }

    #[test]
    fn test_cover_derived_from_cover_page() {
        let manifest = [
            page_item("cover", "Text/cover.xhtml"),
            r#"<item id="img" href="Images/c.jpg" media-type="image/jpeg"/>"#.to_string(),
        ]
        .concat();
        let entries = vec![
            entry("OEBPS/content.opf", &opf("<dc:title>T</dc:title>", &manifest, "")),
            entry(
                "OEBPS/Text/cover.xhtml",
                r#"<svg><image xlink:href="../Images/c.jpg"/></svg>"#,
            ),
            entry("OEBPS/Images/c.jpg", "jpg"),
        ];
        let book = Book::open("file", entries).unwrap();
        assert_eq!(book.cover_image(), Some("OEBPS/Images/c.jpg"));
    }
}
