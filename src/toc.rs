//! Book navigation: the table of contents note and the landing note.

use anyhow::Result;
use kuchikiki::NodeRef;
use roxmltree::{Document, Node};

use crate::asset::{AssetInfo, AssetLocation, ImportTarget};
use crate::html::{self, attribute, tag_name};
use crate::links::{decode_href_path, resolve_path, split_href};
use crate::metadata::{format_frontmatter, FrontMatter};
use crate::package::{folder_of, xml_options};

pub const TOC_FILENAME: &str = "Table of Contents.md";

const INDENT_WIDTH: usize = 4;

/// One node of the navigation tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavPoint {
    pub label: String,
    /// Book-relative path of the target, if the point links anywhere.
    pub path: Option<String>,
    pub fragment: Option<String>,
    pub children: Vec<NavPoint>,
}

impl NavPoint {
    fn from_href(label: String, href: Option<&str>, folder: &[String]) -> Self {
        let (path, fragment) = match href {
            Some(href) => {
                let (path, fragment) = split_href(href);
                (
                    Some(resolve_path(folder, &decode_href_path(path))),
                    fragment.map(str::to_string),
                )
            }
            None => (None, None),
        };
        Self {
            label,
            path,
            fragment,
            children: Vec::new(),
        }
    }
}

/// Flattened navigation line: nesting depth, book-relative output link, text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub depth: usize,
    pub link: Option<String>,
    pub text: String,
}

/// Where the navigation tree came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavSource {
    Ncx,
    NavDocument,
    Spine,
}

/// Page lookups the navigation needs from the book.
pub trait NavTargets {
    fn offer_title(&mut self, path: &str, label: &str);
    /// Book-relative output link of the page at `path`, anchored at `fragment` when it resolves.
    fn output_link(&mut self, path: &str, fragment: Option<&str>) -> Option<String>;
    fn title(&self, path: &str) -> Option<String>;
}

#[derive(Debug)]
pub struct TocAsset {
    source: NavSource,
    info: Option<AssetInfo>,
    points: Vec<NavPoint>,
    entries: Vec<NavEntry>,
    output: AssetLocation,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn ncx_children<'a, 'input>(node: Node<'a, 'input>, name: &'a str) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |child| child.is_element() && child.tag_name().name() == name)
}

fn ncx_point(node: Node, folder: &[String]) -> NavPoint {
    let label = ncx_children(node, "navLabel")
        .next()
        .and_then(|label| ncx_children(label, "text").next())
        .and_then(|text| text.text())
        .map(collapse_whitespace)
        .unwrap_or_default();
    let src = ncx_children(node, "content")
        .next()
        .and_then(|content| content.attribute("src"));

    let mut point = NavPoint::from_href(label, src, folder);
    point.children = ncx_children(node, "navPoint")
        .map(|child| ncx_point(child, folder))
        .collect();
    point
}

fn is_list(node: &NodeRef) -> bool {
    matches!(tag_name(node), Some("ol") | Some("ul"))
}

fn nav_list(list: &NodeRef, folder: &[String]) -> Vec<NavPoint> {
    list.children()
        .filter(|child| tag_name(child) == Some("li"))
        .map(|item| {
            let link = item
                .children()
                .find(|child| matches!(tag_name(child), Some("a") | Some("span")));
            let label = link
                .as_ref()
                .map(|link| collapse_whitespace(&link.text_contents()))
                .unwrap_or_default();
            let href = link.as_ref().and_then(|link| attribute(link, "href"));

            let mut point = NavPoint::from_href(label, href.as_deref(), folder);
            point.children = item
                .children()
                .find(is_list)
                .map(|sublist| nav_list(&sublist, folder))
                .unwrap_or_default();
            point
        })
        .collect()
}

fn flatten_into(points: &[NavPoint], depth: usize, out: &mut Vec<(usize, NavPoint)>) {
    for point in points {
        out.push((depth, point.clone()));
        flatten_into(&point.children, depth + 1, out);
    }
}

/// Label text safe inside `[[target|label]]`.
fn escape_label(text: &str) -> String {
    text.replace('[', "［").replace(']', "］").replace('|', "∣")
}

/// Wiki-link target for a book-relative output link.
fn wiki_target(link: &str) -> String {
    let (path, fragment) = split_href(link);
    let path = path.strip_suffix(".md").unwrap_or(path).to_string();
    match fragment {
        Some(fragment) => format!("{}#{}", path, fragment),
        None => path,
    }
}

impl TocAsset {
    fn new(source: NavSource, info: Option<AssetInfo>, folder: Vec<String>, points: Vec<NavPoint>) -> Self {
        Self {
            source,
            info,
            points,
            entries: Vec::new(),
            output: AssetLocation::new(folder, TOC_FILENAME),
        }
    }

    /// Navigation from an NCX file.
    pub fn from_ncx(info: AssetInfo, text: &str) -> Result<Self, roxmltree::Error> {
        let doc = Document::parse_with_options(text, xml_options())?;
        let folder = info.source.folder().to_vec();

        let points = doc
            .descendants()
            .find(|node| node.is_element() && node.tag_name().name() == "navMap")
            .map(|nav_map| {
                ncx_children(nav_map, "navPoint")
                    .map(|point| ncx_point(point, &folder))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self::new(NavSource::Ncx, Some(info), folder, points))
    }

    /// Navigation from an EPUB 3 navigation document: the `toc` nav, else the first nav.
    pub fn from_nav_document(info: AssetInfo, text: &str) -> Self {
        let document = html::parse_document(text);
        let folder = info.source.folder().to_vec();

        let navs: Vec<NodeRef> = document
            .inclusive_descendants()
            .filter(|node| tag_name(node) == Some("nav"))
            .collect();
        let toc_nav = navs
            .iter()
            .find(|nav| {
                attribute(nav, "epub:type")
                    .is_some_and(|types| types.split_whitespace().any(|t| t == "toc"))
            })
            .or_else(|| navs.first());

        let points = toc_nav
            .and_then(|nav| nav.descendants().find(is_list))
            .map(|list| nav_list(&list, &folder))
            .unwrap_or_default();

        Self::new(NavSource::NavDocument, Some(info), folder, points)
    }

    /// One unlabeled entry per spine page; labels come from page titles.
    pub fn from_spine(package_path: &str, spine: &[String]) -> Self {
        let points = spine
            .iter()
            .map(|path| NavPoint {
                path: Some(path.clone()),
                ..NavPoint::default()
            })
            .collect();
        Self::new(NavSource::Spine, None, folder_of(package_path), points)
    }

    pub fn source(&self) -> NavSource {
        self.source
    }

    /// The archive entry the navigation was read from, if any.
    pub fn info(&self) -> Option<&AssetInfo> {
        self.info.as_ref()
    }

    pub fn points(&self) -> &[NavPoint] {
        &self.points
    }

    pub fn entries(&self) -> &[NavEntry] {
        &self.entries
    }

    pub fn output(&self) -> &AssetLocation {
        &self.output
    }

    pub fn set_output_filename(&mut self, filename: &str) {
        self.output = self.output.with_filename(filename);
    }

    fn flattened(&self) -> Vec<(usize, NavPoint)> {
        let mut out = Vec::new();
        flatten_into(&self.points, 0, &mut out);
        out
    }

    /// Offer every label to its page, in pre-order.
    pub fn assign_titles(&self, targets: &mut dyn NavTargets) {
        for (_, point) in self.flattened() {
            if let Some(path) = &point.path {
                targets.offer_title(path, &point.label);
            }
        }
    }

    /// Flatten the tree into entries with resolved output links.
    pub fn resolve(&mut self, targets: &mut dyn NavTargets) {
        self.entries = self
            .flattened()
            .into_iter()
            .map(|(depth, point)| {
                let link = point
                    .path
                    .as_deref()
                    .and_then(|path| targets.output_link(path, point.fragment.as_deref()));
                let text = if point.label.is_empty() {
                    point
                        .path
                        .as_deref()
                        .and_then(|path| targets.title(path))
                        .unwrap_or_default()
                } else {
                    point.label
                };
                NavEntry { depth, link, text }
            })
            .filter(|entry| entry.link.is_some() || !entry.text.is_empty())
            .collect();
    }

    /// Indented list of wiki links, one per entry.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let indent = " ".repeat(entry.depth * INDENT_WIDTH);
                let text = escape_label(&entry.text);
                match &entry.link {
                    Some(link) if text.is_empty() => format!("{}- [[{}]]\n", indent, wiki_target(link)),
                    Some(link) => format!("{}- [[{}|{}]]\n", indent, wiki_target(link), text),
                    None => format!("{}- {}\n", indent, text),
                }
            })
            .collect()
    }

    pub fn import(&self, target: &mut ImportTarget) -> Result<()> {
        let markdown = self.render();
        target.write_text(&self.output, &markdown)
    }
}

/// Landing note: frontmatter, description callout and an embed of the TOC note.
pub fn render_landing(frontmatter: &FrontMatter, description: Option<&str>, toc: &AssetLocation) -> String {
    let mut out = format_frontmatter(frontmatter);
    out.push('\n');

    if let Some(description) = description.map(str::trim).filter(|d| !d.is_empty()) {
        out.push_str("> [!abstract] Description\n");
        for line in description.lines() {
            out.push_str("> ");
            out.push_str(line.trim());
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str(&format!("![[{}]]\n", wiki_target(&toc.path())));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>Part  One</text></navLabel>
      <content src="Text/part1.xhtml"/>
      <navPoint id="n2" playOrder="2">
        <navLabel><text>Chapter 1</text></navLabel>
        <content src="Text/ch1.xhtml#start"/>
      </navPoint>
    </navPoint>
    <navPoint id="n3" playOrder="3">
      <navLabel><text>Notes [A|B]</text></navLabel>
      <content src="Text/Notes%201.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

    /// Pages keyed by source path, with their output path and title.
    struct Pages {
        pages: HashMap<String, (String, String)>,
        offered: Vec<(String, String)>,
    }

    impl Pages {
        fn new(pages: &[(&str, &str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(source, output, title)| {
                        (source.to_string(), (output.to_string(), title.to_string()))
                    })
                    .collect(),
                offered: Vec::new(),
            }
        }
    }

    impl NavTargets for Pages {
        fn offer_title(&mut self, path: &str, label: &str) {
            self.offered.push((path.to_string(), label.to_string()));
        }

        fn output_link(&mut self, path: &str, fragment: Option<&str>) -> Option<String> {
            let (output, _) = self.pages.get(path)?;
            Some(match fragment {
                Some(id) => format!("{}#^{}", output, id),
                None => output.clone(),
            })
        }

        fn title(&self, path: &str) -> Option<String> {
            self.pages.get(path).map(|(_, title)| title.clone())
        }
    }

    #[test]
    fn test_ncx_tree() {
        let toc = TocAsset::from_ncx(AssetInfo::new("OEBPS/toc.ncx", "application/x-dtbncx+xml"), NCX).unwrap();
        assert_eq!(toc.source(), NavSource::Ncx);
        assert_eq!(toc.output().path(), "OEBPS/Table of Contents.md");

        let points = toc.points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].label, "Part One");
        assert_eq!(points[0].path.as_deref(), Some("OEBPS/Text/part1.xhtml"));
        assert_eq!(points[0].children[0].fragment.as_deref(), Some("start"));
        assert_eq!(points[1].path.as_deref(), Some("OEBPS/Text/Notes 1.xhtml"));
    }

    #[test]
    fn test_titles_offered_in_preorder() {
        let toc = TocAsset::from_ncx(AssetInfo::new("toc.ncx", "application/x-dtbncx+xml"), NCX).unwrap();
        let mut pages = Pages::new(&[]);
        toc.assign_titles(&mut pages);
        let labels: Vec<&str> = pages.offered.iter().map(|(_, label)| label.as_str()).collect();
        assert_eq!(labels, ["Part One", "Chapter 1", "Notes [A|B]"]);
    }

    #[test]
    fn test_resolve_and_render() {
        let mut toc = TocAsset::from_ncx(AssetInfo::new("OEBPS/toc.ncx", "application/x-dtbncx+xml"), NCX).unwrap();
        let mut pages = Pages::new(&[
            ("OEBPS/Text/part1.xhtml", "OEBPS/Text/Part One.md", "Part One"),
            ("OEBPS/Text/ch1.xhtml", "OEBPS/Text/Chapter 1.md", "Chapter 1"),
        ]);
        toc.resolve(&mut pages);

        assert_eq!(
            toc.entries()[1],
            NavEntry {
                depth: 1,
                link: Some("OEBPS/Text/Chapter 1.md#^start".to_string()),
                text: "Chapter 1".to_string(),
            }
        );
        assert_eq!(
            toc.render(),
            concat!(
                "- [[OEBPS/Text/Part One|Part One]]\n",
                "    - [[OEBPS/Text/Chapter 1#^start|Chapter 1]]\n",
                "- Notes ［A∣B］\n",
            )
        );
    }

    #[test]
    fn test_nav_document() {
        let nav = r##"<html xmlns:epub="http://www.idpf.org/2007/ops"><body>
            <nav epub:type="landmarks"><ol><li><a href="cover.xhtml">Cover</a></li></ol></nav>
            <nav epub:type="toc" id="toc"><h1>Contents</h1><ol>
              <li><a href="ch1.xhtml">One</a>
                <ol><li><a href="ch1.xhtml#s1">One.1</a></li></ol>
              </li>
              <li><span>Appendix</span></li>
            </ol></nav></body></html>"##;
        let toc = TocAsset::from_nav_document(AssetInfo::new("OPS/nav.xhtml", "application/xhtml+xml"), nav);
        assert_eq!(toc.source(), NavSource::NavDocument);

        let points = toc.points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].label, "One");
        assert_eq!(points[0].path.as_deref(), Some("OPS/ch1.xhtml"));
        assert_eq!(points[0].children[0].fragment.as_deref(), Some("s1"));
        assert_eq!(points[1].label, "Appendix");
        assert_eq!(points[1].path, None);
    }

    #[test]
    fn test_spine_uses_page_titles() {
        let spine = vec!["OEBPS/a.xhtml".to_string(), "OEBPS/b.xhtml".to_string()];
        let mut toc = TocAsset::from_spine("OEBPS/content.opf", &spine);
        let mut pages = Pages::new(&[
            ("OEBPS/a.xhtml", "OEBPS/Alpha.md", "Alpha"),
            ("OEBPS/b.xhtml", "OEBPS/Beta.md", "Beta"),
        ]);
        toc.assign_titles(&mut pages);
        assert!(pages.offered.iter().all(|(_, label)| label.is_empty()));

        toc.resolve(&mut pages);
        assert_eq!(toc.render(), "- [[OEBPS/Alpha|Alpha]]\n- [[OEBPS/Beta|Beta]]\n");
        assert_eq!(toc.output().path(), "OEBPS/Table of Contents.md");
    }

    #[test]
    fn test_landing_note() {
        let fm = FrontMatter {
            title: "Book".to_string(),
            ..FrontMatter::default()
        };
        let toc = AssetLocation::from_path("OEBPS/Table of Contents.md");
        let landing = render_landing(&fm, Some("First line.\nSecond."), &toc);
        assert_eq!(
            landing,
            concat!(
                "---\ntitle: \"Book\"\n---\n\n",
                "> [!abstract] Description\n> First line.\n> Second.\n\n",
                "![[OEBPS/Table of Contents]]\n",
            )
        );

        let bare = render_landing(&fm, None, &toc);
        assert!(!bare.contains("[!abstract]"));
    }
}
