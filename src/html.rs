//! In-place DOM passes that prepare book pages for Markdown conversion.
//!
//! None of these touch storage. Every pass collects its targets before
//! mutating, because kuchikiki iterators walk the live tree.

use kuchikiki::traits::*;
use kuchikiki::{ElementData, NodeRef};
use tracing::warn;

use crate::markdown::{clean_markdown, MarkdownConverter};
use crate::markers::{self, ANCHOR_ATTR};

/// Parse a page as HTML (not XML), the way the converter expects it.
pub fn parse_document(html: &str) -> NodeRef {
    kuchikiki::parse_html().one(html)
}

pub(crate) fn tag_name(node: &NodeRef) -> Option<&str> {
    node.as_element().map(|el| &*el.name.local)
}

fn is_tag(node: &NodeRef, tag: &str) -> bool {
    tag_name(node).is_some_and(|name| name.eq_ignore_ascii_case(tag))
}

fn is_blank_text(node: &NodeRef) -> bool {
    node.as_text()
        .is_some_and(|text| text.borrow().trim().is_empty())
}

fn elements_named(root: &NodeRef, tag: &str) -> Vec<NodeRef> {
    root.inclusive_descendants()
        .filter(|node| is_tag(node, tag))
        .collect()
}

pub(crate) fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|el| el.attributes.borrow().get(name).map(str::to_string))
}

pub(crate) fn set_attribute(node: &NodeRef, name: &str, value: &str) {
    if let Some(el) = node.as_element() {
        el.attributes.borrow_mut().insert(name, value.to_string());
    }
}

fn has_class(node: &NodeRef, class: &str) -> bool {
    attribute(node, "class").is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
}

fn remove_class(node: &NodeRef, class: &str) {
    let Some(el) = node.as_element() else {
        return;
    };
    let mut attributes = el.attributes.borrow_mut();
    let remaining = attributes
        .get("class")
        .map(|classes| {
            classes
                .split_whitespace()
                .filter(|c| *c != class)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    if remaining.is_empty() {
        attributes.remove("class");
    } else {
        attributes.insert("class", remaining);
    }
}

/// Create a detached HTML element in the same namespace as `like`.
pub(crate) fn create_element(like: &ElementData, tag: &str) -> NodeRef {
    let mut name = like.name.clone();
    name.local = tag.into();
    NodeRef::new_element(name, None)
}

fn move_children(from: &NodeRef, to: &NodeRef) {
    for child in from.children().collect::<Vec<_>>() {
        to.append(child);
    }
}

/// Every `<a href>` in document order.
pub fn hyperlinks(root: &NodeRef) -> Vec<NodeRef> {
    elements_named(root, "a")
        .into_iter()
        .filter(|link| attribute(link, "href").is_some())
        .collect()
}

/// Text of the document's `<title>`, if it has any.
pub fn document_title(document: &NodeRef) -> Option<String> {
    let title = document.select_first("title").ok()?;
    let text = title.text_contents();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Plain text of an HTML fragment with whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    parse_document(html)
        .text_contents()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Source of the first image on a page: `<img src>` first, then SVG `<image href>`.
pub fn first_image_source(document: &NodeRef) -> Option<String> {
    let img = elements_named(document, "img")
        .into_iter()
        .find_map(|node| attribute(&node, "src"));
    if img.is_some() {
        return img;
    }

    // SVG links are usually `xlink:href`, which lives outside the null namespace.
    elements_named(document, "image").into_iter().find_map(|node| {
        let el = node.as_element()?;
        let attributes = el.attributes.borrow();
        let href = attributes
            .map
            .iter()
            .find(|(name, _)| &*name.local == "href")
            .map(|(_, attr)| attr.value.clone());
        href
    })
}

/// Make every `<pre>` start with a `<code>` child.
///
/// The converter only emits a fenced block for `pre > code`.
pub fn normalize_code_blocks(root: &NodeRef) {
    for pre in elements_named(root, "pre") {
        while let Some(first) = pre.first_child() {
            if !is_blank_text(&first) {
                break;
            }
            first.detach();
        }

        if pre.first_child().is_some_and(|first| is_tag(&first, "code")) {
            continue;
        }
        let Some(pre_el) = pre.as_element() else {
            continue;
        };
        let code = create_element(pre_el, "code");
        move_children(&pre, &code);
        pre.append(code);
    }
}

/// Move each table caption to the front of its table and force a break after it.
pub fn hoist_table_captions(root: &NodeRef) {
    for table in elements_named(root, "table") {
        let Some(caption) = table.children().find(|child| is_tag(child, "caption")) else {
            continue;
        };
        if table.first_child().as_ref() != Some(&caption) {
            table.prepend(caption.clone());
        }
        caption.append(NodeRef::new_text(markers::newline_token()));
    }
}

/// Rewrite `.mermaid` diagrams as `pre > code.language-mermaid`.
pub fn normalize_mermaid(root: &NodeRef) {
    let diagrams: Vec<NodeRef> = root
        .inclusive_descendants()
        .filter(|node| has_class(node, "mermaid"))
        .collect();

    for diagram in diagrams {
        let Some(el) = diagram.as_element() else {
            continue;
        };

        if is_tag(&diagram, "code") {
            remove_class(&diagram, "mermaid");
            set_attribute(&diagram, "class", "language-mermaid");
            let wrapped = diagram.parent().is_some_and(|parent| is_tag(&parent, "pre"));
            if !wrapped {
                let pre = create_element(el, "pre");
                diagram.insert_before(pre.clone());
                pre.append(diagram.clone());
            }
        } else if is_tag(&diagram, "pre") {
            remove_class(&diagram, "mermaid");
            let first_code = diagram
                .children()
                .find(|child| child.as_element().is_some())
                .filter(|child| is_tag(child, "code"));
            let code = match first_code {
                Some(code) => code,
                None => {
                    let code = create_element(el, "code");
                    move_children(&diagram, &code);
                    diagram.append(code.clone());
                    code
                }
            };
            set_attribute(&code, "class", "language-mermaid");
        } else {
            let pre = create_element(el, "pre");
            let code = create_element(el, "code");
            set_attribute(&code, "class", "language-mermaid");
            code.append(NodeRef::new_text(diagram.text_contents()));
            pre.append(code);
            diagram.insert_before(pre);
            diagram.detach();
        }
    }
}

/// Turn each table caption into a paragraph just before its table.
///
/// The converter drops `<caption>`; a paragraph keeps the text and its break.
pub fn lift_table_captions(root: &NodeRef) {
    for table in elements_named(root, "table") {
        let Some(caption) = table.children().find(|child| is_tag(child, "caption")) else {
            continue;
        };
        let Some(el) = caption.as_element() else {
            continue;
        };
        let paragraph = create_element(el, "p");
        move_children(&caption, &paragraph);
        table.insert_before(paragraph);
        caption.detach();
    }
}

/// Re-escape angle brackets in prose so the converter keeps them as text.
///
/// Code is left alone: Markdown shows code verbatim.
pub fn escape_angle_brackets(root: &NodeRef) {
    for node in root.inclusive_descendants() {
        let Some(text) = node.as_text() else {
            continue;
        };
        if !text.borrow().contains(&['<', '>'][..]) || in_code(&node) {
            continue;
        }
        let escaped = text.borrow().replace('<', "&lt;").replace('>', "&gt;");
        *text.borrow_mut() = escaped;
    }
}

fn in_code(node: &NodeRef) -> bool {
    node.ancestors()
        .any(|ancestor| ["pre", "code", "script", "style"].iter().any(|tag| is_tag(&ancestor, tag)))
}

/// Replace `<nav>` wrappers with plain `<section>`s, keeping their ids.
pub fn flatten_nav(root: &NodeRef) {
    for nav in elements_named(root, "nav") {
        let Some(el) = nav.as_element() else {
            continue;
        };
        let section = create_element(el, "section");
        if let Some(id) = attribute(&nav, "id") {
            set_attribute(&section, "id", &id);
        }
        move_children(&nav, &section);
        nav.insert_before(section);
        nav.detach();
    }
}

/// Locate the element a fragment id points at.
///
/// Ids that break CSS id selectors fall back to comparing the attribute
/// directly, then to legacy `<a name>` anchors.
pub fn find_element_by_id(root: &NodeRef, id: &str) -> Option<NodeRef> {
    if let Ok(found) = root.select_first(&format!("#{}", id)) {
        let node = found.as_node().clone();
        if attribute(&node, "id").as_deref() == Some(id) {
            return Some(node);
        }
    }

    root.inclusive_descendants()
        .find(|node| attribute(node, "id").as_deref() == Some(id))
        .or_else(|| {
            root.inclusive_descendants()
                .find(|node| is_tag(node, "a") && attribute(node, "name").as_deref() == Some(id))
        })
}

/// Where a link-target marker goes relative to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkStrategy {
    /// Last child of the block; the block renders inline content.
    Append,
    /// Sibling right after the block.
    InsertAfter,
    /// Container without a Markdown form; look inside for a block.
    Descend,
}

pub fn mark_strategy(tag: &str) -> Option<MarkStrategy> {
    match tag.to_ascii_lowercase().as_str() {
        "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "td" | "th" | "dt" | "dd"
        | "figcaption" => Some(MarkStrategy::Append),
        "table" | "blockquote" | "pre" | "hr" => Some(MarkStrategy::InsertAfter),
        "div" | "section" | "article" | "aside" | "header" | "footer" | "main" | "nav"
        | "figure" | "ul" | "ol" | "dl" => Some(MarkStrategy::Descend),
        _ => None,
    }
}

fn is_marker(node: &NodeRef) -> bool {
    attribute(node, ANCHOR_ATTR).is_some()
}

fn node_strategy(node: &NodeRef) -> Option<MarkStrategy> {
    tag_name(node).and_then(mark_strategy)
}

/// The block a marker for `element` should be attached to.
///
/// Returns `None` when the climb reaches `<body>`: the whole page is the target.
/// A container reached from below is not searched: the block comes from the
/// target's own subtree, else the marker follows the container's child that
/// holds the target.
pub fn find_markable_block(element: &NodeRef) -> Option<(NodeRef, MarkStrategy)> {
    let mut below = element.clone();
    for node in element.inclusive_ancestors() {
        let tag = tag_name(&node)?;
        if tag.eq_ignore_ascii_case("body") || tag.eq_ignore_ascii_case("html") {
            return None;
        }
        match mark_strategy(tag) {
            Some(MarkStrategy::Descend) if node == *element => return Some(descend(&node, &node)),
            Some(MarkStrategy::Descend) => return Some(descend(element, &below)),
            Some(strategy) => return Some((node, strategy)),
            None => {}
        }
        below = node;
    }
    None
}

fn descend(root: &NodeRef, fallback: &NodeRef) -> (NodeRef, MarkStrategy) {
    root.descendants()
        .filter(|node| !is_marker(node))
        .find_map(|node| match node_strategy(&node) {
            Some(MarkStrategy::Descend) | None => None,
            Some(strategy) => Some((node, strategy)),
        })
        .unwrap_or_else(|| (fallback.clone(), MarkStrategy::InsertAfter))
}

/// Element that receives an appended marker.
///
/// A block whose content starts with a paragraph-like child hands the marker
/// down to that child.
fn append_carrier(block: &NodeRef) -> NodeRef {
    let mut carrier = block.clone();
    loop {
        let first = carrier.children().find(|child| !is_blank_text(child));
        match first {
            Some(child) if !is_marker(&child) && node_strategy(&child) == Some(MarkStrategy::Append) => {
                carrier = child;
            }
            _ => return carrier,
        }
    }
}

fn first_block_child(carrier: &NodeRef) -> Option<NodeRef> {
    carrier
        .children()
        .find(|child| !is_marker(child) && node_strategy(child).is_some())
}

/// Anchor id of a marker already attached to `block`, if any.
pub fn existing_marker(block: &NodeRef, strategy: MarkStrategy) -> Option<String> {
    match strategy {
        MarkStrategy::Append => append_carrier(block)
            .children()
            .find(is_marker)
            .and_then(|marker| attribute(&marker, ANCHOR_ATTR)),
        _ => {
            let mut sibling = block.next_sibling();
            while let Some(node) = sibling {
                if !is_blank_text(&node) {
                    return attribute(&node, ANCHOR_ATTR);
                }
                sibling = node.next_sibling();
            }
            None
        }
    }
}

fn insert_marker(block: &NodeRef, strategy: MarkStrategy, anchor_id: &str) {
    let Some(el) = block.as_element() else {
        return;
    };
    let code = create_element(el, "code");
    set_attribute(&code, ANCHOR_ATTR, anchor_id);
    code.append(NodeRef::new_text(markers::anchor_token(anchor_id)));

    match strategy {
        MarkStrategy::Append => {
            let carrier = append_carrier(block);
            match first_block_child(&carrier) {
                Some(nested) => nested.insert_before(code),
                None => carrier.append(code),
            }
        }
        _ => {
            let paragraph = create_element(el, "p");
            set_attribute(&paragraph, ANCHOR_ATTR, anchor_id);
            paragraph.append(code);
            block.insert_after(paragraph);
        }
    }
}

/// Attach a link-target marker for `element` and return the anchor id in use.
///
/// A marker already on the chosen block is reused; otherwise `mint` supplies
/// the id. Returns `None` when no block below `<body>` can carry an anchor.
pub fn mark_link_target(element: &NodeRef, mint: impl FnOnce() -> String) -> Option<String> {
    let (block, strategy) = find_markable_block(element)?;
    if let Some(existing) = existing_marker(&block, strategy) {
        return Some(existing);
    }
    let anchor_id = mint();
    insert_marker(&block, strategy, &anchor_id);
    Some(anchor_id)
}

/// Escape square brackets in the text below `node` so they survive as link text.
pub fn escape_link_brackets(node: &NodeRef) {
    for descendant in node.inclusive_descendants() {
        if let Some(text) = descendant.as_text() {
            let escaped = markers::escape_link_text(&text.borrow());
            *text.borrow_mut() = escaped;
        }
    }
}

/// Run the converter over the document body and resolve every marker.
pub fn convert_to_markdown(document: &NodeRef, converter: &dyn MarkdownConverter) -> String {
    lift_table_captions(document);
    let body = document
        .select_first("body")
        .map(|body| body.as_node().clone())
        .unwrap_or_else(|_| document.clone());

    let converted = converter.convert(&body.to_string());
    let decoded = markers::decode(&converted);
    if markers::has_leftover(&decoded) {
        warn!("unresolved placeholder left in converted markdown");
    }
    clean_markdown(&decoded)
}
