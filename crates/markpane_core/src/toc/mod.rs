//! Table of contents for the rendered content.
//!
//! This module provides functionality to:
//! - Extract headings from the committed content tree, assigning unique ids
//! - Derive the nested heading outline
//! - Render the navigation markup (a single-select tree)
//! - Track the active heading while scrolling ([`ScrollSpy`])
//! - Drive keyboard navigation with a roving tab stop ([`TocNavigator`])

mod keyboard;
mod scroll_spy;

pub use self::keyboard::{NavAction, NavKey, TocNavigator};
pub use self::scroll_spy::{ActiveChange, ScrollSpy, DEFAULT_THRESHOLD};

use crate::dom::{escape_html, set_attribute, ContentTree};
use crate::render::NavSanitizer;
use crate::slug::Slugger;
use kuchikiki::iter::NodeIterator;
use kuchikiki::NodeRef;
use serde::Serialize;

const HEADING_SELECTOR: &str = "h1, h2, h3, h4, h5, h6";

/// Markup shown in place of the navigation when there are no headings.
pub const EMPTY_TOC: &str = r#"<div class="toc-empty">No headings found</div>"#;

/// A heading of the current render pass.
///
/// Entries are recreated on every pass; `node` must not be used once a new
/// pass has started.
#[derive(Debug, Clone, Serialize)]
pub struct HeadingEntry {
    pub id: String,
    /// Display text, trimmed, without checkbox inputs.
    pub text: String,
    /// 1 to 6.
    pub level: u8,
    #[serde(skip)]
    pub node: NodeRef,
}

fn heading_level(node: &NodeRef) -> Option<u8> {
    let element = node.as_element()?;
    match &*element.name.local {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Text of a heading, skipping the content of any `<input>`.
fn heading_text(node: &NodeRef) -> String {
    node.descendants()
        .text_nodes()
        .filter(|text| {
            !text
                .as_node()
                .ancestors()
                .take_while(|ancestor| ancestor != node)
                .any(|ancestor| {
                    ancestor
                        .as_element()
                        .map(|e| &*e.name.local == "input")
                        .unwrap_or(false)
                })
        })
        .map(|text| text.borrow().clone())
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Collect the headings of `tree` in document order and give each a fresh id
/// from `slugger`.
pub fn extract(tree: &ContentTree, slugger: &mut Slugger) -> Vec<HeadingEntry> {
    tree.select(HEADING_SELECTOR)
        .into_iter()
        .filter_map(|node| {
            let level = heading_level(&node)?;
            let text = heading_text(&node);
            let id = slugger.slug(&text);
            set_attribute(&node, "id", id.clone());
            Some(HeadingEntry {
                id,
                text,
                level,
                node,
            })
        })
        .collect()
}

/// A heading and the headings nested under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocNode {
    pub id: String,
    pub text: String,
    pub level: u8,
    pub children: Vec<TocNode>,
}

impl From<&HeadingEntry> for TocNode {
    fn from(entry: &HeadingEntry) -> Self {
        Self {
            id: entry.id.clone(),
            text: entry.text.clone(),
            level: entry.level,
            children: Vec::new(),
        }
    }
}

fn attach(node: TocNode, stack: &mut [TocNode], roots: &mut Vec<TocNode>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

/// Derive the heading outline with a stack of open levels.
///
/// A heading closes every open heading of the same or a deeper level before
/// it is opened, so `h2, h3, h2` yields two siblings, the first with one
/// child.
pub fn build_tree(entries: &[HeadingEntry]) -> Vec<TocNode> {
    let mut roots = Vec::new();
    let mut stack: Vec<TocNode> = Vec::new();

    for entry in entries {
        while stack.last().is_some_and(|top| top.level >= entry.level) {
            if let Some(closed) = stack.pop() {
                attach(closed, &mut stack, &mut roots);
            }
        }
        stack.push(TocNode::from(entry));
    }

    while let Some(closed) = stack.pop() {
        attach(closed, &mut stack, &mut roots);
    }

    roots
}

fn push_nodes(html: &mut String, nodes: &[TocNode], depth: usize, first: &mut bool) {
    for node in nodes {
        let tabindex = if std::mem::take(first) { 0 } else { -1 };
        let id = escape_html(&node.id);
        let text = escape_html(&node.text);
        html.push_str(&format!(
            "<li class=\"toc-item toc-level-{}\" role=\"treeitem\" aria-level=\"{depth}\" tabindex=\"{tabindex}\">\
             <a class=\"toc-link\" href=\"#{id}\" title=\"{text}\">{text}</a>",
            node.level
        ));
        if !node.children.is_empty() {
            html.push_str("<ul class=\"toc-group\" role=\"group\">");
            push_nodes(html, &node.children, depth + 1, first);
            html.push_str("</ul>");
        }
        html.push_str("</li>");
    }
}

/// Render the sanitized navigation markup for `entries`.
///
/// Exactly one item, the first, carries the tab stop.
pub fn render_nav(entries: &[HeadingEntry], sanitizer: &NavSanitizer) -> String {
    if entries.is_empty() {
        return EMPTY_TOC.to_string();
    }

    let mut html = String::from("<ul class=\"toc-list\" role=\"tree\">");
    push_nodes(&mut html, &build_tree(entries), 1, &mut true);
    html.push_str("</ul>");

    sanitizer.clean(&html)
}
