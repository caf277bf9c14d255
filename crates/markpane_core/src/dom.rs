//! The content tree rendered HTML is committed into.
//!
//! [`ContentTree`] plays the role of the viewer's content container. It is
//! exclusively owned by the render pipeline during a pass; everything else
//! reads it only between passes.

use kuchikiki::traits::TendrilSink;
use kuchikiki::NodeRef;

/// Escape text for safe inclusion in HTML element content or attribute values.
///
/// # Examples
///
/// ```
/// use markpane_core::dom::escape_html;
///
/// assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#039;");
/// ```
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Parse an HTML fragment and return its top-level nodes, detached.
fn parse_fragment(html: &str) -> Vec<NodeRef> {
    let document = kuchikiki::parse_html().one(html);
    match document.select_first("body") {
        Ok(body) => body.as_node().children().collect(),
        Err(()) => Vec::new(),
    }
}

/// Replace the children of `node` with the parsed `html`.
pub fn set_inner_html(node: &NodeRef, html: &str) {
    clear_children(node);
    for child in parse_fragment(html) {
        node.append(child);
    }
}

/// Replace the children of `node` with a single text node.
pub fn set_text(node: &NodeRef, text: &str) {
    clear_children(node);
    node.append(NodeRef::new_text(text));
}

/// Serialize the children of `node`.
pub fn inner_html(node: &NodeRef) -> String {
    node.children().map(|child| child.to_string()).collect()
}

fn clear_children(node: &NodeRef) {
    let children: Vec<NodeRef> = node.children().collect();
    for child in children {
        child.detach();
    }
}

/// Read an attribute of an element node.
pub fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attributes = element.attributes.borrow();
    attributes.get(name).map(String::from)
}

/// Set an attribute on an element node, ignoring non-element nodes.
pub fn set_attribute(node: &NodeRef, name: &str, value: impl Into<String>) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().insert(name, value.into());
    }
}

/// Check whether an element carries `class` among its class tokens.
pub fn has_class(node: &NodeRef, class: &str) -> bool {
    attribute(node, "class")
        .map(|classes| classes.split_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

/// Collect the nodes matching `selectors` under `root`, in document order.
///
/// Collecting first lets callers mutate or detach the matches safely.
pub fn select_all(root: &NodeRef, selectors: &str) -> Vec<NodeRef> {
    match root.select(selectors) {
        Ok(matches) => matches.map(|m| m.as_node().clone()).collect(),
        Err(()) => {
            tracing::warn!(selectors, "Invalid selector");
            Vec::new()
        }
    }
}

/// The viewer's content container.
#[derive(Clone)]
pub struct ContentTree {
    /// Keeps the owning document alive.
    _document: NodeRef,
    container: NodeRef,
}

impl std::fmt::Debug for ContentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentTree")
            .field("html", &self.inner_html())
            .finish()
    }
}

impl Default for ContentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentTree {
    /// Create an empty content container.
    pub fn new() -> Self {
        let document = kuchikiki::parse_html().one("");
        let container = document
            .select_first("body")
            .map(|body| body.as_node().clone())
            .unwrap_or_else(|()| document.clone());
        Self {
            _document: document,
            container,
        }
    }

    /// The container node itself.
    pub fn root(&self) -> &NodeRef {
        &self.container
    }

    /// Replace the previous content entirely with `html`.
    ///
    /// This is the single commit point of a render pass.
    pub fn commit(&self, html: &str) {
        set_inner_html(&self.container, html);
    }

    /// Remove every `<input>` that is not a checkbox and force `disabled` on
    /// the remaining checkboxes.
    ///
    /// Returns the number of inputs removed.
    pub fn harden_inputs(&self) -> usize {
        let mut removed = 0;
        for input in select_all(&self.container, "input") {
            let is_checkbox = attribute(&input, "type")
                .map(|t| t.trim().eq_ignore_ascii_case("checkbox"))
                .unwrap_or(false);
            if is_checkbox {
                set_attribute(&input, "disabled", "");
            } else {
                input.detach();
                removed += 1;
            }
        }
        removed
    }

    /// Replace the content with a visible error message.
    pub fn show_error(&self, message: &str) {
        self.commit(&format!(
            "<div class=\"error-message\">{}</div>",
            escape_html(message)
        ));
    }

    /// Serialized content of the container.
    pub fn inner_html(&self) -> String {
        inner_html(&self.container)
    }

    /// Concatenated text of the container.
    pub fn text_contents(&self) -> String {
        self.container.text_contents()
    }

    pub fn select(&self, selectors: &str) -> Vec<NodeRef> {
        select_all(&self.container, selectors)
    }
}
