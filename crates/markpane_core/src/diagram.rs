//! Diagram rendering boundary.
//!
//! `mermaid` fenced blocks become `<div class="mermaid">` containers holding
//! the escaped source. After the content is committed, each container is
//! handed to a [`DiagramRenderer`] and replaced by the resulting SVG or by an
//! inline error. A failing block never affects its siblings.

use crate::dom::{attribute, escape_html, set_attribute, set_inner_html, set_text, ContentTree};
use crate::render::{DiagramSanitizer, FenceHook};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Fence language routed to the diagram renderer.
pub const DIAGRAM_LANGUAGE: &str = "mermaid";

/// Selector of diagram containers in the content tree.
pub const DIAGRAM_SELECTOR: &str = "div.mermaid";

/// Attribute holding the untouched diagram source for re-rendering.
pub const DATA_ORIGINAL: &str = "data-original";

#[derive(Debug, thiserror::Error)]
pub enum DiagramError {
    /// The diagram source could not be parsed.
    #[error("{0}")]
    Syntax(String),

    /// The renderer itself could not run.
    #[error("renderer unavailable: {0}")]
    Unavailable(String),
}

/// Flowchart layout options passed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowchartConfig {
    pub default_renderer: &'static str,
    pub html_labels: bool,
    pub node_spacing: u32,
    pub rank_spacing: u32,
    pub padding: u32,
}

/// Engine configuration derived from the active color scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramTheme {
    pub start_on_load: bool,
    pub theme: &'static str,
    pub security_level: &'static str,
    pub flowchart: FlowchartConfig,
}

impl DiagramTheme {
    /// `dark` for dark mode, `neutral` otherwise.
    pub fn new(dark: bool) -> Self {
        Self {
            start_on_load: false,
            theme: if dark { "dark" } else { "neutral" },
            security_level: "strict",
            flowchart: FlowchartConfig {
                default_renderer: "elk",
                html_labels: true,
                node_spacing: 50,
                rank_spacing: 50,
                padding: 15,
            },
        }
    }

    pub fn is_dark(&self) -> bool {
        self.theme == "dark"
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// External diagram engine.
///
/// Rendering is the only asynchronous step of a render pass.
#[async_trait(?Send)]
pub trait DiagramRenderer {
    /// (Re)configure the engine, e.g. after a theme switch.
    fn initialize(&self, theme: &DiagramTheme);

    /// Render one diagram to SVG markup.
    async fn render_one(&self, id: &str, source: &str) -> Result<String, DiagramError>;
}

/// Renderer that leaves every container showing its source text.
#[derive(Debug, Default)]
pub struct SourceOnlyRenderer;

#[async_trait(?Send)]
impl DiagramRenderer for SourceOnlyRenderer {
    fn initialize(&self, _theme: &DiagramTheme) {}

    async fn render_one(&self, _id: &str, source: &str) -> Result<String, DiagramError> {
        Ok(format!("<pre>{}</pre>", escape_html(source)))
    }
}

/// Diverts `mermaid` fenced blocks into diagram containers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiagramFenceHook;

impl FenceHook for DiagramFenceHook {
    fn render_fence(&self, language: &str, content: &str) -> Option<String> {
        (language == DIAGRAM_LANGUAGE)
            .then(|| format!("<div class=\"mermaid\">{}</div>\n", escape_html(content)))
    }
}

static LABEL_WITH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[([^\]]*<br\s*/?>.*?)\]").expect("valid regex"));
static BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));

/// Rewrite `<br>` breaks inside node labels into the engine's markdown string
/// syntax, which it measures correctly.
///
/// # Example
///
/// ```
/// use markpane_core::diagram::fix_label_line_breaks;
///
/// assert_eq!(
///     fix_label_line_breaks("A[one<br/>two] --> B[plain]"),
///     "A[\"`one\ntwo`\"] --> B[plain]"
/// );
/// ```
pub fn fix_label_line_breaks(source: &str) -> String {
    LABEL_WITH_BREAK
        .replace_all(source, |caps: &regex::Captures| {
            let converted = BREAK.replace_all(&caps[1], "\n");
            format!("[\"`{converted}`\"]")
        })
        .into_owned()
}

/// Where each container's source is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramSource {
    /// Freshly committed content: the container text.
    Content,
    /// Re-render: the `data-original` attribute stored by the first render.
    Original,
}

/// Outcome of rendering every diagram container once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagramSummary {
    pub rendered: usize,
    pub failed: usize,
}

/// Render every diagram container in `tree`, isolating failures per block.
///
/// Renderer output goes through `sanitizer` before it enters the tree. Ids are `markpane-diagram-{pass}-{index}`, reproducible for identical
/// content.
pub async fn render_diagrams(
    tree: &ContentTree,
    renderer: &dyn DiagramRenderer,
    sanitizer: &DiagramSanitizer,
    pass: u64,
    source_kind: DiagramSource,
) -> DiagramSummary {
    let mut summary = DiagramSummary::default();

    for (index, container) in tree.select(DIAGRAM_SELECTOR).into_iter().enumerate() {
        let raw = match source_kind {
            DiagramSource::Original => match attribute(&container, DATA_ORIGINAL) {
                Some(original) => {
                    set_text(&container, &original);
                    original
                }
                None => container.text_contents(),
            },
            DiagramSource::Content => container.text_contents(),
        };
        set_attribute(&container, DATA_ORIGINAL, raw.clone());

        let id = format!("markpane-diagram-{pass}-{index}");
        match renderer.render_one(&id, &fix_label_line_breaks(&raw)).await {
            Ok(svg) => {
                set_inner_html(&container, &sanitizer.clean(&svg));
                summary.rendered += 1;
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "Diagram failed to render");
                set_inner_html(
                    &container,
                    &format!(
                        "<div class=\"mermaid-error\">Diagram error: {}</div>",
                        escape_html(&err.to_string())
                    ),
                );
                summary.failed += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Fails on sources containing `invalid`, records every call.
    #[derive(Default)]
    struct FakeRenderer {
        calls: RefCell<Vec<(String, String)>>,
        theme: RefCell<Option<DiagramTheme>>,
    }

    #[async_trait(?Send)]
    impl DiagramRenderer for FakeRenderer {
        fn initialize(&self, theme: &DiagramTheme) {
            self.theme.replace(Some(theme.clone()));
        }

        async fn render_one(&self, id: &str, source: &str) -> Result<String, DiagramError> {
            self.calls
                .borrow_mut()
                .push((id.to_string(), source.to_string()));
            tokio::task::yield_now().await;
            if source.contains("invalid") {
                Err(DiagramError::Syntax("Parse error on line 1".into()))
            } else {
                Ok(format!("<svg><text>{}</text></svg>", escape_html(source.trim())))
            }
        }
    }

    #[test]
    fn test_fence_hook() {
        let hook = DiagramFenceHook;
        assert_eq!(
            hook.render_fence("mermaid", "A-->B & <C>\n").as_deref(),
            Some("<div class=\"mermaid\">A--&gt;B &amp; &lt;C&gt;\n</div>\n")
        );
        assert!(hook.render_fence("rust", "fn main() {}").is_none());
    }

    #[test]
    fn test_fix_label_line_breaks() {
        assert_eq!(
            fix_label_line_breaks("A[x<BR>y<br />z]"),
            "A[\"`x\ny\nz`\"]"
        );
        assert_eq!(fix_label_line_breaks("A[no break]"), "A[no break]");
    }

    #[test]
    fn test_theme_json() {
        let json = DiagramTheme::new(true).to_json();
        assert_eq!(json["theme"], "dark");
        assert_eq!(json["securityLevel"], "strict");
        assert_eq!(json["flowchart"]["defaultRenderer"], "elk");
        assert!(!DiagramTheme::new(false).is_dark());
    }

    #[tokio::test]
    async fn test_error_isolated_per_block() {
        let tree = ContentTree::new();
        tree.commit(
            "<div class=\"mermaid\">graph TD; A--&gt;B</div>\
             <div class=\"mermaid\">invalid diagram</div>\
             <h2>After</h2>",
        );

        let renderer = FakeRenderer::default();
        let sanitizer = DiagramSanitizer::default();
        let summary =
            render_diagrams(&tree, &renderer, &sanitizer, 3, DiagramSource::Content).await;
        assert_eq!(summary, DiagramSummary { rendered: 1, failed: 1 });

        let html = tree.inner_html();
        assert!(html.contains("<svg><text>graph TD; A--&gt;B</text></svg>"));
        assert!(html.contains(
            "<div class=\"mermaid-error\">Diagram error: Parse error on line 1</div>"
        ));
        assert!(html.contains("<h2>After</h2>"));

        let ids: Vec<_> = renderer.calls.borrow().iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec!["markpane-diagram-3-0", "markpane-diagram-3-1"]);
    }

    #[tokio::test]
    async fn test_rerender_from_original() {
        let tree = ContentTree::new();
        tree.commit("<div class=\"mermaid\">A[one&lt;br&gt;two]</div>");

        let renderer = FakeRenderer::default();
        let sanitizer = DiagramSanitizer::default();
        render_diagrams(&tree, &renderer, &sanitizer, 1, DiagramSource::Content).await;
        render_diagrams(&tree, &renderer, &sanitizer, 1, DiagramSource::Original).await;

        let calls = renderer.calls.borrow();
        assert_eq!(calls.len(), 2);
        // The stored original is used, not the SVG text from the first render.
        assert_eq!(calls[0].1, "A[\"`one\ntwo`\"]");
        assert_eq!(calls[1].1, calls[0].1);

        let container = tree.select(DIAGRAM_SELECTOR).remove(0);
        assert_eq!(
            attribute(&container, DATA_ORIGINAL).as_deref(),
            Some("A[one<br>two]")
        );
    }

    /// Returns markup with active content next to the drawing.
    struct HostileRenderer;

    #[async_trait(?Send)]
    impl DiagramRenderer for HostileRenderer {
        fn initialize(&self, _theme: &DiagramTheme) {}

        async fn render_one(&self, _id: &str, _source: &str) -> Result<String, DiagramError> {
            Ok(r#"<svg onload="steal()"><script>steal()</script><g><text>drawn</text></g></svg><img src=x onerror="steal()">"#.into())
        }
    }

    #[tokio::test]
    async fn test_renderer_output_is_sanitized() {
        let tree = ContentTree::new();
        tree.commit("<div class=\"mermaid\">graph TD; A--&gt;B</div>");

        let summary = render_diagrams(
            &tree,
            &HostileRenderer,
            &DiagramSanitizer::default(),
            1,
            DiagramSource::Content,
        )
        .await;
        assert_eq!(summary.rendered, 1);

        let html = tree.inner_html();
        assert!(html.contains("<svg><g><text>drawn</text></g></svg>"));
        assert!(!html.contains("steal"));
        assert!(!html.contains("<img"));
        assert!(!html.contains("<script"));
    }
}
