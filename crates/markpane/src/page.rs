//! Standalone HTML page around the rendered content.

use markpane_core::dom::escape_html;
use markpane_core::toc::EMPTY_TOC;
use markpane_core::{RenderPipeline, Settings, SyntectHighlighter};

/// HTML template with placeholders for styles, outline and content.
pub const HTML_TEMPLATE: &str = include_str!("../assets/index.html");

/// Base page styles.
pub const STYLES_CSS: &str = include_str!("../assets/styles.css");

const DEFAULT_TITLE: &str = "MarkPane";

/// Everything the page shows besides the static assets.
#[derive(Debug, Clone)]
pub struct Page {
    pub title: String,
    pub dark: bool,
    pub settings: Settings,
    pub toc_html: String,
    pub content_html: String,
}

impl Page {
    /// Snapshot of the pipeline's latest pass.
    pub fn from_pipeline(pipeline: &RenderPipeline) -> Self {
        Self {
            title: pipeline
                .display_name()
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            dark: pipeline.is_dark(),
            settings: pipeline.settings(),
            toc_html: pipeline.toc_html(),
            content_html: pipeline.tree().inner_html(),
        }
    }

    /// Page showing only an error message.
    pub fn error(title: Option<String>, message: &str, settings: Settings, dark: bool) -> Self {
        Self {
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            dark,
            settings,
            toc_html: EMPTY_TOC.to_string(),
            content_html: format!(
                "<div class=\"error-message\">{}</div>",
                escape_html(message)
            ),
        }
    }

    /// Assemble the complete document.
    ///
    /// Static assets go in first and document-derived values after them, so
    /// neither settings nor rendered text can be mistaken for a placeholder.
    pub fn build_html(&self, highlighter: &SyntectHighlighter) -> String {
        let theme_class = if self.dark { "theme-dark" } else { "theme-light" };
        let highlight_css = highlighter.stylesheet(self.dark).unwrap_or_default();

        HTML_TEMPLATE
            .replace("/*__STYLES_CSS__*/", STYLES_CSS)
            .replace("/*__HIGHLIGHT_CSS__*/", &highlight_css)
            .replace("__THEME_CLASS__", theme_class)
            .replace("__TITLE__", &escape_html(&self.title))
            .replace("/*__SETTINGS_CSS__*/", &self.settings.css_variables())
            .replace("<!--__TOC__-->", &self.toc_html)
            .replace("<!--__CONTENT__-->", &self.content_html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markpane_core::{FilePayload, StaticViewport, ThemeMode};
    use std::rc::Rc;

    #[test]
    fn test_template_has_placeholders() {
        assert!(HTML_TEMPLATE.contains("<!DOCTYPE html>"));
        for placeholder in [
            "/*__SETTINGS_CSS__*/",
            "/*__STYLES_CSS__*/",
            "/*__HIGHLIGHT_CSS__*/",
            "__THEME_CLASS__",
            "__TITLE__",
            "<!--__TOC__-->",
            "<!--__CONTENT__-->",
        ] {
            assert!(HTML_TEMPLATE.contains(placeholder), "missing {placeholder}");
        }
        assert!(STYLES_CSS.contains(".toc-list"));
        assert!(STYLES_CSS.contains(".mermaid-error"));
    }

    #[test]
    fn test_error_page() {
        let page = Page::error(
            Some("<notes>.md".into()),
            "File was deleted: <notes>.md",
            Settings::default(),
            false,
        );
        let html = page.build_html(&SyntectHighlighter::new());

        assert!(html.contains("<title>&lt;notes&gt;.md</title>"));
        assert!(html.contains(
            r#"<div class="error-message">File was deleted: &lt;notes&gt;.md</div>"#
        ));
        assert!(html.contains(EMPTY_TOC));
        assert!(html.contains(r#"class="theme-light""#));
        assert!(html.contains("--body-font: \"San Francisco\""));
    }

    #[test]
    fn test_font_names_cannot_expand_placeholders() {
        let settings = Settings {
            body_font: "/*__STYLES_CSS__*/ __TITLE__".into(),
            ..Default::default()
        };
        let page = Page::error(Some("notes.md".into()), "gone", settings, false);
        let html = page.build_html(&SyntectHighlighter::new());

        assert_eq!(html.matches(STYLES_CSS).count(), 1);
        assert!(html.contains("--body-font: \"__STYLES_CSS__ __TITLE__\""));
        assert_eq!(html.matches("notes.md").count(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_page_from_pipeline() {
        let settings = Settings {
            theme: ThemeMode::Dark,
            ..Default::default()
        };
        let pipeline = RenderPipeline::new(Rc::new(StaticViewport::new(600.0)))
            .with_settings(settings);
        pipeline
            .load(FilePayload {
                content: "# Guide\n\nMentions `__TITLE__` and `<!--__TOC__-->` literally.\n".into(),
                display_name: Some("guide.md".into()),
                pdf_export: false,
            })
            .await;

        let html = Page::from_pipeline(&pipeline).build_html(&SyntectHighlighter::new());

        assert!(html.contains("<title>guide.md</title>"));
        assert!(html.contains(r#"class="theme-dark""#));
        assert!(html.contains(r##"href="#user-content-guide""##));
        assert!(html.contains(r#"id="user-content-guide""#));
        assert!(html.contains("Mentions <code>__TITLE__</code>"));
        assert!(html.contains("<code>&lt;!--__TOC__--&gt;</code>"));
    }
}
