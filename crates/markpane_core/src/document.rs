//! Markdown source documents.
//!
//! A [`Document`] is created on file load or on every file-change event and is
//! immutable once split. The next render cycle supersedes it wholesale.

use crate::dom::escape_html;
use crate::error::InvalidInput;
use std::path::Path;

/// Lowercase extensions recognized as markdown.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdown", "mkdn", "mkd"];

const FENCE: &str = "---";

/// Markdown source split into an optional frontmatter block and the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    frontmatter: Option<String>,
    body: String,
}

impl Document {
    /// Split `source` into frontmatter and body.
    ///
    /// The frontmatter must open on the very first line and be closed by a
    /// line whose trimmed content is `---`. Without a closing fence the whole
    /// input is the body.
    ///
    /// # Examples
    ///
    /// ```
    /// use markpane_core::Document;
    ///
    /// let doc = Document::new("---\nkey: v\n---\n# Body");
    /// assert_eq!(doc.frontmatter(), Some("key: v"));
    /// assert_eq!(doc.body(), "# Body");
    ///
    /// let doc = Document::new("---\nkey: v\n# Body");
    /// assert_eq!(doc.frontmatter(), None);
    /// assert_eq!(doc.body(), "---\nkey: v\n# Body");
    /// ```
    pub fn new(source: &str) -> Self {
        match split_frontmatter(source) {
            Some((frontmatter, body)) => Self {
                frontmatter: Some(frontmatter),
                body,
            },
            None => Self {
                frontmatter: None,
                body: source.to_owned(),
            },
        }
    }

    pub fn frontmatter(&self) -> Option<&str> {
        self.frontmatter.as_deref()
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Verbatim rendering of the frontmatter block, escaped.
    ///
    /// Returns `None` when there is no frontmatter or it is empty.
    pub fn frontmatter_html(&self) -> Option<String> {
        let frontmatter = self.frontmatter.as_deref().filter(|f| !f.is_empty())?;
        let escaped = escape_html(frontmatter);
        Some(format!(
            "<section class=\"frontmatter\">\
             <div class=\"frontmatter-title\">Frontmatter</div>\
             <pre>---\n{escaped}\n---</pre>\
             </section>\n"
        ))
    }
}

fn split_frontmatter(source: &str) -> Option<(String, String)> {
    let mut lines = source.split('\n');
    if lines.next()?.trim_end() != FENCE {
        return None;
    }

    let rest: Vec<&str> = lines.collect();
    let end = rest.iter().position(|line| line.trim() == FENCE)?;

    Some((rest[..end].join("\n"), rest[end + 1..].join("\n")))
}

/// Check that `path` names a markdown document (case-insensitive extension).
///
/// # Examples
///
/// ```
/// use markpane_core::is_markdown_path;
/// use std::path::Path;
///
/// assert!(is_markdown_path(Path::new("README.md")).is_ok());
/// assert!(is_markdown_path(Path::new("notes.MARKDOWN")).is_ok());
/// assert!(is_markdown_path(Path::new("image.png")).is_err());
/// ```
pub fn is_markdown_path(path: &Path) -> Result<(), InvalidInput> {
    let matches = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            MARKDOWN_EXTENSIONS.iter().any(|e| *e == ext)
        })
        .unwrap_or(false);

    if matches {
        Ok(())
    } else {
        Err(InvalidInput::NotMarkdown(path.display().to_string()))
    }
}
