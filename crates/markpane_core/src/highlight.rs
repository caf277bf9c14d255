//! Syntax highlighting boundary.

use crate::dom::{attribute, set_attribute, set_inner_html};
use kuchikiki::NodeRef;
use syntect::highlighting::ThemeSet;
use syntect::html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

/// Selector of code blocks tagged for highlighting by the markdown transform.
pub const CODE_BLOCK_SELECTOR: &str = "pre code.hljs";

const HIGHLIGHTED_ATTR: &str = "data-highlighted";

/// Highlights one code element in place.
///
/// Implementations must be idempotent per node.
pub trait Highlighter {
    fn highlight_element(&self, node: &NodeRef);
}

/// Language token of a `language-*` class, if any.
pub fn language_of(node: &NodeRef) -> Option<String> {
    attribute(node, "class")?
        .split_whitespace()
        .find_map(|class| class.strip_prefix("language-"))
        .filter(|language| !language.is_empty())
        .map(String::from)
}

/// Class-based highlighter backed by syntect.
#[derive(Debug)]
pub struct SyntectHighlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
        }
    }
}

impl SyntectHighlighter {
    const LIGHT_THEME: &'static str = "InspiredGitHub";
    const DARK_THEME: &'static str = "base16-ocean.dark";

    /// Should be constructed once, loading the syntax set is not cheap.
    pub fn new() -> Self {
        Self::default()
    }

    fn find_syntax(&self, language: &str) -> Option<&SyntaxReference> {
        self.syntax_set.find_syntax_by_token(language)
    }

    /// Highlight `code` as `language`, returning span markup.
    pub fn highlight_code(&self, language: &str, code: &str) -> Result<Option<String>, syntect::Error> {
        let Some(syntax) = self.find_syntax(language) else {
            return Ok(None);
        };

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntax_set, ClassStyle::Spaced);
        for line in LinesWithEndings::from(code) {
            generator.parse_html_for_line_which_includes_newline(line)?;
        }

        Ok(Some(generator.finalize()))
    }

    /// Stylesheet matching the generated classes for the given scheme.
    pub fn stylesheet(&self, dark: bool) -> Option<String> {
        let name = if dark { Self::DARK_THEME } else { Self::LIGHT_THEME };
        let theme = self.theme_set.themes.get(name)?;
        match css_for_theme_with_class_style(theme, ClassStyle::Spaced) {
            Ok(css) => Some(css),
            Err(err) => {
                tracing::warn!(?err, theme = name, "Failed to generate highlight stylesheet");
                None
            }
        }
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight_element(&self, node: &NodeRef) {
        if attribute(node, HIGHLIGHTED_ATTR).is_some() {
            return;
        }
        set_attribute(node, HIGHLIGHTED_ATTR, "yes");

        let Some(language) = language_of(node) else {
            return;
        };

        let code = node.text_contents();
        match self.highlight_code(&language, &code) {
            Ok(Some(html)) => set_inner_html(node, &html),
            Ok(None) => tracing::debug!(%language, "No syntax for language"),
            Err(err) => tracing::warn!(?err, %language, "Failed to highlight code block"),
        }
    }
}
