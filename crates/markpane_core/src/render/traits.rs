//! Collaborator traits for the first stages of a render pass.
//!
//! This module defines the [`MarkdownTransform`] and [`Sanitizer`] boundaries
//! so hosts can swap in other implementations. Failures from either abort the
//! pass and are shown in place of the content.

/// Error type for the parse and sanitize stages.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The markdown transform failed.
    #[error("Failed to render markdown: {0}")]
    Transform(String),

    /// The sanitizer failed.
    #[error("Failed to sanitize content: {0}")]
    Sanitize(String),
}

/// Hook consulted for every fenced code block.
///
/// Returning `Some(html)` replaces the default code block rendering.
pub trait FenceHook {
    fn render_fence(&self, language: &str, content: &str) -> Option<String>;
}

/// Trait for markdown to HTML conversion.
pub trait MarkdownTransform {
    /// Render `markdown` to HTML, consulting `fence_hook` for fenced blocks.
    fn render(&self, markdown: &str, fence_hook: &dyn FenceHook) -> Result<String, RenderError>;
}

/// Trait for HTML sanitization against a fixed allow-list.
pub trait Sanitizer {
    fn sanitize(&self, html: &str) -> Result<String, RenderError>;
}
