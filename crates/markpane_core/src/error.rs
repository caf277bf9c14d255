//! Boundary validation errors.

/// Arguments rejected at the host boundary before they reach the render path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidInput {
    /// The path does not name a markdown document.
    #[error("Not a markdown file: {0}")]
    NotMarkdown(String),

    /// Find-in-page query is empty.
    #[error("Search query is empty")]
    EmptyQuery,

    /// Find-in-page query exceeds the accepted length.
    #[error("Search query too long: {len} characters (max {max})")]
    QueryTooLong { len: usize, max: usize },
}
