//! Core library for the MarkPane live markdown previewer.
//!
//! This crate provides the content pipeline that turns a markdown file into
//! sanitized HTML with a navigable table of contents, syntax highlighting and
//! diagram rendering, plus the live-reload loop that feeds it on file changes.
//!
//! # Modules
//!
//! - [`document`] - Source document and frontmatter splitting
//! - [`render`] - Markdown transform, sanitizer and the re-entrant render pipeline
//! - [`dom`] - The content tree the pipeline commits into
//! - [`slug`] - Unique heading identifiers per render pass
//! - [`toc`] - Heading extraction, outline, scroll-spy and keyboard navigation
//! - [`viewport`] - Scroll position bookkeeping supplied by the host
//! - [`highlight`] - Syntax highlighting boundary
//! - [`diagram`] - Diagram rendering boundary and label fixups
//! - [`settings`] - Theme and font settings delivered by the host
//! - [`search`] - Find-in-page query validation and matching
//! - [`watcher`] - File watching with debounced reloads

pub mod diagram;
pub mod document;
pub mod dom;
pub mod error;
pub mod highlight;
pub mod render;
pub mod search;
pub mod settings;
pub mod slug;
pub mod toc;
pub mod viewport;
pub mod watcher;

// Re-export commonly used types at crate root
pub use diagram::{DiagramError, DiagramRenderer, DiagramTheme};
pub use document::{is_markdown_path, Document};
pub use dom::ContentTree;
pub use error::InvalidInput;
pub use highlight::{Highlighter, SyntectHighlighter};
pub use render::{FilePayload, PassReport, RenderError, RenderPipeline};
pub use search::{FindQuery, StopFindAction};
pub use settings::{Settings, ThemeMode};
pub use slug::Slugger;
pub use toc::{HeadingEntry, TocNode};
pub use viewport::{ScrollOffsetCache, ScrollRatio, StaticViewport, Viewport};
pub use watcher::{LiveReload, WatchError, WatchEvent, WatcherConfig};
