//! Markdown rendering and the re-entrant render pipeline.
//!
//! This module provides:
//! - Markdown to HTML conversion with GFM features and a fenced block hook
//! - HTML sanitization against fixed allow-lists
//! - [`RenderPipeline`], which runs every pass over the content tree and
//!   serializes overlapping render requests

mod markdown;
mod pipeline;
mod sanitize;
mod traits;

pub use self::markdown::{PulldownTransform, RenderOptions};
pub use self::pipeline::{FilePayload, PassReport, RenderPipeline};
pub use self::sanitize::{ContentSanitizer, DiagramSanitizer, NavSanitizer};
pub use self::traits::{FenceHook, MarkdownTransform, RenderError, Sanitizer};
