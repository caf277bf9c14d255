//! HTML sanitization with ammonia.
//!
//! Three fixed allow-lists are used: one for document content, a narrower
//! one for the table of contents navigation markup and an SVG one for the
//! output of diagram renderers.

use super::traits::{RenderError, Sanitizer};
use crate::slug::ID_PREFIX;
use std::borrow::Cow;

/// Tags added to ammonia's default structural allow-list.
const EXTRA_CONTENT_TAGS: &[&str] = &["div", "section", "pre", "input", "span"];

/// Attributes allowed on every content tag.
const CONTENT_GENERIC_ATTRS: &[&str] = &["class", "id"];

/// Only checkbox-shaped attributes survive on `<input>`.
const INPUT_ATTRS: &[&str] = &["type", "disabled", "checked"];

const NAV_TAGS: &[&str] = &["ul", "li", "a", "div"];
const NAV_ATTRS: &[&str] = &["href", "role", "aria-level", "tabindex", "class", "title"];

const DIAGRAM_TAGS: &[&str] = &[
    "svg", "g", "defs", "marker", "path", "rect", "circle", "ellipse", "line", "polyline",
    "polygon", "text", "tspan", "title", "desc", "style", "use", "symbol", "clipPath",
    "linearGradient", "radialGradient", "stop", "foreignObject", "div", "span", "p", "br",
    "pre",
];

/// Presentation attributes, in the case html5ever gives them inside `<svg>`.
const DIAGRAM_ATTRS: &[&str] = &[
    "id", "class", "style", "role", "aria-roledescription", "aria-label", "viewBox",
    "preserveAspectRatio", "width", "height", "x", "y", "x1", "y1", "x2", "y2", "cx", "cy",
    "r", "rx", "ry", "dx", "dy", "d", "points", "transform", "fill", "fill-opacity",
    "stroke", "stroke-width", "stroke-dasharray", "stroke-linecap", "stroke-linejoin",
    "stroke-opacity", "opacity", "font-family", "font-size", "font-weight", "text-anchor",
    "dominant-baseline", "alignment-baseline", "marker-start", "marker-mid", "marker-end",
    "markerWidth", "markerHeight", "markerUnits", "refX", "refY", "orient", "offset",
    "stop-color", "stop-opacity", "gradientUnits", "clip-path", "clipPathUnits",
];

/// Prefix `id` values so they cannot collide with ids of the host UI.
///
/// Already-prefixed values are left alone, which keeps sanitizing idempotent.
fn namespace_ids<'u>(_element: &str, attribute: &str, value: &'u str) -> Option<Cow<'u, str>> {
    if attribute == "id" && !value.starts_with(ID_PREFIX) {
        Some(Cow::Owned(format!("{ID_PREFIX}{value}")))
    } else {
        Some(Cow::Borrowed(value))
    }
}

/// Sanitizer for rendered document content.
pub struct ContentSanitizer {
    builder: ammonia::Builder<'static>,
}

impl std::fmt::Debug for ContentSanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSanitizer").finish_non_exhaustive()
    }
}

impl Default for ContentSanitizer {
    fn default() -> Self {
        let mut builder = ammonia::Builder::default();
        builder
            .add_tags(EXTRA_CONTENT_TAGS)
            .add_generic_attributes(CONTENT_GENERIC_ATTRS)
            .add_generic_attribute_prefixes(&["data-"])
            .add_tag_attributes("input", INPUT_ATTRS)
            .attribute_filter(namespace_ids);
        Self { builder }
    }
}

impl ContentSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize without going through the fallible trait.
    pub fn clean(&self, html: &str) -> String {
        self.builder.clean(html).to_string()
    }
}

impl Sanitizer for ContentSanitizer {
    fn sanitize(&self, html: &str) -> Result<String, RenderError> {
        Ok(self.clean(html))
    }
}

/// Sanitizer for the table of contents navigation markup.
pub struct NavSanitizer {
    builder: ammonia::Builder<'static>,
}

impl Default for NavSanitizer {
    fn default() -> Self {
        let mut builder = ammonia::Builder::empty();
        builder
            .add_tags(NAV_TAGS)
            .clean_content_tags(["script", "style"].into_iter().collect())
            .add_generic_attributes(NAV_ATTRS)
            .url_schemes(["http", "https", "mailto"].into_iter().collect())
            .link_rel(None);
        Self { builder }
    }
}

impl NavSanitizer {
    pub fn clean(&self, html: &str) -> String {
        self.builder.clean(html).to_string()
    }
}

/// Sanitizer for the SVG returned by a diagram renderer.
///
/// Keeps shapes, text and styling. Scripts, event handlers and links are
/// removed, so a misbehaving renderer cannot inject active content.
pub struct DiagramSanitizer {
    builder: ammonia::Builder<'static>,
}

impl Default for DiagramSanitizer {
    fn default() -> Self {
        let mut builder = ammonia::Builder::empty();
        builder
            .add_tags(DIAGRAM_TAGS)
            .clean_content_tags(["script"].into_iter().collect())
            .add_generic_attributes(DIAGRAM_ATTRS)
            .add_generic_attribute_prefixes(&["data-"])
            .link_rel(None);
        Self { builder }
    }
}

impl DiagramSanitizer {
    pub fn clean(&self, svg: &str) -> String {
        self.builder.clean(svg).to_string()
    }
}
