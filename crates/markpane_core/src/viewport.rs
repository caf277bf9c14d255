//! Scroll position bookkeeping.
//!
//! The host owns the scrollable surface and exposes it through [`Viewport`].
//! The core keeps a [`ScrollOffsetCache`] of heading offsets, valid only
//! between the end of one render pass and the start of the next.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// The scrollable content container supplied by the host.
///
/// Methods take `&self`; hosts keep layout state behind interior mutability.
pub trait Viewport {
    fn scroll_top(&self) -> f64;

    fn scroll_height(&self) -> f64;

    fn client_height(&self) -> f64;

    fn set_scroll_top(&self, top: f64);

    /// Vertical offset of the element with `id`, relative to the content
    /// container. `None` if the element is not laid out.
    fn offset_of(&self, id: &str) -> Option<f64>;
}

/// Ordered `(heading id, offset)` pairs.
#[derive(Debug, Clone, Default)]
pub struct ScrollOffsetCache {
    entries: Vec<(String, f64)>,
    valid: bool,
}

impl ScrollOffsetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-measure every heading in document order.
    ///
    /// Headings the viewport cannot place are left out.
    pub fn rebuild<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>, viewport: &dyn Viewport) {
        self.entries = ids
            .into_iter()
            .filter_map(|id| viewport.offset_of(id).map(|offset| (id.to_string(), offset)))
            .collect();
        self.valid = true;
    }

    /// Mark the cache stale, e.g. when a new pass starts or layout shifts.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.valid = true;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    /// The last heading whose offset is at or above `scroll_top + threshold`,
    /// or the first heading when none has been reached yet.
    ///
    /// Returns `None` for a stale or empty cache.
    pub fn active_at(&self, scroll_top: f64, threshold: f64) -> Option<&str> {
        if !self.valid {
            return None;
        }
        let limit = scroll_top + threshold;
        self.entries
            .iter()
            .take_while(|(_, offset)| *offset <= limit)
            .last()
            .or_else(|| self.entries.first())
            .map(|(id, _)| id.as_str())
    }
}

/// Proportional scroll position, `scroll_top / scroll_height`.
///
/// Restoration is approximate: it does not follow a particular heading when
/// the document length changes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollRatio(f64);

impl ScrollRatio {
    pub fn new(ratio: f64) -> Self {
        Self(ratio.clamp(0.0, 1.0))
    }

    /// Capture the current position, `0` when the content does not overflow.
    pub fn capture(viewport: &dyn Viewport) -> Self {
        let scroll_height = viewport.scroll_height();
        if scroll_height <= viewport.client_height() || scroll_height <= 0.0 {
            return Self(0.0);
        }
        Self::new(viewport.scroll_top() / scroll_height)
    }

    /// Reapply against the new layout.
    pub fn restore(self, viewport: &dyn Viewport) {
        viewport.set_scroll_top(self.0 * viewport.scroll_height());
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

/// Viewport with an explicitly assigned layout.
///
/// Useful for hosts without a layout engine and for tests.
#[derive(Debug, Default)]
pub struct StaticViewport {
    scroll_top: Cell<f64>,
    scroll_height: Cell<f64>,
    client_height: Cell<f64>,
    offsets: RefCell<HashMap<String, f64>>,
}

impl StaticViewport {
    pub fn new(client_height: f64) -> Self {
        Self {
            client_height: Cell::new(client_height),
            ..Default::default()
        }
    }

    /// Replace the layout: total content height and heading offsets.
    pub fn set_layout(&self, scroll_height: f64, offsets: impl IntoIterator<Item = (String, f64)>) {
        self.scroll_height.set(scroll_height);
        self.offsets.replace(offsets.into_iter().collect());
        let max_top = (scroll_height - self.client_height.get()).max(0.0);
        self.scroll_top.set(self.scroll_top.get().min(max_top));
    }

    pub fn set_client_height(&self, client_height: f64) {
        self.client_height.set(client_height);
    }
}

impl Viewport for StaticViewport {
    fn scroll_top(&self) -> f64 {
        self.scroll_top.get()
    }

    fn scroll_height(&self) -> f64 {
        self.scroll_height.get()
    }

    fn client_height(&self) -> f64 {
        self.client_height.get()
    }

    fn set_scroll_top(&self, top: f64) {
        let max_top = (self.scroll_height.get() - self.client_height.get()).max(0.0);
        self.scroll_top.set(top.clamp(0.0, max_top));
    }

    fn offset_of(&self, id: &str) -> Option<f64> {
        self.offsets.borrow().get(id).copied()
    }
}
