use crate::viewport::ScrollOffsetCache;

/// Look-ahead below the top edge before a heading counts as reached.
pub const DEFAULT_THRESHOLD: f64 = 100.0;

/// Change of the active navigation entry.
///
/// Only these two entries need restyling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChange {
    pub previous: Option<String>,
    pub current: String,
}

/// Tracks the heading currently in view.
///
/// Scroll events only request a frame; the active heading is recomputed at
/// most once per frame in [`ScrollSpy::on_frame`].
#[derive(Debug, Clone)]
pub struct ScrollSpy {
    threshold: f64,
    frame_pending: bool,
    active: Option<String>,
}

impl Default for ScrollSpy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl ScrollSpy {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            frame_pending: false,
            active: None,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Record a scroll event.
    ///
    /// Returns `true` when the caller should schedule a frame, i.e. for the
    /// first scroll event since the last frame ran.
    pub fn on_scroll(&mut self) -> bool {
        !std::mem::replace(&mut self.frame_pending, true)
    }

    /// Recompute the active heading for `scroll_top`.
    pub fn on_frame(&mut self, cache: &ScrollOffsetCache, scroll_top: f64) -> Option<ActiveChange> {
        self.frame_pending = false;
        self.update(cache, scroll_top)
    }

    /// Recompute immediately, outside of the frame throttle.
    pub fn update(&mut self, cache: &ScrollOffsetCache, scroll_top: f64) -> Option<ActiveChange> {
        let current = cache.active_at(scroll_top, self.threshold)?;
        if self.active.as_deref() == Some(current) {
            return None;
        }
        let previous = self.active.replace(current.to_string());
        Some(ActiveChange {
            previous,
            current: current.to_string(),
        })
    }

    /// Forget the active entry, its heading no longer exists after a new pass.
    pub fn reset(&mut self) {
        self.active = None;
        self.frame_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::StaticViewport;

    fn cache() -> ScrollOffsetCache {
        let viewport = StaticViewport::new(300.0);
        viewport.set_layout(
            3000.0,
            [
                ("one".to_string(), 0.0),
                ("two".to_string(), 800.0),
                ("three".to_string(), 1600.0),
            ],
        );
        let mut cache = ScrollOffsetCache::new();
        cache.rebuild(["one", "two", "three"], &viewport);
        cache
    }

    #[test]
    fn test_scroll_requests_one_frame() {
        let mut spy = ScrollSpy::default();
        assert!(spy.on_scroll());
        assert!(!spy.on_scroll());
        assert!(!spy.on_scroll());
        spy.on_frame(&cache(), 0.0);
        assert!(spy.on_scroll());
    }

    #[test]
    fn test_reports_only_changes() {
        let cache = cache();
        let mut spy = ScrollSpy::default();

        assert_eq!(
            spy.on_frame(&cache, 0.0),
            Some(ActiveChange { previous: None, current: "one".into() })
        );
        assert_eq!(spy.on_frame(&cache, 500.0), None);
        assert_eq!(
            spy.on_frame(&cache, 700.0),
            Some(ActiveChange { previous: Some("one".into()), current: "two".into() })
        );
        assert_eq!(
            spy.on_frame(&cache, 2500.0),
            Some(ActiveChange { previous: Some("two".into()), current: "three".into() })
        );
        assert_eq!(spy.active(), Some("three"));
    }

    #[test]
    fn test_stale_cache_reports_nothing() {
        let mut cache = cache();
        cache.invalidate();
        let mut spy = ScrollSpy::default();
        assert_eq!(spy.on_frame(&cache, 0.0), None);
        assert_eq!(spy.active(), None);
    }

    #[test]
    fn test_reset() {
        let cache = cache();
        let mut spy = ScrollSpy::default();
        spy.update(&cache, 900.0);
        spy.reset();
        assert_eq!(
            spy.update(&cache, 900.0),
            Some(ActiveChange { previous: None, current: "two".into() })
        );
    }
}
