//! Heading identifiers.
//!
//! A [`Slugger`] lives for exactly one render pass. Within that pass every id
//! it hands out is unique; across passes ids are recomputed from scratch.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Prefix carried by every generated heading id.
pub const ID_PREFIX: &str = "user-content-";

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static HYPHENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").expect("valid regex"));

/// Converts heading text to a URL-safe slug without any uniqueness handling.
///
/// 1. Normalize to NFC and lowercase
/// 2. Strip HTML-tag-like substrings
/// 3. Remove everything except word characters, whitespace and hyphens
/// 4. Collapse whitespace runs into a hyphen, then repeated hyphens into one
/// 5. Trim leading and trailing hyphens
///
/// # Example
///
/// ```
/// use markpane_core::slug::slugify;
///
/// assert_eq!(slugify("Hello World"), "hello-world");
/// assert_eq!(slugify("API Reference (v2)"), "api-reference-v2");
/// assert_eq!(slugify("  <em>Café</em> -- menu "), "café-menu");
/// ```
pub fn slugify(text: &str) -> String {
    let normalized: String = text.nfc().collect::<String>().to_lowercase();
    let without_tags = HTML_TAG.replace_all(&normalized, "");
    let cleaned = DISALLOWED.replace_all(&without_tags, "");
    let hyphenated = WHITESPACE.replace_all(cleaned.trim(), "-");
    let collapsed = HYPHENS.replace_all(&hyphenated, "-");
    collapsed.trim_matches('-').to_owned()
}

/// Stateful per-pass slug generator.
///
/// # Example
///
/// ```
/// use markpane_core::Slugger;
///
/// let mut slugger = Slugger::new();
/// assert_eq!(slugger.slug("Intro"), "user-content-intro");
/// assert_eq!(slugger.slug("Intro"), "user-content-intro-1");
/// assert_eq!(slugger.slug("Intro"), "user-content-intro-2");
/// ```
#[derive(Debug, Default)]
pub struct Slugger {
    /// Base slug -> number of prior occurrences.
    occurrences: HashMap<String, usize>,
    /// Counter for headings whose text yields no slug.
    fallbacks: usize,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every slug handed out so far.
    pub fn reset(&mut self) {
        self.occurrences.clear();
        self.fallbacks = 0;
    }

    /// Produce a prefixed id for `text`, unique within this pass.
    ///
    /// Collisions get a `-N` suffix where `N` counts prior occurrences of the
    /// same base slug. Text without any usable characters falls back to a
    /// sequence-numbered `heading-N` base.
    pub fn slug(&mut self, text: &str) -> String {
        let mut base = slugify(text);
        if base.is_empty() {
            self.fallbacks += 1;
            base = format!("heading-{}", self.fallbacks);
        }

        let mut candidate = base.clone();
        while self.occurrences.contains_key(&candidate) {
            let count = self.occurrences.entry(base.clone()).or_insert(0);
            *count += 1;
            candidate = format!("{base}-{count}");
        }
        self.occurrences.insert(candidate.clone(), 0);

        format!("{ID_PREFIX}{candidate}")
    }
}
