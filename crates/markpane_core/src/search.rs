//! Find-in-page over the rendered content.

use crate::dom::ContentTree;
use crate::error::InvalidInput;
use crate::toc::HeadingEntry;
use kuchikiki::NodeRef;

/// Longest query accepted from the host, in characters.
pub const MAX_QUERY_LEN: usize = 1000;

/// A validated, non-empty search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindQuery(String);

impl FindQuery {
    pub fn new(text: impl Into<String>) -> Result<Self, InvalidInput> {
        let text = text.into();
        let len = text.chars().count();
        if len == 0 {
            return Err(InvalidInput::EmptyQuery);
        }
        if len > MAX_QUERY_LEN {
            return Err(InvalidInput::QueryTooLong {
                len,
                max: MAX_QUERY_LEN,
            });
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What happens to the current match when a search is dismissed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopFindAction {
    #[default]
    ClearSelection,
    KeepSelection,
    ActivateSelection,
}

impl StopFindAction {
    /// Unknown values fall back to clearing the selection.
    pub fn parse(action: &str) -> Self {
        match action {
            "keepSelection" => Self::KeepSelection,
            "activateSelection" => Self::ActivateSelection,
            "clearSelection" => Self::ClearSelection,
            other => {
                tracing::debug!(action = other, "Unknown stop-find action, clearing selection");
                Self::ClearSelection
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClearSelection => "clearSelection",
            Self::KeepSelection => "keepSelection",
            Self::ActivateSelection => "activateSelection",
        }
    }
}

/// One occurrence of the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindHit {
    /// 1-based position among all hits.
    pub ordinal: usize,
    /// Id of the closest heading before the hit.
    pub heading_id: Option<String>,
}

/// Case-insensitive search of the rendered text.
///
/// Matches may span element boundaries (`foo <em>bar</em>`); each hit is
/// attributed to the heading that precedes it in document order.
pub fn find_in_content(
    tree: &ContentTree,
    query: &FindQuery,
    headings: &[HeadingEntry],
) -> Vec<FindHit> {
    let needle = query.as_str().to_lowercase();

    // Lowercased text plus the offsets at which each heading starts.
    let mut haystack = String::new();
    let mut heading_starts: Vec<(usize, &str)> = Vec::new();

    for node in tree.root().descendants() {
        if let Some(entry) = headings.iter().find(|entry| entry.node == node) {
            heading_starts.push((haystack.len(), entry.id.as_str()));
        }
        if let Some(text) = node.as_text() {
            haystack.push_str(&text.borrow().to_lowercase());
        }
    }

    let heading_at = |offset: usize| -> Option<String> {
        heading_starts
            .iter()
            .take_while(|(start, _)| *start <= offset)
            .last()
            .map(|(_, id)| id.to_string())
    };

    haystack
        .match_indices(needle.as_str())
        .enumerate()
        .map(|(index, (offset, _))| FindHit {
            ordinal: index + 1,
            heading_id: heading_at(offset),
        })
        .collect()
}

/// Whether `node` still belongs to the content tree.
pub fn is_attached(tree: &ContentTree, node: &NodeRef) -> bool {
    node.ancestors().any(|ancestor| &ancestor == tree.root())
}
