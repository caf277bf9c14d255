use super::HeadingEntry;

/// A key press delivered to the table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    ArrowDown,
    ArrowUp,
    Home,
    End,
    Enter,
    Space,
    Char(char),
    Other,
}

impl NavKey {
    /// Map a DOM `KeyboardEvent.key` value.
    pub fn from_key_name(name: &str) -> Self {
        match name {
            "ArrowDown" => Self::ArrowDown,
            "ArrowUp" => Self::ArrowUp,
            "Home" => Self::Home,
            "End" => Self::End,
            "Enter" => Self::Enter,
            " " | "Spacebar" => Self::Space,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_control() && !c.is_whitespace() => Self::Char(c),
                    _ => Self::Other,
                }
            }
        }
    }
}

/// What the host should do in response to a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavAction {
    /// Move keyboard focus; `previous` loses the tab stop, `current` gains it.
    Focus { previous: usize, current: usize },
    /// Follow the link of the entry with this heading id.
    Activate(String),
    /// Nothing to do, the key is not consumed.
    Ignore,
}

#[derive(Debug, Clone)]
struct NavItem {
    id: String,
    text: String,
}

/// Keyboard model of the navigation tree.
///
/// Every entry is visible, the tree has no collapsible groups. Exactly one
/// entry holds the tab stop at any time.
#[derive(Debug, Clone, Default)]
pub struct TocNavigator {
    items: Vec<NavItem>,
    focused: usize,
}

impl TocNavigator {
    pub fn new(entries: &[HeadingEntry]) -> Self {
        Self {
            items: entries
                .iter()
                .map(|entry| NavItem {
                    id: entry.id.clone(),
                    text: entry.text.clone(),
                })
                .collect(),
            focused: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn focused(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.focused)
    }

    pub fn focused_id(&self) -> Option<&str> {
        self.items.get(self.focused).map(|item| item.id.as_str())
    }

    /// `0` for the entry holding the tab stop, `-1` for all others.
    pub fn tabindex(&self, index: usize) -> i32 {
        if index == self.focused {
            0
        } else {
            -1
        }
    }

    /// Move the tab stop, e.g. when an entry is clicked.
    pub fn focus(&mut self, index: usize) -> NavAction {
        if index >= self.items.len() || index == self.focused {
            return NavAction::Ignore;
        }
        let previous = std::mem::replace(&mut self.focused, index);
        NavAction::Focus {
            previous,
            current: index,
        }
    }

    fn type_ahead(&self, c: char) -> Option<usize> {
        let needle: String = c.to_lowercase().collect();
        self.items
            .iter()
            .position(|item| item.text.to_lowercase().starts_with(&needle))
    }

    pub fn handle_key(&mut self, key: NavKey) -> NavAction {
        if self.items.is_empty() {
            return NavAction::Ignore;
        }
        let last = self.items.len() - 1;

        let target = match key {
            NavKey::ArrowDown => (self.focused + 1).min(last),
            NavKey::ArrowUp => self.focused.saturating_sub(1),
            NavKey::Home => 0,
            NavKey::End => last,
            NavKey::Enter | NavKey::Space => {
                return NavAction::Activate(self.items[self.focused].id.clone());
            }
            NavKey::Char(c) => match self.type_ahead(c) {
                Some(index) => index,
                None => return NavAction::Ignore,
            },
            NavKey::Other => return NavAction::Ignore,
        };

        self.focus(target)
    }
}
