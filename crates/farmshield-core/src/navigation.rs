//! Hash-driven view routing.
//!
//! The active view is derived from the address fragment (`#mandi`) so reloads
//! and deep links land on the same panel, and back/forward keep working. The
//! browser history is reached only through [`AddressObserver`], which keeps
//! the routing logic testable without a browser.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Symbolic identifier of the displayed feature panel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViewTag {
    Dashboard,
    Crops,
    Pest,
    Bot,
    Mandi,
    Weather,
    /// Any other tag; rendered as the "coming soon" placeholder.
    Unknown(String),
}

impl ViewTag {
    /// Derive a view from a fragment. A leading `#` is ignored and an empty
    /// fragment means the dashboard.
    pub fn from_fragment(fragment: &str) -> Self {
        let tag = fragment.trim().trim_start_matches('#');
        match tag {
            "" | "dashboard" => ViewTag::Dashboard,
            "crops" => ViewTag::Crops,
            "pest" => ViewTag::Pest,
            "bot" => ViewTag::Bot,
            "mandi" => ViewTag::Mandi,
            "weather" => ViewTag::Weather,
            other => ViewTag::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ViewTag::Dashboard => "dashboard",
            ViewTag::Crops => "crops",
            ViewTag::Pest => "pest",
            ViewTag::Bot => "bot",
            ViewTag::Mandi => "mandi",
            ViewTag::Weather => "weather",
            ViewTag::Unknown(tag) => tag,
        }
    }

    /// True when no feature panel exists for this tag yet.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ViewTag::Unknown(_))
    }
}

impl Default for ViewTag {
    fn default() -> Self {
        ViewTag::Dashboard
    }
}

impl fmt::Display for ViewTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ViewTag {
    fn from(tag: String) -> Self {
        ViewTag::from_fragment(&tag)
    }
}

impl From<ViewTag> for String {
    fn from(tag: ViewTag) -> Self {
        tag.as_str().to_string()
    }
}

/// The addressable history the router keeps in sync with.
pub trait AddressObserver: Send + Sync {
    /// Current fragment, with or without the leading `#`.
    fn current_fragment(&self) -> String;

    /// Push a new history entry whose fragment is `tag`.
    fn push_fragment(&self, tag: &str);
}

impl<T: AddressObserver + ?Sized> AddressObserver for Arc<T> {
    fn current_fragment(&self) -> String {
        (**self).current_fragment()
    }

    fn push_fragment(&self, tag: &str) {
        (**self).push_fragment(tag)
    }
}

/// Owns the active view and mirrors it into the address fragment.
pub struct NavigationRouter<A: AddressObserver> {
    address: A,
    active: ViewTag,
}

impl<A: AddressObserver> NavigationRouter<A> {
    /// Create the router, resolving the initial view from the current address
    /// so a deep-linked reload renders the right panel first time.
    pub fn new(address: A) -> Self {
        let active = ViewTag::from_fragment(&address.current_fragment());
        debug!(target: "farmshield::nav", view = %active, "initial view resolved");
        Self { address, active }
    }

    pub fn active_view(&self) -> &ViewTag {
        &self.active
    }

    /// Switch views and push the tag onto history. Any tag is accepted.
    pub fn navigate(&mut self, tag: &str) -> &ViewTag {
        self.active = ViewTag::from_fragment(tag);
        self.address.push_fragment(tag);
        debug!(target: "farmshield::nav", view = %self.active, "navigate");
        &self.active
    }

    /// History changed outside the router (back/forward, manual edit).
    pub fn on_history_change(&mut self, fragment: &str) -> &ViewTag {
        self.active = ViewTag::from_fragment(fragment);
        debug!(target: "farmshield::nav", view = %self.active, "history change");
        &self.active
    }

    /// Re-read the fragment from the address observer.
    pub fn sync_from_address(&mut self) -> &ViewTag {
        let fragment = self.address.current_fragment();
        self.on_history_change(&fragment)
    }

    pub fn address(&self) -> &A {
        &self.address
    }
}

/// In-process history stack with browser-like back/forward semantics.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    inner: Mutex<HistoryStack>,
}

#[derive(Debug, Default)]
struct HistoryStack {
    entries: Vec<String>,
    cursor: usize,
}

impl MemoryHistory {
    /// Start with a single entry, as a page load with `fragment` would.
    pub fn with_fragment(fragment: &str) -> Self {
        Self {
            inner: Mutex::new(HistoryStack {
                entries: vec![fragment.trim_start_matches('#').to_string()],
                cursor: 0,
            }),
        }
    }

    /// Step back one entry; returns the new fragment, or `None` at the start.
    pub fn back(&self) -> Option<String> {
        let mut stack = self.lock();
        if stack.cursor == 0 {
            return None;
        }
        stack.cursor -= 1;
        stack.entries.get(stack.cursor).cloned()
    }

    /// Step forward one entry; returns the new fragment, or `None` at the end.
    pub fn forward(&self) -> Option<String> {
        let mut stack = self.lock();
        if stack.cursor + 1 >= stack.entries.len() {
            return None;
        }
        stack.cursor += 1;
        stack.entries.get(stack.cursor).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryStack> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AddressObserver for MemoryHistory {
    fn current_fragment(&self) -> String {
        let stack = self.lock();
        stack.entries.get(stack.cursor).cloned().unwrap_or_default()
    }

    fn push_fragment(&self, tag: &str) {
        let mut stack = self.lock();
        let keep = if stack.entries.is_empty() { 0 } else { stack.cursor + 1 };
        stack.entries.truncate(keep);
        stack.entries.push(tag.to_string());
        stack.cursor = stack.entries.len() - 1;
    }
}
