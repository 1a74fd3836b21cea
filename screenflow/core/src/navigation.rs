//! Navigation History
//!
//! The back stack of `(flow, screen)` frames plus the per-flow UI state.
//!
//! A [`NavigationStack`] can only be built from a root frame and refuses to
//! pop its last frame, so "where am I" always has an answer.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the back stack
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationFrame {
    /// Flow the screen belongs to
    pub flow_id: String,
    /// Screen within the flow
    pub screen_id: String,
}

impl NavigationFrame {
    /// Create a frame
    pub fn new(flow_id: impl Into<String>, screen_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            screen_id: screen_id.into(),
        }
    }
}

impl fmt::Display for NavigationFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.flow_id, self.screen_id)
    }
}

/// Ordered, never-empty stack of frames
///
/// Serializable for diagnostics; not deserializable, since that would allow
/// an empty stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NavigationStack {
    frames: Vec<NavigationFrame>,
}

impl NavigationStack {
    /// Create a stack rooted at `root`
    #[must_use]
    pub fn new(root: NavigationFrame) -> Self {
        Self { frames: vec![root] }
    }

    /// Append a frame
    pub fn push(&mut self, flow_id: impl Into<String>, screen_id: impl Into<String>) {
        let frame = NavigationFrame::new(flow_id, screen_id);
        tracing::debug!(frame = %frame, depth = self.frames.len() + 1, "Navigation push");
        self.frames.push(frame);
    }

    /// Remove and return the top frame. No-op returning `None` on the root.
    pub fn pop(&mut self) -> Option<NavigationFrame> {
        if !self.can_go_back() {
            return None;
        }
        let frame = self.frames.pop();
        if let Some(ref f) = frame {
            tracing::debug!(frame = %f, depth = self.frames.len(), "Navigation pop");
        }
        frame
    }

    /// Whether a pop would succeed
    #[must_use]
    pub fn can_go_back(&self) -> bool {
        self.frames.len() > 1
    }

    /// Pop up to `steps` frames, always keeping the root.
    ///
    /// Returns the removed frames, most recent first.
    pub fn go_back(&mut self, steps: usize) -> Vec<NavigationFrame> {
        let effective = steps.min(self.frames.len() - 1);
        let keep = self.frames.len() - effective;
        let mut popped = self.frames.split_off(keep);
        popped.reverse();
        if effective < steps {
            tracing::debug!(requested = steps, effective, "Navigation back clamped");
        }
        popped
    }

    /// Replace the current frame's screen, keeping its flow
    pub fn replace_screen(&mut self, screen_id: impl Into<String>) {
        let top = self.top_mut();
        top.screen_id = screen_id.into();
        tracing::debug!(frame = %top, "Navigation replace");
    }

    /// Drop everything and start over at `root`
    pub fn reset(&mut self, root: NavigationFrame) {
        self.frames.clear();
        self.frames.push(root);
    }

    /// The current location
    #[must_use]
    pub fn current(&self) -> &NavigationFrame {
        // Constructors and every mutation keep at least one frame.
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut NavigationFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Whether any frame belongs to `flow_id`
    #[must_use]
    pub fn contains_flow(&self, flow_id: &str) -> bool {
        self.frames.iter().any(|f| f.flow_id == flow_id)
    }

    /// All frames, root first
    #[must_use]
    pub fn frames(&self) -> &[NavigationFrame] {
        &self.frames
    }

    /// Number of frames (always at least 1)
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; present for API symmetry with `len`
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Per-flow UI state (draft input and the like), separate from session data
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    states: HashMap<String, Value>,
}

impl FlowState {
    /// Create an empty state map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the state of `flow_id`
    pub fn set(&mut self, flow_id: impl Into<String>, state: Value) {
        self.states.insert(flow_id.into(), state);
    }

    /// State of `flow_id`, if any
    #[must_use]
    pub fn get(&self, flow_id: &str) -> Option<&Value> {
        self.states.get(flow_id)
    }

    /// Drop the state of `flow_id`
    pub fn remove(&mut self, flow_id: &str) -> Option<Value> {
        self.states.remove(flow_id)
    }

    /// Keep only flows for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.states.retain(|flow_id, _| keep(flow_id));
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Number of flows with state
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no flow has state
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
