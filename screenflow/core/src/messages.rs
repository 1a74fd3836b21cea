//! Engine Messages
//!
//! Messages sent from the engine to the presentation layer. The renderer
//! owns the receiving end of an `mpsc` channel and re-renders whenever the
//! current screen or the session data changes.
//!
//! The renderer never mutates engine state directly. It reads through
//! [`FlowEngine::current_screen`](crate::FlowEngine::current_screen) and
//! reports user input back as [`SurfaceEvent`](crate::SurfaceEvent)s.

use serde::{Deserialize, Serialize};

/// Messages from engine to renderer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineMessage {
    // ============================================
    // Navigation
    // ============================================
    /// The current frame changed; re-resolve and render it
    ScreenChanged {
        /// Flow of the new current frame
        flow_id: String,
        /// Screen of the new current frame
        screen_id: String,
    },

    // ============================================
    // Session
    // ============================================
    /// Session keys were written
    SessionUpdated {
        /// Keys touched by the write
        keys: Vec<String>,
    },

    /// All session data was dropped (back navigation with `clearData`, logout)
    SessionCleared,

    // ============================================
    // Developer Feedback
    // ============================================
    /// Something went wrong that a developer should see
    Diagnostic {
        /// Severity
        level: NotifyLevel,
        /// Human-readable description
        message: String,
    },
}

impl EngineMessage {
    /// Shorthand for a diagnostic
    pub fn diagnostic(level: NotifyLevel, message: impl Into<String>) -> Self {
        Self::Diagnostic {
            level,
            message: message.into(),
        }
    }

    /// Whether the renderer should redraw the current screen
    #[must_use]
    pub fn requires_render(&self) -> bool {
        !matches!(self, Self::Diagnostic { .. })
    }
}

/// Diagnostic severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// A failure nobody handled
    Warning,
    /// A bug in a flow definition or in host wiring
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let msg = EngineMessage::ScreenChanged {
            flow_id: "auth".to_string(),
            screen_id: "login".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "screen_changed", "flow_id": "auth", "screen_id": "login"})
        );
    }

    #[test]
    fn test_requires_render() {
        assert!(EngineMessage::SessionCleared.requires_render());
        assert!(!EngineMessage::diagnostic(NotifyLevel::Error, "boom").requires_render());
    }
}
