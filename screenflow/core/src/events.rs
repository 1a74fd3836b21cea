//! Surface Events
//!
//! Events sent from the presentation layer to the engine. The renderer does
//! not interpret what a button means; it forwards the action JSON attached to
//! the control together with the current field values, and the engine decides
//! what happens.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Events from renderer to engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// A control fired its action trigger
    ActionTriggered {
        /// The raw trigger (object or list) as declared in the screen
        action: Value,
        /// Current input values of the screen, by field id
        #[serde(default)]
        fields: Map<String, Value>,
    },

    /// Platform back button / gesture
    BackPressed,

    /// The renderer wants to keep per-flow UI state (draft input, scroll)
    FlowStateChanged {
        /// Owning flow
        flow_id: String,
        /// Opaque state
        state: Value,
    },

    /// Drop the session and return to the entry flow
    LogoutRequested,
}

impl SurfaceEvent {
    /// Event for a control without field values
    pub fn action(action: Value) -> Self {
        Self::ActionTriggered {
            action,
            fields: Map::new(),
        }
    }

    /// Short name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ActionTriggered { .. } => "action_triggered",
            Self::BackPressed => "back_pressed",
            Self::FlowStateChanged { .. } => "flow_state_changed",
            Self::LogoutRequested => "logout_requested",
        }
    }
}
