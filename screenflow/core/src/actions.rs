//! Action Descriptors
//!
//! Screens declare what a control does as JSON, discriminated by `"action"`:
//!
//! ```json
//! {
//!   "action": "apiCall",
//!   "method": "POST",
//!   "endpoint": "/login",
//!   "body": { "user": "${fields.username}" },
//!   "onSuccess": { "action": "navigateToFlow", "targetFlow": "dashboard", "targetScreen": "home" },
//!   "onError": { "action": "setState", "updates": { "loginError": "${error.message}" } }
//! }
//! ```
//!
//! The set of kinds is closed. Unknown tags are rejected when the descriptor is
//! parsed, not when it runs. `onSuccess` / `onError` hold an [`ActionTrigger`]:
//! either one descriptor or an ordered list, so descriptors form a tree.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::network::HttpMethod;
use crate::resolver::{self, ResolveContext};

/// Every tag accepted in the `"action"` field
pub const ACTION_KINDS: [&str; 7] = [
    "navigate",
    "navigateToFlow",
    "setState",
    "apiCall",
    "custom",
    "goBack",
    "executeCallback",
];

const ACTION_TAG: &str = "action";
const ON_SUCCESS: &str = "onSuccess";
const ON_ERROR: &str = "onError";

fn default_steps() -> usize {
    1
}

/// What an action does, with its kind-specific payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ActionKind {
    /// Replace the current screen within the current flow
    Navigate {
        /// Target screen id
        screen: String,
    },

    /// Push a screen of (possibly) another flow
    #[serde(rename_all = "camelCase")]
    NavigateToFlow {
        /// Flow to enter
        target_flow: String,
        /// Screen within that flow
        target_screen: String,
        /// Merged into session data before the push
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Map<String, Value>>,
    },

    /// Shallow-merge values into session data
    SetState {
        /// Top-level keys to write
        updates: Map<String, Value>,
    },

    /// Call a backend endpoint
    ApiCall {
        /// HTTP method
        method: HttpMethod,
        /// Absolute URL or path relative to the configured base URL
        endpoint: String,
        /// Extra request headers
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<Map<String, Value>>,
        /// JSON request body
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },

    /// Run a registered host handler
    Custom {
        /// Registered callback name
        handler: String,
        /// Handler parameters
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<Map<String, Value>>,
    },

    /// Pop frames off the navigation stack
    #[serde(rename_all = "camelCase")]
    GoBack {
        /// How many frames to pop (clamped to keep the root)
        #[serde(default = "default_steps")]
        steps: usize,
        /// Also clear session data
        #[serde(default)]
        clear_data: bool,
    },

    /// Run a registered host handler by `callbackName`
    #[serde(rename_all = "camelCase")]
    ExecuteCallback {
        /// Registered callback name
        callback_name: String,
        /// Handler parameters
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Map<String, Value>>,
    },
}

impl ActionKind {
    /// The `"action"` tag of this kind
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::NavigateToFlow { .. } => "navigateToFlow",
            Self::SetState { .. } => "setState",
            Self::ApiCall { .. } => "apiCall",
            Self::Custom { .. } => "custom",
            Self::GoBack { .. } => "goBack",
            Self::ExecuteCallback { .. } => "executeCallback",
        }
    }

    /// Copy of this kind with every string in its payload resolved
    #[must_use]
    pub fn resolved(&self, ctx: &ResolveContext<'_>) -> Self {
        let map = |m: &Option<Map<String, Value>>| m.as_ref().map(|m| resolver::resolve_map(m, ctx));
        match self {
            Self::Navigate { screen } => Self::Navigate {
                screen: resolver::resolve(screen, ctx),
            },
            Self::NavigateToFlow {
                target_flow,
                target_screen,
                data,
            } => Self::NavigateToFlow {
                target_flow: resolver::resolve(target_flow, ctx),
                target_screen: resolver::resolve(target_screen, ctx),
                data: map(data),
            },
            Self::SetState { updates } => Self::SetState {
                updates: resolver::resolve_map(updates, ctx),
            },
            Self::ApiCall {
                method,
                endpoint,
                headers,
                body,
            } => Self::ApiCall {
                method: *method,
                endpoint: resolver::resolve(endpoint, ctx),
                headers: map(headers),
                body: body.as_ref().map(|b| resolver::resolve_value(b, ctx)),
            },
            Self::Custom {
                handler,
                parameters,
            } => Self::Custom {
                handler: resolver::resolve(handler, ctx),
                parameters: map(parameters),
            },
            Self::GoBack { steps, clear_data } => Self::GoBack {
                steps: *steps,
                clear_data: *clear_data,
            },
            Self::ExecuteCallback {
                callback_name,
                params,
            } => Self::ExecuteCallback {
                callback_name: resolver::resolve(callback_name, ctx),
                params: map(params),
            },
        }
    }
}

/// One action plus its continuations
#[derive(Clone, Debug, PartialEq)]
pub struct ActionDescriptor {
    /// What to do
    pub kind: ActionKind,
    /// Runs after the action succeeded
    pub on_success: Option<Box<ActionTrigger>>,
    /// Runs after the action failed; marks the failure as handled
    pub on_error: Option<Box<ActionTrigger>>,
}

impl ActionDescriptor {
    /// Descriptor without continuations
    #[must_use]
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            on_success: None,
            on_error: None,
        }
    }

    /// Attach an `onSuccess` continuation
    #[must_use]
    pub fn on_success(mut self, trigger: ActionTrigger) -> Self {
        self.on_success = Some(Box::new(trigger));
        self
    }

    /// Attach an `onError` continuation
    #[must_use]
    pub fn on_error(mut self, trigger: ActionTrigger) -> Self {
        self.on_error = Some(Box::new(trigger));
        self
    }

    /// Parse one descriptor object
    ///
    /// # Errors
    ///
    /// `EngineError::Structure` naming the offending field, including
    /// `action` for a missing or unknown tag.
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        let Value::Object(object) = value else {
            return Err(EngineError::structure("action", "<root>", "must be an object"));
        };
        let mut payload = object.clone();

        let tag = match payload.get(ACTION_TAG) {
            Some(Value::String(tag)) => tag.clone(),
            Some(_) => return Err(EngineError::structure("action", ACTION_TAG, "must be a string")),
            None => return Err(EngineError::structure("action", ACTION_TAG, "is missing")),
        };
        if !ACTION_KINDS.contains(&tag.as_str()) {
            return Err(EngineError::structure(
                "action",
                ACTION_TAG,
                format!("has unknown kind \"{tag}\""),
            ));
        }

        let on_success = payload
            .remove(ON_SUCCESS)
            .map(|v| ActionTrigger::from_value(&v).map(Box::new))
            .transpose()?;
        let on_error = payload
            .remove(ON_ERROR)
            .map(|v| ActionTrigger::from_value(&v).map(Box::new))
            .transpose()?;

        let kind = serde_json::from_value(Value::Object(payload))
            .map_err(|e| structure_from_serde(&tag, &e))?;

        Ok(Self {
            kind,
            on_success,
            on_error,
        })
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())
    }
}

fn structure_from_serde(tag: &str, err: &serde_json::Error) -> EngineError {
    let subject = format!("{tag} action");
    let message = err.to_string();
    match message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
    {
        Some(field) => EngineError::structure(subject, field, "is missing"),
        None => EngineError::structure(subject, "<payload>", message),
    }
}

/// A single descriptor or an ordered list run one after another
#[derive(Clone, Debug, PartialEq)]
pub enum ActionTrigger {
    /// One descriptor
    Single(ActionDescriptor),
    /// Sequential list
    Chain(Vec<ActionDescriptor>),
}

impl ActionTrigger {
    /// Parse an object or an array of objects
    ///
    /// # Errors
    ///
    /// `EngineError::Structure` for anything else or for a malformed entry.
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(ActionDescriptor::from_value)
                .collect::<EngineResult<Vec<_>>>()
                .map(Self::Chain),
            Value::Object(_) => ActionDescriptor::from_value(value).map(Self::Single),
            _ => Err(EngineError::structure(
                "action trigger",
                "<root>",
                "must be an object or an array",
            )),
        }
    }

    /// Number of top-level descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Chain(list) => list.len(),
        }
    }

    /// Whether this is an empty list
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<ActionDescriptor> for ActionTrigger {
    fn from(descriptor: ActionDescriptor) -> Self {
        Self::Single(descriptor)
    }
}

impl From<ActionKind> for ActionTrigger {
    fn from(kind: ActionKind) -> Self {
        Self::Single(ActionDescriptor::new(kind))
    }
}
