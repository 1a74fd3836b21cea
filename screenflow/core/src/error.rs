//! Engine Errors
//!
//! One error type for everything the engine can report. Variants fall into
//! two groups:
//!
//! - **Recoverable** failures (`Network`, `Api`, `Validation`,
//!   `CallbackFailed`) are routed to an action's `onError` continuation.
//! - **Programmer** errors (`Structure`, `CallbackNotFound`, `UnknownScreen`,
//!   `Load`) are still routable, but always produce a developer-facing
//!   diagnostic so they never disappear silently.

use serde_json::{json, Value};
use thiserror::Error;

/// Errors produced by the flow engine
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EngineError {
    /// A flow or action descriptor does not have the required shape
    #[error("malformed {subject}: field `{field}` {reason}")]
    Structure {
        /// What was being parsed (e.g. `flow "auth"`, `action`)
        subject: String,
        /// The offending field
        field: String,
        /// Why the field was rejected
        reason: String,
    },

    /// `execute` was called with a name nobody registered
    #[error("callback `{0}` is not registered")]
    CallbackNotFound(String),

    /// A registered callback reported a failure
    #[error("callback `{name}` failed: {message}")]
    CallbackFailed {
        /// Callback name
        name: String,
        /// Failure description from the handler
        message: String,
    },

    /// Transport-level failure (connection refused, timeout, ...)
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("api error: status {status}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        body: Value,
    },

    /// A handler rejected its input
    #[error("validation failed: {0}")]
    Validation(String),

    /// The asset loader could not produce the flow source text
    #[error("failed to load flow source {path}: {message}")]
    Load {
        /// Source path handed to the loader
        path: String,
        /// Loader error description
        message: String,
    },

    /// A navigation target does not exist in its flow
    #[error("screen `{screen_id}` does not exist in flow `{flow_id}`")]
    UnknownScreen {
        /// Flow that was searched
        flow_id: String,
        /// Missing screen
        screen_id: String,
    },
}

impl EngineError {
    /// Shorthand for a `Structure` error
    pub fn structure(
        subject: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Structure {
            subject: subject.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable tag for this error, exposed as `${error.kind}` in continuations
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structure { .. } => "structure",
            Self::CallbackNotFound(_) => "callbackNotFound",
            Self::CallbackFailed { .. } => "callbackFailed",
            Self::Network(_) => "network",
            Self::Api { .. } => "api",
            Self::Validation(_) => "validation",
            Self::Load { .. } => "load",
            Self::UnknownScreen { .. } => "unknownScreen",
        }
    }

    /// Whether this error points at a bug in the flow definition or host wiring
    #[must_use]
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::Structure { .. }
                | Self::CallbackNotFound(_)
                | Self::UnknownScreen { .. }
                | Self::Load { .. }
        )
    }

    /// The value placed under the ephemeral `error` scope
    #[must_use]
    pub fn to_scope_value(&self) -> Value {
        let mut scope = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Self::Api { status, body } = self {
            scope["status"] = json!(status);
            scope["body"] = body.clone();
        }
        scope
    }
}

/// Convenience alias used throughout the crate
pub type EngineResult<T> = Result<T, EngineError>;
