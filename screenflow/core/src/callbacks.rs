//! Callback Registry - Named Host Handlers
//!
//! Flows call into host code by name (`custom` and `executeCallback`
//! actions). The host registers handlers at startup or on the fly:
//!
//! ```ignore
//! registry.register_sync("double", |params| {
//!     let x = params.and_then(|p| p.get("x")?.as_i64()).unwrap_or(0);
//!     Ok(Some(json!(x * 2)))
//! });
//!
//! registry.register("login", |params| async move {
//!     let user = api_login(params).await.map_err(|e| CallbackError::Failed(e.to_string()))?;
//!     Ok(Some(user))
//! });
//! ```
//!
//! Registering a name twice replaces the first handler without complaint.
//! Executing an unknown name is always an error.
//!
//! # Thread Safety
//!
//! Same layout as the rest of the engine's shared maps: `Arc<RwLock<>>`
//! around a `HashMap`. The handler is cloned out of the lock before it is
//! awaited, so a handler may itself register or execute callbacks.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{EngineError, EngineResult};

/// Parameters passed to a handler
pub type CallbackParams = Map<String, Value>;

/// What a handler produces
pub type CallbackResult = Result<Option<Value>, CallbackError>;

type Handler = Arc<dyn Fn(Option<CallbackParams>) -> BoxFuture<'static, CallbackResult> + Send + Sync>;

/// Failures a handler can report
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallbackError {
    /// The input was rejected (shown to the user as a validation problem)
    #[error("{0}")]
    Validation(String),
    /// Anything else went wrong
    #[error("{0}")]
    Failed(String),
}

/// A registered handler and its bookkeeping
#[derive(Clone)]
pub struct RegisteredCallback {
    /// Registration name
    pub name: String,
    /// When it was registered
    pub registered_at: Instant,
    handler: Handler,
}

impl fmt::Debug for RegisteredCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCallback")
            .field("name", &self.name)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

/// Name → handler map
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    inner: Arc<RwLock<HashMap<String, RegisteredCallback>>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl CallbackRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, name: String, handler: Handler) {
        let replaced = self
            .inner
            .write()
            .insert(
                name.clone(),
                RegisteredCallback {
                    name: name.clone(),
                    registered_at: Instant::now(),
                    handler,
                },
            )
            .is_some();
        tracing::debug!(callback = %name, replaced, "Callback registered");
    }

    /// Register an async handler, replacing any handler with the same name
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Option<CallbackParams>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallbackResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params| handler(params).boxed());
        self.insert(name.into(), handler);
    }

    /// Register a synchronous handler, replacing any handler with the same name
    pub fn register_sync<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Option<CallbackParams>) -> CallbackResult + Send + Sync + 'static,
    {
        let handler: Handler =
            Arc::new(move |params| futures::future::ready(handler(params)).boxed());
        self.insert(name.into(), handler);
    }

    /// Run the handler registered as `name`
    ///
    /// # Errors
    ///
    /// `EngineError::CallbackNotFound` for an unknown name,
    /// `EngineError::Validation` / `EngineError::CallbackFailed` when the
    /// handler reports a failure.
    pub async fn execute(&self, name: &str, params: Option<CallbackParams>) -> EngineResult<Option<Value>> {
        let handler = self
            .inner
            .read()
            .get(name)
            .map(|entry| Arc::clone(&entry.handler));

        let Some(handler) = handler else {
            tracing::error!(callback = %name, "Callback is not registered");
            return Err(EngineError::CallbackNotFound(name.to_string()));
        };

        tracing::debug!(callback = %name, "Executing callback");
        handler(params).await.map_err(|e| match e {
            CallbackError::Validation(message) => EngineError::Validation(message),
            CallbackError::Failed(message) => EngineError::CallbackFailed {
                name: name.to_string(),
                message,
            },
        })
    }

    /// Whether `name` has a handler
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Remove one handler
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.inner.write().remove(name).is_some();
        if removed {
            tracing::debug!(callback = %name, "Callback unregistered");
        }
        removed
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Remove every handler (test isolation)
    pub fn clear_all(&self) {
        self.inner.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Option<CallbackParams> {
        value.as_object().cloned()
    }

    fn double(p: Option<CallbackParams>) -> CallbackResult {
        let x = p
            .as_ref()
            .and_then(|p| p.get("x"))
            .and_then(Value::as_i64)
            .ok_or_else(|| CallbackError::Validation("x must be an integer".to_string()))?;
        Ok(Some(json!(x * 2)))
    }

    #[tokio::test]
    async fn test_sync_handler() {
        let registry = CallbackRegistry::new();
        registry.register_sync("double", double);

        let result = registry.execute("double", params(json!({"x": 21}))).await;
        assert_eq!(result, Ok(Some(json!(42))));
    }

    #[tokio::test]
    async fn test_async_handler() {
        let registry = CallbackRegistry::new();
        registry.register("greet", |p: Option<CallbackParams>| async move {
            tokio::task::yield_now().await;
            let name = p
                .and_then(|p| p.get("name").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            Ok::<_, CallbackError>(Some(json!(format!("hello {name}"))))
        });

        let result = registry.execute("greet", params(json!({"name": "ann"}))).await;
        assert_eq!(result, Ok(Some(json!("hello ann"))));
    }

    #[tokio::test]
    async fn test_missing_callback_errors() {
        let registry = CallbackRegistry::new();
        let err = registry.execute("missing", None).await.unwrap_err();
        assert_eq!(err, EngineError::CallbackNotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_reregistration_replaces() {
        let registry = CallbackRegistry::new();
        registry.register_sync("answer", |_| Ok(Some(json!(1))));
        registry.register_sync("answer", |_| Ok(Some(json!(2))));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.execute("answer", None).await, Ok(Some(json!(2))));
    }

    #[tokio::test]
    async fn test_handler_errors_are_mapped() {
        let registry = CallbackRegistry::new();
        registry.register_sync("double", double);
        registry.register_sync("boom", |_| Err(CallbackError::Failed("exploded".to_string())));

        assert_eq!(
            registry.execute("double", None).await,
            Err(EngineError::Validation("x must be an integer".to_string()))
        );
        assert_eq!(
            registry.execute("boom", None).await,
            Err(EngineError::CallbackFailed {
                name: "boom".to_string(),
                message: "exploded".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_handler_may_use_registry() {
        let registry = CallbackRegistry::new();
        registry.register_sync("inner", |_| Ok(Some(json!("inner"))));
        let handle = registry.clone();
        registry.register("outer", move |_| {
            let handle = handle.clone();
            async move {
                handle
                    .execute("inner", None)
                    .await
                    .map_err(|e| CallbackError::Failed(e.to_string()))
            }
        });

        assert_eq!(registry.execute("outer", None).await, Ok(Some(json!("inner"))));
    }

    #[test]
    fn test_unregister_and_clear() {
        let registry = CallbackRegistry::new();
        registry.register_sync("a", |_| Ok(None));
        registry.register_sync("b", |_| Ok(None));

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert_eq!(registry.names(), vec!["b".to_string()]);

        registry.clear_all();
        assert!(registry.is_empty());
        assert!(!registry.is_registered("b"));
    }
}
