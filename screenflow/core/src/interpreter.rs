//! Action Interpreter
//!
//! Executes [`ActionTrigger`]s against the shared [`FlowContext`], the flow
//! cache, the callback registry and the network client.
//!
//! # Execution Model
//!
//! ```text
//!   Idle ──► Executing(action) ──► Succeeded ──► onSuccess? ──► Executing(child) ...
//!                               └─► Failed ────► onError?   ──► Executing(child) ...
//!   (top-level run settles) ──► Idle
//! ```
//!
//! - Before a descriptor runs, every string in its payload is resolved against
//!   session data, the triggering field values and the `response` / `error`
//!   scopes left by the parent action.
//! - A list runs in order. A failure without `onError` aborts the rest of the
//!   list and is returned to the caller. A failure with `onError` counts as
//!   handled and the list continues.
//! - Continuations start only after their parent settled.
//! - A pending `apiCall` is never cancelled. If the user navigated meanwhile,
//!   its continuation still runs against whatever the context is then.
//!
//! Unhandled failures and programmer errors (unknown callback, malformed
//! descriptor, missing screen) are logged and sent to the renderer as
//! [`EngineMessage::Diagnostic`].

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::actions::{ActionDescriptor, ActionKind, ActionTrigger};
use crate::callbacks::{CallbackParams, CallbackRegistry};
use crate::context::FlowContext;
use crate::error::{EngineError, EngineResult};
use crate::flow::FlowCache;
use crate::messages::{EngineMessage, NotifyLevel};
use crate::network::{ApiRequest, HttpMethod, NetworkClient};

/// Where the interpreter is in its execution cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterpreterState {
    /// Nothing running
    Idle,
    /// An action is running
    Executing {
        /// Action tag
        action: &'static str,
        /// Nesting level (0 for the triggered action)
        depth: usize,
    },
    /// The last action succeeded; a continuation may follow
    Succeeded {
        /// Action tag
        action: &'static str,
    },
    /// The last action failed; an `onError` may follow
    Failed {
        /// Action tag
        action: &'static str,
        /// Failure description
        error: String,
    },
}

/// Data visible to placeholders while a chain runs
#[derive(Clone, Debug, Default)]
struct ChainScope {
    fields: Arc<Map<String, Value>>,
    response: Option<Value>,
    error: Option<Value>,
    depth: usize,
}

impl ChainScope {
    fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields: Arc::new(fields),
            ..Self::default()
        }
    }

    /// Scope for `onSuccess`: the parent's output replaces `response`
    fn after_success(&self, output: Option<Value>) -> Self {
        Self {
            fields: Arc::clone(&self.fields),
            response: output.or_else(|| self.response.clone()),
            error: self.error.clone(),
            depth: self.depth + 1,
        }
    }

    /// Scope for `onError`: the parent's failure becomes `error`
    fn after_error(&self, error: &EngineError) -> Self {
        Self {
            fields: Arc::clone(&self.fields),
            response: self.response.clone(),
            error: Some(error.to_scope_value()),
            depth: self.depth + 1,
        }
    }
}

/// Runs action triggers
pub struct ActionInterpreter {
    context: Arc<FlowContext>,
    cache: Arc<FlowCache>,
    registry: CallbackRegistry,
    network: Arc<dyn NetworkClient>,
    tx: mpsc::UnboundedSender<EngineMessage>,
    state: RwLock<InterpreterState>,
}

impl std::fmt::Debug for ActionInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionInterpreter")
            .field("network", &self.network.name())
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl ActionInterpreter {
    /// Create an interpreter over shared engine state
    pub fn new(
        context: Arc<FlowContext>,
        cache: Arc<FlowCache>,
        registry: CallbackRegistry,
        network: Arc<dyn NetworkClient>,
        tx: mpsc::UnboundedSender<EngineMessage>,
    ) -> Self {
        Self {
            context,
            cache,
            registry,
            network,
            tx,
            state: RwLock::new(InterpreterState::Idle),
        }
    }

    /// Current execution state
    #[must_use]
    pub fn state(&self) -> InterpreterState {
        self.state.read().clone()
    }

    fn set_state(&self, state: InterpreterState) {
        *self.state.write() = state;
    }

    /// Run a trigger to completion with the given field values.
    ///
    /// Returns the output of the last action that ran.
    ///
    /// # Errors
    ///
    /// The first failure no `onError` handled.
    pub async fn run(&self, trigger: &ActionTrigger, fields: Map<String, Value>) -> EngineResult<Option<Value>> {
        let scope = ChainScope::new(fields);
        let result = self.run_trigger(trigger, &scope).await;
        self.set_state(InterpreterState::Idle);
        result
    }

    fn run_trigger<'a>(
        &'a self,
        trigger: &'a ActionTrigger,
        scope: &'a ChainScope,
    ) -> BoxFuture<'a, EngineResult<Option<Value>>> {
        async move {
            match trigger {
                ActionTrigger::Single(descriptor) => self.run_descriptor(descriptor, scope).await,
                ActionTrigger::Chain(list) => {
                    let mut last = None;
                    for (index, descriptor) in list.iter().enumerate() {
                        match self.run_descriptor(descriptor, scope).await {
                            Ok(output) => last = output,
                            Err(e) => {
                                tracing::debug!(
                                    index,
                                    skipped = list.len() - index - 1,
                                    "Action list aborted"
                                );
                                return Err(e);
                            }
                        }
                    }
                    Ok(last)
                }
            }
        }
        .boxed()
    }

    async fn run_descriptor(&self, descriptor: &ActionDescriptor, scope: &ChainScope) -> EngineResult<Option<Value>> {
        let kind = self.context.with_resolve_context(
            &scope.fields,
            scope.response.as_ref(),
            scope.error.as_ref(),
            |ctx| descriptor.kind.resolved(ctx),
        );
        let action = kind.name();
        self.set_state(InterpreterState::Executing {
            action,
            depth: scope.depth,
        });
        tracing::info!(action, depth = scope.depth, "Executing action");

        match self.execute(kind).await {
            Ok(output) => {
                self.set_state(InterpreterState::Succeeded { action });
                tracing::debug!(action, "Action succeeded");
                match descriptor.on_success.as_deref() {
                    Some(next) => {
                        let child = scope.after_success(output);
                        self.run_trigger(next, &child).await
                    }
                    None => Ok(output),
                }
            }
            Err(error) => {
                self.set_state(InterpreterState::Failed {
                    action,
                    error: error.to_string(),
                });
                if error.is_programmer_error() {
                    tracing::error!(action, error = %error, "Action failed with a definition error");
                    self.send(EngineMessage::diagnostic(
                        NotifyLevel::Error,
                        format!("{action}: {error}"),
                    ));
                }

                match descriptor.on_error.as_deref() {
                    Some(handler) => {
                        tracing::warn!(action, kind = error.kind(), error = %error, "Action failed, running onError");
                        let child = scope.after_error(&error);
                        self.run_trigger(handler, &child).await
                    }
                    None => {
                        if !error.is_programmer_error() {
                            tracing::warn!(action, error = %error, "Unhandled action failure");
                            self.send(EngineMessage::diagnostic(
                                NotifyLevel::Warning,
                                format!("{action}: {error}"),
                            ));
                        }
                        Err(error)
                    }
                }
            }
        }
    }

    async fn execute(&self, kind: ActionKind) -> EngineResult<Option<Value>> {
        match kind {
            ActionKind::Navigate { screen } => self.navigate(&screen).await,
            ActionKind::NavigateToFlow {
                target_flow,
                target_screen,
                data,
            } => self.navigate_to_flow(&target_flow, &target_screen, data).await,
            ActionKind::SetState { updates } => {
                let keys = self.context.merge_session(updates);
                tracing::debug!(keys = ?keys, "Session updated");
                self.send(EngineMessage::SessionUpdated { keys });
                Ok(None)
            }
            ActionKind::ApiCall {
                method,
                endpoint,
                headers,
                body,
            } => self.api_call(method, endpoint, headers, body).await,
            ActionKind::Custom {
                handler,
                parameters,
            } => self.callback(&handler, parameters).await,
            ActionKind::GoBack { steps, clear_data } => {
                self.go_back(steps, clear_data);
                Ok(None)
            }
            ActionKind::ExecuteCallback {
                callback_name,
                params,
            } => self.callback(&callback_name, params).await,
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    async fn navigate(&self, screen: &str) -> EngineResult<Option<Value>> {
        let frame = self.context.current_frame();
        let flow = self.cache.load(&frame.flow_id).await?;
        if !flow.has_screen(screen) {
            return Err(EngineError::UnknownScreen {
                flow_id: frame.flow_id,
                screen_id: screen.to_string(),
            });
        }

        self.context.replace_screen(screen);
        self.screen_changed();
        Ok(None)
    }

    async fn navigate_to_flow(
        &self,
        flow_id: &str,
        screen: &str,
        data: Option<Map<String, Value>>,
    ) -> EngineResult<Option<Value>> {
        let flow = self.cache.load(flow_id).await?;
        if !flow.has_screen(screen) {
            return Err(EngineError::UnknownScreen {
                flow_id: flow_id.to_string(),
                screen_id: screen.to_string(),
            });
        }

        let keys = self.context.push_navigation(flow_id, screen, data);
        if !keys.is_empty() {
            self.send(EngineMessage::SessionUpdated { keys });
        }
        self.screen_changed();
        Ok(None)
    }

    fn go_back(&self, steps: usize, clear_data: bool) {
        let outcome = self.context.go_back(steps, clear_data);
        if outcome.cleared_session {
            self.send(EngineMessage::SessionCleared);
        }
        if outcome.popped.is_empty() {
            tracing::debug!("Back navigation at root, nothing popped");
        } else {
            self.screen_changed();
        }
    }

    fn screen_changed(&self) {
        let frame = self.context.current_frame();
        tracing::info!(frame = %frame, depth = self.context.depth(), "Screen changed");
        self.send(EngineMessage::ScreenChanged {
            flow_id: frame.flow_id,
            screen_id: frame.screen_id,
        });
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    async fn api_call(
        &self,
        method: HttpMethod,
        endpoint: String,
        headers: Option<Map<String, Value>>,
        body: Option<Value>,
    ) -> EngineResult<Option<Value>> {
        let mut request = ApiRequest::new(method, endpoint);
        for (name, value) in headers.into_iter().flatten() {
            match header_value(&value) {
                Some(value) => request = request.with_header(name, value),
                None => tracing::debug!(header = %name, "Skipping null header"),
            }
        }
        request.body = body;

        tracing::info!(
            method = %request.method,
            endpoint = %request.endpoint,
            client = self.network.name(),
            "Calling API"
        );
        let response = self
            .network
            .request(&request)
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        tracing::debug!(status = response.status, endpoint = %request.endpoint, "API call settled");

        response.into_result().map(Some)
    }

    async fn callback(&self, name: &str, params: Option<CallbackParams>) -> EngineResult<Option<Value>> {
        self.registry.execute(name, params).await
    }

    /// Send a message to the renderer
    fn send(&self, msg: EngineMessage) {
        if let Err(e) = self.tx.send(msg) {
            tracing::warn!("Failed to send message to renderer: {}", e);
        }
    }
}

fn header_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
