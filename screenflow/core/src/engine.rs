//! Flow Engine - The Facade the Renderer Talks To
//!
//! Owns one [`FlowContext`], the flow cache, the callback registry and the
//! interpreter. The renderer is UI-agnostic from the engine's point of view:
//!
//! - [`SurfaceEvent`]s come in through [`FlowEngine::handle_event`]
//! - [`EngineMessage`]s go out over the unbounded `mpsc` channel given to
//!   [`FlowEngine::start`]; sending never waits on the renderer, so the
//!   receiver may be drained after `dispatch` returns
//! - the screen to draw is pulled with [`FlowEngine::current_screen`].
//!   Action payloads inside it stay unresolved until they run.
//!
//! Two engines never share state; each has its own context and cache.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::actions::{ActionKind, ActionTrigger};
use crate::callbacks::CallbackRegistry;
use crate::config::EngineConfig;
use crate::context::{ContextBackup, FlowContext};
use crate::error::{EngineError, EngineResult};
use crate::events::SurfaceEvent;
use crate::flow::{AssetTextLoader, FlowCache};
use crate::interpreter::{ActionInterpreter, InterpreterState};
use crate::messages::{EngineMessage, NotifyLevel};
use crate::navigation::NavigationFrame;
use crate::network::NetworkClient;
use crate::resolver;

/// The current screen with every placeholder resolved
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedScreen {
    /// Owning flow
    pub flow_id: String,
    /// Screen id
    pub screen_id: String,
    /// Screen descriptor ready for the widget builder
    pub descriptor: Value,
}

/// Facade over the flow engine
pub struct FlowEngine {
    config: EngineConfig,
    root: NavigationFrame,
    context: Arc<FlowContext>,
    cache: Arc<FlowCache>,
    registry: CallbackRegistry,
    interpreter: ActionInterpreter,
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl std::fmt::Debug for FlowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowEngine")
            .field("root", &self.root)
            .field("current", &self.context.current_frame())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl FlowEngine {
    /// Load the entry flow, root navigation at its initial screen and preload
    /// the configured flows.
    ///
    /// Preload failures are reported as diagnostics and do not stop startup.
    ///
    /// # Errors
    ///
    /// Fails if the entry flow cannot be loaded.
    pub async fn start(
        config: EngineConfig,
        loader: Arc<dyn AssetTextLoader>,
        network: Arc<dyn NetworkClient>,
        tx: mpsc::UnboundedSender<EngineMessage>,
        entry_flow: &str,
    ) -> EngineResult<Self> {
        tracing::info!(entry_flow = %entry_flow, source = %config.source(), "Starting flow engine");

        let cache = Arc::new(FlowCache::new(loader, config.flows.sources()));
        let entry = cache.load(entry_flow).await?;
        let initial = entry.initial_screen().ok_or_else(|| {
            EngineError::structure(format!("flow \"{entry_flow}\""), "screens", "is empty")
        })?;
        let root = NavigationFrame::new(entry_flow, initial);

        let context = Arc::new(FlowContext::new(root.clone()));
        let registry = CallbackRegistry::new();
        let interpreter = ActionInterpreter::new(
            Arc::clone(&context),
            Arc::clone(&cache),
            registry.clone(),
            network,
            tx.clone(),
        );

        let engine = Self {
            config,
            root,
            context,
            cache,
            registry,
            interpreter,
            tx,
        };

        if !engine.config.flows.preload.is_empty() {
            let report = engine.cache.preload_flows(engine.config.flows.preload.iter()).await;
            tracing::info!(
                loaded = report.loaded.len(),
                failed = report.failed.len(),
                "Preload finished"
            );
            for (flow_id, error) in &report.failed {
                engine.send(EngineMessage::diagnostic(
                    NotifyLevel::Warning,
                    format!("preload of \"{flow_id}\" failed: {error}"),
                ));
            }
        }

        engine.screen_changed();
        Ok(engine)
    }

    /// Handle one event from the renderer
    ///
    /// # Errors
    ///
    /// Any unhandled action failure (already reported as a diagnostic).
    pub async fn handle_event(&self, event: SurfaceEvent) -> EngineResult<()> {
        tracing::debug!(event = event.name(), "Surface event");
        match event {
            SurfaceEvent::ActionTriggered { action, fields } => {
                self.dispatch(&action, fields).await?;
            }
            SurfaceEvent::BackPressed => {
                let back = ActionTrigger::from(ActionKind::GoBack {
                    steps: 1,
                    clear_data: false,
                });
                self.interpreter.run(&back, Map::new()).await?;
            }
            SurfaceEvent::FlowStateChanged { flow_id, state } => {
                self.context.set_flow_state(&flow_id, state);
            }
            SurfaceEvent::LogoutRequested => self.logout(),
        }
        Ok(())
    }

    /// Parse and run an action trigger declared in a screen
    ///
    /// # Errors
    ///
    /// `EngineError::Structure` for a malformed trigger, otherwise the first
    /// failure no `onError` handled.
    pub async fn dispatch(&self, action: &Value, fields: Map<String, Value>) -> EngineResult<Option<Value>> {
        let trigger = match ActionTrigger::from_value(action) {
            Ok(trigger) => trigger,
            Err(e) => {
                tracing::error!(error = %e, "Rejected malformed action");
                self.send(EngineMessage::diagnostic(NotifyLevel::Error, e.to_string()));
                return Err(e);
            }
        };
        self.interpreter.run(&trigger, fields).await
    }

    /// The current screen, resolved against session data and `fields`
    ///
    /// # Errors
    ///
    /// Fails if the current flow can no longer be loaded or lacks the screen.
    pub async fn current_screen(&self, fields: &Map<String, Value>) -> EngineResult<ResolvedScreen> {
        let frame = self.context.current_frame();
        let flow = self.cache.load(&frame.flow_id).await?;
        let Some(screen) = flow.screen(&frame.screen_id) else {
            return Err(EngineError::UnknownScreen {
                flow_id: frame.flow_id,
                screen_id: frame.screen_id,
            });
        };

        let descriptor = self
            .context
            .with_resolve_context(fields, None, None, |ctx| resolver::resolve_screen(screen, ctx));
        Ok(ResolvedScreen {
            flow_id: frame.flow_id,
            screen_id: frame.screen_id,
            descriptor,
        })
    }

    /// Deep copy of all session data
    #[must_use]
    pub fn session_snapshot(&self) -> Map<String, Value> {
        self.context.session_snapshot()
    }

    /// The current location
    #[must_use]
    pub fn current_frame(&self) -> NavigationFrame {
        self.context.current_frame()
    }

    /// Snapshot for a later "cancel changes"
    #[must_use]
    pub fn create_backup(&self) -> ContextBackup {
        self.context.create_backup()
    }

    /// Store one session value, replacing any previous value under `key`
    pub fn set_session_data(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.context.set_session(key.clone(), value);
        tracing::debug!(key = %key, "Session value set");
        self.send(EngineMessage::SessionUpdated { keys: vec![key] });
    }

    /// Drop one session value; returns whether it existed
    pub fn clear_session_data_key(&self, key: &str) -> bool {
        let removed = self.context.remove_session(key).is_some();
        if removed {
            tracing::debug!(key = %key, "Session value cleared");
            self.send(EngineMessage::SessionUpdated {
                keys: vec![key.to_string()],
            });
        }
        removed
    }

    /// Roll session, navigation and flow state back to `backup`
    pub fn restore_from_backup(&self, backup: &ContextBackup) {
        self.context.restore_from_backup(backup);
        self.send(EngineMessage::SessionUpdated {
            keys: backup.session().keys().cloned().collect(),
        });
        self.screen_changed();
    }

    /// Drop session data and flow state, and return to the entry screen
    ///
    /// Cached flows and registered callbacks survive.
    pub fn logout(&self) {
        tracing::info!(root = %self.root, "Logout");
        self.context.reset(self.root.clone());
        self.send(EngineMessage::SessionCleared);
        self.screen_changed();
    }

    /// Host callback registry
    #[must_use]
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Flow cache
    #[must_use]
    pub fn cache(&self) -> &FlowCache {
        &self.cache
    }

    /// Shared context, for read access from the renderer
    #[must_use]
    pub fn context(&self) -> &Arc<FlowContext> {
        &self.context
    }

    /// Interpreter execution state
    #[must_use]
    pub fn interpreter_state(&self) -> InterpreterState {
        self.interpreter.state()
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn screen_changed(&self) {
        let frame = self.context.current_frame();
        self.send(EngineMessage::ScreenChanged {
            flow_id: frame.flow_id,
            screen_id: frame.screen_id,
        });
    }

    /// Send a message to the renderer
    fn send(&self, msg: EngineMessage) {
        if let Err(e) = self.tx.send(msg) {
            tracing::warn!("Failed to send message to renderer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ApiRequest, ApiResponse};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    struct MemoryLoader(HashMap<String, String>);

    #[async_trait]
    impl AssetTextLoader for MemoryLoader {
        async fn load_string(&self, path: &str) -> anyhow::Result<String> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no such asset: {path}"))
        }
    }

    struct OfflineNetwork;

    #[async_trait]
    impl NetworkClient for OfflineNetwork {
        fn name(&self) -> &'static str {
            "offline"
        }

        async fn request(&self, _request: &ApiRequest) -> anyhow::Result<ApiResponse> {
            anyhow::bail!("offline")
        }
    }

    fn loader() -> Arc<MemoryLoader> {
        let auth = json!({
            "type": "flow",
            "flowId": "auth",
            "properties": {"initialScreen": "login"},
            "screens": {
                "login": {
                    "type": "column",
                    "children": [{"type": "text", "text": "Welcome ${navigationData.username}"}]
                },
                "register": {}
            }
        });
        let profile = json!({
            "type": "flow",
            "flowId": "profile",
            "screens": {"view": {"title": "${navigationData.name}"}}
        });
        Arc::new(MemoryLoader(HashMap::from([
            ("flows/auth.json".to_string(), auth.to_string()),
            ("flows/profile.json".to_string(), profile.to_string()),
        ])))
    }

    async fn engine(config: EngineConfig) -> (FlowEngine, mpsc::UnboundedReceiver<EngineMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = FlowEngine::start(config, loader(), Arc::new(OfflineNetwork), tx, "auth")
            .await
            .unwrap();
        (engine, rx)
    }

    #[tokio::test]
    async fn test_start_roots_at_initial_screen() {
        let (engine, mut rx) = engine(EngineConfig::default()).await;

        assert_eq!(engine.current_frame(), NavigationFrame::new("auth", "login"));
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineMessage::ScreenChanged {
                flow_id: "auth".to_string(),
                screen_id: "login".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_start_fails_without_entry_flow() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = FlowEngine::start(
            EngineConfig::default(),
            loader(),
            Arc::new(OfflineNetwork),
            tx,
            "missing",
        )
        .await;

        assert!(matches!(result, Err(EngineError::Load { .. })));
    }

    #[tokio::test]
    async fn test_preload_failure_is_diagnosed() {
        let mut config = EngineConfig::default();
        config.flows.preload = vec!["profile".to_string(), "ghost".to_string()];
        let (engine, mut rx) = engine(config).await;

        assert!(engine.cache().is_cached("profile"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineMessage::Diagnostic {
                level: NotifyLevel::Warning,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_current_screen_is_resolved() {
        let (engine, _rx) = engine(EngineConfig::default()).await;
        engine
            .dispatch(
                &json!({"action": "setState", "updates": {"username": "ann"}}),
                Map::new(),
            )
            .await
            .unwrap();

        let screen = engine.current_screen(&Map::new()).await.unwrap();

        assert_eq!(screen.screen_id, "login");
        assert_eq!(
            screen.descriptor["children"][0]["text"],
            json!("Welcome ann")
        );
    }

    #[tokio::test]
    async fn test_malformed_action_is_rejected() {
        let (engine, mut rx) = engine(EngineConfig::default()).await;
        let _ = rx.try_recv();

        let err = engine
            .dispatch(&json!({"action": "explode"}), Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Structure { .. }));
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineMessage::Diagnostic {
                level: NotifyLevel::Error,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_back_pressed_and_flow_state() {
        let (engine, _rx) = engine(EngineConfig::default()).await;
        engine
            .handle_event(SurfaceEvent::action(json!({
                "action": "navigateToFlow",
                "targetFlow": "profile",
                "targetScreen": "view",
                "data": {"name": "ann"}
            })))
            .await
            .unwrap();
        engine
            .handle_event(SurfaceEvent::FlowStateChanged {
                flow_id: "profile".to_string(),
                state: json!({"scroll": 3}),
            })
            .await
            .unwrap();

        assert_eq!(engine.context().flow_state("profile"), Some(json!({"scroll": 3})));

        engine.handle_event(SurfaceEvent::BackPressed).await.unwrap();
        engine.handle_event(SurfaceEvent::BackPressed).await.unwrap();

        assert_eq!(engine.current_frame(), NavigationFrame::new("auth", "login"));
        assert_eq!(engine.session_snapshot().get("name"), Some(&json!("ann")));
    }

    #[tokio::test]
    async fn test_logout_resets_to_entry() {
        let (engine, _rx) = engine(EngineConfig::default()).await;
        engine.registry().register_sync("noop", |_| Ok(None));
        engine
            .dispatch(
                &json!({
                    "action": "navigateToFlow",
                    "targetFlow": "profile",
                    "targetScreen": "view",
                    "data": {"name": "ann"}
                }),
                Map::new(),
            )
            .await
            .unwrap();

        engine.handle_event(SurfaceEvent::LogoutRequested).await.unwrap();

        assert_eq!(engine.current_frame(), NavigationFrame::new("auth", "login"));
        assert!(engine.session_snapshot().is_empty());
        assert!(engine.cache().is_cached("profile"));
        assert!(engine.registry().is_registered("noop"));
    }

    #[tokio::test]
    async fn test_backup_restore() {
        let (engine, _rx) = engine(EngineConfig::default()).await;
        let backup = engine.create_backup();

        engine
            .dispatch(
                &json!([
                    {"action": "setState", "updates": {"draft": "x"}},
                    {"action": "navigate", "screen": "register"}
                ]),
                Map::new(),
            )
            .await
            .unwrap();
        engine.restore_from_backup(&backup);

        assert_eq!(engine.current_frame(), NavigationFrame::new("auth", "login"));
        assert!(engine.session_snapshot().is_empty());
        assert_eq!(engine.interpreter_state(), InterpreterState::Idle);
    }

    #[tokio::test]
    async fn test_set_and_clear_single_session_key() {
        let (engine, mut rx) = engine(EngineConfig::default()).await;
        let _ = rx.try_recv();

        engine.set_session_data("user", json!({"id": 7, "tags": ["a"]}));
        engine.set_session_data("theme", json!("dark"));

        assert_eq!(engine.context().session_value("user"), Some(json!({"id": 7, "tags": ["a"]})));
        assert!(engine.clear_session_data_key("theme"));
        assert!(!engine.clear_session_data_key("theme"));
        assert_eq!(engine.context().session_value("theme"), None);
        assert_eq!(engine.context().session_value("user"), Some(json!({"id": 7, "tags": ["a"]})));

        let keys: Vec<Vec<String>> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|msg| match msg {
                EngineMessage::SessionUpdated { keys } => Some(keys),
                _ => None,
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                vec!["user".to_string()],
                vec!["theme".to_string()],
                vec!["theme".to_string()],
            ]
        );
    }

    /// A long chain completes even when nobody reads messages until it returns.
    #[tokio::test]
    async fn test_long_chain_with_undrained_receiver() {
        let (engine, mut rx) = engine(EngineConfig::default()).await;
        let chain: Vec<Value> = (0..200)
            .map(|i| json!({"action": "setState", "updates": {"step": i}}))
            .collect();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            engine.dispatch(&Value::Array(chain), Map::new()),
        )
        .await;

        assert!(matches!(result, Ok(Ok(_))));
        assert_eq!(engine.context().session_value("step"), Some(json!(199)));
        assert_eq!(std::iter::from_fn(|| rx.try_recv().ok()).count(), 201);
    }
}
