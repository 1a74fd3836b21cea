//! Flow Context
//!
//! The explicit, shareable home of session data, the navigation stack and the
//! per-flow state. One `FlowContext` exists per running engine instance, so two
//! engines (or two tests) never see each other's data.
//!
//! # Access Rules
//!
//! Anyone holding an `Arc<FlowContext>` may read. Mutation is crate-private:
//! the interpreter and the engine are the only writers. All three stores sit
//! behind one lock, which keeps backup and restore atomic.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::navigation::{FlowState, NavigationFrame, NavigationStack};
use crate::resolver::{self, ResolveContext};
use crate::session::{now_ms, SessionStore};

#[derive(Clone, Debug)]
struct ContextState {
    session: SessionStore,
    navigation: NavigationStack,
    flow_state: FlowState,
}

/// Deep copy of the whole context, for "cancel changes" rollback
#[derive(Clone, Debug, Serialize)]
pub struct ContextBackup {
    session: SessionStore,
    navigation: NavigationStack,
    flow_state: FlowState,
    /// When the backup was taken (Unix timestamp ms)
    pub taken_at: u64,
}

impl ContextBackup {
    /// Frame that was current when the backup was taken
    #[must_use]
    pub fn current_frame(&self) -> &NavigationFrame {
        self.navigation.current()
    }

    /// Session data captured by the backup
    #[must_use]
    pub fn session(&self) -> &Map<String, Value> {
        self.session.as_map()
    }
}

/// Result of a back navigation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackOutcome {
    /// Frames removed, most recent first
    pub popped: Vec<NavigationFrame>,
    /// Whether session data was cleared
    pub cleared_session: bool,
}

/// Shared session + navigation + flow state
#[derive(Debug)]
pub struct FlowContext {
    state: RwLock<ContextState>,
}

impl FlowContext {
    /// Create a context whose navigation starts at `root`
    #[must_use]
    pub fn new(root: NavigationFrame) -> Self {
        Self {
            state: RwLock::new(ContextState {
                session: SessionStore::new(),
                navigation: NavigationStack::new(root),
                flow_state: FlowState::new(),
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// One session value (cloned); `None` on miss
    #[must_use]
    pub fn session_value(&self, key: &str) -> Option<Value> {
        self.state.read().session.get(key).cloned()
    }

    /// Deep copy of all session data
    #[must_use]
    pub fn session_snapshot(&self) -> Map<String, Value> {
        self.state.read().session.snapshot()
    }

    /// The current location
    #[must_use]
    pub fn current_frame(&self) -> NavigationFrame {
        self.state.read().navigation.current().clone()
    }

    /// Every frame, root first
    #[must_use]
    pub fn frames(&self) -> Vec<NavigationFrame> {
        self.state.read().navigation.frames().to_vec()
    }

    /// Stack depth (always at least 1)
    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.read().navigation.len()
    }

    /// Whether back navigation is possible
    #[must_use]
    pub fn can_go_back(&self) -> bool {
        self.state.read().navigation.can_go_back()
    }

    /// Per-flow UI state of `flow_id`
    #[must_use]
    pub fn flow_state(&self, flow_id: &str) -> Option<Value> {
        self.state.read().flow_state.get(flow_id).cloned()
    }

    /// Resolve a template against session data and `fields`
    #[must_use]
    pub fn resolve(&self, template: &str, fields: &Map<String, Value>) -> String {
        let state = self.state.read();
        let ctx = ResolveContext::new()
            .with_session(state.session.as_map())
            .with_fields(fields);
        resolver::resolve(template, &ctx)
    }

    /// Resolve a JSON tree with optional ephemeral `response`/`error` scopes
    #[must_use]
    pub fn resolve_value(
        &self,
        value: &Value,
        fields: &Map<String, Value>,
        response: Option<&Value>,
        error: Option<&Value>,
    ) -> Value {
        self.with_resolve_context(fields, response, error, |ctx| {
            resolver::resolve_value(value, ctx)
        })
    }

    /// Run `f` with a resolve context over the live session data.
    ///
    /// The read lock is held while `f` runs; `f` must not call back into
    /// this context's writers.
    pub fn with_resolve_context<R>(
        &self,
        fields: &Map<String, Value>,
        response: Option<&Value>,
        error: Option<&Value>,
        f: impl FnOnce(&ResolveContext<'_>) -> R,
    ) -> R {
        let state = self.state.read();
        let ctx = ResolveContext::new()
            .with_session(state.session.as_map())
            .with_fields(fields)
            .with_response(response)
            .with_error(error);
        f(&ctx)
    }

    /// Deep copy of session, navigation and flow state
    #[must_use]
    pub fn create_backup(&self) -> ContextBackup {
        let state = self.state.read();
        ContextBackup {
            session: state.session.clone(),
            navigation: state.navigation.clone(),
            flow_state: state.flow_state.clone(),
            taken_at: now_ms(),
        }
    }

    // =========================================================================
    // Writes (crate-private)
    // =========================================================================

    pub(crate) fn set_session(&self, key: impl Into<String>, value: Value) {
        self.state.write().session.set(key, value);
    }

    pub(crate) fn remove_session(&self, key: &str) -> Option<Value> {
        self.state.write().session.remove(key)
    }

    pub(crate) fn merge_session(&self, partial: Map<String, Value>) -> Vec<String> {
        self.state.write().session.merge(partial)
    }

    /// Merge `data` into the session, then push a frame
    pub(crate) fn push_navigation(
        &self,
        flow_id: &str,
        screen_id: &str,
        data: Option<Map<String, Value>>,
    ) -> Vec<String> {
        let mut state = self.state.write();
        let merged = data.map(|d| state.session.merge(d)).unwrap_or_default();
        state.navigation.push(flow_id, screen_id);
        merged
    }

    pub(crate) fn replace_screen(&self, screen_id: &str) {
        self.state.write().navigation.replace_screen(screen_id);
    }

    /// Pop up to `steps` frames. With `clear_data`, also clear the session and
    /// drop flow state of flows that are no longer on the stack.
    pub(crate) fn go_back(&self, steps: usize, clear_data: bool) -> BackOutcome {
        let mut state = self.state.write();
        let popped = state.navigation.go_back(steps);
        if clear_data {
            state.session.clear();
            let ContextState {
                navigation,
                flow_state,
                ..
            } = &mut *state;
            flow_state.retain(|flow_id| navigation.contains_flow(flow_id));
        }
        BackOutcome {
            popped,
            cleared_session: clear_data,
        }
    }

    pub(crate) fn set_flow_state(&self, flow_id: &str, value: Value) {
        self.state.write().flow_state.set(flow_id, value);
    }

    pub(crate) fn restore_from_backup(&self, backup: &ContextBackup) {
        let mut state = self.state.write();
        state.session = backup.session.clone();
        state.navigation = backup.navigation.clone();
        state.flow_state = backup.flow_state.clone();
        tracing::info!(
            frame = %state.navigation.current(),
            taken_at = backup.taken_at,
            "Context restored from backup"
        );
    }

    /// Clear everything and restart navigation at `root`
    pub(crate) fn reset(&self, root: NavigationFrame) {
        let mut state = self.state.write();
        state.session.clear();
        state.flow_state.clear();
        state.navigation.reset(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_push_with_data_then_resolve() {
        let ctx = FlowContext::new(NavigationFrame::new("auth", "login"));
        ctx.push_navigation("dashboard", "home", Some(obj(json!({"username": "ann"}))));

        assert_eq!(ctx.resolve("Hi ${navigationData.username}", &Map::new()), "Hi ann");
        assert_eq!(ctx.current_frame(), NavigationFrame::new("dashboard", "home"));
        assert_eq!(ctx.depth(), 2);
    }

    #[test]
    fn test_go_back_with_clear_data() {
        let ctx = FlowContext::new(NavigationFrame::new("auth", "login"));
        ctx.set_flow_state("auth", json!({"draft": "a"}));
        ctx.push_navigation("checkout", "cart", Some(obj(json!({"cart": [1]}))));
        ctx.set_flow_state("checkout", json!({"step": 1}));

        let outcome = ctx.go_back(5, true);

        assert_eq!(outcome.popped, vec![NavigationFrame::new("checkout", "cart")]);
        assert!(outcome.cleared_session);
        assert!(ctx.session_snapshot().is_empty());
        assert_eq!(ctx.flow_state("checkout"), None);
        assert_eq!(ctx.flow_state("auth"), Some(json!({"draft": "a"})));
    }

    #[test]
    fn test_go_back_keeps_data_by_default() {
        let ctx = FlowContext::new(NavigationFrame::new("auth", "login"));
        ctx.push_navigation("dashboard", "home", Some(obj(json!({"user": "ann"}))));

        ctx.go_back(1, false);

        assert_eq!(ctx.session_value("user"), Some(json!("ann")));
        assert!(!ctx.can_go_back());
    }

    #[test]
    fn test_backup_and_restore_roll_back_everything() {
        let ctx = FlowContext::new(NavigationFrame::new("profile", "view"));
        ctx.merge_session(obj(json!({"name": "ann"})));
        let backup = ctx.create_backup();

        ctx.push_navigation("profile", "edit", None);
        ctx.merge_session(obj(json!({"name": "bob"})));
        ctx.set_flow_state("profile", json!({"draft": "bob"}));

        ctx.restore_from_backup(&backup);

        assert_eq!(ctx.session_value("name"), Some(json!("ann")));
        assert_eq!(ctx.current_frame(), NavigationFrame::new("profile", "view"));
        assert_eq!(ctx.flow_state("profile"), None);
        assert_eq!(backup.current_frame(), &NavigationFrame::new("profile", "view"));
    }

    #[test]
    fn test_backup_is_deep_copy() {
        let ctx = FlowContext::new(NavigationFrame::new("a", "1"));
        ctx.merge_session(obj(json!({"list": [1]})));
        let backup = ctx.create_backup();

        ctx.merge_session(obj(json!({"list": [1, 2]})));

        assert_eq!(backup.session().get("list"), Some(&json!([1])));
    }

    #[test]
    fn test_set_and_remove_single_key() {
        let ctx = FlowContext::new(NavigationFrame::new("a", "1"));
        ctx.set_session("cart", json!({"items": [1, 2]}));

        assert_eq!(ctx.resolve("${navigationData.cart}", &Map::new()), r#"{"items":[1,2]}"#);
        assert_eq!(ctx.remove_session("cart"), Some(json!({"items": [1, 2]})));
        assert_eq!(ctx.remove_session("cart"), None);
        assert!(ctx.session_snapshot().is_empty());
    }

    #[test]
    fn test_reset_clears_all() {
        let ctx = FlowContext::new(NavigationFrame::new("dashboard", "home"));
        ctx.push_navigation("settings", "main", Some(obj(json!({"x": 1}))));
        ctx.set_flow_state("settings", json!({}));

        ctx.reset(NavigationFrame::new("auth", "login"));

        assert_eq!(ctx.depth(), 1);
        assert!(ctx.session_snapshot().is_empty());
        assert_eq!(ctx.flow_state("settings"), None);
        assert!(!ctx.can_go_back());
    }
}
