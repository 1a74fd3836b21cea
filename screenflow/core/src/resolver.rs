//! Variable Resolver
//!
//! Substitutes `${scope.key}` placeholders in strings and JSON trees.
//!
//! Two scopes are always available:
//!
//! - `${navigationData.<key>}` reads session data
//! - `${fields.<key>}` reads the caller-supplied field values
//!
//! Action continuations additionally see `${response.<key>}` and
//! `${error.<key>}`. A scalar response is reachable as `${response.value}`.
//!
//! Resolution never fails. A placeholder that cannot be resolved (unknown
//! scope, missing key, `null` value) is left in the output verbatim so it
//! shows up on screen as a debugging aid. Resolution is single-pass:
//! substituted text is never scanned again.

use serde_json::{Map, Value};

/// Scope backed by the session store
pub const SESSION_SCOPE: &str = "navigationData";
/// Scope backed by the local field values of the current screen
pub const FIELDS_SCOPE: &str = "fields";
/// Ephemeral scope holding the result of the parent action
pub const RESPONSE_SCOPE: &str = "response";
/// Ephemeral scope holding the failure of the parent action
pub const ERROR_SCOPE: &str = "error";

/// Marks an action descriptor inside a screen
const ACTION_KEY: &str = "action";

/// A piece of a scanned template
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'a> {
    /// Text copied to the output unchanged
    Literal(&'a str),
    /// A well-formed `${scope.key}` reference
    Placeholder {
        /// The full placeholder text, including `${` and `}`
        raw: &'a str,
        /// Scope name (left of the dot)
        scope: &'a str,
        /// Key within the scope (right of the dot)
        key: &'a str,
    },
}

/// Split a template into literals and placeholders.
///
/// Malformed references (`${}`, `${nodot}`, `${a.b-c}`, an unterminated
/// `${`) are part of the surrounding literal text.
#[must_use]
pub fn tokenize(template: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some(offset) = template[cursor..].find("${") {
        let open = cursor + offset;
        let Some(close_offset) = template[open + 2..].find('}') else {
            break;
        };
        let close = open + 2 + close_offset;

        match split_reference(&template[open + 2..close]) {
            Some((scope, key)) => {
                if literal_start < open {
                    tokens.push(Token::Literal(&template[literal_start..open]));
                }
                tokens.push(Token::Placeholder {
                    raw: &template[open..=close],
                    scope,
                    key,
                });
                cursor = close + 1;
                literal_start = cursor;
            }
            // Not a reference; rescan from the next byte so `${${fields.a}`
            // still finds the inner placeholder.
            None => cursor = open + 1,
        }
    }

    if literal_start < template.len() {
        tokens.push(Token::Literal(&template[literal_start..]));
    }
    tokens
}

fn split_reference(inner: &str) -> Option<(&str, &str)> {
    let (scope, key) = inner.split_once('.')?;
    let scope_ok = !scope.is_empty() && scope.bytes().all(|b| b.is_ascii_alphabetic());
    let key_ok = !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    (scope_ok && key_ok).then_some((scope, key))
}

/// The data a template is resolved against
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolveContext<'a> {
    session: Option<&'a Map<String, Value>>,
    fields: Option<&'a Map<String, Value>>,
    response: Option<&'a Value>,
    error: Option<&'a Value>,
}

impl<'a> ResolveContext<'a> {
    /// An empty context; every placeholder stays unresolved
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach session data (`navigationData` scope)
    #[must_use]
    pub fn with_session(mut self, session: &'a Map<String, Value>) -> Self {
        self.session = Some(session);
        self
    }

    /// Attach field values (`fields` scope)
    #[must_use]
    pub fn with_fields(mut self, fields: &'a Map<String, Value>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Attach the parent action's result (`response` scope)
    #[must_use]
    pub fn with_response(mut self, response: Option<&'a Value>) -> Self {
        self.response = response;
        self
    }

    /// Attach the parent action's failure (`error` scope)
    #[must_use]
    pub fn with_error(mut self, error: Option<&'a Value>) -> Self {
        self.error = error;
        self
    }

    /// Look up one reference. `null` counts as missing.
    #[must_use]
    pub fn lookup(&self, scope: &str, key: &str) -> Option<&'a Value> {
        let found = match scope {
            SESSION_SCOPE => self.session?.get(key),
            FIELDS_SCOPE => self.fields?.get(key),
            RESPONSE_SCOPE => ephemeral(self.response?, key),
            ERROR_SCOPE => ephemeral(self.error?, key),
            _ => None,
        };
        found.filter(|v| !v.is_null())
    }
}

fn ephemeral<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(key),
        scalar if key == "value" => Some(scalar),
        _ => None,
    }
}

/// Render a value for inline substitution
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve every placeholder in `template`
#[must_use]
pub fn resolve(template: &str, ctx: &ResolveContext<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    for token in tokenize(template) {
        match token {
            Token::Literal(text) => out.push_str(text),
            Token::Placeholder { raw, scope, key } => match ctx.lookup(scope, key) {
                Some(value) => out.push_str(&render(value)),
                None => out.push_str(raw),
            },
        }
    }
    out
}

/// Resolve every string inside a JSON tree.
///
/// A string that is exactly one resolvable placeholder is replaced by the
/// referenced value itself, keeping its JSON type. Object keys are not
/// resolved.
#[must_use]
pub fn resolve_value(value: &Value, ctx: &ResolveContext<'_>) -> Value {
    resolve_tree(value, ctx, false)
}

/// Resolve a screen descriptor for rendering.
///
/// Same as [`resolve_value`], except that action descriptors (objects with an
/// `"action"` key) are copied untouched. They are resolved when they run,
/// against the field values of the triggering event.
#[must_use]
pub fn resolve_screen(value: &Value, ctx: &ResolveContext<'_>) -> Value {
    resolve_tree(value, ctx, true)
}

fn resolve_tree(value: &Value, ctx: &ResolveContext<'_>, skip_actions: bool) -> Value {
    match value {
        Value::String(s) => {
            if let [Token::Placeholder { scope, key, .. }] = tokenize(s).as_slice() {
                if let Some(found) = ctx.lookup(scope, key) {
                    return found.clone();
                }
            }
            Value::String(resolve(s, ctx))
        }
        Value::Object(map) if skip_actions && map.contains_key(ACTION_KEY) => value.clone(),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_tree(v, ctx, skip_actions))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_tree(v, ctx, skip_actions)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve every value of a map, keeping its keys
#[must_use]
pub fn resolve_map(map: &Map<String, Value>, ctx: &ResolveContext<'_>) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, ctx)))
        .collect()
}
