//! Flow Descriptors and Cache
//!
//! A flow is one JSON document holding a set of screens:
//!
//! ```json
//! {
//!   "type": "flow",
//!   "flowId": "auth",
//!   "properties": { "initialScreen": "login" },
//!   "screens": { "login": { ... }, "register": { ... } }
//! }
//! ```
//!
//! [`FlowCache`] loads descriptors through an [`AssetTextLoader`], validates
//! their shape, and keeps one parsed copy per flow id. Every read hands out a
//! deep copy, so callers can mutate what they get without touching the cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};

/// Value of the `type` field every flow document must carry
pub const FLOW_ROOT_MARKER: &str = "flow";

// =============================================================================
// Loader Collaborator
// =============================================================================

/// Source of raw flow text (assets, disk, network...)
#[async_trait]
pub trait AssetTextLoader: Send + Sync {
    /// Read the whole text at `path`
    async fn load_string(&self, path: &str) -> anyhow::Result<String>;
}

/// Loader reading files relative to a base directory
#[derive(Clone, Debug)]
pub struct FsAssetLoader {
    base_dir: PathBuf,
}

impl FsAssetLoader {
    /// Create a loader rooted at `base_dir`; absolute paths bypass it
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl AssetTextLoader for FsAssetLoader {
    async fn load_string(&self, path: &str) -> anyhow::Result<String> {
        let full = self.base_dir.join(path);
        Ok(tokio::fs::read_to_string(&full).await?)
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// A parsed and validated flow document
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDescriptor {
    /// Flow identifier
    pub flow_id: String,
    /// Flow-level properties (`initialScreen`, theme hints, ...)
    pub properties: Map<String, Value>,
    /// Screen descriptors by id, handed to the renderer after resolution
    pub screens: Map<String, Value>,
}

impl FlowDescriptor {
    /// Parse and validate raw JSON text
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Structure` naming the first offending field.
    pub fn parse(flow_key: &str, text: &str) -> EngineResult<Self> {
        let subject = format!("flow \"{flow_key}\"");
        let root: Value = serde_json::from_str(text)
            .map_err(|e| EngineError::structure(&subject, "<root>", format!("is not valid JSON: {e}")))?;
        Self::from_value(&subject, root)
    }

    fn from_value(subject: &str, root: Value) -> EngineResult<Self> {
        let Value::Object(mut root) = root else {
            return Err(EngineError::structure(subject, "<root>", "must be an object"));
        };

        match root.get("type") {
            Some(Value::String(t)) if t == FLOW_ROOT_MARKER => {}
            Some(_) => {
                return Err(EngineError::structure(
                    subject,
                    "type",
                    format!("must be \"{FLOW_ROOT_MARKER}\""),
                ))
            }
            None => return Err(EngineError::structure(subject, "type", "is missing")),
        }

        let flow_id = match root.remove("flowId") {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(_) => {
                return Err(EngineError::structure(
                    subject,
                    "flowId",
                    "must be a non-empty string",
                ))
            }
            None => return Err(EngineError::structure(subject, "flowId", "is missing")),
        };

        let screens = match root.remove("screens") {
            Some(Value::Object(screens)) if !screens.is_empty() => screens,
            Some(_) => {
                return Err(EngineError::structure(
                    subject,
                    "screens",
                    "must be a non-empty map",
                ))
            }
            None => return Err(EngineError::structure(subject, "screens", "is missing")),
        };

        let properties = match root.remove("properties") {
            Some(Value::Object(props)) => props,
            None | Some(Value::Null) => Map::new(),
            Some(_) => {
                return Err(EngineError::structure(
                    subject,
                    "properties",
                    "must be an object",
                ))
            }
        };

        Ok(Self {
            flow_id,
            properties,
            screens,
        })
    }

    /// Screen to open when entering the flow without an explicit target:
    /// `properties.initialScreen` if it exists, else the first screen.
    #[must_use]
    pub fn initial_screen(&self) -> Option<&str> {
        self.properties
            .get("initialScreen")
            .and_then(Value::as_str)
            .filter(|id| self.screens.contains_key(*id))
            .or_else(|| self.screens.keys().next().map(String::as_str))
    }

    /// Descriptor of `screen_id`
    #[must_use]
    pub fn screen(&self, screen_id: &str) -> Option<&Value> {
        self.screens.get(screen_id)
    }

    /// Whether the flow defines `screen_id`
    #[must_use]
    pub fn has_screen(&self, screen_id: &str) -> bool {
        self.screens.contains_key(screen_id)
    }
}

// =============================================================================
// Source Paths
// =============================================================================

/// Maps flow ids to source paths handed to the loader
#[derive(Clone, Debug, Default)]
pub struct FlowSources {
    directory: PathBuf,
    explicit: HashMap<String, String>,
}

impl FlowSources {
    /// Resolve `<directory>/<flow_id>.json` unless overridden
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            explicit: HashMap::new(),
        }
    }

    /// Pin `flow_id` to a specific path
    #[must_use]
    pub fn with_path(mut self, flow_id: impl Into<String>, path: impl Into<String>) -> Self {
        self.explicit.insert(flow_id.into(), path.into());
        self
    }

    /// Source path of `flow_id`
    #[must_use]
    pub fn path_for(&self, flow_id: &str) -> String {
        if let Some(path) = self.explicit.get(flow_id) {
            return path.clone();
        }
        join_path(&self.directory, &format!("{flow_id}.json"))
    }
}

fn join_path(dir: &Path, file: &str) -> String {
    dir.join(file).to_string_lossy().into_owned()
}

// =============================================================================
// Cache
// =============================================================================

/// A cached, validated descriptor
#[derive(Clone, Debug)]
pub struct CachedFlow {
    /// Cache key (the flow id)
    pub key: String,
    /// Parsed descriptor
    pub descriptor: FlowDescriptor,
    /// When the descriptor was loaded
    pub loaded_at: Instant,
}

enum CacheLookup {
    Hit(FlowDescriptor),
    Miss,
}

/// Cache observability
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cached flows
    pub count: usize,
    /// Cached flow ids, sorted
    pub keys: Vec<String>,
}

/// Outcome of a batch preload
#[derive(Debug, Default)]
pub struct PreloadReport {
    /// Flows that are now cached
    pub loaded: Vec<String>,
    /// Flows that failed, with the reason
    pub failed: Vec<(String, EngineError)>,
}

impl PreloadReport {
    /// Whether every flow loaded
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Loads, validates and caches flow descriptors
pub struct FlowCache {
    loader: Arc<dyn AssetTextLoader>,
    sources: FlowSources,
    entries: RwLock<HashMap<String, CachedFlow>>,
}

impl std::fmt::Debug for FlowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowCache")
            .field("sources", &self.sources)
            .field("cached", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl FlowCache {
    /// Create an empty cache
    pub fn new(loader: Arc<dyn AssetTextLoader>, sources: FlowSources) -> Self {
        Self {
            loader,
            sources,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn lookup(&self, flow_id: &str) -> CacheLookup {
        match self.entries.read().get(flow_id) {
            Some(entry) => CacheLookup::Hit(entry.descriptor.clone()),
            None => CacheLookup::Miss,
        }
    }

    /// Load `flow_id` from `source_path`, or return the cached copy.
    ///
    /// # Errors
    ///
    /// `EngineError::Load` if the loader fails, `EngineError::Structure` if
    /// the document is malformed or declares a different `flowId`.
    pub async fn load_flow(&self, flow_id: &str, source_path: &str) -> EngineResult<FlowDescriptor> {
        if let CacheLookup::Hit(descriptor) = self.lookup(flow_id) {
            tracing::trace!(flow_id = %flow_id, "Flow cache hit");
            return Ok(descriptor);
        }

        tracing::debug!(flow_id = %flow_id, path = %source_path, "Flow cache miss, loading");
        let text = self
            .loader
            .load_string(source_path)
            .await
            .map_err(|e| EngineError::Load {
                path: source_path.to_string(),
                message: e.to_string(),
            })?;

        let descriptor = FlowDescriptor::parse(flow_id, &text)?;
        if descriptor.flow_id != flow_id {
            return Err(EngineError::structure(
                format!("flow \"{flow_id}\""),
                "flowId",
                format!("declares \"{}\"", descriptor.flow_id),
            ));
        }

        self.entries.write().insert(
            flow_id.to_string(),
            CachedFlow {
                key: flow_id.to_string(),
                descriptor: descriptor.clone(),
                loaded_at: Instant::now(),
            },
        );
        tracing::info!(
            flow_id = %flow_id,
            screens = descriptor.screens.len(),
            "Flow loaded"
        );
        Ok(descriptor)
    }

    /// Load `flow_id` from its configured source path
    ///
    /// # Errors
    ///
    /// Same as [`FlowCache::load_flow`].
    pub async fn load(&self, flow_id: &str) -> EngineResult<FlowDescriptor> {
        let path = self.sources.path_for(flow_id);
        self.load_flow(flow_id, &path).await
    }

    /// Load a batch ahead of navigation; failures don't stop the batch
    pub async fn preload_flows<I, S>(&self, flow_ids: I) -> PreloadReport
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = flow_ids.into_iter().map(Into::into).collect();
        let results =
            futures::future::join_all(ids.iter().map(|id| self.load(id))).await;

        let mut report = PreloadReport::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(_) => report.loaded.push(id),
                Err(e) => {
                    tracing::warn!(flow_id = %id, error = %e, "Flow preload failed");
                    report.failed.push((id, e));
                }
            }
        }
        report
    }

    /// Deep copy of a cached descriptor, without loading
    #[must_use]
    pub fn get(&self, flow_id: &str) -> Option<FlowDescriptor> {
        match self.lookup(flow_id) {
            CacheLookup::Hit(descriptor) => Some(descriptor),
            CacheLookup::Miss => None,
        }
    }

    /// Whether `flow_id` is cached
    #[must_use]
    pub fn is_cached(&self, flow_id: &str) -> bool {
        self.entries.read().contains_key(flow_id)
    }

    /// Evict one flow, or everything with `None`
    pub fn clear_cache(&self, flow_id: Option<&str>) {
        let mut entries = self.entries.write();
        match flow_id {
            Some(id) => {
                entries.remove(id);
                tracing::debug!(flow_id = %id, "Flow evicted");
            }
            None => {
                tracing::debug!(count = entries.len(), "Flow cache cleared");
                entries.clear();
            }
        }
    }

    /// Count and keys of cached flows
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            count: keys.len(),
            keys,
        }
    }

    /// The path resolver used by [`FlowCache::load`]
    #[must_use]
    pub fn sources(&self) -> &FlowSources {
        &self.sources
    }
}
