//! Screenflow Core - Headless Flow & Interaction Engine
//!
//! Drives multi-screen UIs that are described as JSON. Screens declare what
//! their controls do as action descriptors; this crate executes those actions,
//! keeps session data and navigation history, and hands the renderer a screen
//! descriptor with every `${...}` placeholder resolved. It knows nothing about
//! widgets.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Renderer (widget builder)                    │
//! │                                                                  │
//! │                    SurfaceEvent (up)                             │
//! │                    EngineMessage (down)                          │
//! │                    current_screen() (pull)                       │
//! └───────────────────────────┬──────────────────────────────────────┘
//!                             │
//! ┌───────────────────────────┼──────────────────────────────────────┐
//! │                    SCREENFLOW CORE                               │
//! │  ┌────────────────────────┴────────────────────────────────────┐ │
//! │  │                      FlowEngine                              │ │
//! │  │  ┌──────────────────────────────────────────────────────┐   │ │
//! │  │  │                ActionInterpreter                      │   │ │
//! │  │  └───┬──────────────┬──────────────┬──────────────┬─────┘   │ │
//! │  │  ┌───┴──────┐  ┌────┴─────┐  ┌─────┴────┐  ┌──────┴──────┐  │ │
//! │  │  │  Flow    │  │  Flow    │  │ Callback │  │  Network    │  │ │
//! │  │  │ Context  │  │  Cache   │  │ Registry │  │  Client     │  │ │
//! │  │  └──────────┘  └──────────┘  └──────────┘  └─────────────┘  │ │
//! │  └─────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`FlowEngine`]: Facade owning one context, cache, registry and interpreter
//! - [`FlowContext`]: Session data, navigation stack and per-flow state
//! - [`FlowCache`]: Loads, validates and caches flow descriptors
//! - [`CallbackRegistry`]: Named host handlers for `custom` / `executeCallback`
//! - [`ActionInterpreter`]: Executes action triggers with `onSuccess` / `onError`
//! - [`resolve`]: `${navigationData.x}` / `${fields.x}` interpolation
//!
//! # Quick Start
//!
//! ```ignore
//! use screenflow_core::{EngineConfig, FlowEngine, FsAssetLoader, HttpNetworkClient, SurfaceEvent};
//! use serde_json::{json, Map};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::default();
//!     let network = Arc::new(HttpNetworkClient::from_settings(&config.network)?);
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!
//!     let engine = FlowEngine::start(config, Arc::new(FsAssetLoader::new(".")), network, tx, "auth").await?;
//!     engine.registry().register_sync("track", |_| Ok(None));
//!
//!     engine
//!         .handle_event(SurfaceEvent::action(json!({"action": "navigate", "screen": "register"})))
//!         .await?;
//!
//!     while let Ok(msg) = rx.try_recv() {
//!         if msg.requires_render() {
//!             let screen = engine.current_screen(&Map::new()).await?;
//!             // build widgets from screen.descriptor
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`actions`]: Action descriptors and triggers
//! - [`callbacks`]: Callback registry
//! - [`config`]: TOML + environment configuration
//! - [`context`]: Shared session/navigation/flow state
//! - [`engine`]: The `FlowEngine` facade
//! - [`error`]: Error taxonomy
//! - [`events`]: Events from the renderer
//! - [`flow`]: Flow descriptors, loader trait and cache
//! - [`interpreter`]: Action execution
//! - [`messages`]: Messages to the renderer
//! - [`navigation`]: Navigation stack and per-flow state
//! - [`network`]: HTTP collaborator for `apiCall`
//! - [`resolver`]: Placeholder interpolation
//! - [`session`]: Session key/value store
//! - [`telemetry`]: Tracing subscriber bootstrap

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actions;
pub mod callbacks;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod flow;
pub mod interpreter;
pub mod messages;
pub mod navigation;
pub mod network;
pub mod resolver;
pub mod session;
pub mod telemetry;

// Re-exports for convenience
pub use actions::{ActionDescriptor, ActionKind, ActionTrigger};
pub use callbacks::{CallbackError, CallbackParams, CallbackRegistry, CallbackResult};
pub use context::{BackOutcome, ContextBackup, FlowContext};
pub use engine::{FlowEngine, ResolvedScreen};
pub use error::{EngineError, EngineResult};
pub use events::SurfaceEvent;
pub use flow::{AssetTextLoader, CacheStats, FlowCache, FlowDescriptor, FlowSources, FsAssetLoader, PreloadReport};
pub use interpreter::{ActionInterpreter, InterpreterState};
pub use messages::{EngineMessage, NotifyLevel};
pub use navigation::{FlowState, NavigationFrame, NavigationStack};
pub use network::{ApiRequest, ApiResponse, HttpMethod, HttpNetworkClient, NetworkClient};
pub use resolver::{resolve, resolve_screen, resolve_value, ResolveContext};
pub use session::{SessionMetadata, SessionStore};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigSource,
    EngineConfig, FlowSettings, NetworkSettings,
};
