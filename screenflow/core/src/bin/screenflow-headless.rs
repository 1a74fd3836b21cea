//! Screenflow Headless Runner
//!
//! Drives a flow engine without any widget layer. Surface events are read from
//! stdin as JSON lines; engine messages and the resolved current screen are
//! written to stdout as JSON lines.
//!
//! # Usage
//!
//! ```bash
//! # Start at the "auth" flow, reading flows from ./flows
//! screenflow-headless auth
//!
//! # Drive it
//! echo '{"type":"action_triggered","action":{"action":"navigate","screen":"register"}}' \
//!     | screenflow-headless auth
//!
//! # With verbose logging (stderr)
//! RUST_LOG=debug screenflow-headless auth
//! ```
//!
//! # Environment Variables
//!
//! - `SCREENFLOW_FLOW_DIR`: Directory holding `<flowId>.json`
//! - `SCREENFLOW_BASE_URL`: Base URL for `apiCall` endpoints
//! - `SCREENFLOW_TIMEOUT_MS`: Request timeout
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::sync::Arc;

use serde::Serialize;
use serde_json::Map;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use screenflow_core::{
    config::load_config, telemetry::init_tracing, FlowEngine, FsAssetLoader, HttpNetworkClient,
    SurfaceEvent,
};

async fn write_json_line<T: Serialize>(out: &mut tokio::io::Stdout, value: &T) {
    let line = match serde_json::to_string(value) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "Failed to encode output");
            return;
        }
    };
    if let Err(e) = out.write_all(format!("{line}\n").as_bytes()).await {
        warn!(error = %e, "Failed to write to stdout");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info")?;

    let entry_flow = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: screenflow-headless <entry-flow>"))?;

    let config = load_config()?;
    let network = Arc::new(HttpNetworkClient::from_settings(&config.network)?);
    let loader = Arc::new(FsAssetLoader::new("."));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let engine = FlowEngine::start(config, loader, network, tx, &entry_flow).await?;
    info!(frame = %engine.current_frame(), "Engine ready");

    // Drain engine messages concurrently with event handling
    let printer = tokio::spawn(async move {
        let mut out = tokio::io::stdout();
        while let Some(msg) = rx.recv().await {
            write_json_line(&mut out, &msg).await;
        }
        let _ = out.flush().await;
    });

    let mut out = tokio::io::stdout();
    if let Ok(screen) = engine.current_screen(&Map::new()).await {
        write_json_line(&mut out, &screen).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let event: SurfaceEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed event");
                continue;
            }
        };

        let fields = match &event {
            SurfaceEvent::ActionTriggered { fields, .. } => fields.clone(),
            _ => Map::new(),
        };
        if let Err(e) = engine.handle_event(event).await {
            warn!(error = %e, "Event failed");
        }
        match engine.current_screen(&fields).await {
            Ok(screen) => write_json_line(&mut out, &screen).await,
            Err(e) => warn!(error = %e, "Current screen cannot be resolved"),
        }
    }

    info!("Input closed, shutting down");
    drop(engine);
    printer.await?;
    out.flush().await?;
    Ok(())
}
