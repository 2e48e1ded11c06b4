//! Frontend bridge.
//!
//! Outbound, the bridge pushes the registry's samples (and simulator configs)
//! to a REST frontend at a fixed cadence, backing off when the frontend is
//! unreachable. Inbound, a small HTTP listener accepts simulator control
//! requests and feeds them to the simulation manager through a channel.

use crate::protocol::data::{Color, WearableSample};
use crate::registry::Registry;
use crate::sim::{SimConfig, SimManager};
use axum::extract::State;
use axum::routing::post;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cadence of frontend pushes while the frontend is healthy.
pub const PUSH_INTERVAL: Duration = Duration::from_millis(100);
/// Pause after a failed push before trying again.
pub const PUSH_BACKOFF: Duration = Duration::from_secs(1);

/// HTTP client for the frontend's wearable and simulator endpoints.
pub struct FrontendSender {
    client: reqwest::Client,
    data_url: String,
    sim_url: String,
}

impl FrontendSender {
    pub fn new(
        data_url: String,
        sim_url: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            data_url,
            sim_url,
        })
    }

    pub async fn push_samples(&self, samples: &[WearableSample]) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.data_url)
            .json(samples)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn push_sim_configs(&self, configs: &[SimConfig]) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.sim_url)
            .json(configs)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Pushes registry samples (and simulator configs when simulation is on) to
/// the frontend until cancelled. A failed push switches to the backoff pause;
/// the frontend being down must not affect the TCP pipeline.
pub async fn run_push_loop(
    sender: FrontendSender,
    registry: Arc<Registry>,
    sims: Option<Arc<SimManager>>,
    cancel: CancellationToken,
) {
    loop {
        let samples: Vec<WearableSample> = registry
            .all_samples()
            .into_iter()
            .map(|(_, sample)| sample)
            .collect();
        let mut healthy = match sender.push_samples(&samples).await {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "frontend sample push failed");
                false
            }
        };
        if let Some(sims) = &sims {
            if healthy {
                if let Err(err) = sender.push_sim_configs(&sims.configs()).await {
                    debug!(error = %err, "frontend simulator push failed");
                    healthy = false;
                }
            }
        }

        let pause = if healthy { PUSH_INTERVAL } else { PUSH_BACKOFF };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
    info!("frontend push loop stopped");
}

/// One simulator control request from the frontend. Every field defaults, so
/// the frontend only sends what it means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlRequest {
    pub action: String,
    pub ip: String,
    pub id: i32,
    pub base_heart_rate: i32,
    pub amplitude: f64,
    pub speed_hz: f64,
    pub interval_ms: f64,
    pub color: Color,
}

impl Default for ControlRequest {
    fn default() -> Self {
        Self {
            action: String::new(),
            ip: String::new(),
            id: -1,
            base_heart_rate: 90,
            amplitude: 1.0,
            speed_hz: 1.0,
            interval_ms: 100.0,
            color: Color::default(),
        }
    }
}

/// Serves `POST /api/control` on `addr`, forwarding each request into the
/// control channel. Backpressure on the channel drops the request.
pub async fn run_control_listener(
    addr: std::net::SocketAddr,
    tx: mpsc::Sender<ControlRequest>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let app = axum::Router::new()
        .route("/api/control", post(handle_control))
        .with_state(tx);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "control listener started");
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}

async fn handle_control(
    State(tx): State<mpsc::Sender<ControlRequest>>,
    Json(request): Json<ControlRequest>,
) -> Json<serde_json::Value> {
    if let Err(err) = tx.try_send(request) {
        warn!(error = %err, "control request dropped");
    }
    Json(json!({"ok": true}))
}

/// Applies control requests to the simulation manager until the channel
/// closes or the server shuts down.
pub async fn run_control_handler(
    mut rx: mpsc::Receiver<ControlRequest>,
    manager: Arc<SimManager>,
    registry: Arc<Registry>,
    root: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            _ = root.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        apply_control(&request, &manager, &registry, &root);
    }
    info!("control handler stopped");
}

/// Dispatches one control request. A create ignores the tunable fields; the
/// frontend configures the new instance with a follow-up update once it
/// learns the ip.
pub fn apply_control(
    request: &ControlRequest,
    manager: &SimManager,
    registry: &Registry,
    root: &CancellationToken,
) {
    match request.action.as_str() {
        "create" => {
            if let Some(ip) = manager.create(root) {
                info!(%ip, "simulated wearable created by control request");
            }
        }
        "update" => {
            if request.ip.is_empty() {
                warn!("ignoring update without an ip");
                return;
            }
            let config = SimConfig {
                ip: request.ip.clone(),
                id: request.id,
                base_heart_rate: request.base_heart_rate,
                amplitude: request.amplitude,
                speed_hz: request.speed_hz,
                interval_ms: request.interval_ms,
                color: request.color,
            };
            if !manager.apply_config(&config) {
                warn!(ip = %request.ip, "update for unknown simulated wearable");
            }
        }
        "delete" => {
            if request.ip.is_empty() {
                warn!("ignoring delete without an ip");
                return;
            }
            if manager.remove(&request.ip) {
                registry.remove(&request.ip);
            } else {
                warn!(ip = %request.ip, "delete for unknown simulated wearable");
            }
        }
        other => {
            warn!(action = %other, "unknown control action");
        }
    }
}
