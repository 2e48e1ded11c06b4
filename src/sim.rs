//! Simulated wearables.
//!
//! Each simulated wearable runs its own sampling loop producing a sinusoidal
//! heart-rate signal, and a single pump task publishes the latest samples into
//! the registry so simulated devices flow through the exact same pipeline as
//! physical ones.

use crate::protocol::data::{Color, WearableCommand, WearableSample};
use crate::registry::Registry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often the pump publishes simulated samples into the registry.
pub const PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// Synthetic ips count up from here, so the first instance is
/// `simulated-1001`.
const FIRST_SEQ: i32 = 1000;

/// Externally visible configuration of one simulated wearable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimConfig {
    pub ip: String,
    pub id: i32,
    pub base_heart_rate: i32,
    pub amplitude: f64,
    pub speed_hz: f64,
    pub interval_ms: f64,
    pub color: Color,
}

#[derive(Debug, Clone)]
struct SimState {
    id: i32,
    base_heart_rate: i32,
    amplitude: f64,
    speed_hz: f64,
    interval_ms: f64,
    color: Color,
    latest: WearableSample,
}

/// Heart-rate waveform sample. Pure function of its inputs; a flat
/// configuration (zero amplitude or zero speed) produces the base rate
/// exactly.
pub fn compute_heart_rate(base: i32, amplitude: f64, speed_hz: f64, elapsed_secs: f64) -> i32 {
    let mut value = base as f64;
    if amplitude != 0.0 && speed_hz != 0.0 {
        value += amplitude * (TAU * speed_hz * elapsed_secs).sin();
    }
    (value.round() as i32).max(0)
}

/// One simulated wearable. Cheap to share; the sampling loop and the control
/// plane both mutate the same state under a short-held lock.
pub struct SimulatedWearable {
    ip: String,
    started: Instant,
    state: Mutex<SimState>,
}

impl SimulatedWearable {
    fn new(ip: String) -> Self {
        let mut rng = rand::thread_rng();
        let color = Color::new(rng.gen(), rng.gen(), rng.gen());
        let state = SimState {
            id: -1,
            base_heart_rate: 60,
            amplitude: 0.0,
            speed_hz: 0.0,
            interval_ms: 100.0,
            color,
            latest: WearableSample {
                id: -1,
                heart_rate: 60,
                color,
                ..WearableSample::default()
            },
        };
        Self {
            ip,
            started: Instant::now(),
            state: Mutex::new(state),
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn config(&self) -> SimConfig {
        let state = self.state.lock();
        SimConfig {
            ip: self.ip.clone(),
            id: state.id,
            base_heart_rate: state.base_heart_rate,
            amplitude: state.amplitude,
            speed_hz: state.speed_hz,
            interval_ms: state.interval_ms,
            color: state.color,
        }
    }

    /// Applies every tunable field; the ip is the instance's identity and
    /// never changes.
    pub fn apply_config(&self, config: &SimConfig) {
        let mut state = self.state.lock();
        state.id = config.id;
        state.base_heart_rate = config.base_heart_rate;
        state.amplitude = config.amplitude;
        state.speed_hz = config.speed_hz;
        state.interval_ms = config.interval_ms;
        state.color = config.color;
    }

    /// Reacts to a routed command the way firmware would.
    pub fn apply_command(&self, cmd: WearableCommand) {
        let mut state = self.state.lock();
        match cmd {
            WearableCommand::Color(color_cmd) => {
                info!(ip = %self.ip, r = color_cmd.color.r, g = color_cmd.color.g,
                    b = color_cmd.color.b, "simulated wearable changing color");
                state.color = color_cmd.color;
            }
            WearableCommand::ReassignId(reassign) => {
                info!(ip = %self.ip, from = state.id, to = reassign.new_id,
                    "simulated wearable reassigning id");
                state.id = reassign.new_id;
            }
        }
    }

    pub fn latest(&self) -> WearableSample {
        self.state.lock().latest.clone()
    }

    /// Sampling loop. Publishes a fresh sample at the configured interval
    /// until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let interval_ms = {
                let mut state = self.state.lock();
                let elapsed = self.started.elapsed();
                let heart_rate = compute_heart_rate(
                    state.base_heart_rate,
                    state.amplitude,
                    state.speed_hz,
                    elapsed.as_secs_f64(),
                );
                state.latest = WearableSample {
                    timestamp: elapsed.as_millis() as i64,
                    id: state.id,
                    heart_rate,
                    color: state.color,
                    received_at: None,
                };
                state.interval_ms
            };

            let pause = Duration::from_secs_f64(interval_ms.max(1.0) / 1000.0);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        info!(ip = %self.ip, "simulated wearable stopped");
    }
}

struct SimInstance {
    wearable: Arc<SimulatedWearable>,
    cancel: CancellationToken,
}

/// Owns every simulated wearable and their lifecycle tokens.
pub struct SimManager {
    instances: DashMap<String, SimInstance>,
    seq: AtomicI32,
}

impl Default for SimManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SimManager {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            seq: AtomicI32::new(FIRST_SEQ),
        }
    }

    /// Creates a simulated wearable with a fresh synthetic ip, spawns its
    /// sampling loop under a child of `parent`, and returns the ip.
    pub fn create(&self, parent: &CancellationToken) -> Option<String> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let ip = format!("simulated-{seq}");
        match self.instances.entry(ip.clone()) {
            Entry::Occupied(_) => {
                warn!(%ip, "synthetic ip already in use");
                None
            }
            Entry::Vacant(vacant) => {
                let wearable = Arc::new(SimulatedWearable::new(ip.clone()));
                let cancel = parent.child_token();
                tokio::spawn(Arc::clone(&wearable).run(cancel.clone()));
                vacant.insert(SimInstance { wearable, cancel });
                info!(%ip, "simulated wearable created");
                Some(ip)
            }
        }
    }

    pub fn apply_config(&self, config: &SimConfig) -> bool {
        match self.instances.get(&config.ip) {
            Some(instance) => {
                instance.wearable.apply_config(config);
                true
            }
            None => false,
        }
    }

    /// Stops the instance's sampling loop and forgets it. The registry entry
    /// it produced ages out through the staleness sweep.
    pub fn remove(&self, ip: &str) -> bool {
        match self.instances.remove(ip) {
            Some((_, instance)) => {
                instance.cancel.cancel();
                info!(%ip, "simulated wearable removed");
                true
            }
            None => false,
        }
    }

    pub fn apply_command(&self, ip: &str, cmd: WearableCommand) -> bool {
        match self.instances.get(ip) {
            Some(instance) => {
                instance.wearable.apply_command(cmd);
                true
            }
            None => false,
        }
    }

    pub fn latest_samples(&self) -> Vec<(String, WearableSample)> {
        self.instances
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().wearable.latest()))
            .collect()
    }

    pub fn configs(&self) -> Vec<SimConfig> {
        self.instances
            .iter()
            .map(|entry| entry.value().wearable.config())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Publishes every simulated wearable's latest sample into the registry at a
/// fixed cadence. Reconciliation commands the registry cannot deliver come
/// back here and are applied in-process.
pub async fn run_sample_pump(
    manager: Arc<SimManager>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(PUMP_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for (ip, sample) in manager.latest_samples() {
                    if let Some(pending) = registry.upsert(&ip, &sample) {
                        if !manager.apply_command(&ip, pending) {
                            warn!(%ip, "undeliverable command for unknown simulated wearable");
                        }
                    }
                }
            }
        }
    }
    info!("simulated sample pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::data::{ColorCommand, ReassignIdCommand};
    use std::collections::HashMap;

    #[test]
    fn flat_waveform_is_exactly_the_base_rate() {
        for elapsed in [0.0, 0.25, 1.0, 17.3] {
            assert_eq!(compute_heart_rate(72, 0.0, 0.0, elapsed), 72);
            assert_eq!(compute_heart_rate(72, 5.0, 0.0, elapsed), 72);
        }
    }

    #[test]
    fn waveform_is_deterministic_for_fixed_inputs() {
        let first = compute_heart_rate(70, 5.5, 0.25, 1.0);
        for _ in 0..200 {
            assert_eq!(compute_heart_rate(70, 5.5, 0.25, 1.0), first);
        }
        // sin(2π·0.25·1.0) = 1, so the peak is exact.
        assert_eq!(first, 76);
    }

    #[test]
    fn waveform_never_goes_negative() {
        for elapsed in [0.0, 0.1, 0.25, 0.5, 0.75, 1.0] {
            assert!(compute_heart_rate(0, 3.0, 1.0, elapsed) >= 0);
        }
    }

    #[test]
    fn waveform_stays_within_the_amplitude_envelope() {
        for elapsed in [0.0, 0.3, 0.7, 2.1] {
            let rate = compute_heart_rate(80, 10.0, 1.0, elapsed);
            assert!((70..=90).contains(&rate), "rate {rate} out of envelope");
        }
    }

    #[tokio::test]
    async fn created_instances_get_distinct_sequential_ips() {
        let manager = SimManager::new();
        let root = CancellationToken::new();
        assert_eq!(manager.create(&root).as_deref(), Some("simulated-1001"));
        assert_eq!(manager.create(&root).as_deref(), Some("simulated-1002"));
        assert_eq!(manager.len(), 2);
        root.cancel();
    }

    #[tokio::test]
    async fn apply_config_changes_everything_but_the_ip() {
        let manager = SimManager::new();
        let root = CancellationToken::new();
        let ip = manager.create(&root).unwrap();

        let config = SimConfig {
            ip: ip.clone(),
            id: 4,
            base_heart_rate: 110,
            amplitude: 8.0,
            speed_hz: 0.5,
            interval_ms: 50.0,
            color: Color::new(1, 2, 3),
        };
        assert!(manager.apply_config(&config));
        let configs = manager.configs();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0], config);
        root.cancel();
    }

    #[tokio::test]
    async fn commands_mutate_simulated_state() {
        let manager = SimManager::new();
        let root = CancellationToken::new();
        let ip = manager.create(&root).unwrap();

        assert!(manager.apply_command(
            &ip,
            WearableCommand::ReassignId(ReassignIdCommand { id: -1, new_id: 9 })
        ));
        assert!(manager.apply_command(
            &ip,
            WearableCommand::Color(ColorCommand {
                id: 9,
                color: Color::new(0, 255, 0),
            })
        ));

        let config = &manager.configs()[0];
        assert_eq!(config.id, 9);
        assert_eq!(config.color, Color::new(0, 255, 0));
        root.cancel();
    }

    #[tokio::test]
    async fn unknown_ip_is_reported() {
        let manager = SimManager::new();
        assert!(!manager.remove("simulated-9999"));
        assert!(!manager.apply_command(
            "simulated-9999",
            WearableCommand::Color(ColorCommand {
                id: 1,
                color: Color::default(),
            })
        ));
    }

    #[tokio::test]
    async fn pump_publishes_into_registry() {
        let manager = Arc::new(SimManager::new());
        let registry = Arc::new(Registry::new(HashMap::new()));
        let root = CancellationToken::new();
        let ip = manager.create(&root).unwrap();

        let pump = tokio::spawn(run_sample_pump(
            Arc::clone(&manager),
            Arc::clone(&registry),
            root.child_token(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        root.cancel();
        pump.await.unwrap();

        let sample = registry.get(&ip).expect("pumped sample");
        assert_eq!(sample.heart_rate, 60);
    }
}
