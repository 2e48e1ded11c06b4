//! Live-connection registry.
//!
//! Three concurrent maps keyed by connection ip: last-known telemetry,
//! assigned logical id, and the outbound command sender for connections that
//! have a live writer. The maps are sharded per key, so workers never contend
//! on a single global lock. Every telemetry update runs color reconciliation
//! against the startup preset map.

use crate::protocol::data::{Color, ColorCommand, WearableCommand, WearableSample};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared registry of connected (and simulated) wearables.
#[derive(Debug, Default)]
pub struct Registry {
    samples: DashMap<String, WearableSample>,
    assigned: DashMap<String, i32>,
    outbound: DashMap<String, mpsc::UnboundedSender<WearableCommand>>,
    // Read-only after startup, needs no synchronization.
    presets: HashMap<i32, Color>,
}

impl Registry {
    pub fn new(presets: HashMap<i32, Color>) -> Self {
        Self {
            presets,
            ..Self::default()
        }
    }

    /// Merges a telemetry sample into the entry for `ip`, refreshing its
    /// receipt time and the ip→id mapping, then reconciles the reported color
    /// against any configured preset.
    ///
    /// When reconciliation produces a command but the ip has no live outbound
    /// sender, the command is handed back to the caller (the simulated-sample
    /// pump applies it in-process).
    pub fn upsert(&self, ip: &str, sample: &WearableSample) -> Option<WearableCommand> {
        match self.samples.entry(ip.to_string()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                existing.id = sample.id;
                existing.heart_rate = sample.heart_rate;
                existing.color = sample.color;
                existing.timestamp = sample.timestamp;
                existing.received_at = Some(Instant::now());
            }
            Entry::Vacant(vacant) => {
                // Receipt time stays unset until the first merge or staleness
                // check; a brand-new entry is fresh exactly once.
                vacant.insert(sample.clone());
            }
        }

        match self.assigned.entry(ip.to_string()) {
            Entry::Occupied(mut occupied) => {
                let previous = *occupied.get();
                if previous != sample.id {
                    // Expected when a wearable restarts and keeps its ip.
                    warn!(%ip, previous, new = sample.id, "assigned id changed for known ip");
                }
                *occupied.get_mut() = sample.id;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(sample.id);
            }
        }

        let preset = self.presets.get(&sample.id)?;
        if sample.color == *preset {
            return None;
        }
        let cmd = WearableCommand::Color(ColorCommand {
            id: sample.id,
            color: *preset,
        });
        if self.enqueue(ip, cmd) {
            debug!(%ip, id = sample.id, "enqueued reconciliation color command");
            None
        } else {
            Some(cmd)
        }
    }

    pub fn get(&self, ip: &str) -> Option<WearableSample> {
        self.samples.get(ip).map(|entry| entry.value().clone())
    }

    /// Removes the telemetry entry and id mapping for `ip`. The outbound
    /// sender is left alone; the socket lifecycle owns it.
    pub fn remove(&self, ip: &str) {
        self.samples.remove(ip);
        self.assigned.remove(ip);
    }

    pub fn all_samples(&self) -> Vec<(String, WearableSample)> {
        self.samples
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn assigned_id(&self, ip: &str) -> Option<i32> {
        self.assigned.get(ip).map(|entry| *entry.value())
    }

    /// All ips currently assigned the given logical id. More than one entry
    /// is a transient conflict the router refuses to guess about.
    pub fn ips_assigned_to(&self, id: i32) -> Vec<String> {
        self.assigned
            .iter()
            .filter(|entry| *entry.value() == id)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Installs a fresh outbound channel for `ip` and returns its receiving
    /// end for the connection's writer task. Replaces any prior sender.
    pub fn register_outbound(&self, ip: &str) -> mpsc::UnboundedReceiver<WearableCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound.insert(ip.to_string(), tx);
        rx
    }

    pub fn release_outbound(&self, ip: &str) {
        self.outbound.remove(ip);
    }

    pub fn has_outbound(&self, ip: &str) -> bool {
        self.outbound.contains_key(ip)
    }

    /// Enqueues a command for `ip`'s writer. FIFO per ip; the channel doubles
    /// as the release signal. Returns false when no live sender exists.
    pub fn enqueue(&self, ip: &str, cmd: WearableCommand) -> bool {
        match self.outbound.get(ip) {
            Some(sender) => sender.send(cmd).is_ok(),
            None => false,
        }
    }

    /// Evicts every entry whose telemetry is stale at `now`, returning the
    /// affected ips. Unset receipt times are initialized here (fresh once).
    pub fn evict_stale(&self, now: Instant) -> Vec<String> {
        let mut stale = Vec::new();
        for mut entry in self.samples.iter_mut() {
            let (ip, sample) = entry.pair_mut();
            if sample.is_stale(now) {
                stale.push(ip.clone());
            }
        }
        for ip in &stale {
            self.samples.remove(ip);
            self.assigned.remove(ip);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Loads the startup color preset map from a JSON array of `{id, color}`.
/// A missing file is not an error; an unreadable one is logged and skipped.
pub fn load_color_presets(path: &Path) -> HashMap<i32, Color> {
    let mut presets = HashMap::new();
    if !path.exists() {
        return presets;
    }
    info!(path = %path.display(), "loading wearable color presets");

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to read color preset file");
            return presets;
        }
    };
    let entries: Vec<ColorCommand> = match serde_json::from_str(&contents) {
        Ok(entries) => entries,
        Err(err) => {
            error!(path = %path.display(), error = %err, "failed to parse color preset file");
            return presets;
        }
    };
    for entry in entries {
        info!(id = entry.id, r = entry.color.r, g = entry.color.g, b = entry.color.b,
            "color preset loaded");
        presets.insert(entry.id, entry.color);
    }
    presets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample(id: i32, color: Color) -> WearableSample {
        WearableSample {
            id,
            heart_rate: 70,
            timestamp: 1,
            color,
            received_at: None,
        }
    }

    fn preset_map(id: i32, color: Color) -> HashMap<i32, Color> {
        let mut map = HashMap::new();
        map.insert(id, color);
        map
    }

    #[test]
    fn upsert_records_sample_and_assigned_id() {
        let registry = Registry::new(HashMap::new());
        assert!(registry.upsert("10.0.0.5", &sample(1, Color::default())).is_none());

        let stored = registry.get("10.0.0.5").unwrap();
        assert_eq!(stored.id, 1);
        assert_eq!(stored.heart_rate, 70);
        assert_eq!(registry.assigned_id("10.0.0.5"), Some(1));
    }

    #[test]
    fn upsert_moves_mapping_when_id_changes() {
        let registry = Registry::new(HashMap::new());
        registry.upsert("10.0.0.5", &sample(1, Color::default()));
        registry.upsert("10.0.0.5", &sample(2, Color::default()));
        assert_eq!(registry.assigned_id("10.0.0.5"), Some(2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn upsert_refreshes_receipt_time_in_place() {
        let registry = Registry::new(HashMap::new());
        registry.upsert("ip", &sample(1, Color::default()));
        registry.upsert("ip", &sample(1, Color::default()));
        assert!(registry.get("ip").unwrap().received_at.is_some());
    }

    #[test]
    fn reconciliation_enqueues_exactly_once() {
        let preset = Color::new(10, 20, 30);
        let registry = Registry::new(preset_map(1, preset));
        let mut rx = registry.register_outbound("ip");

        // Wrong color: exactly one correction lands in the queue.
        assert!(registry.upsert("ip", &sample(1, Color::default())).is_none());
        assert_eq!(
            rx.try_recv().ok(),
            Some(WearableCommand::Color(ColorCommand { id: 1, color: preset }))
        );
        assert!(rx.try_recv().is_err());

        // Corrected color: nothing further.
        assert!(registry.upsert("ip", &sample(1, preset)).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reconciliation_without_sender_returns_pending_command() {
        let preset = Color::new(1, 2, 3);
        let registry = Registry::new(preset_map(5, preset));
        let pending = registry.upsert("simulated-1001", &sample(5, Color::default()));
        assert_eq!(
            pending,
            Some(WearableCommand::Color(ColorCommand { id: 5, color: preset }))
        );
    }

    #[test]
    fn no_preset_means_no_reconciliation() {
        let registry = Registry::new(preset_map(9, Color::new(1, 1, 1)));
        let mut rx = registry.register_outbound("ip");
        assert!(registry.upsert("ip", &sample(1, Color::default())).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn evict_stale_removes_entry_and_mapping_but_keeps_outbound() {
        let registry = Registry::new(HashMap::new());
        let _rx = registry.register_outbound("ip");
        registry.upsert("ip", &sample(1, Color::default()));
        registry.upsert("ip", &sample(1, Color::default()));

        // Not stale yet.
        assert!(registry.evict_stale(Instant::now()).is_empty());

        let evicted = registry.evict_stale(Instant::now() + Duration::from_secs(2));
        assert_eq!(evicted, vec!["ip".to_string()]);
        assert!(registry.get("ip").is_none());
        assert!(registry.assigned_id("ip").is_none());
        assert!(registry.has_outbound("ip"));
    }

    #[test]
    fn fresh_entry_survives_its_first_sweep() {
        let registry = Registry::new(HashMap::new());
        // Vacant-path insert leaves the receipt time unset.
        registry.upsert("ip", &sample(1, Color::default()));
        let far_future = Instant::now() + Duration::from_secs(60);
        assert!(registry.evict_stale(far_future).is_empty());
        assert!(!registry.evict_stale(far_future + Duration::from_secs(2)).is_empty());
    }

    #[test]
    fn enqueue_without_sender_reports_failure() {
        let registry = Registry::new(HashMap::new());
        assert!(!registry.enqueue(
            "nowhere",
            WearableCommand::Color(ColorCommand {
                id: 1,
                color: Color::default(),
            })
        ));
    }

    #[test]
    fn load_presets_missing_file_is_empty() {
        let presets = load_color_presets(Path::new("definitely-not-here.json"));
        assert!(presets.is_empty());
    }

    #[test]
    fn load_presets_parses_id_color_pairs() {
        let dir = std::env::temp_dir().join("pulsebridge-preset-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wearable_colors.json");
        std::fs::write(
            &path,
            r#"[{"id":1,"color":{"r":255,"g":0,"b":0}},{"id":2,"color":{"r":0,"g":0,"b":255}}]"#,
        )
        .unwrap();

        let presets = load_color_presets(&path);
        assert_eq!(presets.get(&1), Some(&Color::new(255, 0, 0)));
        assert_eq!(presets.get(&2), Some(&Color::new(0, 0, 255)));
    }
}
