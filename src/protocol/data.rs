//! Telemetry and command data model.
//!
//! Wire shapes are camelCase JSON; integer ids default to `-1` so that
//! payloads from older clients that omit fields still decode.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::{Duration, Instant};

/// Telemetry older than this counts as stale.
pub const STALE_AFTER: Duration = Duration::from_millis(1000);

fn default_id() -> i32 {
    -1
}

/// RGB color reported by and pushed to wearables. Plain value, no identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    #[serde(default)]
    pub r: u8,
    #[serde(default)]
    pub g: u8,
    #[serde(default)]
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// One telemetry sample from a physical or simulated wearable.
///
/// `timestamp` is the device-reported clock and is treated as opaque;
/// `received_at` is the process-local receipt time and never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WearableSample {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default = "default_id")]
    pub id: i32,
    #[serde(default)]
    pub heart_rate: i32,
    #[serde(default)]
    pub color: Color,
    #[serde(skip)]
    pub received_at: Option<Instant>,
}

impl Default for WearableSample {
    fn default() -> Self {
        Self {
            timestamp: 0,
            id: default_id(),
            heart_rate: 0,
            color: Color::default(),
            received_at: None,
        }
    }
}

impl WearableSample {
    /// Staleness predicate. A sample whose receipt time was never set is
    /// initialized here and reported fresh exactly once; afterwards the sample
    /// is stale when strictly more than [`STALE_AFTER`] has passed.
    pub fn is_stale(&mut self, now: Instant) -> bool {
        match self.received_at {
            None => {
                self.received_at = Some(now);
                false
            }
            Some(received) => now.saturating_duration_since(received) > STALE_AFTER,
        }
    }
}

/// Sets a wearable's color.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorCommand {
    #[serde(default = "default_id")]
    pub id: i32,
    #[serde(default)]
    pub color: Color,
}

/// Reassigns a wearable's logical id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignIdCommand {
    #[serde(default = "default_id")]
    pub id: i32,
    #[serde(default = "default_id")]
    pub new_id: i32,
}

/// Closed set of commands addressable to a wearable by logical id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WearableCommand {
    Color(ColorCommand),
    ReassignId(ReassignIdCommand),
}

impl WearableCommand {
    /// Logical id of the wearable this command targets.
    pub fn id(&self) -> i32 {
        match self {
            WearableCommand::Color(cmd) => cmd.id,
            WearableCommand::ReassignId(cmd) => cmd.id,
        }
    }
}

// The payload carries no discriminant; on the wearable wire the frame's type
// char distinguishes the variants, exactly as the original senders expect.
impl Serialize for WearableCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WearableCommand::Color(cmd) => cmd.serialize(serializer),
            WearableCommand::ReassignId(cmd) => cmd.serialize(serializer),
        }
    }
}

// App clients tag their commands with an optional "type" field. Legacy senders
// omit it entirely and always meant a color command, so any missing or
// unrecognized tag falls back to `Color`.
impl<'de> Deserialize<'de> for WearableCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value.get("type").and_then(serde_json::Value::as_str) {
            Some("id") => ReassignIdCommand::deserialize(value)
                .map(WearableCommand::ReassignId)
                .map_err(D::Error::custom),
            _ => ColorCommand::deserialize(value)
                .map(WearableCommand::Color)
                .map_err(D::Error::custom),
        }
    }
}
