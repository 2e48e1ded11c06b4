//! # PulseBridge
//!
//! A TCP bridge between heart-rate wearables and consumer applications.
//!
//! Wearables connect over a small framed protocol (`$<type>:<len>:<payload>&`),
//! apps over an even smaller one (`<json>X`). Telemetry is collected into a
//! concurrent registry keyed by connection ip, commands from apps are routed
//! back to the owning device by logical id, and an externally controlled
//! subsystem of simulated wearables feeds the same registry path as real
//! hardware.
//!
//! ## Architecture
//!
//! - [`protocol`] - data model and the two stream-framing codecs
//! - [`registry`] - concurrent device registry and color reconciliation
//! - [`router`] - logical-id command routing with simulated fallback
//! - [`sweep`] - stale-telemetry eviction
//! - [`sim`] - simulated wearable instances and their manager
//! - [`net`] - TCP accept loops and per-connection workers
//! - [`bridge`] - HTTP adapters toward the dashboard frontend
//! - [`config`] - startup configuration

pub mod bridge;
pub mod config;
pub mod net;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod sim;
pub mod sweep;

pub use protocol::data::{Color, ColorCommand, ReassignIdCommand, WearableCommand, WearableSample};
pub use registry::Registry;
pub use router::Router;
pub use sim::SimManager;
