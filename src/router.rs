//! Command routing from app connections to wearables.
//!
//! Apps address commands by logical id; wearables are keyed by ip. The router
//! resolves the id through the registry's current assignments and refuses to
//! deliver when the resolution is ambiguous.

use crate::protocol::data::WearableCommand;
use crate::registry::Registry;
use crate::sim::SimManager;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Router {
    registry: Arc<Registry>,
    sims: Option<Arc<SimManager>>,
}

impl Router {
    pub fn new(registry: Arc<Registry>, sims: Option<Arc<SimManager>>) -> Self {
        Self { registry, sims }
    }

    /// Resolves the command's target id against the registry and delivers it.
    /// Zero matches and multiple matches are both dropped with a warning;
    /// guessing a recipient is worse than losing the command.
    pub fn route(&self, source: &str, cmd: WearableCommand) -> bool {
        let id = cmd.id();
        let targets = self.registry.ips_assigned_to(id);
        match targets.as_slice() {
            [] => {
                warn!(%source, id, "dropping command: no wearable assigned to id");
                false
            }
            [ip] => self.deliver(ip, cmd),
            many => {
                warn!(
                    %source,
                    id,
                    ips = %many.join(", "),
                    "dropping command: id assigned to multiple wearables"
                );
                false
            }
        }
    }

    /// Hands the command to the ip's writer queue, falling back to in-process
    /// application for simulated wearables (they have no socket).
    fn deliver(&self, ip: &str, cmd: WearableCommand) -> bool {
        if self.registry.enqueue(ip, cmd) {
            debug!(%ip, "command enqueued for delivery");
            return true;
        }
        if let Some(sims) = &self.sims {
            if sims.apply_command(ip, cmd) {
                debug!(%ip, "command applied to simulated wearable");
                return true;
            }
        }
        warn!(%ip, "dropping command: no delivery path for ip");
        false
    }
}
