//! The trivial/detailed mode switch shared by all bus controllers.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use silbus_core::descriptor::{ServiceDescriptor, ServiceType};
use silbus_core::messages::discovery::ServiceDiscoveryEventType;
use silbus_discovery::ServiceDiscovery;

enum SimulationMode {
    Trivial,
    Detailed {
        /// Descriptor of the network simulator's link service.
        simulated_link: ServiceDescriptor,
    },
}

/// Selects between trivial loopback semantics and forwarding to a network
/// simulator; driven by discovery events for the controller's network.
pub struct SimBehavior {
    mode: RwLock<SimulationMode>,
}

impl SimBehavior {
    /// Create in trivial mode.
    pub fn new() -> Self {
        Self {
            mode: RwLock::new(SimulationMode::Trivial),
        }
    }

    /// Whether trivial loopback semantics apply.
    pub fn is_trivial(&self) -> bool {
        matches!(*self.mode.read(), SimulationMode::Trivial)
    }

    /// Whether a network simulator owns the network.
    pub fn is_detailed(&self) -> bool {
        !self.is_trivial()
    }

    /// Name of the network simulator's participant, in detailed mode.
    pub fn simulator_participant(&self) -> Option<String> {
        match &*self.mode.read() {
            SimulationMode::Trivial => None,
            SimulationMode::Detailed { simulated_link } => {
                Some(simulated_link.participant_name().to_string())
            }
        }
    }

    /// Switch to detailed mode, routing to the given simulated link.
    pub fn set_detailed(&self, simulated_link: ServiceDescriptor) {
        *self.mode.write() = SimulationMode::Detailed { simulated_link };
    }

    /// Switch back to trivial mode.
    pub fn set_trivial(&self) {
        *self.mode.write() = SimulationMode::Trivial;
    }

    /// Receive gate of the controller: trivial mode accepts everything (the
    /// sender/self filter is applied by the router); detailed mode accepts
    /// only the network simulator impersonating this very controller.
    pub fn allow_reception(&self, own: &ServiceDescriptor, from: &ServiceDescriptor) -> bool {
        match &*self.mode.read() {
            SimulationMode::Trivial => true,
            SimulationMode::Detailed { simulated_link } => {
                simulated_link.participant_name() == from.participant_name()
                    && own.service_id() == from.service_id()
            }
        }
    }
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the discovery handler that toggles a controller's mode when a
/// network simulator announces or retracts a link for the controller's
/// network.
pub(crate) fn watch_simulated_link(
    discovery: &ServiceDiscovery,
    behavior: Arc<SimBehavior>,
    network_name: String,
    controller_name: String,
) {
    discovery.register_service_discovery_handler(Arc::new(move |event_type, descriptor| {
        let relevant = descriptor.service_type() == ServiceType::Link
            && descriptor.network_name() == network_name;
        if !relevant {
            return;
        }
        if behavior.is_trivial() {
            if event_type == ServiceDiscoveryEventType::ServiceCreated {
                info!(
                    controller = %controller_name,
                    network = %network_name,
                    simulator = %descriptor.participant_name(),
                    "controller is using the simulated network and routes all messages to the network simulator"
                );
                behavior.set_detailed(descriptor.clone());
            }
        } else if event_type == ServiceDiscoveryEventType::ServiceRemoved {
            warn!(
                controller = %controller_name,
                network = %network_name,
                "the network simulator left the simulation, the controller is no longer simulated"
            );
            behavior.set_trivial();
        }
    }));
}
