//! Multi-participant simulation harness.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use silbus_config::ParticipantConfiguration;
use silbus_core::errors::Result;
use silbus_participant::Participant;

use crate::link::InMemoryLink;
use crate::time::ManualTimeProvider;

/// Builds a fully meshed in-process simulation.
///
/// Every participant shares one manual clock; joining wires both link
/// directions before either side announces, like a socket transport
/// establishing a connection before traffic flows.
pub struct SimulationHarness {
    time: Arc<ManualTimeProvider>,
    participants: Mutex<IndexMap<String, Arc<Participant>>>,
}

impl SimulationHarness {
    /// Create an empty simulation.
    pub fn new() -> Self {
        Self {
            time: Arc::new(ManualTimeProvider::new()),
            participants: Mutex::new(IndexMap::new()),
        }
    }

    /// The shared clock.
    pub fn time(&self) -> &Arc<ManualTimeProvider> {
        &self.time
    }

    /// Create a participant with a default configuration and join it.
    pub fn add_participant(&self, name: &str) -> Result<Arc<Participant>> {
        self.add_participant_with_config(ParticipantConfiguration::named(name))
    }

    /// Create a participant from `config` and join it to all existing ones.
    pub fn add_participant_with_config(
        &self,
        config: ParticipantConfiguration,
    ) -> Result<Arc<Participant>> {
        let joining = Participant::with_time_provider(
            config,
            Arc::clone(&self.time) as Arc<dyn silbus_core::time::TimeProvider>,
        )?;

        let existing: Vec<Arc<Participant>> =
            self.participants.lock().values().cloned().collect();

        // Both directions of every connection exist before anyone announces.
        for other in &existing {
            other.attach_peer(Arc::new(InMemoryLink::new(
                joining.name(),
                Arc::downgrade(joining.router()),
            )));
            joining.attach_peer(Arc::new(InMemoryLink::new(
                other.name(),
                Arc::downgrade(other.router()),
            )));
        }
        for other in &existing {
            other.announce_to_peer(joining.name());
            joining.announce_to_peer(other.name());
        }

        self.participants
            .lock()
            .insert(joining.name().to_string(), Arc::clone(&joining));
        Ok(joining)
    }

    /// Look up a participant by name.
    pub fn participant(&self, name: &str) -> Option<Arc<Participant>> {
        self.participants.lock().get(name).cloned()
    }

    /// Disconnect a participant from the simulation and drop the harness's
    /// reference to it.
    pub fn disconnect(&self, name: &str) {
        let removed = self.participants.lock().shift_remove(name);
        let Some(removed) = removed else { return };
        let remaining: Vec<Arc<Participant>> =
            self.participants.lock().values().cloned().collect();
        for other in &remaining {
            removed.disconnect_peer(other.name());
            other.disconnect_peer(name);
        }
    }
}

impl Default for SimulationHarness {
    fn default() -> Self {
        Self::new()
    }
}
