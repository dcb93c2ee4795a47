//! Observation of all participants' lifecycle states.

use std::collections::HashSet;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use silbus_core::bus::{MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::handlers::{HandlerId, SynchronizedHandlers};
use silbus_core::messages::orchestration::{ParticipantStatus, SystemState};
use silbus_core::messages::Message;

use crate::system_state_tracker::{StatusApplyResult, SystemStateTracker};

/// Callback fired for every accepted participant status.
pub type ParticipantStatusHandler = dyn Fn(&ParticipantStatus) + Send + Sync;

/// Callback fired whenever the aggregated system state changes.
pub type SystemStateHandler = dyn Fn(SystemState) + Send + Sync;

/// Callback fired on peer connection or disconnection.
pub type ParticipantConnectedHandler = Box<dyn Fn(&str) + Send + Sync>;

struct MonitorState {
    tracker: SystemStateTracker,
    connected_participants: HashSet<String>,
}

/// Tracks every participant's status and the aggregated system state.
///
/// Connection and lifecycle state are orthogonal: a participant may be
/// connected without ever having sent a status, and keeps a last-known status
/// after disconnecting.
pub struct SystemMonitor {
    descriptor: RwLock<ServiceDescriptor>,
    state: Mutex<MonitorState>,
    participant_status_handlers: SynchronizedHandlers<ParticipantStatusHandler>,
    system_state_handlers: SynchronizedHandlers<SystemStateHandler>,
    participant_connected_handler: Mutex<Option<ParticipantConnectedHandler>>,
    participant_disconnected_handler: Mutex<Option<ParticipantConnectedHandler>>,
}

impl SystemMonitor {
    /// Create the monitor.
    pub fn new() -> Self {
        Self {
            descriptor: RwLock::new(ServiceDescriptor::default()),
            state: Mutex::new(MonitorState {
                tracker: SystemStateTracker::new(),
                connected_participants: HashSet::new(),
            }),
            participant_status_handlers: SynchronizedHandlers::new(),
            system_state_handlers: SynchronizedHandlers::new(),
            participant_connected_handler: Mutex::new(None),
            participant_disconnected_handler: Mutex::new(None),
        }
    }

    /// Register a system state handler; immediately fired with the current
    /// state unless it is still `Invalid`.
    pub fn add_system_state_handler(
        &self,
        handler: std::sync::Arc<SystemStateHandler>,
    ) -> HandlerId {
        let current = self.system_state();
        if current != SystemState::Invalid {
            handler(current);
        }
        self.system_state_handlers.add(handler)
    }

    /// Remove a system state handler.
    pub fn remove_system_state_handler(&self, id: HandlerId) -> bool {
        self.system_state_handlers.remove(id)
    }

    /// Register a participant status handler.
    pub fn add_participant_status_handler(
        &self,
        handler: std::sync::Arc<ParticipantStatusHandler>,
    ) -> HandlerId {
        self.participant_status_handlers.add(handler)
    }

    /// Remove a participant status handler.
    pub fn remove_participant_status_handler(&self, id: HandlerId) -> bool {
        self.participant_status_handlers.remove(id)
    }

    /// Set the handler fired when a peer connects.
    pub fn set_participant_connected_handler(&self, handler: ParticipantConnectedHandler) {
        *self.participant_connected_handler.lock() = Some(handler);
    }

    /// Set the handler fired when a peer disconnects.
    pub fn set_participant_disconnected_handler(&self, handler: ParticipantConnectedHandler) {
        *self.participant_disconnected_handler.lock() = Some(handler);
    }

    /// The aggregated system state.
    pub fn system_state(&self) -> SystemState {
        self.state.lock().tracker.system_state()
    }

    /// Last known status of one participant.
    pub fn participant_status(&self, participant_name: &str) -> Option<ParticipantStatus> {
        self.state
            .lock()
            .tracker
            .participant_status(participant_name)
            .cloned()
    }

    /// Number of observed invalid state transitions.
    pub fn invalid_transition_count(&self) -> u64 {
        self.state.lock().tracker.invalid_transition_count()
    }

    /// Replace the required-participant set.
    pub fn update_required_participant_names(&self, names: Vec<String>) {
        let changed = {
            let mut state = self.state.lock();
            state.tracker.update_required_participants(names)
        };
        if let Some(new_state) = changed {
            self.system_state_handlers.invoke_all(|handler| handler(new_state));
        }
    }

    /// Whether a peer connection to `participant_name` currently exists.
    pub fn is_participant_connected(&self, participant_name: &str) -> bool {
        self.state
            .lock()
            .connected_participants
            .contains(participant_name)
    }

    /// Record a new peer connection.
    pub fn on_participant_connected(&self, participant_name: &str) {
        self.state
            .lock()
            .connected_participants
            .insert(participant_name.to_string());
        if let Some(handler) = self.participant_connected_handler.lock().as_ref() {
            handler(participant_name);
        }
    }

    /// Record a peer disconnection. The last known status stays available.
    pub fn on_participant_disconnected(&self, participant_name: &str) {
        self.state
            .lock()
            .connected_participants
            .remove(participant_name);
        if let Some(handler) = self.participant_disconnected_handler.lock().as_ref() {
            handler(participant_name);
        }
    }

    fn on_participant_status(&self, status: &ParticipantStatus) {
        let outcome = {
            let mut state = self.state.lock();
            state.tracker.apply_status(status.clone())
        };
        match outcome {
            StatusApplyResult::InvalidTransition => {}
            StatusApplyResult::Applied {
                system_state_changed,
            } => {
                self.participant_status_handlers
                    .invoke_all(|handler| handler(status));
                if let Some(new_state) = system_state_changed {
                    debug!(system_state = %new_state, "system state changed");
                    self.system_state_handlers
                        .invoke_all(|handler| handler(new_state));
                }
            }
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceEndpoint for SystemMonitor {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for SystemMonitor {
    fn receive_msg(&self, _from: &ServiceDescriptor, msg: &Message) {
        match msg {
            Message::ParticipantStatus(status) => self.on_participant_status(status),
            Message::WorkflowConfiguration(config) => {
                self.update_required_participant_names(config.required_participant_names.clone());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silbus_core::messages::orchestration::ParticipantState;
    use std::sync::Arc;

    fn status(name: &str, state: ParticipantState) -> ParticipantStatus {
        let mut status = ParticipantStatus::unknown(name);
        status.state = state;
        status
    }

    fn deliver(monitor: &SystemMonitor, status: ParticipantStatus) {
        let from =
            ServiceDescriptor::new(status.participant_name.as_str(), "default", "Lifecycle", 4);
        monitor.receive_msg(&from, &Message::ParticipantStatus(status));
    }

    #[test]
    fn status_handlers_fire_for_accepted_updates() {
        let monitor = SystemMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_inner = Arc::clone(&seen);
        monitor.add_participant_status_handler(Arc::new(move |status: &ParticipantStatus| {
            seen_inner
                .lock()
                .push((status.participant_name.clone(), status.state));
        }));

        deliver(&monitor, status("P1", ParticipantState::ServicesCreated));
        // Invalid transition: ignored, handler does not fire.
        deliver(&monitor, status("P1", ParticipantState::Running));

        assert_eq!(
            seen.lock().as_slice(),
            &[("P1".to_string(), ParticipantState::ServicesCreated)]
        );
        assert_eq!(monitor.invalid_transition_count(), 1);
    }

    #[test]
    fn workflow_configuration_drives_aggregation() {
        let monitor = SystemMonitor::new();
        deliver(&monitor, status("P1", ParticipantState::ServicesCreated));
        assert_eq!(monitor.system_state(), SystemState::Invalid);

        let from = ServiceDescriptor::new("SysCtl", "default", "SystemController", 9);
        monitor.receive_msg(
            &from,
            &Message::WorkflowConfiguration(
                silbus_core::messages::orchestration::WorkflowConfiguration {
                    required_participant_names: vec!["P1".to_string()],
                },
            ),
        );
        assert_eq!(monitor.system_state(), SystemState::ServicesCreated);
    }

    #[test]
    fn registering_a_state_handler_replays_the_current_state() {
        let monitor = SystemMonitor::new();
        monitor.update_required_participant_names(vec!["P1".to_string()]);
        deliver(&monitor, status("P1", ParticipantState::ServicesCreated));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_inner = Arc::clone(&seen);
        monitor.add_system_state_handler(Arc::new(move |state| {
            seen_inner.lock().push(state);
        }));
        assert_eq!(seen.lock().as_slice(), &[SystemState::ServicesCreated]);
    }

    #[test]
    fn connection_tracking_is_orthogonal_to_state() {
        let monitor = SystemMonitor::new();
        assert!(!monitor.is_participant_connected("P2"));

        monitor.on_participant_connected("P2");
        assert!(monitor.is_participant_connected("P2"));
        assert!(monitor.participant_status("P2").is_none());

        deliver(&monitor, status("P2", ParticipantState::ServicesCreated));
        monitor.on_participant_disconnected("P2");
        assert!(!monitor.is_participant_connected("P2"));
        // Last known status survives the disconnect.
        assert_eq!(
            monitor.participant_status("P2").map(|s| s.state),
            Some(ParticipantState::ServicesCreated)
        );
    }
}
