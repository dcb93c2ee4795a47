//! The per-participant lifecycle state machine.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::errors::{Result, SilbusError};
use silbus_core::messages::orchestration::{ParticipantState, ParticipantStatus};
use silbus_core::messages::Message;

use silbus_requests::ParticipantReplies;

type LifecycleHandler = Box<dyn Fn() + Send + Sync>;

/// Drives a participant through its lifecycle states and broadcasts every
/// change as a [`ParticipantStatus`].
///
/// The lifecycle is autonomous: `start` runs through the initialization
/// states on its own, gated only by the all-participants-replied barrier that
/// settles pending subscriptions before communication counts as established.
pub struct LifecycleService {
    bus: Arc<dyn Bus>,
    participant_name: String,
    descriptor: RwLock<ServiceDescriptor>,
    replies: Arc<ParticipantReplies>,
    status: Mutex<ParticipantStatus>,
    communication_ready_handler: Mutex<Option<LifecycleHandler>>,
    starting_handler: Mutex<Option<LifecycleHandler>>,
    stop_handler: Mutex<Option<LifecycleHandler>>,
    shutdown_handler: Mutex<Option<LifecycleHandler>>,
}

impl LifecycleService {
    /// Create the lifecycle service.
    pub fn new(
        bus: Arc<dyn Bus>,
        participant_name: impl Into<String>,
        replies: Arc<ParticipantReplies>,
    ) -> Self {
        let participant_name = participant_name.into();
        Self {
            bus,
            status: Mutex::new(ParticipantStatus::unknown(participant_name.as_str())),
            participant_name,
            descriptor: RwLock::new(ServiceDescriptor::default()),
            replies,
            communication_ready_handler: Mutex::new(None),
            starting_handler: Mutex::new(None),
            stop_handler: Mutex::new(None),
            shutdown_handler: Mutex::new(None),
        }
    }

    /// Set the handler invoked when communication with all peers is
    /// established, before `ReadyToRun`.
    pub fn set_communication_ready_handler(&self, handler: LifecycleHandler) {
        *self.communication_ready_handler.lock() = Some(handler);
    }

    /// Set the handler invoked between `ReadyToRun` and `Running`.
    pub fn set_starting_handler(&self, handler: LifecycleHandler) {
        *self.starting_handler.lock() = Some(handler);
    }

    /// Set the handler invoked while stopping.
    pub fn set_stop_handler(&self, handler: LifecycleHandler) {
        *self.stop_handler.lock() = Some(handler);
    }

    /// Set the handler invoked while shutting down.
    pub fn set_shutdown_handler(&self, handler: LifecycleHandler) {
        *self.shutdown_handler.lock() = Some(handler);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ParticipantState {
        self.status.lock().state
    }

    /// Current status record.
    pub fn status(&self) -> ParticipantStatus {
        self.status.lock().clone()
    }

    /// Begin the lifecycle: announce the created services, settle
    /// communication with all known participants, then enter `Running`.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let current = self.state();
        if current != ParticipantState::Invalid {
            return Err(SilbusError::state(format!(
                "lifecycle cannot start from state {current}"
            )));
        }
        info!(participant = %self.participant_name, "starting lifecycle");
        self.change_state(ParticipantState::ServicesCreated, "services created");
        self.advance_to_running();
        Ok(())
    }

    /// Pause the simulation from this participant's point of view.
    pub fn pause(&self, reason: impl Into<String>) -> Result<()> {
        self.guarded_change(
            &[ParticipantState::Running],
            ParticipantState::Paused,
            reason.into(),
        )
    }

    /// Resume after [`LifecycleService::pause`].
    pub fn resume(&self, reason: impl Into<String>) -> Result<()> {
        self.guarded_change(
            &[ParticipantState::Paused],
            ParticipantState::Running,
            reason.into(),
        )
    }

    /// Stop the participant: `Stopping`, the stop handler, `Stopped`.
    pub fn stop(&self, reason: impl Into<String>) -> Result<()> {
        self.guarded_change(
            &[ParticipantState::Running, ParticipantState::Paused],
            ParticipantState::Stopping,
            reason.into(),
        )?;
        if let Some(handler) = self.stop_handler.lock().as_ref() {
            handler();
        }
        self.change_state(ParticipantState::Stopped, "stop handler finished");
        Ok(())
    }

    /// Report an unrecoverable error; only shutdown is possible afterwards.
    pub fn report_error(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(participant = %self.participant_name, %reason, "participant entered the error state");
        self.change_state(ParticipantState::Error, reason);
    }

    /// Shut the participant down from `Stopped` or `Error`.
    pub fn shutdown(&self, reason: impl Into<String>) -> Result<()> {
        self.guarded_change(
            &[ParticipantState::Stopped, ParticipantState::Error],
            ParticipantState::ShuttingDown,
            reason.into(),
        )?;
        if let Some(handler) = self.shutdown_handler.lock().as_ref() {
            handler();
        }
        self.change_state(ParticipantState::Shutdown, "shutdown handler finished");
        Ok(())
    }

    /// Restart a stopped participant; the only legal restart edge.
    pub fn restart(self: &Arc<Self>, reason: impl Into<String>) -> Result<()> {
        self.guarded_change(
            &[ParticipantState::Stopped],
            ParticipantState::ServicesCreated,
            reason.into(),
        )?;
        self.advance_to_running();
        Ok(())
    }

    fn advance_to_running(self: &Arc<Self>) {
        self.change_state(
            ParticipantState::CommunicationInitializing,
            "waiting for pending subscriptions",
        );
        let this = Arc::clone(self);
        self.replies
            .call_after_all_participants_replied(Box::new(move || {
                this.change_state(
                    ParticipantState::CommunicationInitialized,
                    "all participants replied",
                );
                if let Some(handler) = this.communication_ready_handler.lock().as_ref() {
                    handler();
                }
                this.change_state(ParticipantState::ReadyToRun, "communication ready");
                if let Some(handler) = this.starting_handler.lock().as_ref() {
                    handler();
                }
                this.change_state(ParticipantState::Running, "starting simulation");
            }));
    }

    fn guarded_change(
        &self,
        allowed_from: &[ParticipantState],
        new_state: ParticipantState,
        reason: String,
    ) -> Result<()> {
        let current = self.state();
        if !allowed_from.contains(&current) {
            return Err(SilbusError::state(format!(
                "cannot transition from {current} to {new_state}"
            )));
        }
        self.change_state(new_state, reason);
        Ok(())
    }

    fn change_state(&self, new_state: ParticipantState, reason: impl Into<String>) {
        let status = {
            let now = OffsetDateTime::now_utc();
            let mut status = self.status.lock();
            status.state = new_state;
            status.enter_reason = reason.into();
            status.enter_time = now;
            status.refresh_time = now;
            status.clone()
        };
        debug!(
            participant = %self.participant_name,
            state = %new_state,
            reason = %status.enter_reason,
            "participant state change"
        );
        self.bus.send_msg(
            &self.service_descriptor(),
            Message::ParticipantStatus(status),
        );
    }
}

impl ServiceEndpoint for LifecycleService {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for LifecycleService {
    fn receive_msg(&self, _from: &ServiceDescriptor, _msg: &Message) {
        // The lifecycle service only produces messages; system commands are
        // outside the supported surface.
    }
}
