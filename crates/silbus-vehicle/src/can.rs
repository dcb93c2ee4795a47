//! The virtual CAN controller.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::handlers::{HandlerId, SynchronizedHandlers};
use silbus_core::messages::can::{
    CanConfigureBaudrate, CanControllerState, CanControllerStatus, CanErrorState, CanFrame,
    CanFrameEvent, CanFrameTransmitEvent, CanSetControllerMode, CanTransmitStatus,
};
use silbus_core::messages::{Message, TransmitDirection};
use silbus_core::time::TimeProvider;
use silbus_discovery::ServiceDiscovery;

use crate::sim_behavior::{watch_simulated_link, SimBehavior};

/// Controller state change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct CanStateChangeEvent {
    /// Simulation time of the change.
    pub timestamp: Duration,
    /// New controller state.
    pub state: CanControllerState,
}

/// Error state change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct CanErrorStateChangeEvent {
    /// Simulation time of the change.
    pub timestamp: Duration,
    /// New error state.
    pub error_state: CanErrorState,
}

/// Handler for received CAN frames.
pub type CanFrameHandler = dyn Fn(&CanFrameEvent) + Send + Sync;
/// Handler for transmit acknowledgements.
pub type CanFrameTransmitHandler = dyn Fn(&CanFrameTransmitEvent) + Send + Sync;
/// Handler for controller state changes.
pub type CanStateChangeHandler = dyn Fn(&CanStateChangeEvent) + Send + Sync;
/// Handler for error state changes.
pub type CanErrorStateChangeHandler = dyn Fn(&CanErrorStateChangeEvent) + Send + Sync;

/// A virtual CAN controller on one network.
pub struct CanController {
    bus: Arc<dyn Bus>,
    time: Arc<dyn TimeProvider>,
    descriptor: RwLock<ServiceDescriptor>,
    name: String,
    behavior: Arc<SimBehavior>,
    controller_state: Mutex<CanControllerState>,
    error_state: Mutex<CanErrorState>,
    frame_handlers: SynchronizedHandlers<CanFrameHandler>,
    frame_transmit_handlers: SynchronizedHandlers<CanFrameTransmitHandler>,
    state_change_handlers: SynchronizedHandlers<CanStateChangeHandler>,
    error_state_change_handlers: SynchronizedHandlers<CanErrorStateChangeHandler>,
}

impl CanController {
    /// Create a controller named `name`.
    pub fn new(bus: Arc<dyn Bus>, time: Arc<dyn TimeProvider>, name: impl Into<String>) -> Self {
        Self {
            bus,
            time,
            descriptor: RwLock::new(ServiceDescriptor::default()),
            name: name.into(),
            behavior: Arc::new(SimBehavior::new()),
            controller_state: Mutex::new(CanControllerState::Uninit),
            error_state: Mutex::new(CanErrorState::NotAvailable),
            frame_handlers: SynchronizedHandlers::new(),
            frame_transmit_handlers: SynchronizedHandlers::new(),
            state_change_handlers: SynchronizedHandlers::new(),
            error_state_change_handlers: SynchronizedHandlers::new(),
        }
    }

    /// The controller's configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current controller state.
    pub fn state(&self) -> CanControllerState {
        *self.controller_state.lock()
    }

    /// Current error state.
    pub fn error_state(&self) -> CanErrorState {
        *self.error_state.lock()
    }

    /// The mode switch; exposed for the owning participant.
    pub fn sim_behavior(&self) -> &Arc<SimBehavior> {
        &self.behavior
    }

    /// Watch discovery for a network simulator owning this network.
    pub fn register_service_discovery(&self, discovery: &ServiceDiscovery) {
        watch_simulated_link(
            discovery,
            Arc::clone(&self.behavior),
            self.service_descriptor().network_name().to_string(),
            self.name.clone(),
        );
    }

    /// Register a frame handler.
    pub fn add_frame_handler(&self, handler: Arc<CanFrameHandler>) -> HandlerId {
        self.frame_handlers.add(handler)
    }

    /// Remove a frame handler.
    pub fn remove_frame_handler(&self, id: HandlerId) -> bool {
        self.frame_handlers.remove(id)
    }

    /// Register a transmit acknowledgement handler.
    pub fn add_frame_transmit_handler(&self, handler: Arc<CanFrameTransmitHandler>) -> HandlerId {
        self.frame_transmit_handlers.add(handler)
    }

    /// Remove a transmit acknowledgement handler.
    pub fn remove_frame_transmit_handler(&self, id: HandlerId) -> bool {
        self.frame_transmit_handlers.remove(id)
    }

    /// Register a state change handler.
    pub fn add_state_change_handler(&self, handler: Arc<CanStateChangeHandler>) -> HandlerId {
        self.state_change_handlers.add(handler)
    }

    /// Remove a state change handler.
    pub fn remove_state_change_handler(&self, id: HandlerId) -> bool {
        self.state_change_handlers.remove(id)
    }

    /// Register an error state change handler.
    pub fn add_error_state_change_handler(
        &self,
        handler: Arc<CanErrorStateChangeHandler>,
    ) -> HandlerId {
        self.error_state_change_handlers.add(handler)
    }

    /// Remove an error state change handler.
    pub fn remove_error_state_change_handler(&self, id: HandlerId) -> bool {
        self.error_state_change_handlers.remove(id)
    }

    /// Start the controller.
    pub fn start(&self) {
        self.change_controller_mode(CanControllerState::Started, false, false);
    }

    /// Stop the controller.
    pub fn stop(&self) {
        self.change_controller_mode(CanControllerState::Stopped, false, false);
    }

    /// Put the controller to sleep.
    pub fn sleep(&self) {
        self.change_controller_mode(CanControllerState::Sleep, false, false);
    }

    /// Reset the controller: cancel transmissions, reset error handling.
    pub fn reset(&self) {
        self.change_controller_mode(CanControllerState::Uninit, true, true);
    }

    /// Configure baud rates. No-op in trivial mode, which has no physical
    /// layer.
    pub fn set_baud_rate(&self, baud_rate: u32, fd_baud_rate: u32, xl_baud_rate: u32) {
        if let Some(simulator) = self.behavior.simulator_participant() {
            self.bus.send_msg_to(
                &self.service_descriptor(),
                &simulator,
                Message::CanConfigureBaudrate(CanConfigureBaudrate {
                    baud_rate,
                    fd_baud_rate,
                    xl_baud_rate,
                }),
            );
        }
    }

    /// Transmit a frame.
    ///
    /// `user_context` is an opaque token handed back in the transmit
    /// acknowledgement and in the TX-direction frame event.
    pub fn send_frame(&self, frame: CanFrame, user_context: u64) {
        if let Some(simulator) = self.behavior.simulator_participant() {
            let event = CanFrameEvent {
                timestamp: self.time.now(),
                frame,
                direction: TransmitDirection::Tx,
                user_context,
            };
            self.bus
                .send_msg_to(&self.service_descriptor(), &simulator, Message::CanFrame(event));
            return;
        }

        if self.state() != CanControllerState::Started {
            warn!(
                controller = %self.name,
                "send_frame is called although the controller is not started"
            );
            return;
        }

        let now = self.time.now();
        let can_id = frame.can_id;
        let mut event = CanFrameEvent {
            timestamp: now,
            frame,
            direction: TransmitDirection::Rx,
            user_context,
        };

        // Peers observe the frame as RX, then the sender sees its own TX,
        // then the self acknowledgement; every participant's handlers see
        // the same order.
        self.bus
            .send_msg(&self.service_descriptor(), Message::CanFrame(event.clone()));

        event.direction = TransmitDirection::Tx;
        self.process_frame_event(&event);

        let ack = CanFrameTransmitEvent {
            timestamp: now,
            can_id,
            status: CanTransmitStatus::Transmitted,
            user_context,
        };
        self.process_frame_transmit_event(&ack);
    }

    fn change_controller_mode(
        &self,
        mode: CanControllerState,
        cancel_transmit_requests: bool,
        reset_error_handling: bool,
    ) {
        if let Some(simulator) = self.behavior.simulator_participant() {
            self.bus.send_msg_to(
                &self.service_descriptor(),
                &simulator,
                Message::CanSetControllerMode(CanSetControllerMode {
                    mode,
                    cancel_transmit_requests,
                    reset_error_handling,
                }),
            );
            return;
        }

        // Trivial mode: a synchronous local status change, no wire traffic.
        let status = CanControllerStatus {
            timestamp: self.time.now(),
            controller_state: mode,
            error_state: CanErrorState::NotAvailable,
        };
        self.process_controller_status(&status);
    }

    fn process_frame_event(&self, event: &CanFrameEvent) {
        let mut event = event.clone();
        if event.direction != TransmitDirection::Tx {
            // The sender's token is only meaningful on the TX side.
            event.user_context = 0;
        }
        trace!(
            controller = %self.name,
            can_id = event.frame.can_id,
            direction = ?event.direction,
            timestamp_ns = event.timestamp.as_nanos() as u64,
            "can frame"
        );
        self.frame_handlers.invoke_all(|handler| handler(&event));
    }

    fn process_frame_transmit_event(&self, event: &CanFrameTransmitEvent) {
        self.frame_transmit_handlers
            .invoke_all(|handler| handler(event));
    }

    fn process_controller_status(&self, status: &CanControllerStatus) {
        {
            let mut state = self.controller_state.lock();
            if *state != status.controller_state {
                *state = status.controller_state;
                drop(state);
                self.state_change_handlers.invoke_all(|handler| {
                    handler(&CanStateChangeEvent {
                        timestamp: status.timestamp,
                        state: status.controller_state,
                    })
                });
            }
        }
        {
            let mut error_state = self.error_state.lock();
            if *error_state != status.error_state {
                *error_state = status.error_state;
                drop(error_state);
                self.error_state_change_handlers.invoke_all(|handler| {
                    handler(&CanErrorStateChangeEvent {
                        timestamp: status.timestamp,
                        error_state: status.error_state,
                    })
                });
            }
        }
    }
}

impl ServiceEndpoint for CanController {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for CanController {
    fn receive_msg(&self, from: &ServiceDescriptor, msg: &Message) {
        if !self.behavior.allow_reception(&self.service_descriptor(), from) {
            return;
        }
        match msg {
            Message::CanFrame(event) => self.process_frame_event(event),
            Message::CanFrameTransmit(event) => self.process_frame_transmit_event(event),
            Message::CanControllerStatus(status) => self.process_controller_status(status),
            _ => {}
        }
    }
}
