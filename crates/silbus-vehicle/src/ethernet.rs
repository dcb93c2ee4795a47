//! The virtual Ethernet controller.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::handlers::{HandlerId, SynchronizedHandlers};
use silbus_core::messages::ethernet::{
    EthernetFrame, EthernetFrameEvent, EthernetFrameTransmitEvent, EthernetMode, EthernetSetMode,
    EthernetState, EthernetStatus, EthernetTransmitStatus,
};
use silbus_core::messages::{Message, TransmitDirection};
use silbus_core::time::TimeProvider;
use silbus_discovery::ServiceDiscovery;

use crate::sim_behavior::{watch_simulated_link, SimBehavior};

/// Link state change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct EthernetStateChangeEvent {
    /// Simulation time of the change.
    pub timestamp: Duration,
    /// New link state.
    pub state: EthernetState,
}

/// Handler for received Ethernet frames.
pub type EthernetFrameHandler = dyn Fn(&EthernetFrameEvent) + Send + Sync;
/// Handler for transmit acknowledgements.
pub type EthernetFrameTransmitHandler = dyn Fn(&EthernetFrameTransmitEvent) + Send + Sync;
/// Handler for link state changes.
pub type EthernetStateChangeHandler = dyn Fn(&EthernetStateChangeEvent) + Send + Sync;

/// A virtual Ethernet controller on one network.
pub struct EthernetController {
    bus: Arc<dyn Bus>,
    time: Arc<dyn TimeProvider>,
    descriptor: RwLock<ServiceDescriptor>,
    name: String,
    behavior: Arc<SimBehavior>,
    state: Mutex<EthernetState>,
    frame_handlers: SynchronizedHandlers<EthernetFrameHandler>,
    frame_transmit_handlers: SynchronizedHandlers<EthernetFrameTransmitHandler>,
    state_change_handlers: SynchronizedHandlers<EthernetStateChangeHandler>,
}

impl EthernetController {
    /// Create a controller named `name`.
    pub fn new(bus: Arc<dyn Bus>, time: Arc<dyn TimeProvider>, name: impl Into<String>) -> Self {
        Self {
            bus,
            time,
            descriptor: RwLock::new(ServiceDescriptor::default()),
            name: name.into(),
            behavior: Arc::new(SimBehavior::new()),
            state: Mutex::new(EthernetState::Inactive),
            frame_handlers: SynchronizedHandlers::new(),
            frame_transmit_handlers: SynchronizedHandlers::new(),
            state_change_handlers: SynchronizedHandlers::new(),
        }
    }

    /// The controller's configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current link state.
    pub fn state(&self) -> EthernetState {
        *self.state.lock()
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
    pub fn add_frame_handler(&self, handler: Arc<EthernetFrameHandler>) -> HandlerId {
        self.frame_handlers.add(handler)
    }

    /// Remove a frame handler.
    pub fn remove_frame_handler(&self, id: HandlerId) -> bool {
        self.frame_handlers.remove(id)
    }

    /// Register a transmit acknowledgement handler.
    pub fn add_frame_transmit_handler(
        &self,
        handler: Arc<EthernetFrameTransmitHandler>,
    ) -> HandlerId {
        self.frame_transmit_handlers.add(handler)
    }

    /// Remove a transmit acknowledgement handler.
    pub fn remove_frame_transmit_handler(&self, id: HandlerId) -> bool {
        self.frame_transmit_handlers.remove(id)
    }

    /// Register a link state change handler.
    pub fn add_state_change_handler(&self, handler: Arc<EthernetStateChangeHandler>) -> HandlerId {
        self.state_change_handlers.add(handler)
    }

    /// Remove a link state change handler.
    pub fn remove_state_change_handler(&self, id: HandlerId) -> bool {
        self.state_change_handlers.remove(id)
    }

    /// Activate the controller.
    pub fn activate(&self) {
        self.set_mode(EthernetMode::Active);
    }

    /// Deactivate the controller.
    pub fn deactivate(&self) {
        self.set_mode(EthernetMode::Inactive);
    }

    /// Transmit a frame.
    pub fn send_frame(&self, frame: EthernetFrame, user_context: u64) {
        if let Some(simulator) = self.behavior.simulator_participant() {
            let event = EthernetFrameEvent {
                timestamp: self.time.now(),
                frame,
                direction: TransmitDirection::Tx,
                user_context,
            };
            self.bus.send_msg_to(
                &self.service_descriptor(),
                &simulator,
                Message::EthernetFrame(event),
            );
            return;
        }

        let now = self.time.now();
        if self.state() != EthernetState::LinkUp {
            warn!(
                controller = %self.name,
                "send_frame is called although the controller is not active"
            );
            self.process_frame_transmit_event(&EthernetFrameTransmitEvent {
                timestamp: now,
                status: EthernetTransmitStatus::ControllerInactive,
                user_context,
            });
            return;
        }

        let mut event = EthernetFrameEvent {
            timestamp: now,
            frame,
            direction: TransmitDirection::Rx,
            user_context,
        };
        self.bus.send_msg(
            &self.service_descriptor(),
            Message::EthernetFrame(event.clone()),
        );

        event.direction = TransmitDirection::Tx;
        self.process_frame_event(&event);

        self.process_frame_transmit_event(&EthernetFrameTransmitEvent {
            timestamp: now,
            status: EthernetTransmitStatus::Transmitted,
            user_context,
        });
    }

    fn set_mode(&self, mode: EthernetMode) {
        if let Some(simulator) = self.behavior.simulator_participant() {
            self.bus.send_msg_to(
                &self.service_descriptor(),
                &simulator,
                Message::EthernetSetMode(EthernetSetMode { mode }),
            );
            return;
        }

        // Trivial mode establishes the link instantly.
        let state = match mode {
            EthernetMode::Active => EthernetState::LinkUp,
            EthernetMode::Inactive => EthernetState::Inactive,
        };
        self.process_status(&EthernetStatus {
            timestamp: self.time.now(),
            state,
        });
    }

    fn process_frame_event(&self, event: &EthernetFrameEvent) {
        let mut event = event.clone();
        if event.direction != TransmitDirection::Tx {
            event.user_context = 0;
        }
        trace!(
            controller = %self.name,
            length = event.frame.raw.len(),
            direction = ?event.direction,
            "ethernet frame"
        );
        self.frame_handlers.invoke_all(|handler| handler(&event));
    }

    fn process_frame_transmit_event(&self, event: &EthernetFrameTransmitEvent) {
        self.frame_transmit_handlers
            .invoke_all(|handler| handler(event));
    }

    fn process_status(&self, status: &EthernetStatus) {
        let mut state = self.state.lock();
        if *state != status.state {
            *state = status.state;
            drop(state);
            self.state_change_handlers.invoke_all(|handler| {
                handler(&EthernetStateChangeEvent {
                    timestamp: status.timestamp,
                    state: status.state,
                })
            });
        }
    }
}

impl ServiceEndpoint for EthernetController {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for EthernetController {
    fn receive_msg(&self, from: &ServiceDescriptor, msg: &Message) {
        if !self.behavior.allow_reception(&self.service_descriptor(), from) {
            return;
        }
        match msg {
            Message::EthernetFrame(event) => self.process_frame_event(event),
            Message::EthernetFrameTransmit(event) => self.process_frame_transmit_event(event),
            Message::EthernetStatus(status) => self.process_status(status),
            _ => {}
        }
    }
}
