//! The virtual LIN controller.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::handlers::{HandlerId, SynchronizedHandlers};
use silbus_core::messages::lin::{
    LinControllerConfig, LinControllerMode, LinFrame, LinFrameStatus, LinTransmission,
    LinWakeupPulse,
};
use silbus_core::messages::{Message, TransmitDirection};
use silbus_core::time::TimeProvider;
use silbus_discovery::ServiceDiscovery;

use crate::sim_behavior::{watch_simulated_link, SimBehavior};

/// Handler for completed frame transmissions.
pub type LinFrameStatusHandler = dyn Fn(&LinTransmission) + Send + Sync;
/// Handler for wakeup pulses.
pub type LinWakeupHandler = dyn Fn(&LinWakeupPulse) + Send + Sync;

/// A virtual LIN controller on one bus.
pub struct LinController {
    bus: Arc<dyn Bus>,
    time: Arc<dyn TimeProvider>,
    descriptor: RwLock<ServiceDescriptor>,
    name: String,
    behavior: Arc<SimBehavior>,
    mode: Mutex<LinControllerMode>,
    frame_status_handlers: SynchronizedHandlers<LinFrameStatusHandler>,
    wakeup_handlers: SynchronizedHandlers<LinWakeupHandler>,
}

impl LinController {
    /// Create a controller named `name`.
    pub fn new(bus: Arc<dyn Bus>, time: Arc<dyn TimeProvider>, name: impl Into<String>) -> Self {
        Self {
            bus,
            time,
            descriptor: RwLock::new(ServiceDescriptor::default()),
            name: name.into(),
            behavior: Arc::new(SimBehavior::new()),
            mode: Mutex::new(LinControllerMode::Inactive),
            frame_status_handlers: SynchronizedHandlers::new(),
            wakeup_handlers: SynchronizedHandlers::new(),
        }
    }

    /// The controller's configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured operating mode.
    pub fn mode(&self) -> LinControllerMode {
        *self.mode.lock()
    }

    /// The mode switch; exposed for the owning participant.
    pub fn sim_behavior(&self) -> &Arc<SimBehavior> {
        &self.behavior
    }

    /// Watch discovery for a network simulator owning this bus.
    pub fn register_service_discovery(&self, discovery: &ServiceDiscovery) {
        watch_simulated_link(
            discovery,
            Arc::clone(&self.behavior),
            self.service_descriptor().network_name().to_string(),
            self.name.clone(),
        );
    }

    /// Register a frame status handler.
    pub fn add_frame_status_handler(&self, handler: Arc<LinFrameStatusHandler>) -> HandlerId {
        self.frame_status_handlers.add(handler)
    }

    /// Remove a frame status handler.
    pub fn remove_frame_status_handler(&self, id: HandlerId) -> bool {
        self.frame_status_handlers.remove(id)
    }

    /// Register a wakeup handler.
    pub fn add_wakeup_handler(&self, handler: Arc<LinWakeupHandler>) -> HandlerId {
        self.wakeup_handlers.add(handler)
    }

    /// Remove a wakeup handler.
    pub fn remove_wakeup_handler(&self, id: HandlerId) -> bool {
        self.wakeup_handlers.remove(id)
    }

    /// Initialise the controller and announce its configuration on the bus.
    pub fn init(&self, config: LinControllerConfig) {
        *self.mode.lock() = config.controller_mode;
        match self.behavior.simulator_participant() {
            Some(simulator) => self.bus.send_msg_to(
                &self.service_descriptor(),
                &simulator,
                Message::LinControllerConfig(config),
            ),
            None => self.bus.send_msg(
                &self.service_descriptor(),
                Message::LinControllerConfig(config),
            ),
        }
    }

    /// Transmit a frame; master nodes only.
    pub fn send_frame(&self, frame: LinFrame) {
        if let Some(simulator) = self.behavior.simulator_participant() {
            let transmission = LinTransmission {
                timestamp: self.time.now(),
                frame,
                status: LinFrameStatus::NotOk,
            };
            self.bus.send_msg_to(
                &self.service_descriptor(),
                &simulator,
                Message::LinTransmission(transmission),
            );
            return;
        }

        if self.mode() != LinControllerMode::Master {
            warn!(
                controller = %self.name,
                "send_frame is only available to a LIN master"
            );
            return;
        }

        let now = self.time.now();
        let mut transmission = LinTransmission {
            timestamp: now,
            frame,
            status: LinFrameStatus::LinRxOk,
        };
        self.bus.send_msg(
            &self.service_descriptor(),
            Message::LinTransmission(transmission.clone()),
        );

        transmission.status = LinFrameStatus::LinTxOk;
        self.process_transmission(&transmission);
    }

    /// Send a wakeup pulse on the bus.
    pub fn wakeup(&self) {
        let now = self.time.now();
        if let Some(simulator) = self.behavior.simulator_participant() {
            self.bus.send_msg_to(
                &self.service_descriptor(),
                &simulator,
                Message::LinWakeupPulse(LinWakeupPulse {
                    timestamp: now,
                    direction: TransmitDirection::Tx,
                }),
            );
            return;
        }

        let mut pulse = LinWakeupPulse {
            timestamp: now,
            direction: TransmitDirection::Rx,
        };
        self.bus.send_msg(
            &self.service_descriptor(),
            Message::LinWakeupPulse(pulse.clone()),
        );
        pulse.direction = TransmitDirection::Tx;
        self.process_wakeup(&pulse);
    }

    fn process_transmission(&self, transmission: &LinTransmission) {
        self.frame_status_handlers
            .invoke_all(|handler| handler(transmission));
    }

    fn process_wakeup(&self, pulse: &LinWakeupPulse) {
        self.wakeup_handlers.invoke_all(|handler| handler(pulse));
    }
}

impl ServiceEndpoint for LinController {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for LinController {
    fn receive_msg(&self, from: &ServiceDescriptor, msg: &Message) {
        if !self.behavior.allow_reception(&self.service_descriptor(), from) {
            return;
        }
        match msg {
            Message::LinTransmission(transmission) => self.process_transmission(transmission),
            Message::LinWakeupPulse(pulse) => self.process_wakeup(pulse),
            _ => {}
        }
    }
}
