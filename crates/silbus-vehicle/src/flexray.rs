//! The virtual FlexRay controller.
//!
//! FlexRay has no trivial-mode semantics: the time-triggered schedule of a
//! cluster cannot be approximated by loopback. The controller therefore only
//! becomes operational once a network simulator owns its network; host
//! commands issued in trivial mode are rejected with a warning.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::handlers::{HandlerId, SynchronizedHandlers};
use silbus_core::messages::flexray::{
    FlexrayChiCommand, FlexrayFrameEvent, FlexrayFrameTransmitEvent, FlexrayHostCommand,
    FlexrayPocStatusEvent,
};
use silbus_core::messages::Message;
use silbus_discovery::ServiceDiscovery;

use crate::sim_behavior::{watch_simulated_link, SimBehavior};

/// Handler for frames observed in the cluster.
pub type FlexrayFrameHandler = dyn Fn(&FlexrayFrameEvent) + Send + Sync;
/// Handler for transmit acknowledgements.
pub type FlexrayFrameTransmitHandler = dyn Fn(&FlexrayFrameTransmitEvent) + Send + Sync;
/// Handler for protocol operation control status changes.
pub type FlexrayPocStatusHandler = dyn Fn(&FlexrayPocStatusEvent) + Send + Sync;

/// A virtual FlexRay controller on one cluster.
pub struct FlexrayController {
    bus: Arc<dyn Bus>,
    descriptor: RwLock<ServiceDescriptor>,
    name: String,
    behavior: Arc<SimBehavior>,
    frame_handlers: SynchronizedHandlers<FlexrayFrameHandler>,
    frame_transmit_handlers: SynchronizedHandlers<FlexrayFrameTransmitHandler>,
    poc_status_handlers: SynchronizedHandlers<FlexrayPocStatusHandler>,
}

impl FlexrayController {
    /// Create a controller named `name`.
    pub fn new(bus: Arc<dyn Bus>, name: impl Into<String>) -> Self {
        Self {
            bus,
            descriptor: RwLock::new(ServiceDescriptor::default()),
            name: name.into(),
            behavior: Arc::new(SimBehavior::new()),
            frame_handlers: SynchronizedHandlers::new(),
            frame_transmit_handlers: SynchronizedHandlers::new(),
            poc_status_handlers: SynchronizedHandlers::new(),
        }
    }

    /// The controller's configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mode switch; exposed for the owning participant.
    pub fn sim_behavior(&self) -> &Arc<SimBehavior> {
        &self.behavior
    }

    /// Watch discovery for a network simulator owning this cluster.
    pub fn register_service_discovery(&self, discovery: &ServiceDiscovery) {
        watch_simulated_link(
            discovery,
            Arc::clone(&self.behavior),
            self.service_descriptor().network_name().to_string(),
            self.name.clone(),
        );
    }

    /// Register a frame handler.
    pub fn add_frame_handler(&self, handler: Arc<FlexrayFrameHandler>) -> HandlerId {
        self.frame_handlers.add(handler)
    }

    /// Remove a frame handler.
    pub fn remove_frame_handler(&self, id: HandlerId) -> bool {
        self.frame_handlers.remove(id)
    }

    /// Register a transmit acknowledgement handler.
    pub fn add_frame_transmit_handler(
        &self,
        handler: Arc<FlexrayFrameTransmitHandler>,
    ) -> HandlerId {
        self.frame_transmit_handlers.add(handler)
    }

    /// Remove a transmit acknowledgement handler.
    pub fn remove_frame_transmit_handler(&self, id: HandlerId) -> bool {
        self.frame_transmit_handlers.remove(id)
    }

    /// Register a POC status handler.
    pub fn add_poc_status_handler(&self, handler: Arc<FlexrayPocStatusHandler>) -> HandlerId {
        self.poc_status_handlers.add(handler)
    }

    /// Remove a POC status handler.
    pub fn remove_poc_status_handler(&self, id: HandlerId) -> bool {
        self.poc_status_handlers.remove(id)
    }

    /// Start communication.
    pub fn run(&self) {
        self.send_host_command(FlexrayChiCommand::Run);
    }

    /// Halt at the end of the current cycle.
    pub fn deferred_halt(&self) {
        self.send_host_command(FlexrayChiCommand::DeferredHalt);
    }

    /// Halt immediately.
    pub fn freeze(&self) {
        self.send_host_command(FlexrayChiCommand::Freeze);
    }

    /// Permit this node to cold-start the cluster.
    pub fn allow_coldstart(&self) {
        self.send_host_command(FlexrayChiCommand::AllowColdstart);
    }

    /// Send a wakeup pattern.
    pub fn wakeup(&self) {
        self.send_host_command(FlexrayChiCommand::Wakeup);
    }

    fn send_host_command(&self, command: FlexrayChiCommand) {
        let Some(simulator) = self.behavior.simulator_participant() else {
            warn!(
                controller = %self.name,
                ?command,
                "FlexRay requires a network simulator; the command is dropped"
            );
            return;
        };
        self.bus.send_msg_to(
            &self.service_descriptor(),
            &simulator,
            Message::FlexrayHostCommand(FlexrayHostCommand { command }),
        );
    }
}

impl ServiceEndpoint for FlexrayController {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for FlexrayController {
    fn receive_msg(&self, from: &ServiceDescriptor, msg: &Message) {
        if !self.behavior.allow_reception(&self.service_descriptor(), from) {
            return;
        }
        match msg {
            Message::FlexrayFrame(event) => {
                self.frame_handlers.invoke_all(|handler| handler(event));
            }
            Message::FlexrayFrameTransmit(event) => {
                self.frame_transmit_handlers
                    .invoke_all(|handler| handler(event));
            }
            Message::FlexrayPocStatus(event) => {
                self.poc_status_handlers.invoke_all(|handler| handler(event));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use silbus_core::bus::DeferredJob;
    use silbus_core::descriptor::ServiceType;
    use silbus_core::messages::MessageKind;

    #[derive(Default)]
    struct MockBus {
        directed: PlMutex<Vec<(String, Message)>>,
    }

    impl Bus for MockBus {
        fn participant_name(&self) -> &str {
            "P1"
        }

        fn send_msg(&self, _from: &ServiceDescriptor, _msg: Message) {}

        fn send_msg_to(&self, _from: &ServiceDescriptor, target: &str, msg: Message) {
            self.directed.lock().push((target.to_string(), msg));
        }

        fn execute_deferred(&self, job: DeferredJob) {
            job();
        }

        fn on_all_messages_delivered(&self, callback: DeferredJob) {
            callback();
        }

        fn flush_send_buffers(&self) {}

        fn remote_receivers_of(
            &self,
            _from: &ServiceDescriptor,
            _kind: MessageKind,
        ) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn commands_are_dropped_without_a_simulator() {
        let bus = Arc::new(MockBus::default());
        let controller = FlexrayController::new(Arc::clone(&bus) as Arc<dyn Bus>, "FrCtrl1");
        controller.set_service_descriptor(ServiceDescriptor::new("P1", "FR1", "FrCtrl1", 13));

        controller.run();
        assert!(bus.directed.lock().is_empty());
    }

    #[test]
    fn commands_are_directed_to_the_simulator() {
        let bus = Arc::new(MockBus::default());
        let controller = FlexrayController::new(Arc::clone(&bus) as Arc<dyn Bus>, "FrCtrl1");
        controller.set_service_descriptor(ServiceDescriptor::new("P1", "FR1", "FrCtrl1", 13));

        let mut link = ServiceDescriptor::new("NetSim", "FR1", "FR1", 2);
        link.set_service_type(ServiceType::Link);
        controller.sim_behavior().set_detailed(link);

        controller.run();
        controller.freeze();
        let directed = bus.directed.lock();
        assert_eq!(directed.len(), 2);
        assert!(directed.iter().all(|(target, _)| target == "NetSim"));
    }
}
