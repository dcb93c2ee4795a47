//! Distribution of the workflow configuration.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::messages::orchestration::WorkflowConfiguration;
use silbus_core::messages::Message;

/// Publishes the required-participant set to every system monitor in the
/// simulation, including the local one.
pub struct SystemController {
    bus: Arc<dyn Bus>,
    descriptor: RwLock<ServiceDescriptor>,
}

impl SystemController {
    /// Create the controller.
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self {
            bus,
            descriptor: RwLock::new(ServiceDescriptor::default()),
        }
    }

    /// Broadcast the set of participants counted into the system state
    /// aggregation.
    pub fn set_workflow_configuration(&self, required_participant_names: Vec<String>) {
        info!(
            required = required_participant_names.len(),
            "publishing workflow configuration"
        );
        let config = WorkflowConfiguration {
            required_participant_names,
        };
        self.bus.send_msg(
            &self.service_descriptor(),
            Message::WorkflowConfiguration(config),
        );
    }
}

impl ServiceEndpoint for SystemController {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for SystemController {
    fn receive_msg(&self, _from: &ServiceDescriptor, _msg: &Message) {}
}
