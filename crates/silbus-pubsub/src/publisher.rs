//! The data publisher endpoint.

use std::sync::Arc;

use parking_lot::RwLock;

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::messages::pubsub::DataMessageEvent;
use silbus_core::messages::Message;
use silbus_core::time::TimeProvider;

use crate::types::PubSubSpec;

/// Publishes data samples on its topic network.
pub struct DataPublisher {
    bus: Arc<dyn Bus>,
    time: Arc<dyn TimeProvider>,
    descriptor: RwLock<ServiceDescriptor>,
    spec: PubSubSpec,
    publisher_uuid: String,
}

impl DataPublisher {
    /// Create a publisher for `spec`; `publisher_uuid` identifies it in
    /// discovery.
    pub fn new(
        bus: Arc<dyn Bus>,
        time: Arc<dyn TimeProvider>,
        spec: PubSubSpec,
        publisher_uuid: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            time,
            descriptor: RwLock::new(ServiceDescriptor::default()),
            spec,
            publisher_uuid: publisher_uuid.into(),
        }
    }

    /// The endpoint spec.
    pub fn spec(&self) -> &PubSubSpec {
        &self.spec
    }

    /// The publisher's UUID.
    pub fn publisher_uuid(&self) -> &str {
        &self.publisher_uuid
    }

    /// Publish one sample to all matched subscribers.
    pub fn publish(&self, data: Vec<u8>) {
        let event = DataMessageEvent {
            timestamp: self.time.now(),
            data,
        };
        self.bus
            .send_msg(&self.service_descriptor(), Message::DataMessage(event));
    }
}

impl ServiceEndpoint for DataPublisher {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for DataPublisher {
    fn receive_msg(&self, _from: &ServiceDescriptor, _msg: &Message) {}
}
