//! The internal subscriber endpoint on the topic network.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use silbus_core::bus::{MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::keys;
use silbus_core::messages::Message;

use crate::types::DataMessageHandler;

/// Receives all samples of a topic and forwards those of matched publishers
/// to the parent subscriber's handler.
pub struct DataSubscriberInternal {
    descriptor: RwLock<ServiceDescriptor>,
    handler: Mutex<Arc<DataMessageHandler>>,
    /// UUIDs of the publishers the parent subscriber matched.
    matched_publishers: Arc<Mutex<BTreeSet<String>>>,
}

impl DataSubscriberInternal {
    /// Create the endpoint; `matched_publishers` is shared with the parent.
    pub fn new(
        handler: Arc<DataMessageHandler>,
        matched_publishers: Arc<Mutex<BTreeSet<String>>>,
    ) -> Self {
        Self {
            descriptor: RwLock::new(ServiceDescriptor::default()),
            handler: Mutex::new(handler),
            matched_publishers,
        }
    }

    /// Replace the sample handler.
    pub fn set_data_message_handler(&self, handler: Arc<DataMessageHandler>) {
        *self.handler.lock() = handler;
    }
}

impl ServiceEndpoint for DataSubscriberInternal {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for DataSubscriberInternal {
    fn receive_msg(&self, from: &ServiceDescriptor, msg: &Message) {
        let Message::DataMessage(event) = msg else {
            return;
        };
        // Other publishers share the topic network; only matched ones get
        // through.
        let matched = from
            .supplemental_data_item(keys::KEY_DATA_PUBLISHER_UUID)
            .is_some_and(|uuid| self.matched_publishers.lock().contains(uuid));
        if !matched {
            return;
        }
        let handler = Arc::clone(&*self.handler.lock());
        handler(event);
    }
}
