//! The user-facing data subscriber.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use silbus_core::bus::{MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::keys;
use silbus_core::label::{decode_labels, match_labels};
use silbus_core::messages::discovery::ServiceDiscoveryEventType;
use silbus_core::messages::Message;
use silbus_discovery::ServiceDiscovery;

use crate::subscriber_internal::DataSubscriberInternal;
use crate::types::{DataMessageHandler, PubSubSpec};

/// Creates the internal subscriber endpoint on behalf of the subscriber;
/// implemented by the participant.
pub trait DataSubscriberInternalFactory: Send + Sync {
    /// Create and announce the internal endpoint on the topic network.
    fn create_data_subscriber_internal(
        &self,
        topic: &str,
        handler: Arc<DataMessageHandler>,
        matched_publishers: Arc<Mutex<BTreeSet<String>>>,
    ) -> Arc<DataSubscriberInternal>;
}

/// Matches publishers on `(topic, media type, labels)` and receives their
/// samples.
pub struct DataSubscriber {
    descriptor: RwLock<ServiceDescriptor>,
    spec: PubSubSpec,
    handler: Mutex<Arc<DataMessageHandler>>,
    matched_publishers: Arc<Mutex<BTreeSet<String>>>,
    internal: Mutex<Option<Arc<DataSubscriberInternal>>>,
}

impl DataSubscriber {
    /// Create a subscriber for `spec`.
    pub fn new(spec: PubSubSpec, handler: Arc<DataMessageHandler>) -> Self {
        Self {
            descriptor: RwLock::new(ServiceDescriptor::default()),
            spec,
            handler: Mutex::new(handler),
            matched_publishers: Arc::new(Mutex::new(BTreeSet::new())),
            internal: Mutex::new(None),
        }
    }

    /// The endpoint spec.
    pub fn spec(&self) -> &PubSubSpec {
        &self.spec
    }

    /// Replace the sample handler.
    pub fn set_data_message_handler(&self, handler: Arc<DataMessageHandler>) {
        *self.handler.lock() = Arc::clone(&handler);
        if let Some(internal) = self.internal.lock().as_ref() {
            internal.set_data_message_handler(handler);
        }
    }

    /// Watch for matching publishers.
    pub fn register_service_discovery(
        self: &Arc<Self>,
        discovery: &ServiceDiscovery,
        factory: &Arc<dyn DataSubscriberInternalFactory>,
    ) {
        let weak_subscriber = Arc::downgrade(self);
        let weak_factory: Weak<dyn DataSubscriberInternalFactory> = Arc::downgrade(factory);
        discovery.register_specific_service_discovery_handler(
            Arc::new(move |event_type, descriptor| {
                let (Some(subscriber), Some(factory)) =
                    (weak_subscriber.upgrade(), weak_factory.upgrade())
                else {
                    return;
                };
                match event_type {
                    ServiceDiscoveryEventType::ServiceCreated => {
                        subscriber.on_publisher_discovered(descriptor, &factory);
                    }
                    ServiceDiscoveryEventType::ServiceRemoved => {
                        subscriber.on_publisher_removed(descriptor);
                    }
                    ServiceDiscoveryEventType::Invalid => {}
                }
            }),
            keys::CONTROLLER_TYPE_DATA_PUBLISHER,
            self.spec.topic(),
            self.spec.labels(),
        );
    }

    fn on_publisher_discovered(
        &self,
        descriptor: &ServiceDescriptor,
        factory: &Arc<dyn DataSubscriberInternalFactory>,
    ) {
        let item = |key: &str| descriptor.supplemental_data_item(key).unwrap_or_default();
        let topic = item(keys::KEY_DATA_PUBLISHER_TOPIC);
        let media_type = item(keys::KEY_DATA_PUBLISHER_MEDIA_TYPE);
        let publisher_uuid = item(keys::KEY_DATA_PUBLISHER_UUID).to_string();
        let publisher_labels =
            decode_labels(item(keys::KEY_DATA_PUBLISHER_LABELS)).unwrap_or_default();

        // An empty subscriber media type is the wildcard; a publisher's
        // never is.
        let media_type_matches =
            self.spec.media_type().is_empty() || self.spec.media_type() == media_type;
        if topic != self.spec.topic()
            || publisher_uuid.is_empty()
            || !media_type_matches
            || !match_labels(self.spec.labels(), &publisher_labels)
        {
            return;
        }

        debug!(topic = %topic, publisher = %publisher_uuid, "publisher matched");
        self.matched_publishers.lock().insert(publisher_uuid);

        let mut internal = self.internal.lock();
        if internal.is_none() {
            *internal = Some(factory.create_data_subscriber_internal(
                self.spec.topic(),
                Arc::clone(&*self.handler.lock()),
                Arc::clone(&self.matched_publishers),
            ));
        }
    }

    fn on_publisher_removed(&self, descriptor: &ServiceDescriptor) {
        if let Some(uuid) = descriptor.supplemental_data_item(keys::KEY_DATA_PUBLISHER_UUID) {
            self.matched_publishers.lock().remove(uuid);
        }
    }
}

impl ServiceEndpoint for DataSubscriber {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for DataSubscriber {
    fn receive_msg(&self, _from: &ServiceDescriptor, _msg: &Message) {
        // Samples arrive at the internal endpoint on the topic network.
    }
}
