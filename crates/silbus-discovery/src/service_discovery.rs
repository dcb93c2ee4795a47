//! The per-participant service directory.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, error, warn};

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::keys;
use silbus_core::label::MatchingLabel;
use silbus_core::messages::discovery::{
    ParticipantDiscoveryEvent, ServiceDiscoveryEvent, ServiceDiscoveryEventType,
    DISCOVERY_PROTOCOL_VERSION,
};
use silbus_core::messages::Message;

use crate::specific_store::SpecificDiscoveryStore;

/// Callback fired on service creation and removal.
pub type ServiceDiscoveryHandler =
    dyn Fn(ServiceDiscoveryEventType, &ServiceDescriptor) + Send + Sync;

struct DiscoveryState {
    handlers: Vec<Arc<ServiceDiscoveryHandler>>,
    /// `participant name -> canonical descriptor string -> descriptor`
    services_by_participant: HashMap<String, HashMap<String, ServiceDescriptor>>,
    /// Peers that already received our full service list.
    announced_to: HashSet<String>,
    specific_store: SpecificDiscoveryStore,
}

/// Announces local services, ingests peer announcements and notifies
/// registered handlers.
///
/// The state sits behind a reentrant lock so a handler may synchronously
/// create dependent services from inside its invocation.
pub struct ServiceDiscovery {
    bus: Arc<dyn Bus>,
    participant_name: String,
    descriptor: RwLock<ServiceDescriptor>,
    state: ReentrantMutex<RefCell<DiscoveryState>>,
    shutting_down: AtomicBool,
}

impl ServiceDiscovery {
    /// Create the discovery service for one participant.
    pub fn new(bus: Arc<dyn Bus>, participant_name: impl Into<String>) -> Self {
        Self {
            bus,
            participant_name: participant_name.into(),
            descriptor: RwLock::new(ServiceDescriptor::default()),
            state: ReentrantMutex::new(RefCell::new(DiscoveryState {
                handlers: Vec::new(),
                services_by_participant: HashMap::new(),
                announced_to: HashSet::new(),
                specific_store: SpecificDiscoveryStore::new(),
            })),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Convert all further inbound events and notifications into no-ops.
    ///
    /// Must be called before teardown begins; I/O callbacks may still race
    /// with the destruction of dependent services.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Publish a locally created service to ourselves and all peers.
    pub fn notify_service_created(&self, descriptor: ServiceDescriptor) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        // No self delivery over the bus; apply directly in this call context.
        self.on_service_addition(&descriptor);

        let event = ServiceDiscoveryEvent {
            event_type: ServiceDiscoveryEventType::ServiceCreated,
            service_descriptor: descriptor,
        };
        self.bus
            .send_msg(&self.service_descriptor(), Message::ServiceDiscovery(event));
    }

    /// Publish a locally removed service to ourselves and all peers.
    pub fn notify_service_removed(&self, descriptor: ServiceDescriptor) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        self.on_service_removal(&descriptor);

        let event = ServiceDiscoveryEvent {
            event_type: ServiceDiscoveryEventType::ServiceRemoved,
            service_descriptor: descriptor,
        };
        self.bus
            .send_msg(&self.service_descriptor(), Message::ServiceDiscovery(event));
    }

    /// Register a handler fired on every service change; replays
    /// `ServiceCreated` for all currently known services before subscribing.
    pub fn register_service_discovery_handler(&self, handler: Arc<ServiceDiscoveryHandler>) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        // Replay and subscription are one atomic unit with respect to other
        // threads; an event arriving concurrently cannot fall between the
        // snapshot and the registration.
        let guard = self.state.lock();
        let known: Vec<ServiceDescriptor> = {
            let state = guard.borrow();
            state
                .services_by_participant
                .values()
                .flat_map(|services| services.values().cloned())
                .collect()
        };
        for descriptor in &known {
            handler(ServiceDiscoveryEventType::ServiceCreated, descriptor);
        }
        guard.borrow_mut().handlers.push(handler);
    }

    /// Register a handler filtered by controller type, topic/function key and
    /// labels; delegated to the specific discovery store.
    pub fn register_specific_service_discovery_handler(
        &self,
        handler: Arc<ServiceDiscoveryHandler>,
        controller_type: &str,
        key: &str,
        labels: &[MatchingLabel],
    ) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let guard = self.state.lock();
        let candidates = guard
            .borrow_mut()
            .specific_store
            .candidates_for_handler(controller_type, key, labels);
        for descriptor in &candidates {
            handler(ServiceDiscoveryEventType::ServiceCreated, descriptor);
        }
        guard
            .borrow_mut()
            .specific_store
            .insert_handler(controller_type, key, labels, handler);
    }

    /// All currently known services, including our own.
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .services_by_participant
            .values()
            .flat_map(|services| services.values().cloned())
            .collect()
    }

    /// React to a leaving participant: fire `ServiceRemoved` for everything
    /// it announced and erase it from the directory.
    pub fn on_participant_removal(&self, participant_name: &str) {
        if participant_name == self.participant_name {
            return;
        }

        let guard = self.state.lock();
        let to_fire = {
            let mut state = guard.borrow_mut();
            state.announced_to.remove(participant_name);
            let Some(services) = state.services_by_participant.remove(participant_name) else {
                return;
            };
            let mut to_fire = Vec::new();
            for descriptor in services.into_values() {
                let mut handlers = state
                    .specific_store
                    .service_change(ServiceDiscoveryEventType::ServiceRemoved, &descriptor);
                handlers.extend(state.handlers.iter().cloned());
                to_fire.push((descriptor, handlers));
            }
            to_fire
        };
        for (descriptor, handlers) in to_fire {
            for handler in handlers {
                handler(ServiceDiscoveryEventType::ServiceRemoved, &descriptor);
            }
        }
    }

    /// Send the creation event of our own discovery controller to a freshly
    /// connected peer. The peer answers with its full service list.
    pub fn announce_to_new_peer(&self, peer_name: &str) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let event = ServiceDiscoveryEvent {
            event_type: ServiceDiscoveryEventType::ServiceCreated,
            service_descriptor: self.service_descriptor(),
        };
        self.bus.send_msg_to(
            &self.service_descriptor(),
            peer_name,
            Message::ServiceDiscovery(event),
        );
    }

    fn on_service_addition(&self, descriptor: &ServiceDescriptor) {
        let guard = self.state.lock();

        let (reply_target, own_services, to_fire) = {
            let mut state = guard.borrow_mut();
            let from_participant = descriptor.participant_name().to_string();
            let key = match descriptor.canonical_name() {
                Ok(key) => key,
                Err(err) => {
                    error!(%err, "dropping service announcement without canonical name");
                    return;
                }
            };

            // A remote participant announces its own discovery controller as
            // the very first event after joining; answer with our full local
            // service list, directed at that participant only. The reply is
            // owed even when the event itself is a duplicate: both sides of a
            // fresh connection announce concurrently.
            let mut reply_target = None;
            let mut own_services = Vec::new();
            if from_participant != self.participant_name
                && descriptor.supplemental_data_item(keys::CONTROLLER_TYPE)
                    == Some(keys::CONTROLLER_TYPE_SERVICE_DISCOVERY)
                && !state.announced_to.contains(&from_participant)
            {
                state.announced_to.insert(from_participant.clone());
                reply_target = Some(from_participant.clone());
                own_services = state
                    .services_by_participant
                    .get(&self.participant_name)
                    .map(|services| services.values().cloned().collect())
                    .unwrap_or_default();
            }

            let services = state
                .services_by_participant
                .entry(from_participant)
                .or_default();
            if services.contains_key(&key) {
                // We already know this participant's service; at most the
                // owed announcement reply remains to be sent.
                (reply_target, own_services, Vec::new())
            } else {
                services.insert(key, descriptor.clone());
                let mut handlers = state
                    .specific_store
                    .service_change(ServiceDiscoveryEventType::ServiceCreated, descriptor);
                handlers.extend(state.handlers.iter().cloned());
                (reply_target, own_services, handlers)
            }
        };

        if let Some(target) = reply_target {
            debug!(peer = %target, services = own_services.len(), "announcing local services to joining participant");
            let announcement =
                ParticipantDiscoveryEvent::new(self.participant_name.as_str(), own_services);
            self.bus.send_msg_to(
                &self.service_descriptor(),
                &target,
                Message::ParticipantDiscovery(announcement),
            );
        }

        for handler in to_fire {
            handler(ServiceDiscoveryEventType::ServiceCreated, descriptor);
        }
    }

    fn on_service_removal(&self, descriptor: &ServiceDescriptor) {
        let guard = self.state.lock();
        let to_fire = {
            let mut state = guard.borrow_mut();
            let from_participant = descriptor.participant_name().to_string();
            let key = match descriptor.canonical_name() {
                Ok(key) => key,
                Err(err) => {
                    error!(%err, "dropping service removal without canonical name");
                    return;
                }
            };
            let services = state
                .services_by_participant
                .entry(from_participant)
                .or_default();
            if services.remove(&key).is_none() {
                // We only notify once per event.
                return;
            }
            let mut handlers = state
                .specific_store
                .service_change(ServiceDiscoveryEventType::ServiceRemoved, descriptor);
            handlers.extend(state.handlers.iter().cloned());
            handlers
        };
        for handler in to_fire {
            handler(ServiceDiscoveryEventType::ServiceRemoved, descriptor);
        }
    }

    fn on_participant_addition(&self, event: &ParticipantDiscoveryEvent) {
        let guard = self.state.lock();
        let to_fire = {
            let mut state = guard.borrow_mut();
            let services = state
                .services_by_participant
                .entry(event.participant_name.clone())
                .or_default();

            let mut fresh = Vec::new();
            for descriptor in &event.services {
                let key = match descriptor.canonical_name() {
                    Ok(key) => key,
                    Err(err) => {
                        error!(%err, "skipping announced service without canonical name");
                        continue;
                    }
                };
                if services.contains_key(&key) {
                    continue;
                }
                services.insert(key, descriptor.clone());
                fresh.push(descriptor.clone());
            }

            let mut to_fire = Vec::new();
            for descriptor in fresh {
                let mut handlers = state
                    .specific_store
                    .service_change(ServiceDiscoveryEventType::ServiceCreated, &descriptor);
                handlers.extend(state.handlers.iter().cloned());
                to_fire.push((descriptor, handlers));
            }
            to_fire
        };
        for (descriptor, handlers) in to_fire {
            for handler in handlers {
                handler(ServiceDiscoveryEventType::ServiceCreated, &descriptor);
            }
        }
    }
}

impl ServiceEndpoint for ServiceDiscovery {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for ServiceDiscovery {
    fn receive_msg(&self, _from: &ServiceDescriptor, msg: &Message) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        match msg {
            Message::ParticipantDiscovery(event) => {
                if event.version != DISCOVERY_PROTOCOL_VERSION {
                    warn!(
                        participant = %event.participant_name,
                        version = event.version,
                        "dropping participant announcement with unsupported version"
                    );
                    return;
                }
                self.on_participant_addition(event);
            }
            Message::ServiceDiscovery(event) => match event.event_type {
                ServiceDiscoveryEventType::ServiceCreated => {
                    self.on_service_addition(&event.service_descriptor);
                }
                ServiceDiscoveryEventType::ServiceRemoved => {
                    self.on_service_removal(&event.service_descriptor);
                }
                ServiceDiscoveryEventType::Invalid => {
                    warn!("dropping service discovery event of invalid type");
                }
            },
            _ => {}
        }
    }
}
