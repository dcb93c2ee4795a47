//! Per-participant message router.
//!
//! The router fans typed messages out to local receivers and remote peers.
//! Delivery to a local receiver requires a matching network and suppresses
//! the sending endpoint itself; remote delivery hands an encoded frame to the
//! peer link. Deferred jobs run once the router is idle, which stands in for
//! the I/O-thread scheduling of a socket-based transport.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use silbus_core::bus::{Bus, BusService, DeferredJob};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::messages::{Message, MessageKind, WireFrame};

/// A connection to one remote participant.
pub trait PeerLink: Send + Sync {
    /// Name of the remote participant.
    fn peer_name(&self) -> &str;

    /// Hand one frame to the transport.
    fn send_frame(&self, frame: &WireFrame);

    /// Whether the remote participant has a receiver for `kind` on
    /// `network`.
    fn wants(&self, kind: MessageKind, network: &str) -> bool;

    /// Flush buffered frames.
    fn flush(&self) {}
}

#[derive(Default)]
struct RouterInner {
    receivers: HashMap<MessageKind, Vec<Weak<dyn BusService>>>,
    peers: IndexMap<String, Arc<dyn PeerLink>>,
}

/// Fan-out hub of one participant.
pub struct Router {
    participant_name: String,
    inner: Mutex<RouterInner>,
    dispatch_depth: AtomicUsize,
    deferred: Mutex<VecDeque<DeferredJob>>,
    draining: AtomicBool,
}

impl Router {
    /// Create the router for `participant_name`.
    pub fn new(participant_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            participant_name: participant_name.into(),
            inner: Mutex::new(RouterInner::default()),
            dispatch_depth: AtomicUsize::new(0),
            deferred: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        })
    }

    /// Register a service as receiver of the given message kinds.
    ///
    /// The router keeps only a weak reference; the participant owns its
    /// services.
    pub fn add_receiver(&self, kinds: &[MessageKind], service: &Arc<dyn BusService>) {
        let mut inner = self.inner.lock();
        for kind in kinds {
            inner
                .receivers
                .entry(*kind)
                .or_default()
                .push(Arc::downgrade(service));
        }
    }

    /// Unregister a service from the given message kinds.
    pub fn remove_receiver(&self, kinds: &[MessageKind], service: &Arc<dyn BusService>) {
        let target = Arc::as_ptr(service) as *const ();
        let mut inner = self.inner.lock();
        for kind in kinds {
            if let Some(entries) = inner.receivers.get_mut(kind) {
                entries.retain(|entry| match entry.upgrade() {
                    Some(alive) => Arc::as_ptr(&alive) as *const () != target,
                    None => false,
                });
            }
        }
    }

    /// Attach a peer connection.
    pub fn add_peer(&self, link: Arc<dyn PeerLink>) {
        let name = link.peer_name().to_string();
        debug!(participant = %self.participant_name, peer = %name, "peer connected");
        self.inner.lock().peers.insert(name, link);
    }

    /// Detach a peer connection.
    pub fn remove_peer(&self, peer_name: &str) -> bool {
        let removed = self.inner.lock().peers.shift_remove(peer_name).is_some();
        if removed {
            debug!(participant = %self.participant_name, peer = %peer_name, "peer disconnected");
        }
        removed
    }

    /// Whether any local receiver for `kind` sits on `network`.
    ///
    /// Queried by remote peers to decide whether this participant receives a
    /// given message stream.
    pub fn has_local_receiver(&self, kind: MessageKind, network: &str) -> bool {
        let entries: Vec<Weak<dyn BusService>> = {
            let inner = self.inner.lock();
            match inner.receivers.get(&kind) {
                Some(entries) => entries.clone(),
                None => return false,
            }
        };
        entries
            .iter()
            .filter_map(Weak::upgrade)
            .any(|service| service.service_descriptor().network_name() == network)
    }

    /// Entry point for frames arriving from a peer.
    pub fn receive_frame(&self, frame: &WireFrame) {
        self.dispatch_local(&frame.sender, &frame.message);
    }

    fn dispatch_local(&self, from: &ServiceDescriptor, msg: &Message) {
        let kind = msg.kind();
        let entries: Vec<Weak<dyn BusService>> = {
            let inner = self.inner.lock();
            inner.receivers.get(&kind).cloned().unwrap_or_default()
        };

        self.dispatch_depth.fetch_add(1, Ordering::SeqCst);
        for entry in entries {
            let Some(service) = entry.upgrade() else {
                continue;
            };
            let descriptor = service.service_descriptor();
            if descriptor.is_same_service(from) {
                // Locally-originated messages do not loop back to their own
                // endpoint.
                continue;
            }
            if descriptor.network_name() != from.network_name() {
                continue;
            }
            service.receive_msg(from, msg);
        }
        self.dispatch_depth.fetch_sub(1, Ordering::SeqCst);
        self.drain_deferred();
    }

    fn drain_deferred(&self) {
        if self.dispatch_depth.load(Ordering::SeqCst) != 0 {
            return;
        }
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            let job = self.deferred.lock().pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
        self.draining.store(false, Ordering::SeqCst);
    }

    fn peers_snapshot(&self) -> Vec<Arc<dyn PeerLink>> {
        self.inner.lock().peers.values().cloned().collect()
    }
}

impl Bus for Router {
    fn participant_name(&self) -> &str {
        &self.participant_name
    }

    fn send_msg(&self, from: &ServiceDescriptor, msg: Message) {
        trace!(
            participant = %self.participant_name,
            kind = ?msg.kind(),
            sender = %from,
            "broadcast"
        );
        let frame = WireFrame {
            sender: from.clone(),
            message: msg,
        };
        let kind = frame.message.kind();

        self.dispatch_local(from, &frame.message);
        for peer in self.peers_snapshot() {
            if peer.wants(kind, from.network_name()) {
                peer.send_frame(&frame);
            }
        }
        self.drain_deferred();
    }

    fn send_msg_to(&self, from: &ServiceDescriptor, target_participant: &str, msg: Message) {
        trace!(
            participant = %self.participant_name,
            kind = ?msg.kind(),
            target = %target_participant,
            "directed send"
        );
        if target_participant == self.participant_name {
            self.dispatch_local(from, &msg);
            return;
        }

        let peer = self.inner.lock().peers.get(target_participant).cloned();
        match peer {
            Some(peer) => {
                let frame = WireFrame {
                    sender: from.clone(),
                    message: msg,
                };
                peer.send_frame(&frame);
                self.drain_deferred();
            }
            None => {
                // Disconnect detection surfaces the loss; directed sends to
                // unknown peers are dropped silently.
                debug!(
                    participant = %self.participant_name,
                    target = %target_participant,
                    "dropping directed message to unknown participant"
                );
            }
        }
    }

    fn execute_deferred(&self, job: DeferredJob) {
        self.deferred.lock().push_back(job);
        self.drain_deferred();
    }

    fn on_all_messages_delivered(&self, callback: DeferredJob) {
        // Sends are handed to the peer links synchronously; the queue is
        // drained once the router is idle.
        self.flush_send_buffers();
        self.deferred.lock().push_back(callback);
        self.drain_deferred();
    }

    fn flush_send_buffers(&self) {
        for peer in self.peers_snapshot() {
            peer.flush();
        }
    }

    fn remote_receivers_of(&self, from: &ServiceDescriptor, kind: MessageKind) -> Vec<String> {
        self.peers_snapshot()
            .into_iter()
            .filter(|peer| peer.wants(kind, from.network_name()))
            .map(|peer| peer.peer_name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use silbus_core::bus::{MessageReceiver, ServiceEndpoint};
    use silbus_core::messages::pubsub::DataMessageEvent;
    use std::time::Duration;

    struct RecordingService {
        descriptor: parking_lot::RwLock<ServiceDescriptor>,
        received: PlMutex<Vec<(String, MessageKind)>>,
    }

    impl RecordingService {
        fn new(descriptor: ServiceDescriptor) -> Arc<Self> {
            Arc::new(Self {
                descriptor: parking_lot::RwLock::new(descriptor),
                received: PlMutex::new(Vec::new()),
            })
        }
    }

    impl ServiceEndpoint for RecordingService {
        fn service_descriptor(&self) -> ServiceDescriptor {
            self.descriptor.read().clone()
        }

        fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
            *self.descriptor.write() = descriptor;
        }
    }

    impl MessageReceiver for RecordingService {
        fn receive_msg(&self, from: &ServiceDescriptor, msg: &Message) {
            self.received
                .lock()
                .push((from.participant_name().to_string(), msg.kind()));
        }
    }

    fn data_message() -> Message {
        Message::DataMessage(DataMessageEvent {
            timestamp: Duration::ZERO,
            data: vec![1],
        })
    }

    #[test]
    fn broadcast_skips_the_sender_and_foreign_networks() {
        let router = Router::new("P1");
        let sender_descriptor = ServiceDescriptor::new("P1", "TopicA", "Pub", 1);
        let same_network = RecordingService::new(ServiceDescriptor::new("P1", "TopicA", "Sub", 2));
        let other_network = RecordingService::new(ServiceDescriptor::new("P1", "TopicB", "Sub", 3));
        let sender_itself = RecordingService::new(sender_descriptor.clone());

        for service in [&same_network, &other_network, &sender_itself] {
            let service: Arc<dyn BusService> = Arc::clone(service) as Arc<dyn BusService>;
            router.add_receiver(&[MessageKind::DataMessage], &service);
        }

        router.send_msg(&sender_descriptor, data_message());

        assert_eq!(same_network.received.lock().len(), 1);
        assert!(other_network.received.lock().is_empty());
        assert!(sender_itself.received.lock().is_empty());
    }

    #[test]
    fn directed_send_to_unknown_peer_is_dropped() {
        let router = Router::new("P1");
        let sender_descriptor = ServiceDescriptor::new("P1", "TopicA", "Pub", 1);
        // Must not panic or error.
        router.send_msg_to(&sender_descriptor, "Nobody", data_message());
    }

    #[test]
    fn deferred_jobs_run_after_the_current_dispatch() {
        let router = Router::new("P1");
        let order: Arc<PlMutex<Vec<&'static str>>> = Arc::new(PlMutex::new(Vec::new()));

        struct DeferringService {
            descriptor: parking_lot::RwLock<ServiceDescriptor>,
            router: Arc<Router>,
            order: Arc<PlMutex<Vec<&'static str>>>,
        }

        impl ServiceEndpoint for DeferringService {
            fn service_descriptor(&self) -> ServiceDescriptor {
                self.descriptor.read().clone()
            }

            fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
                *self.descriptor.write() = descriptor;
            }
        }

        impl MessageReceiver for DeferringService {
            fn receive_msg(&self, _from: &ServiceDescriptor, _msg: &Message) {
                let order = Arc::clone(&self.order);
                self.router.execute_deferred(Box::new(move || {
                    order.lock().push("deferred");
                }));
                self.order.lock().push("receive");
            }
        }

        let service = Arc::new(DeferringService {
            descriptor: parking_lot::RwLock::new(ServiceDescriptor::new("P1", "TopicA", "Sub", 2)),
            router: Arc::clone(&router),
            order: Arc::clone(&order),
        });
        let dyn_service: Arc<dyn BusService> = Arc::clone(&service) as Arc<dyn BusService>;
        router.add_receiver(&[MessageKind::DataMessage], &dyn_service);

        let sender_descriptor = ServiceDescriptor::new("P1", "TopicA", "Pub", 1);
        router.send_msg(&sender_descriptor, data_message());
        assert_eq!(order.lock().as_slice(), &["receive", "deferred"]);
    }

    #[test]
    fn dropped_services_are_skipped() {
        let router = Router::new("P1");
        let service = RecordingService::new(ServiceDescriptor::new("P1", "TopicA", "Sub", 2));
        {
            let dyn_service: Arc<dyn BusService> = Arc::clone(&service) as Arc<dyn BusService>;
            router.add_receiver(&[MessageKind::DataMessage], &dyn_service);
        }
        assert!(router.has_local_receiver(MessageKind::DataMessage, "TopicA"));

        drop(service);
        assert!(!router.has_local_receiver(MessageKind::DataMessage, "TopicA"));
        let sender_descriptor = ServiceDescriptor::new("P1", "TopicA", "Pub", 1);
        router.send_msg(&sender_descriptor, data_message());
    }

    #[test]
    fn remove_receiver_detaches_only_the_given_service() {
        let router = Router::new("P1");
        let first = RecordingService::new(ServiceDescriptor::new("P1", "TopicA", "Sub1", 2));
        let second = RecordingService::new(ServiceDescriptor::new("P1", "TopicA", "Sub2", 3));
        let first_dyn: Arc<dyn BusService> = Arc::clone(&first) as Arc<dyn BusService>;
        let second_dyn: Arc<dyn BusService> = Arc::clone(&second) as Arc<dyn BusService>;
        router.add_receiver(&[MessageKind::DataMessage], &first_dyn);
        router.add_receiver(&[MessageKind::DataMessage], &second_dyn);

        router.remove_receiver(&[MessageKind::DataMessage], &first_dyn);

        let sender_descriptor = ServiceDescriptor::new("P1", "TopicA", "Pub", 1);
        router.send_msg(&sender_descriptor, data_message());
        assert!(first.received.lock().is_empty());
        assert_eq!(second.received.lock().len(), 1);
    }
}
