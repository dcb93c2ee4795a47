//! The all-participants-replied barrier.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use silbus_core::bus::{Bus, ServiceEndpoint};
use silbus_core::errors::Result;
use silbus_core::messages::requests::{CallReturnStatus, FunctionType};
use silbus_core::messages::MessageKind;

use crate::service::{CallReturnSink, RequestReplyProcedure, RequestReplyService};

type CompletionFn = Box<dyn FnOnce() + Send>;

struct BarrierState {
    barrier_active: bool,
    expected_repliers: BTreeSet<String>,
    completion: Option<CompletionFn>,
    active_uuid: Option<Uuid>,
}

/// Barrier that fires once every currently known remote participant has
/// answered a liveness probe.
///
/// Receiving a probe is answered immediately with `Success`, so the barrier
/// measures only that every peer has drained its inbound queue up to the
/// probe. A disconnect counts as a reply; the barrier completes even if peers
/// leave.
pub struct ParticipantReplies {
    bus: Arc<dyn Bus>,
    service: OnceCell<Weak<RequestReplyService>>,
    state: Mutex<BarrierState>,
}

impl ParticipantReplies {
    /// Create the barrier procedure.
    pub fn new(bus: Arc<dyn Bus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            service: OnceCell::new(),
            state: Mutex::new(BarrierState {
                barrier_active: false,
                expected_repliers: BTreeSet::new(),
                completion: None,
                active_uuid: None,
            }),
        })
    }

    /// Wire the owning request/reply service; called once during participant
    /// construction.
    pub fn attach_service(&self, service: &Arc<RequestReplyService>) {
        let _ = self.service.set(Arc::downgrade(service));
    }

    /// Invoke `completion` once every currently known remote participant has
    /// replied. Only one barrier may be active at a time; concurrent
    /// attempts are logged and dropped.
    pub fn call_after_all_participants_replied(self: &Arc<Self>, completion: CompletionFn) {
        // Deferred onto the I/O context so no participant can join between
        // sampling the receiver set and the actual send.
        let this = Arc::clone(self);
        self.bus.execute_deferred(Box::new(move || {
            let Some(service) = this.service.get().and_then(Weak::upgrade) else {
                return;
            };

            let mut state = this.state.lock();
            if state.barrier_active {
                debug!(
                    "still waiting for replies from participants on a previous call, \
                     the new completion will not be executed"
                );
                return;
            }

            let receivers = this
                .bus
                .remote_receivers_of(&service.service_descriptor(), MessageKind::RequestReplyCall);
            debug!(replies = receivers.len(), "requesting participant replies");
            if receivers.is_empty() {
                drop(state);
                completion();
                return;
            }

            let call_uuid = Uuid::new_v4();
            state.barrier_active = true;
            state.expected_repliers = receivers.into_iter().collect();
            state.completion = Some(completion);
            state.active_uuid = Some(call_uuid);
            drop(state);

            // Replies may arrive while the call is still being delivered;
            // all bookkeeping is in place before the send.
            if let Err(err) =
                service.call_with_uuid(call_uuid, FunctionType::ParticipantReplies, Vec::new())
            {
                debug!(%err, "participant replies call failed");
                let mut state = this.state.lock();
                state.barrier_active = false;
                state.completion = None;
                state.active_uuid = None;
            }
        }));
    }
}

impl RequestReplyProcedure for ParticipantReplies {
    fn receive_call(
        &self,
        sink: &dyn CallReturnSink,
        call_uuid: Uuid,
        _call_data: &[u8],
    ) -> Result<()> {
        // A pure liveness probe: reply directly.
        sink.submit_call_return(
            call_uuid,
            FunctionType::ParticipantReplies,
            Vec::new(),
            CallReturnStatus::Success,
        )
    }

    fn receive_call_return(
        &self,
        from_participant: &str,
        call_uuid: Uuid,
        _call_return_data: &[u8],
        _call_return_status: CallReturnStatus,
    ) {
        // Every call return status completes the request, including
        // RecipientDisconnected.
        let completion = {
            let mut state = self.state.lock();
            if !state.barrier_active || state.active_uuid != Some(call_uuid) {
                return;
            }
            state.expected_repliers.remove(from_participant);
            if !state.expected_repliers.is_empty() {
                return;
            }
            state.barrier_active = false;
            state.active_uuid = None;
            state.completion.take()
        };
        if let Some(completion) = completion {
            debug!("participant replies completed");
            completion();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use silbus_core::bus::DeferredJob;
    use silbus_core::descriptor::{ServiceDescriptor, ServiceType};
    use silbus_core::keys;
    use silbus_core::messages::Message;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockBus {
        remote_receivers: PlMutex<Vec<String>>,
        broadcasts: PlMutex<Vec<Message>>,
    }

    impl Bus for MockBus {
        fn participant_name(&self) -> &str {
            "ParticipantA"
        }

        fn send_msg(&self, _from: &ServiceDescriptor, msg: Message) {
            self.broadcasts.lock().push(msg);
        }

        fn send_msg_to(&self, _from: &ServiceDescriptor, _target: &str, _msg: Message) {}

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
            self.remote_receivers.lock().clone()
        }
    }

    fn make_barrier(bus: &Arc<MockBus>) -> (Arc<ParticipantReplies>, Arc<RequestReplyService>) {
        let replies = ParticipantReplies::new(Arc::clone(bus) as Arc<dyn Bus>);
        let mut procedures: HashMap<FunctionType, Arc<dyn RequestReplyProcedure>> = HashMap::new();
        procedures.insert(
            FunctionType::ParticipantReplies,
            Arc::clone(&replies) as Arc<dyn RequestReplyProcedure>,
        );
        let service = Arc::new(RequestReplyService::new(
            Arc::clone(bus) as Arc<dyn Bus>,
            "ParticipantA",
            procedures,
        ));
        let mut descriptor = ServiceDescriptor::new(
            "ParticipantA",
            keys::INTERNAL_NETWORK_NAME,
            "RequestReplyService",
            2,
        );
        descriptor.set_service_type(ServiceType::InternalController);
        service.set_service_descriptor(descriptor);
        replies.attach_service(&service);
        (replies, service)
    }

    fn active_call_uuid(bus: &MockBus) -> Uuid {
        let broadcasts = bus.broadcasts.lock();
        match broadcasts.last() {
            Some(Message::RequestReplyCall(call)) => call.call_uuid,
            other => panic!("expected a broadcast call, got {other:?}"),
        }
    }

    #[test]
    fn empty_receiver_set_completes_synchronously() {
        let bus = Arc::new(MockBus::default());
        let (replies, _service) = make_barrier(&bus);

        let completions = Arc::new(AtomicUsize::new(0));
        let completions_inner = Arc::clone(&completions);
        replies.call_after_all_participants_replied(Box::new(move || {
            completions_inner.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(bus.broadcasts.lock().is_empty());
    }

    #[test]
    fn completes_after_every_participant_replied() {
        let bus = Arc::new(MockBus::default());
        *bus.remote_receivers.lock() = vec!["ParticipantB".to_string(), "ParticipantC".to_string()];
        let (replies, _service) = make_barrier(&bus);

        let completions = Arc::new(AtomicUsize::new(0));
        let completions_inner = Arc::clone(&completions);
        replies.call_after_all_participants_replied(Box::new(move || {
            completions_inner.fetch_add(1, Ordering::SeqCst);
        }));

        let call_uuid = active_call_uuid(&bus);
        replies.receive_call_return("ParticipantB", call_uuid, &[], CallReturnStatus::Success);
        assert_eq!(completions.load(Ordering::SeqCst), 0);
        replies.receive_call_return("ParticipantC", call_uuid, &[], CallReturnStatus::Success);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disconnect_counts_as_reply() {
        let bus = Arc::new(MockBus::default());
        *bus.remote_receivers.lock() = vec!["ParticipantB".to_string()];
        let (replies, _service) = make_barrier(&bus);

        let completions = Arc::new(AtomicUsize::new(0));
        let completions_inner = Arc::clone(&completions);
        replies.call_after_all_participants_replied(Box::new(move || {
            completions_inner.fetch_add(1, Ordering::SeqCst);
        }));

        let call_uuid = active_call_uuid(&bus);
        replies.receive_call_return(
            "ParticipantB",
            call_uuid,
            &[],
            CallReturnStatus::RecipientDisconnected,
        );
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_barrier_attempts_are_dropped() {
        let bus = Arc::new(MockBus::default());
        *bus.remote_receivers.lock() = vec!["ParticipantB".to_string()];
        let (replies, _service) = make_barrier(&bus);

        let completions = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let completions_inner = Arc::clone(&completions);
            replies.call_after_all_participants_replied(Box::new(move || {
                completions_inner.fetch_add(1, Ordering::SeqCst);
            }));
        }
        // Only one probe went out.
        assert_eq!(bus.broadcasts.lock().len(), 1);

        let call_uuid = active_call_uuid(&bus);
        replies.receive_call_return("ParticipantB", call_uuid, &[], CallReturnStatus::Success);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn foreign_call_uuids_are_ignored() {
        let bus = Arc::new(MockBus::default());
        *bus.remote_receivers.lock() = vec!["ParticipantB".to_string()];
        let (replies, _service) = make_barrier(&bus);

        let completions = Arc::new(AtomicUsize::new(0));
        let completions_inner = Arc::clone(&completions);
        replies.call_after_all_participants_replied(Box::new(move || {
            completions_inner.fetch_add(1, Ordering::SeqCst);
        }));

        replies.receive_call_return("ParticipantB", Uuid::new_v4(), &[], CallReturnStatus::Success);
        assert_eq!(completions.load(Ordering::SeqCst), 0);
    }
}
