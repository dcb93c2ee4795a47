//! The RPC client endpoint.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::errors::Result;
use silbus_core::keys;
use silbus_core::messages::discovery::ServiceDiscoveryEventType;
use silbus_core::messages::rpc::{FunctionCall, FunctionCallResponse, FunctionCallResponseStatus};
use silbus_core::messages::Message;
use silbus_core::time::TimeProvider;
use silbus_discovery::ServiceDiscovery;

use crate::types::{RpcCallResultEvent, RpcCallResultHandler, RpcCallStatus, RpcSpec};

/// A matched counterpart endpoint: owning participant and service id.
type CounterpartKey = (String, u64);

struct ActiveCall {
    pending_counterparts: BTreeSet<CounterpartKey>,
    user_context: u64,
    deadline: Option<Duration>,
}

#[derive(Default)]
struct ClientState {
    counterparts: BTreeSet<CounterpartKey>,
    active_calls: HashMap<Uuid, ActiveCall>,
}

/// Detached RPC calls with per-call bookkeeping of the expected answers.
///
/// The client discovers internal server endpoints created for it and counts
/// one expected answer per matched counterpart. Counterpart loss synthesises
/// a `RecipientDisconnected` result so every call settles with exactly one
/// result per expected answer.
pub struct RpcClient {
    bus: Arc<dyn Bus>,
    time: Arc<dyn TimeProvider>,
    descriptor: RwLock<ServiceDescriptor>,
    spec: RpcSpec,
    client_uuid: String,
    handler: Mutex<Option<Arc<RpcCallResultHandler>>>,
    state: Mutex<ClientState>,
    /// Wakes the owning participant's timeout scheduler for a new deadline.
    timeout_wakeup: Mutex<Option<Box<dyn Fn(Duration) + Send + Sync>>>,
}

impl RpcClient {
    /// Create a client for `spec`; `client_uuid` also names its network.
    pub fn new(
        bus: Arc<dyn Bus>,
        time: Arc<dyn TimeProvider>,
        spec: RpcSpec,
        client_uuid: impl Into<String>,
        handler: Option<Arc<RpcCallResultHandler>>,
    ) -> Self {
        Self {
            bus,
            time,
            descriptor: RwLock::new(ServiceDescriptor::default()),
            spec,
            client_uuid: client_uuid.into(),
            handler: Mutex::new(handler),
            state: Mutex::new(ClientState::default()),
            timeout_wakeup: Mutex::new(None),
        }
    }

    /// The client's UUID.
    pub fn client_uuid(&self) -> &str {
        &self.client_uuid
    }

    /// The endpoint spec.
    pub fn spec(&self) -> &RpcSpec {
        &self.spec
    }

    /// Replace the result handler.
    pub fn set_call_result_handler(&self, handler: Arc<RpcCallResultHandler>) {
        *self.handler.lock() = Some(handler);
    }

    /// Install the scheduler wakeup used by `call_with_timeout`.
    pub fn set_timeout_wakeup(&self, wakeup: Box<dyn Fn(Duration) + Send + Sync>) {
        *self.timeout_wakeup.lock() = Some(wakeup);
    }

    /// Watch for internal server endpoints created for this client.
    pub fn register_service_discovery(self: &Arc<Self>, discovery: &ServiceDiscovery) {
        let weak = Arc::downgrade(self);
        discovery.register_specific_service_discovery_handler(
            Arc::new(move |event_type, descriptor| {
                let Some(client) = weak.upgrade() else { return };
                if descriptor.supplemental_data_item(keys::KEY_RPC_SERVER_INTERNAL_CLIENT_UUID)
                    != Some(client.client_uuid.as_str())
                {
                    return;
                }
                let key = (
                    descriptor.participant_name().to_string(),
                    descriptor.service_id(),
                );
                match event_type {
                    ServiceDiscoveryEventType::ServiceCreated => client.on_counterpart_added(key),
                    ServiceDiscoveryEventType::ServiceRemoved => {
                        client.on_counterpart_removed(&key)
                    }
                    ServiceDiscoveryEventType::Invalid => {}
                }
            }),
            keys::CONTROLLER_TYPE_RPC_SERVER_INTERNAL,
            &self.client_uuid,
            &[],
        );
    }

    /// Issue a detached call to all matched servers.
    ///
    /// With no matched counterpart, the result handler fires synchronously
    /// with `ServerNotReachable` and no traffic is produced.
    pub fn call(&self, data: Vec<u8>, user_context: u64) -> Result<()> {
        self.call_impl(data, user_context, None)
    }

    /// Like [`RpcClient::call`], but the call settles with a `Timeout` result
    /// if answers are still outstanding when `timeout` elapses.
    pub fn call_with_timeout(
        &self,
        data: Vec<u8>,
        timeout: Duration,
        user_context: u64,
    ) -> Result<()> {
        self.call_impl(data, user_context, Some(timeout))
    }

    fn call_impl(&self, data: Vec<u8>, user_context: u64, timeout: Option<Duration>) -> Result<()> {
        let now = self.time.now();
        let deadline = timeout.map(|timeout| now + timeout);

        let call_uuid = {
            let mut state = self.state.lock();
            if state.counterparts.is_empty() {
                drop(state);
                self.deliver_result(RpcCallResultEvent {
                    timestamp: now,
                    call_status: RpcCallStatus::ServerNotReachable,
                    result_data: Vec::new(),
                    user_context,
                });
                return Ok(());
            }
            let call_uuid = Uuid::new_v4();
            let pending = state.counterparts.clone();
            state.active_calls.insert(
                call_uuid,
                ActiveCall {
                    pending_counterparts: pending,
                    user_context,
                    deadline,
                },
            );
            call_uuid
        };

        self.bus.send_msg(
            &self.service_descriptor(),
            Message::FunctionCall(FunctionCall {
                timestamp: now,
                call_uuid,
                data,
            }),
        );

        if let (Some(deadline), Some(wakeup)) = (deadline, self.timeout_wakeup.lock().as_ref()) {
            wakeup(deadline);
        }
        Ok(())
    }

    /// Expire calls whose deadline has passed; invoked by the owning
    /// participant's timeout scheduler.
    pub fn process_timeouts(&self, now: Duration) {
        let expired: Vec<RpcCallResultEvent> = {
            let mut state = self.state.lock();
            let uuids: Vec<Uuid> = state
                .active_calls
                .iter()
                .filter(|(_, call)| call.deadline.is_some_and(|deadline| deadline <= now))
                .map(|(uuid, _)| *uuid)
                .collect();
            uuids
                .into_iter()
                .filter_map(|uuid| state.active_calls.remove(&uuid))
                .map(|call| RpcCallResultEvent {
                    timestamp: now,
                    call_status: RpcCallStatus::Timeout,
                    result_data: Vec::new(),
                    user_context: call.user_context,
                })
                .collect()
        };
        for event in expired {
            self.deliver_result(event);
        }
    }

    /// Earliest deadline among the active calls.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state
            .lock()
            .active_calls
            .values()
            .filter_map(|call| call.deadline)
            .min()
    }

    fn on_counterpart_added(&self, key: CounterpartKey) {
        self.state.lock().counterparts.insert(key);
    }

    fn on_counterpart_removed(&self, key: &CounterpartKey) {
        let disconnect_events: Vec<RpcCallResultEvent> = {
            let mut state = self.state.lock();
            state.counterparts.remove(key);

            let now = self.time.now();
            let mut events = Vec::new();
            let mut settled = Vec::new();
            for (uuid, call) in state.active_calls.iter_mut() {
                if call.pending_counterparts.remove(key) {
                    events.push(RpcCallResultEvent {
                        timestamp: now,
                        call_status: RpcCallStatus::RecipientDisconnected,
                        result_data: Vec::new(),
                        user_context: call.user_context,
                    });
                    if call.pending_counterparts.is_empty() {
                        settled.push(*uuid);
                    }
                }
            }
            for uuid in settled {
                state.active_calls.remove(&uuid);
            }
            events
        };
        for event in disconnect_events {
            self.deliver_result(event);
        }
    }

    fn deliver_result(&self, event: RpcCallResultEvent) {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(&event),
            None => debug!(?event.call_status, "rpc result dropped, no handler set"),
        }
    }
}

impl ServiceEndpoint for RpcClient {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for RpcClient {
    fn receive_msg(&self, from: &ServiceDescriptor, msg: &Message) {
        let Message::FunctionCallResponse(response) = msg else {
            return;
        };

        let event = {
            let mut state = self.state.lock();
            let Some(call) = state.active_calls.get_mut(&response.call_uuid) else {
                error!(call_uuid = %response.call_uuid, "received unknown function call response");
                return;
            };
            let key = (from.participant_name().to_string(), from.service_id());
            if !call.pending_counterparts.remove(&key) {
                debug!(call_uuid = %response.call_uuid, "ignoring late or duplicate response");
                return;
            }
            let call_status = match response.status {
                FunctionCallResponseStatus::Success => RpcCallStatus::Success,
                FunctionCallResponseStatus::InternalServerError => {
                    RpcCallStatus::InternalServerError
                }
            };
            let event = RpcCallResultEvent {
                timestamp: response.timestamp,
                call_status,
                result_data: response.data.clone(),
                user_context: call.user_context,
            };
            if call.pending_counterparts.is_empty() {
                state.active_calls.remove(&response.call_uuid);
            }
            event
        };
        self.deliver_result(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use silbus_core::bus::DeferredJob;
    use silbus_core::messages::MessageKind;

    #[derive(Default)]
    struct MockBus {
        broadcasts: PlMutex<Vec<Message>>,
    }

    impl Bus for MockBus {
        fn participant_name(&self) -> &str {
            "Client"
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
            Vec::new()
        }
    }

    struct FixedTime;
    impl TimeProvider for FixedTime {
        fn now(&self) -> Duration {
            Duration::from_millis(100)
        }
    }

    type ResultRecord = Arc<PlMutex<Vec<RpcCallResultEvent>>>;

    fn make_client(bus: &Arc<MockBus>) -> (Arc<RpcClient>, ResultRecord) {
        let results: ResultRecord = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let client = Arc::new(RpcClient::new(
            Arc::clone(bus) as Arc<dyn Bus>,
            Arc::new(FixedTime),
            RpcSpec::new("Add", "application/json"),
            "client-uuid-1",
            Some(Arc::new(move |event: &RpcCallResultEvent| {
                sink.lock().push(event.clone());
            })),
        ));
        client.set_service_descriptor(ServiceDescriptor::new("Client", "client-uuid-1", "Rpc", 7));
        (client, results)
    }

    fn server_endpoint(participant: &str, service_id: u64) -> ServiceDescriptor {
        ServiceDescriptor::new(participant, "client-uuid-1", "ServerInternal", service_id)
    }

    #[test]
    fn call_without_counterparts_reports_server_not_reachable() {
        let bus = Arc::new(MockBus::default());
        let (client, results) = make_client(&bus);

        client.call(vec![1, 2, 3], 42).unwrap();

        // The result fired synchronously, before any I/O.
        assert!(bus.broadcasts.lock().is_empty());
        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].call_status, RpcCallStatus::ServerNotReachable);
        assert!(results[0].result_data.is_empty());
        assert_eq!(results[0].user_context, 42);
    }

    #[test]
    fn responses_settle_the_call() {
        let bus = Arc::new(MockBus::default());
        let (client, results) = make_client(&bus);
        client.on_counterpart_added(("ServerA".to_string(), 1));
        client.on_counterpart_added(("ServerB".to_string(), 2));

        client.call(vec![1], 7).unwrap();
        let call_uuid = match bus.broadcasts.lock().last() {
            Some(Message::FunctionCall(call)) => call.call_uuid,
            other => panic!("expected function call, got {other:?}"),
        };

        let response = FunctionCallResponse {
            timestamp: Duration::from_millis(101),
            call_uuid,
            data: vec![4, 5],
            status: FunctionCallResponseStatus::Success,
        };
        client.receive_msg(
            &server_endpoint("ServerA", 1),
            &Message::FunctionCallResponse(response.clone()),
        );
        client.receive_msg(
            &server_endpoint("ServerB", 2),
            &Message::FunctionCallResponse(FunctionCallResponse {
                data: vec![6],
                ..response
            }),
        );

        let results = results.lock();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|event| event.call_status == RpcCallStatus::Success));

        // The UUID entry is gone: a further response is unknown.
        drop(results);
        client.receive_msg(
            &server_endpoint("ServerA", 1),
            &Message::FunctionCallResponse(FunctionCallResponse {
                timestamp: Duration::from_millis(102),
                call_uuid,
                data: Vec::new(),
                status: FunctionCallResponseStatus::Success,
            }),
        );
    }

    #[test]
    fn counterpart_disconnect_synthesises_a_result() {
        let bus = Arc::new(MockBus::default());
        let (client, results) = make_client(&bus);
        client.on_counterpart_added(("ServerA".to_string(), 1));
        client.on_counterpart_added(("ServerB".to_string(), 2));

        client.call(vec![1], 9).unwrap();
        let call_uuid = match bus.broadcasts.lock().last() {
            Some(Message::FunctionCall(call)) => call.call_uuid,
            other => panic!("expected function call, got {other:?}"),
        };

        client.receive_msg(
            &server_endpoint("ServerA", 1),
            &Message::FunctionCallResponse(FunctionCallResponse {
                timestamp: Duration::from_millis(101),
                call_uuid,
                data: vec![4, 5],
                status: FunctionCallResponseStatus::Success,
            }),
        );
        client.on_counterpart_removed(&("ServerB".to_string(), 2));

        let results = results.lock();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_status, RpcCallStatus::Success);
        assert_eq!(results[1].call_status, RpcCallStatus::RecipientDisconnected);
        assert_eq!(results[1].user_context, 9);
    }

    #[test]
    fn timeouts_expire_pending_calls() {
        let bus = Arc::new(MockBus::default());
        let (client, results) = make_client(&bus);
        client.on_counterpart_added(("ServerA".to_string(), 1));

        client
            .call_with_timeout(vec![1], Duration::from_millis(50), 3)
            .unwrap();
        assert_eq!(client.next_deadline(), Some(Duration::from_millis(150)));

        client.process_timeouts(Duration::from_millis(149));
        assert!(results.lock().is_empty());

        client.process_timeouts(Duration::from_millis(150));
        {
            let results = results.lock();
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].call_status, RpcCallStatus::Timeout);
        }

        // A late response to the forgotten call is ignored.
        let call_uuid = match bus.broadcasts.lock().last() {
            Some(Message::FunctionCall(call)) => call.call_uuid,
            other => panic!("expected function call, got {other:?}"),
        };
        client.receive_msg(
            &server_endpoint("ServerA", 1),
            &Message::FunctionCallResponse(FunctionCallResponse {
                timestamp: Duration::from_millis(200),
                call_uuid,
                data: Vec::new(),
                status: FunctionCallResponseStatus::Success,
            }),
        );
        assert_eq!(results.lock().len(), 1);
    }
}
