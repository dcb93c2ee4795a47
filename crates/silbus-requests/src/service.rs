//! The request/reply service endpoint.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::errors::{Result, SilbusError};
use silbus_core::messages::requests::{
    CallReturnStatus, FunctionType, RequestReplyCall, RequestReplyCallReturn,
};
use silbus_core::messages::{Message, MessageKind};

/// Surface a procedure uses to answer a received call.
pub trait CallReturnSink: Send + Sync {
    /// Send a call return back to the call's initiator.
    fn submit_call_return(
        &self,
        call_uuid: Uuid,
        function_type: FunctionType,
        call_return_data: Vec<u8>,
        call_return_status: CallReturnStatus,
    ) -> Result<()>;
}

/// A procedure plugged into the request/reply service.
pub trait RequestReplyProcedure: Send + Sync {
    /// Handle an incoming call. Returning an error makes the service answer
    /// with `CallReturnStatus::ProcedureError`.
    fn receive_call(&self, sink: &dyn CallReturnSink, call_uuid: Uuid, call_data: &[u8])
        -> Result<()>;

    /// Handle one call return for a call this participant initiated.
    fn receive_call_return(
        &self,
        from_participant: &str,
        call_uuid: Uuid,
        call_return_data: &[u8],
        call_return_status: CallReturnStatus,
    );
}

struct RequestsState {
    /// Per peer: the call returns synthesised if that peer disconnects
    /// before replying.
    disconnect_call_returns: HashMap<String, HashMap<Uuid, RequestReplyCallReturn>>,
    /// Which participant initiated a call we received, so the reply can be
    /// directed back to exactly that peer.
    initiator_by_call_uuid: HashMap<Uuid, String>,
}

/// Issues calls, routes received calls into procedures and guarantees exactly
/// one call return per expected recipient.
pub struct RequestReplyService {
    bus: Arc<dyn Bus>,
    participant_name: String,
    descriptor: RwLock<ServiceDescriptor>,
    state: ReentrantMutex<RefCell<RequestsState>>,
    procedures: HashMap<FunctionType, Arc<dyn RequestReplyProcedure>>,
    shutting_down: AtomicBool,
}

impl RequestReplyService {
    /// Create the service with its procedure table.
    pub fn new(
        bus: Arc<dyn Bus>,
        participant_name: impl Into<String>,
        procedures: HashMap<FunctionType, Arc<dyn RequestReplyProcedure>>,
    ) -> Self {
        Self {
            bus,
            participant_name: participant_name.into(),
            descriptor: RwLock::new(ServiceDescriptor::default()),
            state: ReentrantMutex::new(RefCell::new(RequestsState {
                disconnect_call_returns: HashMap::new(),
                initiator_by_call_uuid: HashMap::new(),
            })),
            procedures,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Convert all further inbound messages into no-ops.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Broadcast a call to all participants and return its UUID.
    pub fn call(&self, function_type: FunctionType, call_data: Vec<u8>) -> Result<Uuid> {
        self.call_with_uuid(Uuid::new_v4(), function_type, call_data)
    }

    /// Like [`RequestReplyService::call`] but with a caller-chosen UUID, so a
    /// procedure can finish its bookkeeping before replies start arriving.
    pub fn call_with_uuid(
        &self,
        call_uuid: Uuid,
        function_type: FunctionType,
        call_data: Vec<u8>,
    ) -> Result<Uuid> {
        if function_type == FunctionType::Invalid {
            return Err(SilbusError::state(
                "call with FunctionType::Invalid is not allowed",
            ));
        }

        let guard = self.state.lock();

        // Snapshot the peers that receive the call; this is the set the
        // disconnect synthesis must cover. Taken before the send so a late
        // joiner cannot end up with a dangling call.
        let receiving_participants = self
            .bus
            .remote_receivers_of(&self.service_descriptor(), MessageKind::RequestReplyCall);
        {
            let mut state = guard.borrow_mut();
            for name in &receiving_participants {
                let synthesised = RequestReplyCallReturn {
                    call_uuid,
                    function_type,
                    call_return_data: Vec::new(),
                    call_return_status: CallReturnStatus::RecipientDisconnected,
                };
                state
                    .disconnect_call_returns
                    .entry(name.clone())
                    .or_default()
                    .insert(call_uuid, synthesised);
            }
        }

        let call = RequestReplyCall {
            call_uuid,
            function_type,
            call_data,
        };
        self.bus
            .send_msg(&self.service_descriptor(), Message::RequestReplyCall(call));
        Ok(call_uuid)
    }

    /// Deliver the synthesised call returns for a disconnected peer.
    pub fn on_participant_removal(&self, participant_name: &str) {
        let guard = self.state.lock();
        let pending = {
            let mut state = guard.borrow_mut();
            state.disconnect_call_returns.remove(participant_name)
        };
        let Some(pending) = pending else { return };
        for (_, call_return) in pending {
            self.forward_call_return_to_procedure(participant_name, &call_return);
        }
    }

    fn forward_call_to_procedure(&self, from_participant: &str, msg: &RequestReplyCall) {
        match self.procedures.get(&msg.function_type) {
            None => {
                let _ = self.submit_call_return_for(
                    from_participant,
                    msg.call_uuid,
                    msg.function_type,
                    Vec::new(),
                    CallReturnStatus::UnknownFunctionType,
                );
            }
            Some(procedure) => {
                if let Err(err) = procedure.receive_call(self, msg.call_uuid, &msg.call_data) {
                    debug!(%err, "procedure failed, answering with ProcedureError");
                    let _ = self.submit_call_return_for(
                        from_participant,
                        msg.call_uuid,
                        msg.function_type,
                        Vec::new(),
                        CallReturnStatus::ProcedureError,
                    );
                }
            }
        }
    }

    fn forward_call_return_to_procedure(
        &self,
        from_participant: &str,
        msg: &RequestReplyCallReturn,
    ) {
        match self.procedures.get(&msg.function_type) {
            None => {
                error!(
                    function_type = ?msg.function_type,
                    "received call return for unknown function type"
                );
            }
            Some(procedure) => {
                procedure.receive_call_return(
                    from_participant,
                    msg.call_uuid,
                    &msg.call_return_data,
                    msg.call_return_status,
                );
            }
        }
    }

    fn submit_call_return_for(
        &self,
        initiator: &str,
        call_uuid: Uuid,
        function_type: FunctionType,
        call_return_data: Vec<u8>,
        call_return_status: CallReturnStatus,
    ) -> Result<()> {
        let call_return = RequestReplyCallReturn {
            call_uuid,
            function_type,
            call_return_data,
            call_return_status,
        };
        self.bus.send_msg_to(
            &self.service_descriptor(),
            initiator,
            Message::RequestReplyCallReturn(call_return),
        );
        Ok(())
    }

    fn remove_from_disconnect_lookup(&self, call_uuid: Uuid, participant_name: &str) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if let Some(pending) = state.disconnect_call_returns.get_mut(participant_name) {
            pending.remove(&call_uuid);
            if pending.is_empty() {
                state.disconnect_call_returns.remove(participant_name);
            }
        }
    }
}

impl CallReturnSink for RequestReplyService {
    fn submit_call_return(
        &self,
        call_uuid: Uuid,
        function_type: FunctionType,
        call_return_data: Vec<u8>,
        call_return_status: CallReturnStatus,
    ) -> Result<()> {
        if function_type == FunctionType::Invalid {
            return Err(SilbusError::state(
                "submit_call_return with FunctionType::Invalid is not allowed",
            ));
        }

        let initiator = {
            let guard = self.state.lock();
            let state = guard.borrow();
            state
                .initiator_by_call_uuid
                .get(&call_uuid)
                .cloned()
                .ok_or_else(|| SilbusError::state("submit_call_return for unknown call UUID"))?
        };
        self.submit_call_return_for(
            &initiator,
            call_uuid,
            function_type,
            call_return_data,
            call_return_status,
        )
    }
}

impl ServiceEndpoint for RequestReplyService {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for RequestReplyService {
    fn receive_msg(&self, from: &ServiceDescriptor, msg: &Message) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        match msg {
            Message::RequestReplyCall(call) => {
                let from_participant = from.participant_name().to_string();
                {
                    let guard = self.state.lock();
                    let mut state = guard.borrow_mut();
                    if state.initiator_by_call_uuid.contains_key(&call.call_uuid) {
                        error!(call_uuid = %call.call_uuid, "dropping duplicate request/reply call");
                        return;
                    }
                    state
                        .initiator_by_call_uuid
                        .insert(call.call_uuid, from_participant.clone());
                }
                self.forward_call_to_procedure(&from_participant, call);
            }
            Message::RequestReplyCallReturn(call_return) => {
                let from_participant = from.participant_name();
                self.remove_from_disconnect_lookup(call_return.call_uuid, from_participant);
                self.forward_call_return_to_procedure(from_participant, call_return);
            }
            _ => {}
        }
    }
}

// The participant name identifies this service in logs; the descriptor is the
// routing identity.
impl std::fmt::Debug for RequestReplyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestReplyService")
            .field("participant", &self.participant_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use silbus_core::bus::DeferredJob;
    use silbus_core::descriptor::ServiceType;
    use silbus_core::keys;

    #[derive(Default)]
    struct MockBus {
        remote_receivers: Mutex<Vec<String>>,
        broadcasts: Mutex<Vec<Message>>,
        directed: Mutex<Vec<(String, Message)>>,
    }

    impl Bus for MockBus {
        fn participant_name(&self) -> &str {
            "ParticipantA"
        }

        fn send_msg(&self, _from: &ServiceDescriptor, msg: Message) {
            self.broadcasts.lock().push(msg);
        }

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

        fn remote_receivers_of(&self, _from: &ServiceDescriptor, _kind: MessageKind) -> Vec<String> {
            self.remote_receivers.lock().clone()
        }
    }

    type ReturnRecord = Arc<Mutex<Vec<(String, Uuid, CallReturnStatus)>>>;

    /// Echoes every call back with `Success` and records call returns.
    struct EchoProcedure {
        returns: ReturnRecord,
    }

    impl RequestReplyProcedure for EchoProcedure {
        fn receive_call(
            &self,
            sink: &dyn CallReturnSink,
            call_uuid: Uuid,
            call_data: &[u8],
        ) -> Result<()> {
            sink.submit_call_return(
                call_uuid,
                FunctionType::ParticipantReplies,
                call_data.to_vec(),
                CallReturnStatus::Success,
            )
        }

        fn receive_call_return(
            &self,
            from_participant: &str,
            call_uuid: Uuid,
            _call_return_data: &[u8],
            call_return_status: CallReturnStatus,
        ) {
            self.returns
                .lock()
                .push((from_participant.to_string(), call_uuid, call_return_status));
        }
    }

    fn make_service(bus: &Arc<MockBus>) -> (Arc<RequestReplyService>, ReturnRecord) {
        let returns: ReturnRecord = Arc::new(Mutex::new(Vec::new()));
        let mut procedures: HashMap<FunctionType, Arc<dyn RequestReplyProcedure>> = HashMap::new();
        procedures.insert(
            FunctionType::ParticipantReplies,
            Arc::new(EchoProcedure {
                returns: Arc::clone(&returns),
            }),
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
        (service, returns)
    }

    fn remote_endpoint(participant: &str) -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::new(
            participant,
            keys::INTERNAL_NETWORK_NAME,
            "RequestReplyService",
            2,
        );
        descriptor.set_service_type(ServiceType::InternalController);
        descriptor
    }

    #[test]
    fn call_with_invalid_function_type_is_rejected() {
        let bus = Arc::new(MockBus::default());
        let (service, _) = make_service(&bus);
        assert!(matches!(
            service.call(FunctionType::Invalid, Vec::new()),
            Err(SilbusError::State { .. })
        ));
    }

    #[test]
    fn call_broadcasts_and_seeds_disconnect_synthesis() {
        let bus = Arc::new(MockBus::default());
        *bus.remote_receivers.lock() = vec!["ParticipantB".to_string(), "ParticipantC".to_string()];
        let (service, returns) = make_service(&bus);

        let call_uuid = service
            .call(FunctionType::ParticipantReplies, vec![1, 2])
            .unwrap();
        assert_eq!(bus.broadcasts.lock().len(), 1);

        // ParticipantB answers over the wire, ParticipantC disconnects.
        let wire_return = RequestReplyCallReturn {
            call_uuid,
            function_type: FunctionType::ParticipantReplies,
            call_return_data: Vec::new(),
            call_return_status: CallReturnStatus::Success,
        };
        service.receive_msg(
            &remote_endpoint("ParticipantB"),
            &Message::RequestReplyCallReturn(wire_return),
        );
        service.on_participant_removal("ParticipantC");

        let recorded = returns.lock();
        assert_eq!(recorded.len(), 2);
        assert_eq!(
            recorded[0],
            ("ParticipantB".to_string(), call_uuid, CallReturnStatus::Success)
        );
        assert_eq!(
            recorded[1],
            (
                "ParticipantC".to_string(),
                call_uuid,
                CallReturnStatus::RecipientDisconnected
            )
        );
    }

    #[test]
    fn wire_reply_suppresses_disconnect_synthesis() {
        let bus = Arc::new(MockBus::default());
        *bus.remote_receivers.lock() = vec!["ParticipantB".to_string()];
        let (service, returns) = make_service(&bus);

        let call_uuid = service
            .call(FunctionType::ParticipantReplies, Vec::new())
            .unwrap();
        let wire_return = RequestReplyCallReturn {
            call_uuid,
            function_type: FunctionType::ParticipantReplies,
            call_return_data: Vec::new(),
            call_return_status: CallReturnStatus::Success,
        };
        service.receive_msg(
            &remote_endpoint("ParticipantB"),
            &Message::RequestReplyCallReturn(wire_return),
        );
        // The peer leaving later must not produce a second return.
        service.on_participant_removal("ParticipantB");

        assert_eq!(returns.lock().len(), 1);
    }

    #[test]
    fn received_call_is_answered_to_the_initiator() {
        let bus = Arc::new(MockBus::default());
        let (service, _) = make_service(&bus);

        let call = RequestReplyCall {
            call_uuid: Uuid::new_v4(),
            function_type: FunctionType::ParticipantReplies,
            call_data: vec![7],
        };
        service.receive_msg(
            &remote_endpoint("ParticipantB"),
            &Message::RequestReplyCall(call.clone()),
        );

        let directed = bus.directed.lock();
        assert_eq!(directed.len(), 1);
        let (target, message) = &directed[0];
        assert_eq!(target, "ParticipantB");
        assert!(matches!(
            message,
            Message::RequestReplyCallReturn(ret)
                if ret.call_uuid == call.call_uuid
                    && ret.call_return_status == CallReturnStatus::Success
        ));
    }

    #[test]
    fn duplicate_call_uuid_is_dropped() {
        let bus = Arc::new(MockBus::default());
        let (service, _) = make_service(&bus);

        let call = RequestReplyCall {
            call_uuid: Uuid::new_v4(),
            function_type: FunctionType::ParticipantReplies,
            call_data: Vec::new(),
        };
        service.receive_msg(
            &remote_endpoint("ParticipantB"),
            &Message::RequestReplyCall(call.clone()),
        );
        service.receive_msg(
            &remote_endpoint("ParticipantB"),
            &Message::RequestReplyCall(call),
        );
        // Only the first call produced a reply.
        assert_eq!(bus.directed.lock().len(), 1);
    }

    #[test]
    fn submit_call_return_for_unknown_uuid_is_a_state_error() {
        let bus = Arc::new(MockBus::default());
        let (service, _) = make_service(&bus);
        let result = service.submit_call_return(
            Uuid::new_v4(),
            FunctionType::ParticipantReplies,
            Vec::new(),
            CallReturnStatus::Success,
        );
        assert!(matches!(result, Err(SilbusError::State { .. })));
    }
}
