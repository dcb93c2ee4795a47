//! The per-client server endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::error;
use uuid::Uuid;

use silbus_core::bus::{Bus, MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::label::MatchingLabel;
use silbus_core::messages::rpc::{FunctionCall, FunctionCallResponse, FunctionCallResponseStatus};
use silbus_core::messages::Message;
use silbus_core::time::TimeProvider;

use crate::types::{RpcCallEvent, RpcCallHandle, RpcCallHandler};

/// Server endpoint serving exactly one matched client.
///
/// Owns the `call uuid -> call handle` map for that client; created by the
/// parent [`crate::RpcServer`] when discovery reports a matching client.
pub struct RpcServerInternal {
    bus: Arc<dyn Bus>,
    time: Arc<dyn TimeProvider>,
    descriptor: RwLock<ServiceDescriptor>,
    function_name: String,
    media_type: String,
    labels: Vec<MatchingLabel>,
    client_uuid: String,
    handler: Mutex<Option<Arc<RpcCallHandler>>>,
    active_calls: Mutex<HashMap<Uuid, RpcCallHandle>>,
}

impl RpcServerInternal {
    /// Create the endpoint for one client.
    pub fn new(
        bus: Arc<dyn Bus>,
        time: Arc<dyn TimeProvider>,
        function_name: impl Into<String>,
        media_type: impl Into<String>,
        labels: Vec<MatchingLabel>,
        client_uuid: impl Into<String>,
        handler: Option<Arc<RpcCallHandler>>,
    ) -> Self {
        Self {
            bus,
            time,
            descriptor: RwLock::new(ServiceDescriptor::default()),
            function_name: function_name.into(),
            media_type: media_type.into(),
            labels,
            client_uuid: client_uuid.into(),
            handler: Mutex::new(handler),
            active_calls: Mutex::new(HashMap::new()),
        }
    }

    /// The served client's UUID.
    pub fn client_uuid(&self) -> &str {
        &self.client_uuid
    }

    /// The served function name.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// The negotiated media type.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// The client's labels.
    pub fn labels(&self) -> &[MatchingLabel] {
        &self.labels
    }

    /// Replace the call handler; propagated from the parent server.
    pub fn set_call_handler(&self, handler: Option<Arc<RpcCallHandler>>) {
        *self.handler.lock() = handler;
    }

    /// Answer a call previously delivered to the handler. Returns `false`
    /// when the handle did not originate from this endpoint or was already
    /// answered.
    pub(crate) fn submit_result(&self, call_handle: &RpcCallHandle, result_data: &[u8]) -> bool {
        if call_handle.client_uuid != self.client_uuid {
            return false;
        }
        if self
            .active_calls
            .lock()
            .remove(&call_handle.call_uuid)
            .is_none()
        {
            return false;
        }
        self.bus.send_msg(
            &self.service_descriptor(),
            Message::FunctionCallResponse(FunctionCallResponse {
                timestamp: self.time.now(),
                call_uuid: call_handle.call_uuid,
                data: result_data.to_vec(),
                status: FunctionCallResponseStatus::Success,
            }),
        );
        true
    }

    fn reject_call(&self, call: &FunctionCall) {
        self.bus.send_msg(
            &self.service_descriptor(),
            Message::FunctionCallResponse(FunctionCallResponse {
                timestamp: self.time.now(),
                call_uuid: call.call_uuid,
                data: Vec::new(),
                status: FunctionCallResponseStatus::InternalServerError,
            }),
        );
    }

    fn on_function_call(&self, call: &FunctionCall) {
        let handler = self.handler.lock().clone();
        let Some(handler) = handler else {
            error!("function call received but no handler has been set");
            self.reject_call(call);
            return;
        };

        let call_handle = RpcCallHandle {
            call_uuid: call.call_uuid,
            client_uuid: self.client_uuid.clone(),
        };
        {
            let mut active_calls = self.active_calls.lock();
            if active_calls.contains_key(&call.call_uuid) {
                error!(call_uuid = %call.call_uuid, "received function call with already active uuid");
                drop(active_calls);
                self.reject_call(call);
                return;
            }
            active_calls.insert(call.call_uuid, call_handle.clone());
        }

        handler(RpcCallEvent {
            timestamp: call.timestamp,
            call_handle,
            data: call.data.clone(),
        });
    }
}

impl ServiceEndpoint for RpcServerInternal {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for RpcServerInternal {
    fn receive_msg(&self, _from: &ServiceDescriptor, msg: &Message) {
        if let Message::FunctionCall(call) = msg {
            self.on_function_call(call);
        }
    }
}
