//! The user-facing RPC server.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use silbus_core::bus::{MessageReceiver, ServiceEndpoint};
use silbus_core::descriptor::ServiceDescriptor;
use silbus_core::errors::{Result, SilbusError};
use silbus_core::keys;
use silbus_core::label::{decode_labels, match_labels, MatchingLabel};
use silbus_core::messages::discovery::ServiceDiscoveryEventType;
use silbus_core::messages::Message;
use silbus_discovery::ServiceDiscovery;

use crate::server_internal::RpcServerInternal;
use crate::types::{match_media_type, RpcCallHandle, RpcCallHandler, RpcSpec};

/// Creates and retires the per-client internal endpoints on behalf of the
/// server; implemented by the participant, which owns service ids, receiver
/// registration and discovery announcements.
pub trait RpcServerInternalFactory: Send + Sync {
    /// Create and announce an internal server endpoint for one client.
    fn create_rpc_server_internal(
        &self,
        function_name: &str,
        client_uuid: &str,
        media_type: &str,
        labels: Vec<MatchingLabel>,
        handler: Option<Arc<RpcCallHandler>>,
    ) -> Arc<RpcServerInternal>;

    /// Retract and drop an internal server endpoint.
    fn remove_rpc_server_internal(&self, internal: &Arc<RpcServerInternal>);
}

/// Serves one function; spawns an internal endpoint per matched client.
pub struct RpcServer {
    descriptor: RwLock<ServiceDescriptor>,
    spec: RpcSpec,
    handler: Mutex<Option<Arc<RpcCallHandler>>>,
    internal_servers: Mutex<IndexMap<String, Arc<RpcServerInternal>>>,
}

impl RpcServer {
    /// Create a server for `spec`.
    pub fn new(spec: RpcSpec, handler: Option<Arc<RpcCallHandler>>) -> Self {
        Self {
            descriptor: RwLock::new(ServiceDescriptor::default()),
            spec,
            handler: Mutex::new(handler),
            internal_servers: Mutex::new(IndexMap::new()),
        }
    }

    /// The endpoint spec.
    pub fn spec(&self) -> &RpcSpec {
        &self.spec
    }

    /// Replace the call handler on this server and all internal endpoints.
    pub fn set_call_handler(&self, handler: Arc<RpcCallHandler>) {
        *self.handler.lock() = Some(Arc::clone(&handler));
        let internals: Vec<Arc<RpcServerInternal>> =
            self.internal_servers.lock().values().cloned().collect();
        for internal in internals {
            internal.set_call_handler(Some(Arc::clone(&handler)));
        }
    }

    /// Watch for matching RPC clients; on a match, instantiate the internal
    /// per-client endpoint through `factory`.
    pub fn register_service_discovery(
        self: &Arc<Self>,
        discovery: &ServiceDiscovery,
        factory: &Arc<dyn RpcServerInternalFactory>,
    ) {
        let weak_server = Arc::downgrade(self);
        let weak_factory: Weak<dyn RpcServerInternalFactory> = Arc::downgrade(factory);
        discovery.register_specific_service_discovery_handler(
            Arc::new(move |event_type, descriptor| {
                let (Some(server), Some(factory)) = (weak_server.upgrade(), weak_factory.upgrade())
                else {
                    return;
                };
                match event_type {
                    ServiceDiscoveryEventType::ServiceCreated => {
                        server.on_client_discovered(descriptor, &factory);
                    }
                    ServiceDiscoveryEventType::ServiceRemoved => {
                        server.on_client_removed(descriptor, &factory);
                    }
                    ServiceDiscoveryEventType::Invalid => {}
                }
            }),
            keys::CONTROLLER_TYPE_RPC_CLIENT,
            self.spec.function_name(),
            self.spec.labels(),
        );
    }

    /// Answer a call received by one of the internal endpoints.
    ///
    /// The handle must originate from this server; double submission or a
    /// foreign handle is a contract violation.
    pub fn submit_result(&self, call_handle: &RpcCallHandle, result_data: &[u8]) -> Result<()> {
        let internals: Vec<Arc<RpcServerInternal>> =
            self.internal_servers.lock().values().cloned().collect();
        let submitted = internals
            .iter()
            .filter(|internal| internal.submit_result(call_handle, result_data))
            .count();
        if submitted != 1 {
            return Err(SilbusError::state(
                "submit_result must be called once with a handle of an active call",
            ));
        }
        Ok(())
    }

    fn on_client_discovered(
        &self,
        descriptor: &ServiceDescriptor,
        factory: &Arc<dyn RpcServerInternalFactory>,
    ) {
        let item = |key: &str| descriptor.supplemental_data_item(key).unwrap_or_default();
        let client_uuid = item(keys::KEY_RPC_CLIENT_UUID).to_string();
        if client_uuid.is_empty() {
            warn!(%descriptor, "ignoring rpc client without uuid");
            return;
        }
        if self.internal_servers.lock().contains_key(&client_uuid) {
            // The client is already connected.
            return;
        }

        let function_name = item(keys::KEY_RPC_CLIENT_FUNCTION_NAME);
        let client_media_type = item(keys::KEY_RPC_CLIENT_MEDIA_TYPE);
        let client_labels = decode_labels(item(keys::KEY_RPC_CLIENT_LABELS)).unwrap_or_default();

        if function_name != self.spec.function_name()
            || !match_media_type(client_media_type, self.spec.media_type())
            || !match_labels(self.spec.labels(), &client_labels)
        {
            return;
        }

        debug!(client = %client_uuid, function = %function_name, "rpc client matched");
        let internal = factory.create_rpc_server_internal(
            self.spec.function_name(),
            &client_uuid,
            client_media_type,
            client_labels,
            self.handler.lock().clone(),
        );
        self.internal_servers.lock().insert(client_uuid, internal);
    }

    fn on_client_removed(
        &self,
        descriptor: &ServiceDescriptor,
        factory: &Arc<dyn RpcServerInternalFactory>,
    ) {
        let Some(client_uuid) = descriptor.supplemental_data_item(keys::KEY_RPC_CLIENT_UUID) else {
            return;
        };
        let removed = self.internal_servers.lock().shift_remove(client_uuid);
        if let Some(internal) = removed {
            debug!(client = %client_uuid, "rpc client left, retiring internal server");
            factory.remove_rpc_server_internal(&internal);
        }
    }
}

impl ServiceEndpoint for RpcServer {
    fn service_descriptor(&self) -> ServiceDescriptor {
        self.descriptor.read().clone()
    }

    fn set_service_descriptor(&self, descriptor: ServiceDescriptor) {
        *self.descriptor.write() = descriptor;
    }
}

impl MessageReceiver for RpcServer {
    fn receive_msg(&self, _from: &ServiceDescriptor, _msg: &Message) {
        // Traffic flows through the internal per-client endpoints.
    }
}
