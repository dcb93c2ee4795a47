//! The simulation participant.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use silbus_config::ParticipantConfiguration;
use silbus_core::bus::{Bus, BusService, ServiceEndpoint};
use silbus_core::descriptor::{EndpointId, NetworkType, ServiceDescriptor, ServiceType};
use silbus_core::errors::{Result, SilbusError};
use silbus_core::keys;
use silbus_core::label::{encode_labels, MatchingLabel};
use silbus_core::messages::requests::FunctionType;
use silbus_core::messages::MessageKind;
use silbus_core::time::{TimeProvider, WallClock};
use silbus_discovery::ServiceDiscovery;
use silbus_orchestration::{LifecycleService, SystemController, SystemMonitor};
use silbus_pubsub::{
    DataMessageHandler, DataPublisher, DataSubscriber, DataSubscriberInternal,
    DataSubscriberInternalFactory, PubSubSpec,
};
use silbus_requests::{ParticipantReplies, RequestReplyProcedure, RequestReplyService};
use silbus_rpc::{
    RpcCallHandler, RpcCallResultHandler, RpcClient, RpcServer, RpcServerInternal,
    RpcServerInternalFactory, RpcSpec,
};
use silbus_vehicle::can::CanController;
use silbus_vehicle::ethernet::EthernetController;
use silbus_vehicle::flexray::FlexrayController;
use silbus_vehicle::lin::LinController;

use crate::router::{PeerLink, Router};
use crate::timeout::TimeoutScheduler;

/// An independently built simulation participant.
///
/// Owns the router, the internal services and every controller it creates;
/// controllers hold the router but never the participant, so the participant
/// is the sole owner and the last to be destroyed.
pub struct Participant {
    name: String,
    config: ParticipantConfiguration,
    router: Arc<Router>,
    bus: Arc<dyn Bus>,
    time: Arc<dyn TimeProvider>,
    discovery: Arc<ServiceDiscovery>,
    requests: Arc<RequestReplyService>,
    replies: Arc<ParticipantReplies>,
    monitor: Arc<SystemMonitor>,
    system_controller: Arc<SystemController>,
    lifecycle: Arc<LifecycleService>,
    timeouts: Arc<TimeoutScheduler>,
    next_service_id: AtomicU64,
    service_names: Mutex<HashSet<String>>,
    /// Strong ownership of every created service.
    services: Mutex<Vec<Arc<dyn BusService>>>,
}

impl Participant {
    /// Create a participant from its configuration.
    pub fn new(config: ParticipantConfiguration) -> Result<Arc<Self>> {
        Self::with_time_provider(config, Arc::new(WallClock::new()))
    }

    /// Create a participant with an explicit time provider.
    pub fn with_time_provider(
        config: ParticipantConfiguration,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let name = config.participant_name.clone();
        info!(participant = %name, registry = %config.registry_uri()?, "creating participant");

        let router = Router::new(name.clone());
        let bus: Arc<dyn Bus> = Arc::clone(&router) as Arc<dyn Bus>;

        let discovery = Arc::new(ServiceDiscovery::new(Arc::clone(&bus), name.as_str()));
        let replies = ParticipantReplies::new(Arc::clone(&bus));
        let mut procedures: HashMap<FunctionType, Arc<dyn RequestReplyProcedure>> = HashMap::new();
        procedures.insert(
            FunctionType::ParticipantReplies,
            Arc::clone(&replies) as Arc<dyn RequestReplyProcedure>,
        );
        let requests = Arc::new(RequestReplyService::new(Arc::clone(&bus), name.as_str(), procedures));
        replies.attach_service(&requests);
        let monitor = Arc::new(SystemMonitor::new());
        let system_controller = Arc::new(SystemController::new(Arc::clone(&bus)));
        let lifecycle = Arc::new(LifecycleService::new(
            Arc::clone(&bus),
            name.as_str(),
            Arc::clone(&replies),
        ));
        let timeouts = TimeoutScheduler::new(Arc::clone(&time));

        let participant = Arc::new(Self {
            name,
            config,
            router,
            bus,
            time,
            discovery: Arc::clone(&discovery),
            requests: Arc::clone(&requests),
            replies,
            monitor: Arc::clone(&monitor),
            system_controller: Arc::clone(&system_controller),
            lifecycle: Arc::clone(&lifecycle),
            timeouts,
            next_service_id: AtomicU64::new(1),
            service_names: Mutex::new(HashSet::new()),
            services: Mutex::new(Vec::new()),
        });

        // The discovery controller must be the first announced service: its
        // creation event is the bootstrap handshake with every new peer.
        participant.register_internal_controller(
            Arc::clone(&discovery) as Arc<dyn BusService>,
            keys::CONTROLLER_TYPE_SERVICE_DISCOVERY,
            &[MessageKind::ParticipantDiscovery, MessageKind::ServiceDiscovery],
        );
        participant.register_internal_controller(
            requests as Arc<dyn BusService>,
            keys::CONTROLLER_TYPE_REQUEST_REPLY_SERVICE,
            &[
                MessageKind::RequestReplyCall,
                MessageKind::RequestReplyCallReturn,
            ],
        );
        participant.register_internal_controller(
            monitor as Arc<dyn BusService>,
            keys::CONTROLLER_TYPE_SYSTEM_MONITOR,
            &[
                MessageKind::ParticipantStatus,
                MessageKind::WorkflowConfiguration,
            ],
        );
        participant.register_internal_controller(
            system_controller as Arc<dyn BusService>,
            keys::CONTROLLER_TYPE_SYSTEM_CONTROLLER,
            &[],
        );
        participant.register_internal_controller(
            lifecycle as Arc<dyn BusService>,
            keys::CONTROLLER_TYPE_LIFECYCLE_SERVICE,
            &[],
        );

        Ok(participant)
    }

    /// The participant's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The participant's configuration.
    pub fn config(&self) -> &ParticipantConfiguration {
        &self.config
    }

    /// The router; exposed for transports connecting peers.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The participant's time provider.
    pub fn time_provider(&self) -> &Arc<dyn TimeProvider> {
        &self.time
    }

    /// The service discovery.
    pub fn service_discovery(&self) -> &Arc<ServiceDiscovery> {
        &self.discovery
    }

    /// The lifecycle service.
    pub fn lifecycle_service(&self) -> &Arc<LifecycleService> {
        &self.lifecycle
    }

    /// The system monitor.
    pub fn system_monitor(&self) -> &Arc<SystemMonitor> {
        &self.monitor
    }

    /// The system controller.
    pub fn system_controller(&self) -> &Arc<SystemController> {
        &self.system_controller
    }

    /// The all-participants-replied barrier.
    pub fn participant_replies(&self) -> &Arc<ParticipantReplies> {
        &self.replies
    }

    /// Attach a peer connection without announcing yet. Transports attach
    /// both directions of a fresh connection before either side announces.
    pub fn attach_peer(&self, link: Arc<dyn PeerLink>) {
        let peer_name = link.peer_name().to_string();
        self.router.add_peer(link);
        self.monitor.on_participant_connected(&peer_name);
    }

    /// Run the discovery handshake with an attached peer.
    pub fn announce_to_peer(&self, peer_name: &str) {
        self.discovery.announce_to_new_peer(peer_name);
    }

    /// Attach a peer connection and run the discovery handshake.
    pub fn connect_peer(&self, link: Arc<dyn PeerLink>) {
        let peer_name = link.peer_name().to_string();
        self.attach_peer(link);
        self.announce_to_peer(&peer_name);
    }

    /// Detach a peer and cascade the loss into the request/reply plane,
    /// service discovery and the system monitor.
    pub fn disconnect_peer(&self, peer_name: &str) {
        if !self.router.remove_peer(peer_name) {
            return;
        }
        self.requests.on_participant_removal(peer_name);
        self.discovery.on_participant_removal(peer_name);
        self.monitor.on_participant_disconnected(peer_name);
    }

    /// Create a CAN controller. The configured controller table may override
    /// the network name.
    pub fn create_can_controller(&self, name: &str) -> Result<Arc<CanController>> {
        let network = self.configured_network(&self.config.can_controllers, name);
        self.claim_service_name(name)?;
        let controller = Arc::new(CanController::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.time),
            name,
        ));

        let mut descriptor = self.controller_descriptor(name, &network, NetworkType::Can);
        descriptor.set_supplemental_data_item(keys::CONTROLLER_TYPE, keys::CONTROLLER_TYPE_CAN);
        controller.set_service_descriptor(descriptor.clone());

        self.own_service(
            Arc::clone(&controller) as Arc<dyn BusService>,
            &[
                MessageKind::CanFrame,
                MessageKind::CanFrameTransmit,
                MessageKind::CanControllerStatus,
            ],
        );
        controller.register_service_discovery(&self.discovery);
        self.discovery.notify_service_created(descriptor);
        Ok(controller)
    }

    /// Create an Ethernet controller.
    pub fn create_ethernet_controller(&self, name: &str) -> Result<Arc<EthernetController>> {
        let network = self.configured_network(&self.config.ethernet_controllers, name);
        self.claim_service_name(name)?;
        let controller = Arc::new(EthernetController::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.time),
            name,
        ));

        let mut descriptor = self.controller_descriptor(name, &network, NetworkType::Ethernet);
        descriptor
            .set_supplemental_data_item(keys::CONTROLLER_TYPE, keys::CONTROLLER_TYPE_ETHERNET);
        controller.set_service_descriptor(descriptor.clone());

        self.own_service(
            Arc::clone(&controller) as Arc<dyn BusService>,
            &[
                MessageKind::EthernetFrame,
                MessageKind::EthernetFrameTransmit,
                MessageKind::EthernetStatus,
            ],
        );
        controller.register_service_discovery(&self.discovery);
        self.discovery.notify_service_created(descriptor);
        Ok(controller)
    }

    /// Create a FlexRay controller.
    pub fn create_flexray_controller(&self, name: &str) -> Result<Arc<FlexrayController>> {
        let network = self.configured_network(&self.config.flexray_controllers, name);
        self.claim_service_name(name)?;
        let controller = Arc::new(FlexrayController::new(Arc::clone(&self.bus), name));

        let mut descriptor = self.controller_descriptor(name, &network, NetworkType::FlexRay);
        descriptor
            .set_supplemental_data_item(keys::CONTROLLER_TYPE, keys::CONTROLLER_TYPE_FLEXRAY);
        controller.set_service_descriptor(descriptor.clone());

        self.own_service(
            Arc::clone(&controller) as Arc<dyn BusService>,
            &[
                MessageKind::FlexrayFrame,
                MessageKind::FlexrayFrameTransmit,
                MessageKind::FlexrayPocStatus,
            ],
        );
        controller.register_service_discovery(&self.discovery);
        self.discovery.notify_service_created(descriptor);
        Ok(controller)
    }

    /// Create a LIN controller.
    pub fn create_lin_controller(&self, name: &str) -> Result<Arc<LinController>> {
        let network = self.configured_network(&self.config.lin_controllers, name);
        self.claim_service_name(name)?;
        let controller = Arc::new(LinController::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.time),
            name,
        ));

        let mut descriptor = self.controller_descriptor(name, &network, NetworkType::Lin);
        descriptor.set_supplemental_data_item(keys::CONTROLLER_TYPE, keys::CONTROLLER_TYPE_LIN);
        controller.set_service_descriptor(descriptor.clone());

        self.own_service(
            Arc::clone(&controller) as Arc<dyn BusService>,
            &[MessageKind::LinTransmission, MessageKind::LinWakeupPulse],
        );
        controller.register_service_discovery(&self.discovery);
        self.discovery.notify_service_created(descriptor);
        Ok(controller)
    }

    /// Create a data publisher.
    pub fn create_data_publisher(&self, name: &str, spec: PubSubSpec) -> Result<Arc<DataPublisher>> {
        self.claim_service_name(name)?;
        let publisher_uuid = Uuid::new_v4().to_string();
        let publisher = Arc::new(DataPublisher::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.time),
            spec.clone(),
            publisher_uuid.as_str(),
        ));

        let mut descriptor =
            self.controller_descriptor(name, spec.topic(), NetworkType::Data);
        descriptor.set_supplemental_data_item(
            keys::CONTROLLER_TYPE,
            keys::CONTROLLER_TYPE_DATA_PUBLISHER,
        );
        descriptor.set_supplemental_data_item(keys::KEY_DATA_PUBLISHER_TOPIC, spec.topic());
        descriptor
            .set_supplemental_data_item(keys::KEY_DATA_PUBLISHER_MEDIA_TYPE, spec.media_type());
        descriptor.set_supplemental_data_item(
            keys::KEY_DATA_PUBLISHER_LABELS,
            encode_labels(spec.labels()),
        );
        descriptor.set_supplemental_data_item(keys::KEY_DATA_PUBLISHER_UUID, publisher_uuid.as_str());
        publisher.set_service_descriptor(descriptor.clone());

        self.own_service(Arc::clone(&publisher) as Arc<dyn BusService>, &[]);
        self.discovery.notify_service_created(descriptor);
        Ok(publisher)
    }

    /// Create a data subscriber.
    pub fn create_data_subscriber(
        self: &Arc<Self>,
        name: &str,
        spec: PubSubSpec,
        handler: Arc<DataMessageHandler>,
    ) -> Result<Arc<DataSubscriber>> {
        self.claim_service_name(name)?;
        let subscriber = Arc::new(DataSubscriber::new(spec.clone(), handler));

        let mut descriptor =
            self.controller_descriptor(name, spec.topic(), NetworkType::Data);
        descriptor.set_supplemental_data_item(
            keys::CONTROLLER_TYPE,
            keys::CONTROLLER_TYPE_DATA_SUBSCRIBER,
        );
        descriptor.set_supplemental_data_item(keys::KEY_DATA_SUBSCRIBER_TOPIC, spec.topic());
        descriptor
            .set_supplemental_data_item(keys::KEY_DATA_SUBSCRIBER_MEDIA_TYPE, spec.media_type());
        descriptor.set_supplemental_data_item(
            keys::KEY_DATA_SUBSCRIBER_LABELS,
            encode_labels(spec.labels()),
        );
        subscriber.set_service_descriptor(descriptor.clone());

        self.own_service(Arc::clone(&subscriber) as Arc<dyn BusService>, &[]);
        let factory: Arc<dyn DataSubscriberInternalFactory> =
            Arc::clone(self) as Arc<dyn DataSubscriberInternalFactory>;
        subscriber.register_service_discovery(&self.discovery, &factory);
        self.discovery.notify_service_created(descriptor);
        Ok(subscriber)
    }

    /// Create an RPC client.
    pub fn create_rpc_client(
        self: &Arc<Self>,
        name: &str,
        spec: RpcSpec,
        handler: Option<Arc<RpcCallResultHandler>>,
    ) -> Result<Arc<RpcClient>> {
        self.claim_service_name(name)?;
        let client_uuid = Uuid::new_v4().to_string();
        let client = Arc::new(RpcClient::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.time),
            spec.clone(),
            client_uuid.as_str(),
            handler,
        ));

        let mut descriptor = self.controller_descriptor(name, &client_uuid, NetworkType::Rpc);
        descriptor
            .set_supplemental_data_item(keys::CONTROLLER_TYPE, keys::CONTROLLER_TYPE_RPC_CLIENT);
        descriptor.set_supplemental_data_item(
            keys::KEY_RPC_CLIENT_FUNCTION_NAME,
            spec.function_name(),
        );
        descriptor.set_supplemental_data_item(keys::KEY_RPC_CLIENT_MEDIA_TYPE, spec.media_type());
        descriptor
            .set_supplemental_data_item(keys::KEY_RPC_CLIENT_LABELS, encode_labels(spec.labels()));
        descriptor.set_supplemental_data_item(keys::KEY_RPC_CLIENT_UUID, client_uuid.as_str());
        client.set_service_descriptor(descriptor.clone());

        self.own_service(
            Arc::clone(&client) as Arc<dyn BusService>,
            &[MessageKind::FunctionCallResponse],
        );
        client.register_service_discovery(&self.discovery);

        let scheduler = Arc::clone(&self.timeouts);
        client.set_timeout_wakeup(Box::new(move |deadline| scheduler.notify_deadline(deadline)));
        self.timeouts.register_client(&client);

        self.discovery.notify_service_created(descriptor);
        Ok(client)
    }

    /// Create an RPC server.
    pub fn create_rpc_server(
        self: &Arc<Self>,
        name: &str,
        spec: RpcSpec,
        handler: Option<Arc<RpcCallHandler>>,
    ) -> Result<Arc<RpcServer>> {
        self.claim_service_name(name)?;
        let server = Arc::new(RpcServer::new(spec.clone(), handler));

        let mut descriptor =
            self.controller_descriptor(name, spec.function_name(), NetworkType::Rpc);
        descriptor
            .set_supplemental_data_item(keys::CONTROLLER_TYPE, keys::CONTROLLER_TYPE_RPC_SERVER);
        descriptor.set_supplemental_data_item(
            keys::KEY_RPC_SERVER_FUNCTION_NAME,
            spec.function_name(),
        );
        descriptor.set_supplemental_data_item(keys::KEY_RPC_SERVER_MEDIA_TYPE, spec.media_type());
        descriptor
            .set_supplemental_data_item(keys::KEY_RPC_SERVER_LABELS, encode_labels(spec.labels()));
        server.set_service_descriptor(descriptor.clone());

        self.own_service(Arc::clone(&server) as Arc<dyn BusService>, &[]);
        let factory: Arc<dyn RpcServerInternalFactory> =
            Arc::clone(self) as Arc<dyn RpcServerInternalFactory>;
        server.register_service_discovery(&self.discovery, &factory);
        self.discovery.notify_service_created(descriptor);
        Ok(server)
    }

    fn configured_network(&self, table: &[silbus_config::ControllerConfig], name: &str) -> String {
        table
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.network_name().to_string())
            .unwrap_or_else(|| name.to_string())
    }

    fn controller_descriptor(
        &self,
        service_name: &str,
        network_name: &str,
        network_type: NetworkType,
    ) -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::new(
            self.name.as_str(),
            network_name,
            service_name,
            self.allocate_service_id(),
        );
        descriptor.set_service_type(ServiceType::Controller);
        descriptor.set_network_type(network_type);
        descriptor
    }

    fn allocate_service_id(&self) -> EndpointId {
        self.next_service_id.fetch_add(1, Ordering::SeqCst)
    }

    fn claim_service_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(SilbusError::configuration("service name must not be empty"));
        }
        if !self.service_names.lock().insert(name.to_string()) {
            return Err(SilbusError::state(format!(
                "a service named '{name}' already exists in participant '{}'",
                self.name
            )));
        }
        Ok(())
    }

    fn own_service(&self, service: Arc<dyn BusService>, kinds: &[MessageKind]) {
        if !kinds.is_empty() {
            self.router.add_receiver(kinds, &service);
        }
        self.services.lock().push(service);
    }

    fn register_internal_controller(
        &self,
        service: Arc<dyn BusService>,
        controller_type: &str,
        kinds: &[MessageKind],
    ) {
        let mut descriptor = ServiceDescriptor::new(
            self.name.as_str(),
            keys::INTERNAL_NETWORK_NAME,
            controller_type,
            self.allocate_service_id(),
        );
        descriptor.set_service_type(ServiceType::InternalController);
        descriptor.set_network_type(NetworkType::Invalid);
        descriptor.set_supplemental_data_item(keys::CONTROLLER_TYPE, controller_type);
        service.set_service_descriptor(descriptor.clone());

        self.own_service(service, kinds);
        self.discovery.notify_service_created(descriptor);
    }
}

impl RpcServerInternalFactory for Participant {
    fn create_rpc_server_internal(
        &self,
        function_name: &str,
        client_uuid: &str,
        media_type: &str,
        labels: Vec<MatchingLabel>,
        handler: Option<Arc<RpcCallHandler>>,
    ) -> Arc<RpcServerInternal> {
        let internal = Arc::new(RpcServerInternal::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.time),
            function_name,
            media_type,
            labels,
            client_uuid,
            handler,
        ));

        let service_id = self.allocate_service_id();
        let mut descriptor = ServiceDescriptor::new(
            self.name.as_str(),
            client_uuid,
            format!("{function_name}_internal_{service_id}"),
            service_id,
        );
        descriptor.set_service_type(ServiceType::Controller);
        descriptor.set_network_type(NetworkType::Rpc);
        descriptor.set_supplemental_data_item(
            keys::CONTROLLER_TYPE,
            keys::CONTROLLER_TYPE_RPC_SERVER_INTERNAL,
        );
        descriptor
            .set_supplemental_data_item(keys::KEY_RPC_SERVER_INTERNAL_CLIENT_UUID, client_uuid);
        descriptor.set_supplemental_data_item(keys::KEY_RPC_SERVER_MEDIA_TYPE, media_type);
        internal.set_service_descriptor(descriptor.clone());

        self.own_service(
            Arc::clone(&internal) as Arc<dyn BusService>,
            &[MessageKind::FunctionCall],
        );
        self.discovery.notify_service_created(descriptor);
        internal
    }

    fn remove_rpc_server_internal(&self, internal: &Arc<RpcServerInternal>) {
        use silbus_core::bus::ServiceEndpoint;
        let service: Arc<dyn BusService> = Arc::clone(internal) as Arc<dyn BusService>;
        self.router
            .remove_receiver(&[MessageKind::FunctionCall], &service);
        let target = Arc::as_ptr(&service) as *const ();
        self.services
            .lock()
            .retain(|owned| Arc::as_ptr(owned) as *const () != target);
        self.discovery
            .notify_service_removed(internal.service_descriptor());
    }
}

impl DataSubscriberInternalFactory for Participant {
    fn create_data_subscriber_internal(
        &self,
        topic: &str,
        handler: Arc<DataMessageHandler>,
        matched_publishers: Arc<Mutex<BTreeSet<String>>>,
    ) -> Arc<DataSubscriberInternal> {
        let internal = Arc::new(DataSubscriberInternal::new(handler, matched_publishers));

        let service_id = self.allocate_service_id();
        let mut descriptor = ServiceDescriptor::new(
            self.name.as_str(),
            topic,
            format!("{topic}_subscriber_internal_{service_id}"),
            service_id,
        );
        descriptor.set_service_type(ServiceType::Controller);
        descriptor.set_network_type(NetworkType::Data);
        descriptor.set_supplemental_data_item(
            keys::CONTROLLER_TYPE,
            keys::CONTROLLER_TYPE_DATA_SUBSCRIBER_INTERNAL,
        );
        internal.set_service_descriptor(descriptor.clone());

        self.own_service(
            Arc::clone(&internal) as Arc<dyn BusService>,
            &[MessageKind::DataMessage],
        );
        self.discovery.notify_service_created(descriptor);
        internal
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        // Inbound callbacks may still race with teardown; the guards must be
        // set before any internal state goes away.
        self.discovery.shutdown();
        self.requests.shutdown();
        self.timeouts.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silbus_config::ControllerConfig;
    use silbus_core::bus::ServiceEndpoint;

    #[test]
    fn participant_requires_a_valid_configuration() {
        assert!(matches!(
            Participant::new(ParticipantConfiguration::default()),
            Err(SilbusError::Configuration { .. })
        ));
    }

    #[test]
    fn internal_services_are_announced_at_creation() {
        let participant = Participant::new(ParticipantConfiguration::named("Ecu")).unwrap();
        let names: Vec<String> = participant
            .service_discovery()
            .services()
            .iter()
            .map(|descriptor| descriptor.service_name().to_string())
            .collect();
        for internal in [
            keys::CONTROLLER_TYPE_SERVICE_DISCOVERY,
            keys::CONTROLLER_TYPE_REQUEST_REPLY_SERVICE,
            keys::CONTROLLER_TYPE_SYSTEM_MONITOR,
            keys::CONTROLLER_TYPE_SYSTEM_CONTROLLER,
            keys::CONTROLLER_TYPE_LIFECYCLE_SERVICE,
        ] {
            assert!(names.iter().any(|name| name == internal), "{internal}");
        }
    }

    #[test]
    fn controller_names_are_unique_per_participant() {
        let participant = Participant::new(ParticipantConfiguration::named("Ecu")).unwrap();
        participant.create_can_controller("Ctrl").unwrap();
        assert!(matches!(
            participant.create_can_controller("Ctrl"),
            Err(SilbusError::State { .. })
        ));
        // The name is taken across controller types as well.
        assert!(participant.create_lin_controller("Ctrl").is_err());
    }

    #[test]
    fn the_configured_controller_table_overrides_the_network() {
        let mut config = ParticipantConfiguration::named("Ecu");
        config.can_controllers.push(ControllerConfig {
            name: "Ctrl".to_string(),
            network: Some("CAN1".to_string()),
        });
        let participant = Participant::new(config).unwrap();

        let configured = participant.create_can_controller("Ctrl").unwrap();
        assert_eq!(configured.service_descriptor().network_name(), "CAN1");

        let unconfigured = participant.create_can_controller("Other").unwrap();
        assert_eq!(unconfigured.service_descriptor().network_name(), "Other");
    }
}
