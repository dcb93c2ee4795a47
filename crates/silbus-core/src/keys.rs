//! Well-known supplemental-data keys and controller type names.
//!
//! Every service announces a `controller.type` attribute; publishers, RPC
//! endpoints and internal services attach further attributes that drive
//! discovery matching. The values are part of the wire contract between
//! participants and must not change.
#![allow(missing_docs)]

/// Key under which every controller announces its type.
pub const CONTROLLER_TYPE: &str = "controller.type";

// Bus controller types.
pub const CONTROLLER_TYPE_CAN: &str = "CAN";
pub const CONTROLLER_TYPE_ETHERNET: &str = "Ethernet";
pub const CONTROLLER_TYPE_FLEXRAY: &str = "FlexRay";
pub const CONTROLLER_TYPE_LIN: &str = "LIN";

// Publish/subscribe controller types and attributes.
pub const CONTROLLER_TYPE_DATA_PUBLISHER: &str = "DataPublisher";
pub const KEY_DATA_PUBLISHER_TOPIC: &str = "PubSub::topic";
pub const KEY_DATA_PUBLISHER_UUID: &str = "PubSub::pubUUID";
pub const KEY_DATA_PUBLISHER_MEDIA_TYPE: &str = "PubSub::pubMediaType";
pub const KEY_DATA_PUBLISHER_LABELS: &str = "PubSub::pubLabels";

pub const CONTROLLER_TYPE_DATA_SUBSCRIBER: &str = "DataSubscriber";
pub const KEY_DATA_SUBSCRIBER_TOPIC: &str = "PubSub::topic";
pub const KEY_DATA_SUBSCRIBER_MEDIA_TYPE: &str = "PubSub::subMediaType";
pub const KEY_DATA_SUBSCRIBER_LABELS: &str = "PubSub::subLabels";

pub const CONTROLLER_TYPE_DATA_SUBSCRIBER_INTERNAL: &str = "DataSubscriberInternal";
pub const KEY_DATA_SUBSCRIBER_INTERNAL_PARENT_SERVICE_ID: &str = "PubSub::subIntParentServiceId";

// RPC controller types and attributes.
pub const CONTROLLER_TYPE_RPC_SERVER: &str = "RpcServer";
pub const KEY_RPC_SERVER_FUNCTION_NAME: &str = "Rpc::server::functionName";
pub const KEY_RPC_SERVER_MEDIA_TYPE: &str = "Rpc::server::mediaType";
pub const KEY_RPC_SERVER_LABELS: &str = "Rpc::server::labels";

pub const CONTROLLER_TYPE_RPC_CLIENT: &str = "RpcClient";
pub const KEY_RPC_CLIENT_FUNCTION_NAME: &str = "Rpc::client::functionName";
pub const KEY_RPC_CLIENT_MEDIA_TYPE: &str = "Rpc::client::mediaType";
pub const KEY_RPC_CLIENT_LABELS: &str = "Rpc::client::labels";
pub const KEY_RPC_CLIENT_UUID: &str = "Rpc::client::UUID";

pub const CONTROLLER_TYPE_RPC_SERVER_INTERNAL: &str = "RpcServerInternal";
pub const KEY_RPC_SERVER_INTERNAL_CLIENT_UUID: &str = "Rpc::serverinternal::clientUUID";
pub const KEY_RPC_SERVER_INTERNAL_PARENT_SERVICE_ID: &str = "Rpc::serverinternal::parentServiceId";

// Internal controller types. Also used as the internal controllers' service
// names.
pub const CONTROLLER_TYPE_SERVICE_DISCOVERY: &str = "ServiceDiscovery";
pub const CONTROLLER_TYPE_REQUEST_REPLY_SERVICE: &str = "RequestReplyService";
pub const CONTROLLER_TYPE_SYSTEM_MONITOR: &str = "SystemMonitor";
pub const CONTROLLER_TYPE_SYSTEM_CONTROLLER: &str = "SystemController";
pub const CONTROLLER_TYPE_LIFECYCLE_SERVICE: &str = "LifecycleService";

/// Network name shared by all internal controllers.
pub const INTERNAL_NETWORK_NAME: &str = "default";
