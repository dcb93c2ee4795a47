//! Service identity.
//!
//! Every addressable object inside a participant (a CAN controller, a data
//! publisher, an internal RPC server, the discovery service itself) carries a
//! [`ServiceDescriptor`]. The descriptor is announced through service
//! discovery, travels inside discovery and RPC messages, and is the identity
//! receivers use to filter traffic on the hot path.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Result, SilbusError};
use crate::hash::stable_hash;
use crate::keys;

/// Stable participant identifier, derived by hashing the participant name.
pub type ParticipantId = u64;

/// Service identifier, unique within the owning participant.
pub type EndpointId = u64;

/// Discovery attributes attached to a service.
///
/// Ordered so the canonical serialisation is deterministic.
pub type SupplementalData = BTreeMap<String, String>;

/// The role a service plays inside the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// Not yet assigned.
    #[default]
    Undefined,
    /// A simulated network, announced by a network simulator.
    Link,
    /// A regular user-facing controller.
    Controller,
    /// A controller owned by a network simulator on behalf of a participant.
    SimulatedController,
    /// A participant-internal service (discovery, request/reply, ...).
    InternalController,
}

impl ServiceType {
    /// Wire ordinal (u8).
    pub fn to_wire(self) -> u8 {
        match self {
            ServiceType::Undefined => 0,
            ServiceType::Link => 1,
            ServiceType::Controller => 2,
            ServiceType::SimulatedController => 3,
            ServiceType::InternalController => 4,
        }
    }

    /// Decode a wire ordinal.
    pub fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ServiceType::Undefined),
            1 => Ok(ServiceType::Link),
            2 => Ok(ServiceType::Controller),
            3 => Ok(ServiceType::SimulatedController),
            4 => Ok(ServiceType::InternalController),
            other => Err(SilbusError::protocol(format!(
                "unknown service type ordinal {other}"
            ))),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceType::Undefined => "Undefined",
            ServiceType::Link => "Link",
            ServiceType::Controller => "Controller",
            ServiceType::SimulatedController => "SimulatedController",
            ServiceType::InternalController => "InternalController",
        };
        f.write_str(name)
    }
}

/// The kind of network a service is attached to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NetworkType {
    /// No physical network; used by internal controllers.
    #[default]
    Invalid,
    /// A CAN bus.
    Can,
    /// An Ethernet network.
    Ethernet,
    /// A FlexRay cluster.
    FlexRay,
    /// A LIN bus.
    Lin,
    /// A publish/subscribe topic.
    Data,
    /// An RPC connection.
    Rpc,
}

impl NetworkType {
    /// Wire ordinal (u8).
    pub fn to_wire(self) -> u8 {
        match self {
            NetworkType::Invalid => 0,
            NetworkType::Can => 1,
            NetworkType::Ethernet => 2,
            NetworkType::FlexRay => 3,
            NetworkType::Lin => 4,
            NetworkType::Data => 5,
            NetworkType::Rpc => 6,
        }
    }

    /// Decode a wire ordinal.
    pub fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(NetworkType::Invalid),
            1 => Ok(NetworkType::Can),
            2 => Ok(NetworkType::Ethernet),
            3 => Ok(NetworkType::FlexRay),
            4 => Ok(NetworkType::Lin),
            5 => Ok(NetworkType::Data),
            6 => Ok(NetworkType::Rpc),
            other => Err(SilbusError::protocol(format!(
                "unknown network type ordinal {other}"
            ))),
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkType::Invalid => "Invalid",
            NetworkType::Can => "CAN",
            NetworkType::Ethernet => "Ethernet",
            NetworkType::FlexRay => "FlexRay",
            NetworkType::Lin => "LIN",
            NetworkType::Data => "Data",
            NetworkType::Rpc => "Rpc",
        };
        f.write_str(name)
    }
}

/// Compact address of a service: owning participant plus endpoint id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    /// Id of the owning participant.
    pub participant: ParticipantId,
    /// Id of the service within the participant.
    pub endpoint: EndpointId,
}

/// Canonical identity of a service instance.
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    participant_name: String,
    participant_id: ParticipantId,
    service_type: ServiceType,
    network_name: String,
    network_type: NetworkType,
    service_name: String,
    service_id: EndpointId,
    supplemental_data: SupplementalData,
}

impl ServiceDescriptor {
    /// Create a descriptor from the identifying fields; computes the
    /// participant id from the name.
    pub fn new(
        participant_name: impl Into<String>,
        network_name: impl Into<String>,
        service_name: impl Into<String>,
        service_id: EndpointId,
    ) -> Self {
        let mut descriptor = Self::default();
        descriptor.set_participant_name(participant_name.into());
        descriptor.set_network_name(network_name.into());
        descriptor.set_service_name(service_name.into());
        descriptor.set_service_id(service_id);
        descriptor
    }

    /// The owning participant's name.
    pub fn participant_name(&self) -> &str {
        &self.participant_name
    }

    /// Set the participant name; also recomputes the participant id.
    pub fn set_participant_name(&mut self, name: String) {
        self.participant_id = stable_hash(&name);
        self.participant_name = name;
    }

    /// The owning participant's id.
    pub fn participant_id(&self) -> ParticipantId {
        self.participant_id
    }

    pub(crate) fn set_participant_id_raw(&mut self, id: ParticipantId) {
        self.participant_id = id;
    }

    /// The service type.
    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    /// Set the service type.
    pub fn set_service_type(&mut self, value: ServiceType) {
        self.service_type = value;
    }

    /// The network (link) name the service is attached to.
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    /// Set the network name.
    pub fn set_network_name(&mut self, value: String) {
        self.network_name = value;
    }

    /// The network type.
    pub fn network_type(&self) -> NetworkType {
        self.network_type
    }

    /// Set the network type.
    pub fn set_network_type(&mut self, value: NetworkType) {
        self.network_type = value;
    }

    /// The service name, unique within the owning participant.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Set the service name.
    pub fn set_service_name(&mut self, value: String) {
        self.service_name = value;
    }

    /// The service id, unique within the owning participant.
    pub fn service_id(&self) -> EndpointId {
        self.service_id
    }

    /// Set the service id.
    pub fn set_service_id(&mut self, value: EndpointId) {
        self.service_id = value;
    }

    /// All supplemental data attached to the service.
    pub fn supplemental_data(&self) -> &SupplementalData {
        &self.supplemental_data
    }

    /// Replace the supplemental data wholesale.
    pub fn set_supplemental_data(&mut self, value: SupplementalData) {
        self.supplemental_data = value;
    }

    /// Look up a single supplemental data item.
    pub fn supplemental_data_item(&self, key: &str) -> Option<&str> {
        self.supplemental_data.get(key).map(String::as_str)
    }

    /// Set a single supplemental data item.
    pub fn set_supplemental_data_item(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.supplemental_data.insert(key.into(), value.into());
    }

    /// The compact endpoint address.
    pub fn endpoint_address(&self) -> EndpointAddress {
        EndpointAddress {
            participant: self.participant_id,
            endpoint: self.service_id,
        }
    }

    /// True when `from` is the very endpoint described by `self`, i.e. a
    /// message originated at this service instance.
    ///
    /// Receivers use this on the hot path to suppress locally-originated
    /// broadcasts at their own controller while the message still fans out to
    /// remote peers.
    pub fn is_same_service(&self, from: &ServiceDescriptor) -> bool {
        self.service_id == from.service_id && self.participant_name == from.participant_name
    }

    /// Canonical string form of the descriptor.
    ///
    /// Derived deterministically from the service type and the supplemental
    /// data; used as the key of the discovery cache. Fails for a controller
    /// that does not announce a `controller.type` attribute.
    pub fn canonical_name(&self) -> Result<String> {
        let mut name = format!("{}/{}", self.participant_name, self.service_type);
        match self.service_type {
            ServiceType::Link => {
                name.push_str(&format!("/{}/{}", self.network_type, self.network_name));
            }
            ServiceType::Controller | ServiceType::SimulatedController => {
                let controller_type = self
                    .supplemental_data_item(keys::CONTROLLER_TYPE)
                    .ok_or_else(|| {
                        SilbusError::state(
                            "canonical_name failed: no controller type in supplemental data",
                        )
                    })?;
                name.push_str(&format!(
                    "/{}/{}/{}",
                    controller_type, self.network_name, self.service_name
                ));
            }
            ServiceType::InternalController => {
                name.push_str(&format!("/{}", self.service_name));
            }
            ServiceType::Undefined => {
                name.push_str(&format!("/{}/{}", self.network_name, self.service_name));
            }
        }
        Ok(name)
    }
}

impl PartialEq for ServiceDescriptor {
    fn eq(&self, rhs: &Self) -> bool {
        self.participant_id == rhs.participant_id
            && self.network_name == rhs.network_name
            && self.service_type == rhs.service_type
            && self.service_id == rhs.service_id
    }
}

impl Eq for ServiceDescriptor {}

impl std::hash::Hash for ServiceDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.participant_id.hash(state);
        self.network_name.hash(state);
        self.service_type.hash(state);
        self.service_id.hash(state);
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_name() {
            Ok(name) => f.write_str(&name),
            Err(_) => write!(
                f,
                "{}/{}/?/{}/{}",
                self.participant_name, self.service_type, self.network_name, self.service_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_descriptor() -> ServiceDescriptor {
        let mut descriptor = ServiceDescriptor::new("P1", "CAN1", "CanCtrl1", 8);
        descriptor.set_service_type(ServiceType::Controller);
        descriptor.set_network_type(NetworkType::Can);
        descriptor.set_supplemental_data_item(keys::CONTROLLER_TYPE, keys::CONTROLLER_TYPE_CAN);
        descriptor
    }

    #[test]
    fn participant_id_follows_name() {
        let descriptor = controller_descriptor();
        assert_eq!(descriptor.participant_id(), stable_hash("P1"));
    }

    #[test]
    fn canonical_name_per_service_type() {
        let descriptor = controller_descriptor();
        assert_eq!(
            descriptor.canonical_name().unwrap(),
            "P1/Controller/CAN/CAN1/CanCtrl1"
        );

        let mut link = ServiceDescriptor::new("NetSim", "CAN1", "CAN1", 2);
        link.set_service_type(ServiceType::Link);
        link.set_network_type(NetworkType::Can);
        assert_eq!(link.canonical_name().unwrap(), "NetSim/Link/CAN/CAN1");

        let mut internal = ServiceDescriptor::new("P1", "default", "ServiceDiscovery", 1);
        internal.set_service_type(ServiceType::InternalController);
        assert_eq!(
            internal.canonical_name().unwrap(),
            "P1/InternalController/ServiceDiscovery"
        );
    }

    #[test]
    fn canonical_name_requires_controller_type() {
        let mut descriptor = controller_descriptor();
        descriptor.set_supplemental_data(SupplementalData::new());
        assert!(matches!(
            descriptor.canonical_name(),
            Err(SilbusError::State { .. })
        ));
    }

    #[test]
    fn equality_ignores_supplemental_data() {
        let a = controller_descriptor();
        let mut b = controller_descriptor();
        b.set_supplemental_data_item("extra", "value");
        assert_eq!(a, b);

        let mut c = controller_descriptor();
        c.set_service_id(9);
        assert_ne!(a, c);
    }

    #[test]
    fn same_service_gate() {
        let mine = controller_descriptor();
        let from_self = controller_descriptor();
        assert!(mine.is_same_service(&from_self));

        // A network simulator impersonates the controller by copying the
        // service id, but its participant name differs.
        let mut from_netsim = controller_descriptor();
        from_netsim.set_participant_name("NetSim".to_string());
        assert!(!mine.is_same_service(&from_netsim));
    }
}
