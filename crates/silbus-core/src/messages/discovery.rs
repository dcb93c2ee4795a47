//! Service discovery payloads.

use crate::descriptor::ServiceDescriptor;
use crate::errors::{Result, SilbusError};
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// Version of the discovery payload schema; bumped on incompatible change.
pub const DISCOVERY_PROTOCOL_VERSION: u64 = 1;

/// Full service list of one participant.
///
/// Sent as a directed reply when a remote participant's discovery controller
/// becomes visible, converting the join into O(N) targeted replies.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantDiscoveryEvent {
    /// Name of the announcing participant.
    pub participant_name: String,
    /// Schema version, see [`DISCOVERY_PROTOCOL_VERSION`].
    pub version: u64,
    /// Every service the announcing participant currently owns.
    pub services: Vec<ServiceDescriptor>,
}

impl ParticipantDiscoveryEvent {
    /// Create an announcement with the current schema version.
    pub fn new(participant_name: impl Into<String>, services: Vec<ServiceDescriptor>) -> Self {
        Self {
            participant_name: participant_name.into(),
            version: DISCOVERY_PROTOCOL_VERSION,
            services,
        }
    }
}

/// The type of an incremental service change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceDiscoveryEventType {
    /// Unset.
    Invalid,
    /// The service was created.
    ServiceCreated,
    /// The service was removed.
    ServiceRemoved,
}

impl ServiceDiscoveryEventType {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            ServiceDiscoveryEventType::Invalid => 0,
            ServiceDiscoveryEventType::ServiceCreated => 1,
            ServiceDiscoveryEventType::ServiceRemoved => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ServiceDiscoveryEventType::Invalid),
            1 => Ok(ServiceDiscoveryEventType::ServiceCreated),
            2 => Ok(ServiceDiscoveryEventType::ServiceRemoved),
            other => Err(SilbusError::protocol(format!(
                "unknown service discovery event type {other}"
            ))),
        }
    }
}

/// Incremental service creation or removal.
///
/// Never self-delivered over the bus; the producing participant invokes its
/// own handlers directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDiscoveryEvent {
    /// Created or removed.
    pub event_type: ServiceDiscoveryEventType,
    /// The affected service.
    pub service_descriptor: ServiceDescriptor,
}

impl WireEncode for ParticipantDiscoveryEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_string(&self.participant_name);
        buffer.put_u64(self.version);
        self.services.encode(buffer);
    }
}

impl WireDecode for ParticipantDiscoveryEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            participant_name: reader.string()?,
            version: reader.u64()?,
            services: Vec::decode(reader)?,
        })
    }
}

impl WireEncode for ServiceDiscoveryEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u8(self.event_type.to_wire());
        self.service_descriptor.encode(buffer);
    }
}

impl WireDecode for ServiceDiscoveryEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            event_type: ServiceDiscoveryEventType::from_wire(reader.u8()?)?,
            service_descriptor: ServiceDescriptor::decode(reader)?,
        })
    }
}
