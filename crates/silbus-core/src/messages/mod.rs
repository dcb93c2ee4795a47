//! Typed message model.
//!
//! Every payload that crosses the participant boundary is a variant of
//! [`Message`]. The router dispatches on [`MessageKind`]; the wire layer maps
//! kinds to stable frame tags.

pub mod can;
pub mod discovery;
pub mod ethernet;
pub mod flexray;
pub mod lin;
pub mod orchestration;
pub mod pubsub;
pub mod requests;
pub mod rpc;

use crate::descriptor::ServiceDescriptor;
use crate::errors::{Result, SilbusError};
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// Direction of a bus frame relative to the observing controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmitDirection {
    /// Transmitted by the observing controller.
    Tx,
    /// Received by the observing controller.
    Rx,
}

impl TransmitDirection {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            TransmitDirection::Tx => 1,
            TransmitDirection::Rx => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            1 => Ok(TransmitDirection::Tx),
            2 => Ok(TransmitDirection::Rx),
            other => Err(SilbusError::protocol(format!(
                "unknown transmit direction {other}"
            ))),
        }
    }
}

/// All message payloads of the middleware.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Full service list of a participant, sent on join.
    ParticipantDiscovery(discovery::ParticipantDiscoveryEvent),
    /// Incremental service creation/removal.
    ServiceDiscovery(discovery::ServiceDiscoveryEvent),
    /// Request/reply call.
    RequestReplyCall(requests::RequestReplyCall),
    /// Request/reply call return.
    RequestReplyCallReturn(requests::RequestReplyCallReturn),
    /// Lifecycle status of a participant.
    ParticipantStatus(orchestration::ParticipantStatus),
    /// Required-participant set for system state aggregation.
    WorkflowConfiguration(orchestration::WorkflowConfiguration),
    /// Published data sample.
    DataMessage(pubsub::DataMessageEvent),
    /// RPC function call.
    FunctionCall(rpc::FunctionCall),
    /// RPC function call response.
    FunctionCallResponse(rpc::FunctionCallResponse),
    /// CAN frame.
    CanFrame(can::CanFrameEvent),
    /// CAN transmit acknowledgement.
    CanFrameTransmit(can::CanFrameTransmitEvent),
    /// CAN controller status.
    CanControllerStatus(can::CanControllerStatus),
    /// CAN baud rate configuration.
    CanConfigureBaudrate(can::CanConfigureBaudrate),
    /// CAN controller mode change request.
    CanSetControllerMode(can::CanSetControllerMode),
    /// Ethernet frame.
    EthernetFrame(ethernet::EthernetFrameEvent),
    /// Ethernet transmit acknowledgement.
    EthernetFrameTransmit(ethernet::EthernetFrameTransmitEvent),
    /// Ethernet controller status.
    EthernetStatus(ethernet::EthernetStatus),
    /// Ethernet controller mode change request.
    EthernetSetMode(ethernet::EthernetSetMode),
    /// FlexRay frame.
    FlexrayFrame(flexray::FlexrayFrameEvent),
    /// FlexRay transmit acknowledgement.
    FlexrayFrameTransmit(flexray::FlexrayFrameTransmitEvent),
    /// FlexRay controller host command.
    FlexrayHostCommand(flexray::FlexrayHostCommand),
    /// FlexRay protocol operation control status.
    FlexrayPocStatus(flexray::FlexrayPocStatusEvent),
    /// LIN frame transmission.
    LinTransmission(lin::LinTransmission),
    /// LIN controller configuration.
    LinControllerConfig(lin::LinControllerConfig),
    /// LIN wakeup pulse.
    LinWakeupPulse(lin::LinWakeupPulse),
}

/// Discriminant of [`Message`], used for receiver registration and wire tags.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ParticipantDiscovery,
    ServiceDiscovery,
    RequestReplyCall,
    RequestReplyCallReturn,
    ParticipantStatus,
    WorkflowConfiguration,
    DataMessage,
    FunctionCall,
    FunctionCallResponse,
    CanFrame,
    CanFrameTransmit,
    CanControllerStatus,
    CanConfigureBaudrate,
    CanSetControllerMode,
    EthernetFrame,
    EthernetFrameTransmit,
    EthernetStatus,
    EthernetSetMode,
    FlexrayFrame,
    FlexrayFrameTransmit,
    FlexrayHostCommand,
    FlexrayPocStatus,
    LinTransmission,
    LinControllerConfig,
    LinWakeupPulse,
}

impl MessageKind {
    /// Stable wire tag of this message kind. Do not renumber.
    pub fn tag(self) -> u16 {
        match self {
            MessageKind::ParticipantDiscovery => 1,
            MessageKind::ServiceDiscovery => 2,
            MessageKind::RequestReplyCall => 3,
            MessageKind::RequestReplyCallReturn => 4,
            MessageKind::ParticipantStatus => 5,
            MessageKind::WorkflowConfiguration => 6,
            MessageKind::DataMessage => 7,
            MessageKind::FunctionCall => 8,
            MessageKind::FunctionCallResponse => 9,
            MessageKind::CanFrame => 10,
            MessageKind::CanFrameTransmit => 11,
            MessageKind::CanControllerStatus => 12,
            MessageKind::CanConfigureBaudrate => 13,
            MessageKind::CanSetControllerMode => 14,
            MessageKind::EthernetFrame => 15,
            MessageKind::EthernetFrameTransmit => 16,
            MessageKind::EthernetStatus => 17,
            MessageKind::EthernetSetMode => 18,
            MessageKind::FlexrayFrame => 19,
            MessageKind::FlexrayFrameTransmit => 20,
            MessageKind::FlexrayHostCommand => 21,
            MessageKind::FlexrayPocStatus => 22,
            MessageKind::LinTransmission => 23,
            MessageKind::LinControllerConfig => 24,
            MessageKind::LinWakeupPulse => 25,
        }
    }

    /// Decode a wire tag.
    pub fn from_tag(tag: u16) -> Result<Self> {
        let kind = match tag {
            1 => MessageKind::ParticipantDiscovery,
            2 => MessageKind::ServiceDiscovery,
            3 => MessageKind::RequestReplyCall,
            4 => MessageKind::RequestReplyCallReturn,
            5 => MessageKind::ParticipantStatus,
            6 => MessageKind::WorkflowConfiguration,
            7 => MessageKind::DataMessage,
            8 => MessageKind::FunctionCall,
            9 => MessageKind::FunctionCallResponse,
            10 => MessageKind::CanFrame,
            11 => MessageKind::CanFrameTransmit,
            12 => MessageKind::CanControllerStatus,
            13 => MessageKind::CanConfigureBaudrate,
            14 => MessageKind::CanSetControllerMode,
            15 => MessageKind::EthernetFrame,
            16 => MessageKind::EthernetFrameTransmit,
            17 => MessageKind::EthernetStatus,
            18 => MessageKind::EthernetSetMode,
            19 => MessageKind::FlexrayFrame,
            20 => MessageKind::FlexrayFrameTransmit,
            21 => MessageKind::FlexrayHostCommand,
            22 => MessageKind::FlexrayPocStatus,
            23 => MessageKind::LinTransmission,
            24 => MessageKind::LinControllerConfig,
            25 => MessageKind::LinWakeupPulse,
            other => {
                return Err(SilbusError::protocol(format!(
                    "unknown message tag {other}"
                )))
            }
        };
        Ok(kind)
    }
}

impl Message {
    /// The discriminant of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ParticipantDiscovery(_) => MessageKind::ParticipantDiscovery,
            Message::ServiceDiscovery(_) => MessageKind::ServiceDiscovery,
            Message::RequestReplyCall(_) => MessageKind::RequestReplyCall,
            Message::RequestReplyCallReturn(_) => MessageKind::RequestReplyCallReturn,
            Message::ParticipantStatus(_) => MessageKind::ParticipantStatus,
            Message::WorkflowConfiguration(_) => MessageKind::WorkflowConfiguration,
            Message::DataMessage(_) => MessageKind::DataMessage,
            Message::FunctionCall(_) => MessageKind::FunctionCall,
            Message::FunctionCallResponse(_) => MessageKind::FunctionCallResponse,
            Message::CanFrame(_) => MessageKind::CanFrame,
            Message::CanFrameTransmit(_) => MessageKind::CanFrameTransmit,
            Message::CanControllerStatus(_) => MessageKind::CanControllerStatus,
            Message::CanConfigureBaudrate(_) => MessageKind::CanConfigureBaudrate,
            Message::CanSetControllerMode(_) => MessageKind::CanSetControllerMode,
            Message::EthernetFrame(_) => MessageKind::EthernetFrame,
            Message::EthernetFrameTransmit(_) => MessageKind::EthernetFrameTransmit,
            Message::EthernetStatus(_) => MessageKind::EthernetStatus,
            Message::EthernetSetMode(_) => MessageKind::EthernetSetMode,
            Message::FlexrayFrame(_) => MessageKind::FlexrayFrame,
            Message::FlexrayFrameTransmit(_) => MessageKind::FlexrayFrameTransmit,
            Message::FlexrayHostCommand(_) => MessageKind::FlexrayHostCommand,
            Message::FlexrayPocStatus(_) => MessageKind::FlexrayPocStatus,
            Message::LinTransmission(_) => MessageKind::LinTransmission,
            Message::LinControllerConfig(_) => MessageKind::LinControllerConfig,
            Message::LinWakeupPulse(_) => MessageKind::LinWakeupPulse,
        }
    }
}

impl WireEncode for Message {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u16(self.kind().tag());
        match self {
            Message::ParticipantDiscovery(msg) => msg.encode(buffer),
            Message::ServiceDiscovery(msg) => msg.encode(buffer),
            Message::RequestReplyCall(msg) => msg.encode(buffer),
            Message::RequestReplyCallReturn(msg) => msg.encode(buffer),
            Message::ParticipantStatus(msg) => msg.encode(buffer),
            Message::WorkflowConfiguration(msg) => msg.encode(buffer),
            Message::DataMessage(msg) => msg.encode(buffer),
            Message::FunctionCall(msg) => msg.encode(buffer),
            Message::FunctionCallResponse(msg) => msg.encode(buffer),
            Message::CanFrame(msg) => msg.encode(buffer),
            Message::CanFrameTransmit(msg) => msg.encode(buffer),
            Message::CanControllerStatus(msg) => msg.encode(buffer),
            Message::CanConfigureBaudrate(msg) => msg.encode(buffer),
            Message::CanSetControllerMode(msg) => msg.encode(buffer),
            Message::EthernetFrame(msg) => msg.encode(buffer),
            Message::EthernetFrameTransmit(msg) => msg.encode(buffer),
            Message::EthernetStatus(msg) => msg.encode(buffer),
            Message::EthernetSetMode(msg) => msg.encode(buffer),
            Message::FlexrayFrame(msg) => msg.encode(buffer),
            Message::FlexrayFrameTransmit(msg) => msg.encode(buffer),
            Message::FlexrayHostCommand(msg) => msg.encode(buffer),
            Message::FlexrayPocStatus(msg) => msg.encode(buffer),
            Message::LinTransmission(msg) => msg.encode(buffer),
            Message::LinControllerConfig(msg) => msg.encode(buffer),
            Message::LinWakeupPulse(msg) => msg.encode(buffer),
        }
    }
}

impl WireDecode for Message {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        let kind = MessageKind::from_tag(reader.u16()?)?;
        let message = match kind {
            MessageKind::ParticipantDiscovery => {
                Message::ParticipantDiscovery(WireDecode::decode(reader)?)
            }
            MessageKind::ServiceDiscovery => Message::ServiceDiscovery(WireDecode::decode(reader)?),
            MessageKind::RequestReplyCall => Message::RequestReplyCall(WireDecode::decode(reader)?),
            MessageKind::RequestReplyCallReturn => {
                Message::RequestReplyCallReturn(WireDecode::decode(reader)?)
            }
            MessageKind::ParticipantStatus => {
                Message::ParticipantStatus(WireDecode::decode(reader)?)
            }
            MessageKind::WorkflowConfiguration => {
                Message::WorkflowConfiguration(WireDecode::decode(reader)?)
            }
            MessageKind::DataMessage => Message::DataMessage(WireDecode::decode(reader)?),
            MessageKind::FunctionCall => Message::FunctionCall(WireDecode::decode(reader)?),
            MessageKind::FunctionCallResponse => {
                Message::FunctionCallResponse(WireDecode::decode(reader)?)
            }
            MessageKind::CanFrame => Message::CanFrame(WireDecode::decode(reader)?),
            MessageKind::CanFrameTransmit => Message::CanFrameTransmit(WireDecode::decode(reader)?),
            MessageKind::CanControllerStatus => {
                Message::CanControllerStatus(WireDecode::decode(reader)?)
            }
            MessageKind::CanConfigureBaudrate => {
                Message::CanConfigureBaudrate(WireDecode::decode(reader)?)
            }
            MessageKind::CanSetControllerMode => {
                Message::CanSetControllerMode(WireDecode::decode(reader)?)
            }
            MessageKind::EthernetFrame => Message::EthernetFrame(WireDecode::decode(reader)?),
            MessageKind::EthernetFrameTransmit => {
                Message::EthernetFrameTransmit(WireDecode::decode(reader)?)
            }
            MessageKind::EthernetStatus => Message::EthernetStatus(WireDecode::decode(reader)?),
            MessageKind::EthernetSetMode => Message::EthernetSetMode(WireDecode::decode(reader)?),
            MessageKind::FlexrayFrame => Message::FlexrayFrame(WireDecode::decode(reader)?),
            MessageKind::FlexrayFrameTransmit => {
                Message::FlexrayFrameTransmit(WireDecode::decode(reader)?)
            }
            MessageKind::FlexrayHostCommand => {
                Message::FlexrayHostCommand(WireDecode::decode(reader)?)
            }
            MessageKind::FlexrayPocStatus => Message::FlexrayPocStatus(WireDecode::decode(reader)?),
            MessageKind::LinTransmission => Message::LinTransmission(WireDecode::decode(reader)?),
            MessageKind::LinControllerConfig => {
                Message::LinControllerConfig(WireDecode::decode(reader)?)
            }
            MessageKind::LinWakeupPulse => Message::LinWakeupPulse(WireDecode::decode(reader)?),
        };
        Ok(message)
    }
}

/// One frame as it crosses the participant boundary: sending endpoint plus
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WireFrame {
    /// Descriptor of the sending service.
    pub sender: ServiceDescriptor,
    /// The payload.
    pub message: Message,
}

impl WireFrame {
    /// Encode the frame into bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = MessageBuffer::new();
        self.sender.encode(&mut buffer);
        self.message.encode(&mut buffer);
        buffer.into_vec()
    }

    /// Decode a frame from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = MessageReader::new(bytes);
        let sender = ServiceDescriptor::decode(&mut reader)?;
        let message = Message::decode(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(SilbusError::protocol(format!(
                "{} trailing bytes after frame payload",
                reader.remaining()
            )));
        }
        Ok(WireFrame { sender, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{NetworkType, ServiceDescriptor, ServiceType};

    #[test]
    fn tags_round_trip() {
        for kind in [
            MessageKind::ParticipantDiscovery,
            MessageKind::RequestReplyCallReturn,
            MessageKind::CanFrame,
            MessageKind::LinWakeupPulse,
        ] {
            assert_eq!(MessageKind::from_tag(kind.tag()).unwrap(), kind);
        }
        assert!(MessageKind::from_tag(0).is_err());
        assert!(MessageKind::from_tag(9999).is_err());
    }

    #[test]
    fn frame_round_trips() {
        let mut sender = ServiceDescriptor::new("P1", "default", "RequestReplyService", 3);
        sender.set_service_type(ServiceType::InternalController);
        sender.set_network_type(NetworkType::Invalid);

        let frame = WireFrame {
            sender,
            message: Message::RequestReplyCall(requests::RequestReplyCall {
                call_uuid: uuid::Uuid::new_v4(),
                function_type: requests::FunctionType::ParticipantReplies,
                call_data: vec![1, 2, 3],
            }),
        };
        let bytes = frame.to_bytes();
        assert_eq!(WireFrame::from_bytes(&bytes).unwrap(), frame);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut sender = ServiceDescriptor::new("P1", "default", "ServiceDiscovery", 1);
        sender.set_service_type(ServiceType::InternalController);
        let frame = WireFrame {
            sender,
            message: Message::WorkflowConfiguration(orchestration::WorkflowConfiguration {
                required_participant_names: vec!["P1".to_string()],
            }),
        };
        let mut bytes = frame.to_bytes();
        bytes.push(0xFF);
        assert!(WireFrame::from_bytes(&bytes).is_err());
    }
}
