//! Request/reply plane payloads.

use uuid::Uuid;

use crate::errors::{Result, SilbusError};
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// The procedure a request/reply call addresses.
///
/// Ordinals are wire-stable; do not renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionType {
    /// Unset; rejected on `call`.
    Invalid,
    /// The all-participants-replied barrier.
    ParticipantReplies,
}

impl FunctionType {
    pub(crate) fn to_wire(self) -> u16 {
        match self {
            FunctionType::Invalid => 0,
            FunctionType::ParticipantReplies => 1,
        }
    }

    pub(crate) fn from_wire(value: u16) -> Result<Self> {
        match value {
            0 => Ok(FunctionType::Invalid),
            1 => Ok(FunctionType::ParticipantReplies),
            other => Err(SilbusError::protocol(format!(
                "unknown function type {other}"
            ))),
        }
    }
}

/// Terminal status of one call return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallReturnStatus {
    /// Normal reply.
    Success,
    /// The receiver did not know the function type.
    UnknownFunctionType,
    /// The procedure on the receiver failed.
    ProcedureError,
    /// The receiver left before replying; synthesised locally.
    RecipientDisconnected,
}

impl CallReturnStatus {
    pub(crate) fn to_wire(self) -> u16 {
        match self {
            CallReturnStatus::Success => 0,
            CallReturnStatus::UnknownFunctionType => 1,
            CallReturnStatus::ProcedureError => 2,
            CallReturnStatus::RecipientDisconnected => 3,
        }
    }

    pub(crate) fn from_wire(value: u16) -> Result<Self> {
        match value {
            0 => Ok(CallReturnStatus::Success),
            1 => Ok(CallReturnStatus::UnknownFunctionType),
            2 => Ok(CallReturnStatus::ProcedureError),
            3 => Ok(CallReturnStatus::RecipientDisconnected),
            other => Err(SilbusError::protocol(format!(
                "unknown call return status {other}"
            ))),
        }
    }
}

/// A procedure call, broadcast to all participants.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestReplyCall {
    /// Globally unique id of this call.
    pub call_uuid: Uuid,
    /// Addressed procedure.
    pub function_type: FunctionType,
    /// Opaque call argument.
    pub call_data: Vec<u8>,
}

/// A reply to one [`RequestReplyCall`], directed back to the initiator.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestReplyCallReturn {
    /// Id of the answered call.
    pub call_uuid: Uuid,
    /// Addressed procedure.
    pub function_type: FunctionType,
    /// Opaque reply payload.
    pub call_return_data: Vec<u8>,
    /// Terminal status.
    pub call_return_status: CallReturnStatus,
}

impl WireEncode for RequestReplyCall {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_uuid(self.call_uuid);
        buffer.put_u16(self.function_type.to_wire());
        buffer.put_byte_vec(&self.call_data);
    }
}

impl WireDecode for RequestReplyCall {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            call_uuid: reader.uuid()?,
            function_type: FunctionType::from_wire(reader.u16()?)?,
            call_data: reader.byte_vec()?,
        })
    }
}

impl WireEncode for RequestReplyCallReturn {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_uuid(self.call_uuid);
        buffer.put_u16(self.function_type.to_wire());
        buffer.put_byte_vec(&self.call_return_data);
        buffer.put_u16(self.call_return_status.to_wire());
    }
}

impl WireDecode for RequestReplyCallReturn {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            call_uuid: reader.uuid()?,
            function_type: FunctionType::from_wire(reader.u16()?)?,
            call_return_data: reader.byte_vec()?,
            call_return_status: CallReturnStatus::from_wire(reader.u16()?)?,
        })
    }
}
