//! RPC payloads.

use std::time::Duration;

use uuid::Uuid;

use crate::errors::{Result, SilbusError};
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// Wire status of a function call response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCallResponseStatus {
    /// The server handled the call.
    Success,
    /// The server could not handle the call (no handler, duplicate call id).
    InternalServerError,
}

impl FunctionCallResponseStatus {
    pub(crate) fn to_wire(self) -> u16 {
        match self {
            FunctionCallResponseStatus::Success => 0,
            FunctionCallResponseStatus::InternalServerError => 1,
        }
    }

    pub(crate) fn from_wire(value: u16) -> Result<Self> {
        match value {
            0 => Ok(FunctionCallResponseStatus::Success),
            1 => Ok(FunctionCallResponseStatus::InternalServerError),
            other => Err(SilbusError::protocol(format!(
                "unknown function call response status {other}"
            ))),
        }
    }
}

/// A function call, broadcast by an RPC client on its client network.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Simulation time at call issuance.
    pub timestamp: Duration,
    /// Id correlating call and responses.
    pub call_uuid: Uuid,
    /// Serialised argument data.
    pub data: Vec<u8>,
}

/// A response to one [`FunctionCall`], sent by a server-internal endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallResponse {
    /// Simulation time at submission.
    pub timestamp: Duration,
    /// Id of the answered call.
    pub call_uuid: Uuid,
    /// Serialised result data.
    pub data: Vec<u8>,
    /// Whether the server handled the call.
    pub status: FunctionCallResponseStatus,
}

impl WireEncode for FunctionCall {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_uuid(self.call_uuid);
        buffer.put_byte_vec(&self.data);
    }
}

impl WireDecode for FunctionCall {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            call_uuid: reader.uuid()?,
            data: reader.byte_vec()?,
        })
    }
}

impl WireEncode for FunctionCallResponse {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_uuid(self.call_uuid);
        buffer.put_byte_vec(&self.data);
        buffer.put_u16(self.status.to_wire());
    }
}

impl WireDecode for FunctionCallResponse {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            call_uuid: reader.uuid()?,
            data: reader.byte_vec()?,
            status: FunctionCallResponseStatus::from_wire(reader.u16()?)?,
        })
    }
}
