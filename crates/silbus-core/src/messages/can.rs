//! CAN bus payloads.

use std::time::Duration;

use super::TransmitDirection;
use crate::errors::{Result, SilbusError};
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// A CAN frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanFrame {
    /// CAN identifier.
    pub can_id: u32,
    /// Data length code.
    pub dlc: u16,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// A CAN frame observed on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrameEvent {
    /// Simulation time of the transmission.
    pub timestamp: Duration,
    /// The frame.
    pub frame: CanFrame,
    /// TX at the sender, RX everywhere else.
    pub direction: TransmitDirection,
    /// Opaque token supplied by the sending application; only visible on the
    /// TX side.
    pub user_context: u64,
}

/// Outcome of a frame transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanTransmitStatus {
    /// The frame reached the bus.
    Transmitted,
    /// The transmission was canceled.
    Canceled,
    /// The transmit queue was full.
    TransmitQueueFull,
}

impl CanTransmitStatus {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            CanTransmitStatus::Transmitted => 0,
            CanTransmitStatus::Canceled => 1,
            CanTransmitStatus::TransmitQueueFull => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CanTransmitStatus::Transmitted),
            1 => Ok(CanTransmitStatus::Canceled),
            2 => Ok(CanTransmitStatus::TransmitQueueFull),
            other => Err(SilbusError::protocol(format!(
                "unknown CAN transmit status {other}"
            ))),
        }
    }
}

/// Acknowledgement of one frame transmission, delivered to the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrameTransmitEvent {
    /// Simulation time of the acknowledgement.
    pub timestamp: Duration,
    /// Identifier of the acknowledged frame.
    pub can_id: u32,
    /// Outcome.
    pub status: CanTransmitStatus,
    /// The token supplied at `send_frame`.
    pub user_context: u64,
}

/// Operational state of a CAN controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CanControllerState {
    /// Not initialised.
    #[default]
    Uninit,
    /// Initialised but not participating in traffic.
    Stopped,
    /// Participating in bus traffic.
    Started,
    /// Low-power mode.
    Sleep,
}

impl CanControllerState {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            CanControllerState::Uninit => 0,
            CanControllerState::Stopped => 1,
            CanControllerState::Started => 2,
            CanControllerState::Sleep => 3,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CanControllerState::Uninit),
            1 => Ok(CanControllerState::Stopped),
            2 => Ok(CanControllerState::Started),
            3 => Ok(CanControllerState::Sleep),
            other => Err(SilbusError::protocol(format!(
                "unknown CAN controller state {other}"
            ))),
        }
    }
}

/// Error handling state of a CAN controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CanErrorState {
    /// No error information available (trivial simulation).
    #[default]
    NotAvailable,
    /// Error active, normal operation.
    ErrorActive,
    /// Error passive.
    ErrorPassive,
    /// Bus-off, controller detached from the bus.
    BusOff,
}

impl CanErrorState {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            CanErrorState::NotAvailable => 0,
            CanErrorState::ErrorActive => 1,
            CanErrorState::ErrorPassive => 2,
            CanErrorState::BusOff => 3,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CanErrorState::NotAvailable),
            1 => Ok(CanErrorState::ErrorActive),
            2 => Ok(CanErrorState::ErrorPassive),
            3 => Ok(CanErrorState::BusOff),
            other => Err(SilbusError::protocol(format!(
                "unknown CAN error state {other}"
            ))),
        }
    }
}

/// Status report of a CAN controller.
#[derive(Debug, Clone, PartialEq)]
pub struct CanControllerStatus {
    /// Simulation time of the report.
    pub timestamp: Duration,
    /// Operational state.
    pub controller_state: CanControllerState,
    /// Error handling state.
    pub error_state: CanErrorState,
}

/// Baud rate configuration, forwarded to the network simulator in detailed
/// mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanConfigureBaudrate {
    /// Classic CAN baud rate.
    pub baud_rate: u32,
    /// CAN FD baud rate.
    pub fd_baud_rate: u32,
    /// CAN XL baud rate.
    pub xl_baud_rate: u32,
}

/// Controller mode change request.
#[derive(Debug, Clone, PartialEq)]
pub struct CanSetControllerMode {
    /// Requested state.
    pub mode: CanControllerState,
    /// Cancel all queued transmissions.
    pub cancel_transmit_requests: bool,
    /// Reset the error handling state.
    pub reset_error_handling: bool,
}

impl WireEncode for CanFrame {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u32(self.can_id);
        buffer.put_u16(self.dlc);
        buffer.put_byte_vec(&self.data);
    }
}

impl WireDecode for CanFrame {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            can_id: reader.u32()?,
            dlc: reader.u16()?,
            data: reader.byte_vec()?,
        })
    }
}

impl WireEncode for CanFrameEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        self.frame.encode(buffer);
        buffer.put_u8(self.direction.to_wire());
        buffer.put_u64(self.user_context);
    }
}

impl WireDecode for CanFrameEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            frame: CanFrame::decode(reader)?,
            direction: TransmitDirection::from_wire(reader.u8()?)?,
            user_context: reader.u64()?,
        })
    }
}

impl WireEncode for CanFrameTransmitEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_u32(self.can_id);
        buffer.put_u8(self.status.to_wire());
        buffer.put_u64(self.user_context);
    }
}

impl WireDecode for CanFrameTransmitEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            can_id: reader.u32()?,
            status: CanTransmitStatus::from_wire(reader.u8()?)?,
            user_context: reader.u64()?,
        })
    }
}

impl WireEncode for CanControllerStatus {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_u8(self.controller_state.to_wire());
        buffer.put_u8(self.error_state.to_wire());
    }
}

impl WireDecode for CanControllerStatus {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            controller_state: CanControllerState::from_wire(reader.u8()?)?,
            error_state: CanErrorState::from_wire(reader.u8()?)?,
        })
    }
}

impl WireEncode for CanConfigureBaudrate {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u32(self.baud_rate);
        buffer.put_u32(self.fd_baud_rate);
        buffer.put_u32(self.xl_baud_rate);
    }
}

impl WireDecode for CanConfigureBaudrate {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            baud_rate: reader.u32()?,
            fd_baud_rate: reader.u32()?,
            xl_baud_rate: reader.u32()?,
        })
    }
}

impl WireEncode for CanSetControllerMode {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u8(self.mode.to_wire());
        buffer.put_bool(self.cancel_transmit_requests);
        buffer.put_bool(self.reset_error_handling);
    }
}

impl WireDecode for CanSetControllerMode {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            mode: CanControllerState::from_wire(reader.u8()?)?,
            cancel_transmit_requests: reader.bool()?,
            reset_error_handling: reader.bool()?,
        })
    }
}
