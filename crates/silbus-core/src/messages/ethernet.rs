//! Ethernet payloads.

use std::time::Duration;

use super::TransmitDirection;
use crate::errors::{Result, SilbusError};
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// A raw Ethernet frame (destination, source, ether type and payload).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EthernetFrame {
    /// The raw frame bytes.
    pub raw: Vec<u8>,
}

/// An Ethernet frame observed on the network.
#[derive(Debug, Clone, PartialEq)]
pub struct EthernetFrameEvent {
    /// Simulation time of the transmission.
    pub timestamp: Duration,
    /// The frame.
    pub frame: EthernetFrame,
    /// TX at the sender, RX everywhere else.
    pub direction: TransmitDirection,
    /// Opaque token supplied by the sending application.
    pub user_context: u64,
}

/// Outcome of an Ethernet frame transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthernetTransmitStatus {
    /// The frame reached the network.
    Transmitted,
    /// The controller was not active.
    ControllerInactive,
    /// The link was down.
    LinkDown,
    /// The frame was dropped.
    Dropped,
    /// The frame was malformed.
    InvalidFrameFormat,
}

impl EthernetTransmitStatus {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            EthernetTransmitStatus::Transmitted => 0,
            EthernetTransmitStatus::ControllerInactive => 1,
            EthernetTransmitStatus::LinkDown => 2,
            EthernetTransmitStatus::Dropped => 3,
            EthernetTransmitStatus::InvalidFrameFormat => 4,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(EthernetTransmitStatus::Transmitted),
            1 => Ok(EthernetTransmitStatus::ControllerInactive),
            2 => Ok(EthernetTransmitStatus::LinkDown),
            3 => Ok(EthernetTransmitStatus::Dropped),
            4 => Ok(EthernetTransmitStatus::InvalidFrameFormat),
            other => Err(SilbusError::protocol(format!(
                "unknown ethernet transmit status {other}"
            ))),
        }
    }
}

/// Acknowledgement of one frame transmission, delivered to the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct EthernetFrameTransmitEvent {
    /// Simulation time of the acknowledgement.
    pub timestamp: Duration,
    /// Outcome.
    pub status: EthernetTransmitStatus,
    /// The token supplied at `send_frame`.
    pub user_context: u64,
}

/// Link state of an Ethernet controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EthernetState {
    /// The controller is deactivated.
    #[default]
    Inactive,
    /// Activated but no link established.
    LinkDown,
    /// Link established.
    LinkUp,
}

impl EthernetState {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            EthernetState::Inactive => 0,
            EthernetState::LinkDown => 1,
            EthernetState::LinkUp => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(EthernetState::Inactive),
            1 => Ok(EthernetState::LinkDown),
            2 => Ok(EthernetState::LinkUp),
            other => Err(SilbusError::protocol(format!(
                "unknown ethernet state {other}"
            ))),
        }
    }
}

/// Status report of an Ethernet controller.
#[derive(Debug, Clone, PartialEq)]
pub struct EthernetStatus {
    /// Simulation time of the report.
    pub timestamp: Duration,
    /// Link state.
    pub state: EthernetState,
}

/// Requested controller mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthernetMode {
    /// Deactivate the controller.
    Inactive,
    /// Activate the controller.
    Active,
}

impl EthernetMode {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            EthernetMode::Inactive => 0,
            EthernetMode::Active => 1,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(EthernetMode::Inactive),
            1 => Ok(EthernetMode::Active),
            other => Err(SilbusError::protocol(format!(
                "unknown ethernet mode {other}"
            ))),
        }
    }
}

/// Controller mode change request.
#[derive(Debug, Clone, PartialEq)]
pub struct EthernetSetMode {
    /// Requested mode.
    pub mode: EthernetMode,
}

impl WireEncode for EthernetFrameEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_byte_vec(&self.frame.raw);
        buffer.put_u8(self.direction.to_wire());
        buffer.put_u64(self.user_context);
    }
}

impl WireDecode for EthernetFrameEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            frame: EthernetFrame {
                raw: reader.byte_vec()?,
            },
            direction: TransmitDirection::from_wire(reader.u8()?)?,
            user_context: reader.u64()?,
        })
    }
}

impl WireEncode for EthernetFrameTransmitEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_u8(self.status.to_wire());
        buffer.put_u64(self.user_context);
    }
}

impl WireDecode for EthernetFrameTransmitEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            status: EthernetTransmitStatus::from_wire(reader.u8()?)?,
            user_context: reader.u64()?,
        })
    }
}

impl WireEncode for EthernetStatus {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_u8(self.state.to_wire());
    }
}

impl WireDecode for EthernetStatus {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            state: EthernetState::from_wire(reader.u8()?)?,
        })
    }
}

impl WireEncode for EthernetSetMode {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u8(self.mode.to_wire());
    }
}

impl WireDecode for EthernetSetMode {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            mode: EthernetMode::from_wire(reader.u8()?)?,
        })
    }
}
