//! LIN bus payloads.

use std::time::Duration;

use super::TransmitDirection;
use crate::errors::{Result, SilbusError};
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// Checksum model of a LIN frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinChecksumModel {
    /// Not configured.
    #[default]
    Unknown,
    /// Enhanced checksum (LIN 2.x).
    Enhanced,
    /// Classic checksum (LIN 1.x).
    Classic,
}

impl LinChecksumModel {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            LinChecksumModel::Unknown => 0,
            LinChecksumModel::Enhanced => 1,
            LinChecksumModel::Classic => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LinChecksumModel::Unknown),
            1 => Ok(LinChecksumModel::Enhanced),
            2 => Ok(LinChecksumModel::Classic),
            other => Err(SilbusError::protocol(format!(
                "unknown LIN checksum model {other}"
            ))),
        }
    }
}

/// A LIN frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinFrame {
    /// Frame identifier (0..=63).
    pub id: u8,
    /// Checksum model.
    pub checksum_model: LinChecksumModel,
    /// Number of valid data bytes.
    pub data_length: u8,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// Delivery status of a LIN frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinFrameStatus {
    /// No valid outcome.
    NotOk,
    /// Sent successfully by this controller.
    LinTxOk,
    /// Received successfully by this controller.
    LinRxOk,
    /// Transmission failed.
    LinTxError,
    /// Reception failed.
    LinRxError,
}

impl LinFrameStatus {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            LinFrameStatus::NotOk => 0,
            LinFrameStatus::LinTxOk => 1,
            LinFrameStatus::LinRxOk => 2,
            LinFrameStatus::LinTxError => 3,
            LinFrameStatus::LinRxError => 4,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LinFrameStatus::NotOk),
            1 => Ok(LinFrameStatus::LinTxOk),
            2 => Ok(LinFrameStatus::LinRxOk),
            3 => Ok(LinFrameStatus::LinTxError),
            4 => Ok(LinFrameStatus::LinRxError),
            other => Err(SilbusError::protocol(format!(
                "unknown LIN frame status {other}"
            ))),
        }
    }
}

/// One completed LIN frame transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct LinTransmission {
    /// Simulation time of the transmission.
    pub timestamp: Duration,
    /// The frame.
    pub frame: LinFrame,
    /// Outcome as observed by the receiving controller.
    pub status: LinFrameStatus,
}

/// Operating mode of a LIN controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinControllerMode {
    /// Not configured.
    #[default]
    Inactive,
    /// Master node.
    Master,
    /// Slave node.
    Slave,
}

impl LinControllerMode {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            LinControllerMode::Inactive => 0,
            LinControllerMode::Master => 1,
            LinControllerMode::Slave => 2,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LinControllerMode::Inactive),
            1 => Ok(LinControllerMode::Master),
            2 => Ok(LinControllerMode::Slave),
            other => Err(SilbusError::protocol(format!(
                "unknown LIN controller mode {other}"
            ))),
        }
    }
}

/// Configuration of a LIN controller, broadcast on initialisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinControllerConfig {
    /// Master or slave.
    pub controller_mode: LinControllerMode,
    /// Configured baud rate.
    pub baud_rate: u32,
}

/// A wakeup pulse on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct LinWakeupPulse {
    /// Simulation time of the pulse.
    pub timestamp: Duration,
    /// TX at the initiator, RX everywhere else.
    pub direction: TransmitDirection,
}

impl WireEncode for LinTransmission {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_u8(self.frame.id);
        buffer.put_u8(self.frame.checksum_model.to_wire());
        buffer.put_u8(self.frame.data_length);
        buffer.put_byte_vec(&self.frame.data);
        buffer.put_u8(self.status.to_wire());
    }
}

impl WireDecode for LinTransmission {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            frame: LinFrame {
                id: reader.u8()?,
                checksum_model: LinChecksumModel::from_wire(reader.u8()?)?,
                data_length: reader.u8()?,
                data: reader.byte_vec()?,
            },
            status: LinFrameStatus::from_wire(reader.u8()?)?,
        })
    }
}

impl WireEncode for LinControllerConfig {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u8(self.controller_mode.to_wire());
        buffer.put_u32(self.baud_rate);
    }
}

impl WireDecode for LinControllerConfig {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            controller_mode: LinControllerMode::from_wire(reader.u8()?)?,
            baud_rate: reader.u32()?,
        })
    }
}

impl WireEncode for LinWakeupPulse {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_u8(self.direction.to_wire());
    }
}

impl WireDecode for LinWakeupPulse {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            direction: TransmitDirection::from_wire(reader.u8()?)?,
        })
    }
}
