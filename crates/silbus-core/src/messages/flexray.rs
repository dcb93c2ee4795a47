//! FlexRay payloads.
//!
//! FlexRay has no trivial-mode semantics; a network simulator is
//! authoritative for the cluster. These payloads carry only what the
//! controller-to-simulator protocol requires.

use std::time::Duration;

use crate::errors::{Result, SilbusError};
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// FlexRay channel selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexrayChannel {
    /// Channel A.
    A,
    /// Channel B.
    B,
    /// Both channels.
    AB,
}

impl FlexrayChannel {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            FlexrayChannel::A => 1,
            FlexrayChannel::B => 2,
            FlexrayChannel::AB => 3,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FlexrayChannel::A),
            2 => Ok(FlexrayChannel::B),
            3 => Ok(FlexrayChannel::AB),
            other => Err(SilbusError::protocol(format!(
                "unknown flexray channel {other}"
            ))),
        }
    }
}

/// A FlexRay frame within its slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlexrayFrame {
    /// Static or dynamic slot id.
    pub slot_id: u16,
    /// Communication cycle counter.
    pub cycle: u8,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

/// A frame observed in the cluster, produced by the network simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexrayFrameEvent {
    /// Simulation time of the slot.
    pub timestamp: Duration,
    /// Channel the frame was observed on.
    pub channel: FlexrayChannel,
    /// The frame.
    pub frame: FlexrayFrame,
}

/// Acknowledgement for a transmit buffer, produced by the network simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexrayFrameTransmitEvent {
    /// Simulation time of the slot.
    pub timestamp: Duration,
    /// Index of the acknowledged transmit buffer.
    pub tx_buffer_index: u16,
    /// Channel the frame was sent on.
    pub channel: FlexrayChannel,
}

/// Controller host interface commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexrayChiCommand {
    /// Start communication.
    Run,
    /// Halt at the end of the cycle.
    DeferredHalt,
    /// Halt immediately.
    Freeze,
    /// Permit this node to cold-start the cluster.
    AllowColdstart,
    /// Send a wakeup pattern.
    Wakeup,
}

impl FlexrayChiCommand {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            FlexrayChiCommand::Run => 0,
            FlexrayChiCommand::DeferredHalt => 1,
            FlexrayChiCommand::Freeze => 2,
            FlexrayChiCommand::AllowColdstart => 3,
            FlexrayChiCommand::Wakeup => 4,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FlexrayChiCommand::Run),
            1 => Ok(FlexrayChiCommand::DeferredHalt),
            2 => Ok(FlexrayChiCommand::Freeze),
            3 => Ok(FlexrayChiCommand::AllowColdstart),
            4 => Ok(FlexrayChiCommand::Wakeup),
            other => Err(SilbusError::protocol(format!(
                "unknown flexray CHI command {other}"
            ))),
        }
    }
}

/// A host command, directed to the network simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexrayHostCommand {
    /// The command.
    pub command: FlexrayChiCommand,
}

/// Protocol operation control states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlexrayPocState {
    /// Default configuration.
    #[default]
    DefaultConfig,
    /// Configuration in progress.
    Config,
    /// Configured, ready to start.
    Ready,
    /// Startup phase.
    Startup,
    /// Wakeup phase.
    Wakeup,
    /// Synchronised, participating.
    NormalActive,
    /// Synchronised with degraded clock correction.
    NormalPassive,
    /// Halted.
    Halt,
}

impl FlexrayPocState {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            FlexrayPocState::DefaultConfig => 0,
            FlexrayPocState::Config => 1,
            FlexrayPocState::Ready => 2,
            FlexrayPocState::Startup => 3,
            FlexrayPocState::Wakeup => 4,
            FlexrayPocState::NormalActive => 5,
            FlexrayPocState::NormalPassive => 6,
            FlexrayPocState::Halt => 7,
        }
    }

    pub(crate) fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FlexrayPocState::DefaultConfig),
            1 => Ok(FlexrayPocState::Config),
            2 => Ok(FlexrayPocState::Ready),
            3 => Ok(FlexrayPocState::Startup),
            4 => Ok(FlexrayPocState::Wakeup),
            5 => Ok(FlexrayPocState::NormalActive),
            6 => Ok(FlexrayPocState::NormalPassive),
            7 => Ok(FlexrayPocState::Halt),
            other => Err(SilbusError::protocol(format!(
                "unknown flexray POC state {other}"
            ))),
        }
    }
}

/// Protocol operation control status, produced by the network simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexrayPocStatusEvent {
    /// Simulation time of the status.
    pub timestamp: Duration,
    /// Current POC state.
    pub state: FlexrayPocState,
    /// Freeze indicator.
    pub freeze: bool,
}

impl WireEncode for FlexrayFrameEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_u8(self.channel.to_wire());
        buffer.put_u16(self.frame.slot_id);
        buffer.put_u8(self.frame.cycle);
        buffer.put_byte_vec(&self.frame.payload);
    }
}

impl WireDecode for FlexrayFrameEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            channel: FlexrayChannel::from_wire(reader.u8()?)?,
            frame: FlexrayFrame {
                slot_id: reader.u16()?,
                cycle: reader.u8()?,
                payload: reader.byte_vec()?,
            },
        })
    }
}

impl WireEncode for FlexrayFrameTransmitEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_u16(self.tx_buffer_index);
        buffer.put_u8(self.channel.to_wire());
    }
}

impl WireDecode for FlexrayFrameTransmitEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            tx_buffer_index: reader.u16()?,
            channel: FlexrayChannel::from_wire(reader.u8()?)?,
        })
    }
}

impl WireEncode for FlexrayHostCommand {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u8(self.command.to_wire());
    }
}

impl WireDecode for FlexrayHostCommand {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            command: FlexrayChiCommand::from_wire(reader.u8()?)?,
        })
    }
}

impl WireEncode for FlexrayPocStatusEvent {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_timestamp(self.timestamp);
        buffer.put_u8(self.state.to_wire());
        buffer.put_bool(self.freeze);
    }
}

impl WireDecode for FlexrayPocStatusEvent {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            timestamp: reader.timestamp()?,
            state: FlexrayPocState::from_wire(reader.u8()?)?,
            freeze: reader.bool()?,
        })
    }
}
