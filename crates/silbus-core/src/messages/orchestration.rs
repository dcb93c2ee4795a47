//! Lifecycle and system state payloads.

use std::fmt;

use time::OffsetDateTime;

use crate::errors::{Result, SilbusError};
use crate::wire::{MessageBuffer, MessageReader, WireDecode, WireEncode};

/// Lifecycle state of a single participant.
///
/// Wire ordinals are spaced so intermediate states can be added without
/// renumbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParticipantState {
    /// No status observed yet.
    Invalid,
    /// All internal services are set up.
    ServicesCreated,
    /// Pending subscriptions are being settled.
    CommunicationInitializing,
    /// Communication with all peers is established.
    CommunicationInitialized,
    /// Ready to enter the running phase.
    ReadyToRun,
    /// The simulation is running.
    Running,
    /// The simulation is paused by this participant.
    Paused,
    /// The participant is stopping.
    Stopping,
    /// The participant has stopped.
    Stopped,
    /// The participant is shutting down.
    ShuttingDown,
    /// Terminal state.
    Shutdown,
    /// An error occurred; only shutdown is possible from here.
    Error,
}

impl ParticipantState {
    pub(crate) fn to_wire(self) -> u16 {
        match self {
            ParticipantState::Invalid => 0,
            ParticipantState::ServicesCreated => 10,
            ParticipantState::CommunicationInitializing => 20,
            ParticipantState::CommunicationInitialized => 30,
            ParticipantState::ReadyToRun => 40,
            ParticipantState::Running => 50,
            ParticipantState::Paused => 60,
            ParticipantState::Stopping => 70,
            ParticipantState::Stopped => 80,
            ParticipantState::ShuttingDown => 90,
            ParticipantState::Shutdown => 100,
            ParticipantState::Error => 110,
        }
    }

    pub(crate) fn from_wire(value: u16) -> Result<Self> {
        match value {
            0 => Ok(ParticipantState::Invalid),
            10 => Ok(ParticipantState::ServicesCreated),
            20 => Ok(ParticipantState::CommunicationInitializing),
            30 => Ok(ParticipantState::CommunicationInitialized),
            40 => Ok(ParticipantState::ReadyToRun),
            50 => Ok(ParticipantState::Running),
            60 => Ok(ParticipantState::Paused),
            70 => Ok(ParticipantState::Stopping),
            80 => Ok(ParticipantState::Stopped),
            90 => Ok(ParticipantState::ShuttingDown),
            100 => Ok(ParticipantState::Shutdown),
            110 => Ok(ParticipantState::Error),
            other => Err(SilbusError::protocol(format!(
                "unknown participant state {other}"
            ))),
        }
    }
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParticipantState::Invalid => "Invalid",
            ParticipantState::ServicesCreated => "ServicesCreated",
            ParticipantState::CommunicationInitializing => "CommunicationInitializing",
            ParticipantState::CommunicationInitialized => "CommunicationInitialized",
            ParticipantState::ReadyToRun => "ReadyToRun",
            ParticipantState::Running => "Running",
            ParticipantState::Paused => "Paused",
            ParticipantState::Stopping => "Stopping",
            ParticipantState::Stopped => "Stopped",
            ParticipantState::ShuttingDown => "ShuttingDown",
            ParticipantState::Shutdown => "Shutdown",
            ParticipantState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Aggregated state of the required-participant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemState {
    /// No aggregation possible (empty required set or missing statuses).
    Invalid,
    /// All required participants have created their services.
    ServicesCreated,
    /// At least one required participant is still initializing communication.
    CommunicationInitializing,
    /// All required participants reached communication-initialized.
    CommunicationInitialized,
    /// All required participants are ready to run.
    ReadyToRun,
    /// All required participants are running.
    Running,
    /// At least one required participant paused the simulation.
    Paused,
    /// At least one required participant is stopping.
    Stopping,
    /// All required participants have stopped.
    Stopped,
    /// At least one required participant is shutting down.
    ShuttingDown,
    /// All required participants have shut down.
    Shutdown,
    /// At least one required participant reported an error.
    Error,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemState::Invalid => "Invalid",
            SystemState::ServicesCreated => "ServicesCreated",
            SystemState::CommunicationInitializing => "CommunicationInitializing",
            SystemState::CommunicationInitialized => "CommunicationInitialized",
            SystemState::ReadyToRun => "ReadyToRun",
            SystemState::Running => "Running",
            SystemState::Paused => "Paused",
            SystemState::Stopping => "Stopping",
            SystemState::Stopped => "Stopped",
            SystemState::ShuttingDown => "ShuttingDown",
            SystemState::Shutdown => "Shutdown",
            SystemState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Lifecycle status announcement of one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantStatus {
    /// Name of the reporting participant.
    pub participant_name: String,
    /// Current lifecycle state.
    pub state: ParticipantState,
    /// Human-readable reason for entering the state.
    pub enter_reason: String,
    /// Wall-clock time the state was entered.
    pub enter_time: OffsetDateTime,
    /// Wall-clock time the status was last refreshed.
    pub refresh_time: OffsetDateTime,
}

impl ParticipantStatus {
    /// Initial, unset status for a participant.
    pub fn unknown(participant_name: impl Into<String>) -> Self {
        Self {
            participant_name: participant_name.into(),
            state: ParticipantState::Invalid,
            enter_reason: String::new(),
            enter_time: OffsetDateTime::UNIX_EPOCH,
            refresh_time: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// The required-participant set used for system state aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkflowConfiguration {
    /// Names of the participants counted into the aggregation.
    pub required_participant_names: Vec<String>,
}

fn encode_time(buffer: &mut MessageBuffer, value: OffsetDateTime) {
    buffer.put_i64(value.unix_timestamp_nanos() as i64);
}

fn decode_time(reader: &mut MessageReader<'_>) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(reader.i64()?))
        .map_err(|error| SilbusError::protocol(format!("invalid timestamp: {error}")))
}

impl WireEncode for ParticipantStatus {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_string(&self.participant_name);
        buffer.put_u16(self.state.to_wire());
        buffer.put_string(&self.enter_reason);
        encode_time(buffer, self.enter_time);
        encode_time(buffer, self.refresh_time);
    }
}

impl WireDecode for ParticipantStatus {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        Ok(Self {
            participant_name: reader.string()?,
            state: ParticipantState::from_wire(reader.u16()?)?,
            enter_reason: reader.string()?,
            enter_time: decode_time(reader)?,
            refresh_time: decode_time(reader)?,
        })
    }
}

impl WireEncode for WorkflowConfiguration {
    fn encode(&self, buffer: &mut MessageBuffer) {
        buffer.put_u32(self.required_participant_names.len() as u32);
        for name in &self.required_participant_names {
            buffer.put_string(name);
        }
    }
}

impl WireDecode for WorkflowConfiguration {
    fn decode(reader: &mut MessageReader<'_>) -> Result<Self> {
        let count = reader.u32()?;
        let mut names = Vec::new();
        for _ in 0..count {
            names.push(reader.string()?);
        }
        Ok(Self {
            required_participant_names: names,
        })
    }
}
