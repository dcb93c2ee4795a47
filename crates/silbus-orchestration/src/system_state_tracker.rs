//! Aggregation of participant states into one system state.

use std::collections::HashMap;

use tracing::warn;

use silbus_core::messages::orchestration::{ParticipantState, ParticipantStatus, SystemState};

/// Outcome of applying one participant status.
#[derive(Debug, PartialEq, Eq)]
pub enum StatusApplyResult {
    /// The transition violated the state graph; the status was ignored.
    InvalidTransition,
    /// The status was recorded.
    Applied {
        /// New system state, if the aggregation changed.
        system_state_changed: Option<SystemState>,
    },
}

/// Tracks every participant's last status and derives the system state from
/// the required-participant set.
pub struct SystemStateTracker {
    required_participants: Vec<String>,
    statuses: HashMap<String, ParticipantStatus>,
    system_state: SystemState,
    invalid_transition_count: u64,
}

impl Default for SystemStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Allowed transitions of the participant state graph: the happy-path
/// sequence, `Running <-> Paused`, `Error` from every operational state,
/// `Error -> ShuttingDown -> Shutdown` and the restart edge
/// `Stopped -> ServicesCreated`.
fn is_valid_transition(old: ParticipantState, new: ParticipantState) -> bool {
    use ParticipantState as S;
    if old == new {
        // Status refresh.
        return true;
    }
    match old {
        // The first observed status of a participant is always accepted.
        S::Invalid => true,
        S::ServicesCreated => matches!(new, S::CommunicationInitializing | S::Error),
        S::CommunicationInitializing => matches!(new, S::CommunicationInitialized | S::Error),
        S::CommunicationInitialized => matches!(new, S::ReadyToRun | S::Error),
        S::ReadyToRun => matches!(new, S::Running | S::Error),
        S::Running => matches!(new, S::Paused | S::Stopping | S::Error),
        S::Paused => matches!(new, S::Running | S::Stopping | S::Error),
        S::Stopping => matches!(new, S::Stopped | S::Error),
        S::Stopped => matches!(new, S::ShuttingDown | S::ServicesCreated | S::Error),
        S::ShuttingDown => matches!(new, S::Shutdown | S::Error),
        S::Shutdown => false,
        S::Error => matches!(new, S::ShuttingDown),
    }
}

/// Rank on the canonical ordering used for the minimum rule; `Paused` counts
/// as `Running` so one straggler keeps the system at its own state.
fn ladder_rank(state: ParticipantState) -> u8 {
    use ParticipantState as S;
    match state {
        S::ServicesCreated => 0,
        S::CommunicationInitializing => 1,
        S::CommunicationInitialized => 2,
        S::ReadyToRun => 3,
        _ => 4,
    }
}

fn ladder_state(rank: u8) -> SystemState {
    match rank {
        0 => SystemState::ServicesCreated,
        1 => SystemState::CommunicationInitializing,
        2 => SystemState::CommunicationInitialized,
        3 => SystemState::ReadyToRun,
        _ => SystemState::Running,
    }
}

fn aggregate(states: &[ParticipantState], previous: SystemState) -> SystemState {
    use ParticipantState as S;

    if states.iter().all(|state| *state == S::Shutdown) {
        return SystemState::Shutdown;
    }
    // Error latches until every required participant reached Shutdown.
    if previous == SystemState::Error {
        return SystemState::Error;
    }
    if states.iter().any(|state| *state == S::Error) {
        return SystemState::Error;
    }
    if states.iter().any(|state| *state == S::Invalid) {
        return SystemState::Invalid;
    }
    if states.iter().any(|state| *state == S::Stopping) {
        return SystemState::Stopping;
    }
    if states.iter().any(|state| *state == S::ShuttingDown) {
        return SystemState::ShuttingDown;
    }
    if states.iter().any(|state| *state == S::Stopped) {
        return SystemState::Stopped;
    }
    if states.iter().any(|state| *state == S::Paused)
        && states
            .iter()
            .all(|state| matches!(state, S::Paused | S::Running))
    {
        return SystemState::Paused;
    }

    let min_rank = states.iter().map(|state| ladder_rank(*state)).min();
    match min_rank {
        Some(rank) => ladder_state(rank),
        None => SystemState::Invalid,
    }
}

impl SystemStateTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            required_participants: Vec::new(),
            statuses: HashMap::new(),
            system_state: SystemState::Invalid,
            invalid_transition_count: 0,
        }
    }

    /// Replace the required-participant set; returns the new system state if
    /// the aggregation changed.
    pub fn update_required_participants(&mut self, names: Vec<String>) -> Option<SystemState> {
        self.required_participants = names;
        self.recompute()
    }

    /// Record one participant status.
    pub fn apply_status(&mut self, status: ParticipantStatus) -> StatusApplyResult {
        let old_state = self
            .statuses
            .get(&status.participant_name)
            .map_or(ParticipantState::Invalid, |known| known.state);
        if !is_valid_transition(old_state, status.state) {
            self.invalid_transition_count += 1;
            warn!(
                participant = %status.participant_name,
                from = %old_state,
                to = %status.state,
                "ignoring invalid participant state transition"
            );
            return StatusApplyResult::InvalidTransition;
        }

        self.statuses
            .insert(status.participant_name.clone(), status);
        StatusApplyResult::Applied {
            system_state_changed: self.recompute(),
        }
    }

    /// Forget a participant entirely.
    pub fn remove_participant(&mut self, name: &str) -> Option<SystemState> {
        self.statuses.remove(name);
        self.recompute()
    }

    /// The current aggregated system state.
    pub fn system_state(&self) -> SystemState {
        self.system_state
    }

    /// Last known status of one participant.
    pub fn participant_status(&self, name: &str) -> Option<&ParticipantStatus> {
        self.statuses.get(name)
    }

    /// Number of ignored invalid transitions.
    pub fn invalid_transition_count(&self) -> u64 {
        self.invalid_transition_count
    }

    fn recompute(&mut self) -> Option<SystemState> {
        if self.required_participants.is_empty() {
            return None;
        }
        let states: Vec<ParticipantState> = self
            .required_participants
            .iter()
            .map(|name| {
                self.statuses
                    .get(name)
                    .map_or(ParticipantState::Invalid, |status| status.state)
            })
            .collect();
        let next = aggregate(&states, self.system_state);
        if next != self.system_state {
            self.system_state = next;
            Some(next)
        } else {
            None
        }
    }
}
