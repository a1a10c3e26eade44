//! Convergence run state machine
//!
//! A run progresses SCANNING → DISPATCHING → PERSISTING and loops back to
//! SCANNING until one of the named stop conditions fires, ending in STOPPED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ExtractionField;

/// Convergence run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    /// Deriving the incomplete work list from catalog + store
    Scanning,
    /// Voting incomplete items through the extractor
    Dispatching,
    /// Writing accepted values to the checkpoint store
    Persisting,
    /// Terminal; see the stop reason
    Stopped,
}

/// Why a run stopped
///
/// Neither `Stalled` nor `CeilingReached` is an error: both mean "resume me
/// later", with everything accepted so far already flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The scanner found nothing incomplete
    Success,
    /// The given number of consecutive rounds accepted zero values
    Stalled { rounds: u32 },
    /// The hard round ceiling was reached
    CeilingReached,
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// One convergence run (in-memory state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    /// Unique session identifier
    pub session_id: Uuid,

    /// Which worksheet field this run converges
    pub field: ExtractionField,

    /// Current state
    pub state: RunState,

    /// Rounds started so far
    pub round: u32,

    /// Values accepted across all rounds
    pub accepted_total: usize,

    /// Stop reason, set when the run reaches STOPPED
    pub stop_reason: Option<StopReason>,

    /// Run start time
    pub started_at: DateTime<Utc>,

    /// Run end time (terminal states only)
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunSession {
    pub fn new(field: ExtractionField) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            field,
            state: RunState::Scanning,
            round: 0,
            accepted_total: 0,
            stop_reason: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new state
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state == RunState::Stopped {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    /// Transition to STOPPED with the given reason
    pub fn stop(&mut self, reason: StopReason) -> StateTransition {
        self.stop_reason = Some(reason);
        self.transition_to(RunState::Stopped)
    }

    pub fn is_terminal(&self) -> bool {
        self.state == RunState::Stopped
    }
}

/// Completion counts for one catalog group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCompletion {
    pub group: u32,
    pub complete: u32,
    pub total: u32,
}

/// Final report for one convergence run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: Uuid,
    pub field: ExtractionField,
    pub stop_reason: StopReason,
    pub rounds: u32,
    pub accepted_total: usize,
    /// Per-group completion counts at the end of the run
    pub groups: Vec<GroupCompletion>,
    /// Keys accepted by the longest-candidate fallback rather than by
    /// consensus; surfaced for manual review
    pub fallback_keys: Vec<String>,
}

impl RunReport {
    pub fn complete_items(&self) -> u32 {
        self.groups.iter().map(|g| g.complete).sum()
    }

    pub fn total_items(&self) -> u32 {
        self.groups.iter().map(|g| g.total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_session() -> RunSession {
        RunSession::new(ExtractionField::Description)
    }

    #[test]
    fn test_new_session_starts_scanning() {
        let session = create_test_session();
        assert_eq!(session.state, RunState::Scanning);
        assert_eq!(session.round, 0);
        assert!(session.stop_reason.is_none());
        assert!(session.ended_at.is_none());
    }

    #[test]
    fn test_round_cycle_transitions() {
        // Given: a session in SCANNING
        let mut session = create_test_session();

        // When: it moves through one round
        let t1 = session.transition_to(RunState::Dispatching);
        let t2 = session.transition_to(RunState::Persisting);
        let t3 = session.transition_to(RunState::Scanning);

        // Then: every transition records old and new state
        assert_eq!(t1.old_state, RunState::Scanning);
        assert_eq!(t1.new_state, RunState::Dispatching);
        assert_eq!(t2.new_state, RunState::Persisting);
        assert_eq!(t3.new_state, RunState::Scanning);
        assert!(!session.is_terminal());
    }

    #[test]
    fn test_stop_stamps_end_time_and_reason() {
        let mut session = create_test_session();
        session.transition_to(RunState::Dispatching);

        session.stop(StopReason::Stalled { rounds: 3 });

        assert!(session.is_terminal());
        assert_eq!(session.stop_reason, Some(StopReason::Stalled { rounds: 3 }));
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_report_totals() {
        let report = RunReport {
            session_id: Uuid::new_v4(),
            field: ExtractionField::Requirement,
            stop_reason: StopReason::Success,
            rounds: 2,
            accepted_total: 105,
            groups: vec![
                GroupCompletion { group: 3, complete: 50, total: 50 },
                GroupCompletion { group: 8, complete: 55, total: 55 },
            ],
            fallback_keys: Vec::new(),
        };
        assert_eq!(report.complete_items(), 105);
        assert_eq!(report.total_items(), 105);
    }
}
