//! Join state machine types

use crate::error::{LoraError, LoraResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Network join state
///
/// # State Transitions
/// ```text
/// Idle -> Joining (join started)
/// Joining -> Joining (attempt failed, retrying)
/// Joining -> Joined (modem reports joined or already joined)
/// Joining -> Failed (attempts exhausted)
/// Joined/Failed -> Joining (re-join)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinState {
    /// No join attempted since the session was created
    #[default]
    Idle,
    /// A join command is outstanding or a retry is pending
    Joining,
    /// The modem reports an active network session
    Joined,
    /// Every attempt of the last join failed
    Failed,
}

impl JoinState {
    pub fn is_joined(&self) -> bool {
        matches!(self, JoinState::Joined)
    }

    /// Validate state transition
    ///
    /// # Returns
    /// `Ok(())` if transition is valid, `Err` otherwise
    pub fn validate_transition(&self, new_state: JoinState) -> LoraResult<()> {
        let valid = matches!(
            (*self, new_state),
            (JoinState::Idle, JoinState::Joining)
                | (JoinState::Joining, JoinState::Joining)
                | (JoinState::Joining, JoinState::Joined)
                | (JoinState::Joining, JoinState::Failed)
                | (JoinState::Joined, JoinState::Joining)
                | (JoinState::Failed, JoinState::Joining)
        );

        if valid {
            Ok(())
        } else {
            Err(LoraError::InvalidData(format!(
                "Invalid join state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JoinState::Idle => "Idle",
            JoinState::Joining => "Joining",
            JoinState::Joined => "Joined",
            JoinState::Failed => "Failed",
        }
    }
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one join command's reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinOutcome {
    Success,
    AlreadyJoined,
    Failure,
    /// Modem busy or in join backoff
    Busy,
    /// Modem not configured for the requested activation mode
    WrongMode,
    Timeout,
}

impl JoinOutcome {
    /// Whether the outcome ends the retry loop in `Joined`
    pub fn is_joined(&self) -> bool {
        matches!(self, JoinOutcome::Success | JoinOutcome::AlreadyJoined)
    }
}

/// Counters scoped to one join call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAttempt {
    pub remaining: u8,
    pub made: u8,
    pub delay: Duration,
}

impl JoinAttempt {
    pub fn new(attempts: u8) -> Self {
        Self {
            remaining: attempts,
            made: 0,
            delay: Duration::ZERO,
        }
    }

    /// Consume one attempt, returning `false` when none are left
    pub fn begin(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.made += 1;
        true
    }

    pub fn exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let idle = JoinState::default();
        assert_eq!(idle, JoinState::Idle);
        assert!(idle.validate_transition(JoinState::Joining).is_ok());
        assert!(idle.validate_transition(JoinState::Joined).is_err());
        assert!(JoinState::Joining.validate_transition(JoinState::Joining).is_ok());
        assert!(JoinState::Joining.validate_transition(JoinState::Failed).is_ok());
        assert!(JoinState::Failed.validate_transition(JoinState::Joined).is_err());
        assert!(JoinState::Joined.validate_transition(JoinState::Joining).is_ok());
    }

    #[test]
    fn test_attempt_counters() {
        let mut attempt = JoinAttempt::new(2);
        assert!(attempt.begin());
        assert!(attempt.begin());
        assert!(attempt.exhausted());
        assert!(!attempt.begin());
        assert_eq!(attempt.made, 2);
    }

    #[test]
    fn test_outcome_classes() {
        assert!(JoinOutcome::Success.is_joined());
        assert!(JoinOutcome::AlreadyJoined.is_joined());
        assert!(!JoinOutcome::Busy.is_joined());
        assert!(!JoinOutcome::Timeout.is_joined());
    }
}
