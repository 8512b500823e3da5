//! Session state machine with validated transitions.
//!
//! Every state may stay where it is. Beyond that:
//! Idle -> CollectingParameters/Executing/AwaitingConfirmation
//! CollectingParameters -> AwaitingConfirmation/Idle
//! AwaitingConfirmation -> Executing/Idle
//! Executing -> Idle/Error
//! Error -> CollectingParameters/Idle

use crate::error::ContextError;
use crate::types::{ActiveContext, SessionState};

/// Validate that a session state transition is allowed.
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), ContextError> {
    use SessionState::*;

    let valid = from == to
        || matches!(
            (from, to),
            (Idle, CollectingParameters)
                | (Idle, Executing)
                | (Idle, AwaitingConfirmation)
                | (CollectingParameters, AwaitingConfirmation)
                | (CollectingParameters, Idle)
                | (AwaitingConfirmation, Executing)
                | (AwaitingConfirmation, Idle)
                | (Executing, Idle)
                | (Executing, Error)
                | (Error, CollectingParameters)
                | (Error, Idle)
        );

    if valid {
        Ok(())
    } else {
        Err(ContextError::InvalidTransition { from, to })
    }
}

impl SessionState {
    pub fn can_transition_to(self, to: SessionState) -> bool {
        validate_transition(self, to).is_ok()
    }
}

/// Move `active` to `to`, rejecting transitions outside the table.
pub fn transition(active: &mut ActiveContext, to: SessionState) -> Result<(), ContextError> {
    let from = active.session_state;
    validate_transition(from, to)?;
    if from != to {
        tracing::debug!(from = %from, to = %to, "Session transition");
    }
    active.session_state = to;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL_STATES: [SessionState; 5] = [
        Idle,
        CollectingParameters,
        Executing,
        AwaitingConfirmation,
        Error,
    ];

    // =====================================================================
    // Valid transitions
    // =====================================================================

    #[test]
    fn test_idle_to_collecting() {
        assert!(validate_transition(Idle, CollectingParameters).is_ok());
    }

    #[test]
    fn test_idle_to_executing() {
        assert!(validate_transition(Idle, Executing).is_ok());
    }

    #[test]
    fn test_collecting_to_awaiting_confirmation() {
        assert!(validate_transition(CollectingParameters, AwaitingConfirmation).is_ok());
    }

    #[test]
    fn test_awaiting_confirmation_to_executing() {
        assert!(validate_transition(AwaitingConfirmation, Executing).is_ok());
    }

    #[test]
    fn test_executing_to_error() {
        assert!(validate_transition(Executing, Error).is_ok());
    }

    #[test]
    fn test_error_recovery_paths() {
        assert!(validate_transition(Error, CollectingParameters).is_ok());
        assert!(validate_transition(Error, Idle).is_ok());
    }

    #[test]
    fn test_every_state_may_stay() {
        for state in ALL_STATES {
            assert!(validate_transition(state, state).is_ok(), "{} -> {}", state, state);
        }
    }

    // =====================================================================
    // Invalid transitions
    // =====================================================================

    #[test]
    fn test_idle_to_error_invalid() {
        assert!(validate_transition(Idle, Error).is_err());
    }

    #[test]
    fn test_awaiting_confirmation_to_collecting_invalid() {
        assert!(!AwaitingConfirmation.can_transition_to(CollectingParameters));
    }

    #[test]
    fn test_collecting_to_executing_invalid() {
        assert!(validate_transition(CollectingParameters, Executing).is_err());
    }

    #[test]
    fn test_error_to_executing_invalid() {
        assert!(validate_transition(Error, Executing).is_err());
        assert!(validate_transition(Error, AwaitingConfirmation).is_err());
    }

    #[test]
    fn test_executing_to_collecting_invalid() {
        assert!(validate_transition(Executing, CollectingParameters).is_err());
        assert!(validate_transition(Executing, AwaitingConfirmation).is_err());
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    #[test]
    fn test_invalid_transition_error_message() {
        let err = validate_transition(Idle, Error).unwrap_err();
        assert_eq!(err.to_string(), "Invalid state transition: idle -> error");
    }

    #[test]
    fn test_all_valid_transitions_count() {
        let mut valid_count = 0;
        for from in ALL_STATES {
            for to in ALL_STATES {
                if validate_transition(from, to).is_ok() {
                    valid_count += 1;
                }
            }
        }
        // Five self-loops plus eleven moves.
        assert_eq!(valid_count, 16);
    }

    #[test]
    fn test_transition_leaves_state_on_rejection() {
        let mut active = ActiveContext::default();
        assert!(transition(&mut active, Error).is_err());
        assert_eq!(active.session_state, Idle);

        transition(&mut active, CollectingParameters).unwrap();
        assert_eq!(active.session_state, CollectingParameters);
    }
}
