//! Press lifecycle state machine with thread-safe transitions.
//!
//! Enforces valid state transitions for a press-to-talk session:
//! - Idle -> Pressed (button down)
//! - Pressed -> Qualified (long-press timer fired while still held)
//! - Pressed -> Idle (released before qualifying)
//! - Qualified -> Idle (released)

use std::fmt;
use std::sync::{Arc, Mutex};

use pressvox_core::error::PressvoxError;

/// Where the current press session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressState {
    /// No button held. Ready for a new press.
    Idle,
    /// Button held, long-press timer running.
    Pressed,
    /// Long-press threshold reached while still held; capture may run.
    Qualified,
}

impl fmt::Display for PressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressState::Idle => write!(f, "Idle"),
            PressState::Pressed => write!(f, "Pressed"),
            PressState::Qualified => write!(f, "Qualified"),
        }
    }
}

impl PressState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &PressState) -> bool {
        matches!(
            (self, target),
            (PressState::Idle, PressState::Pressed)
                | (PressState::Pressed, PressState::Qualified)
                // Release transitions
                | (PressState::Pressed, PressState::Idle)
                | (PressState::Qualified, PressState::Idle)
        )
    }
}

/// Thread-safe state machine for press lifecycle transitions.
///
/// Wraps `PressState` in an `Arc<Mutex<>>` to allow safe concurrent access
/// from the input pump and the timer task. All transitions are validated
/// before being applied, returning an error if the requested transition is
/// not permitted.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<PressState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine initialized to `Idle`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PressState::Idle)),
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> PressState {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// Attempt to transition to the target state.
    ///
    /// Returns `Ok(())` if the transition is valid, or a `PressvoxError::Input`
    /// if the transition is not allowed from the current state.
    pub fn transition(&self, target: PressState) -> Result<(), PressvoxError> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if state.can_transition_to(&target) {
            tracing::debug!("Press state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(PressvoxError::Input(format!(
                "Invalid state transition: {} -> {}",
                *state, target
            )))
        }
    }

    /// Force the state machine back to Idle (used for error recovery).
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        tracing::warn!("Press state machine reset to Idle from {}", *state);
        *state = PressState::Idle;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(PressState::Idle.to_string(), "Idle");
        assert_eq!(PressState::Pressed.to_string(), "Pressed");
        assert_eq!(PressState::Qualified.to_string(), "Qualified");
    }

    #[test]
    fn test_valid_transitions() {
        // Forward path
        assert!(PressState::Idle.can_transition_to(&PressState::Pressed));
        assert!(PressState::Pressed.can_transition_to(&PressState::Qualified));

        // Release transitions
        assert!(PressState::Pressed.can_transition_to(&PressState::Idle));
        assert!(PressState::Qualified.can_transition_to(&PressState::Idle));
    }

    #[test]
    fn test_invalid_transitions() {
        // Cannot qualify without a press
        assert!(!PressState::Idle.can_transition_to(&PressState::Qualified));

        // Cannot go backwards
        assert!(!PressState::Qualified.can_transition_to(&PressState::Pressed));

        // Cannot transition to self
        assert!(!PressState::Idle.can_transition_to(&PressState::Idle));
        assert!(!PressState::Pressed.can_transition_to(&PressState::Pressed));
        assert!(!PressState::Qualified.can_transition_to(&PressState::Qualified));
    }

    #[test]
    fn test_state_machine_full_press_cycle() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), PressState::Idle);

        sm.transition(PressState::Pressed).unwrap();
        assert_eq!(sm.current(), PressState::Pressed);

        sm.transition(PressState::Qualified).unwrap();
        assert_eq!(sm.current(), PressState::Qualified);

        sm.transition(PressState::Idle).unwrap();
        assert_eq!(sm.current(), PressState::Idle);
    }

    #[test]
    fn test_state_machine_short_press_cycle() {
        let sm = StateMachine::new();
        sm.transition(PressState::Pressed).unwrap();
        sm.transition(PressState::Idle).unwrap();
        assert_eq!(sm.current(), PressState::Idle);
    }

    #[test]
    fn test_state_machine_invalid_transition() {
        let sm = StateMachine::new();
        let result = sm.transition(PressState::Qualified);
        assert!(result.is_err());
        assert_eq!(sm.current(), PressState::Idle);
    }

    #[test]
    fn test_state_machine_reset() {
        let sm = StateMachine::new();
        sm.transition(PressState::Pressed).unwrap();
        sm.reset();
        assert_eq!(sm.current(), PressState::Idle);
    }

    #[test]
    fn test_state_machine_clone_is_shared() {
        let sm1 = StateMachine::new();
        let sm2 = sm1.clone();

        sm1.transition(PressState::Pressed).unwrap();
        assert_eq!(sm2.current(), PressState::Pressed);
    }

    #[test]
    fn test_state_machine_transition_error_message() {
        let sm = StateMachine::new();
        let result = sm.transition(PressState::Qualified);
        match result {
            Err(PressvoxError::Input(msg)) => {
                assert!(msg.contains("Idle"));
                assert!(msg.contains("Qualified"));
            }
            _ => panic!("Expected Input error variant"),
        }
    }
}
