//! Build errors for matrix construction and finalization.

use thiserror::Error;

/// Errors that can occur while assembling or finalizing a state matrix.
///
/// All of these are caller bugs: construction-order mistakes, unknown names,
/// or shape violations. None are transient and none are retried.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Extra timer '{name}' must be added before any state. Create all extra timers first")]
    ExtraTimerAfterStates { name: String },

    #[error("Extra timer '{name}' has already been defined")]
    DuplicateExtraTimer { name: String },

    #[error("The state matrix has no extra timer called '{name}'")]
    UnknownExtraTimer { name: String },

    #[error("Unknown event '{name}'. Events are '{{input}}in', '{{input}}out', 'Tup', or an extra timer name")]
    UnknownEvent { name: String },

    #[error("Unknown output '{name}'. Outputs must be declared at construction")]
    UnknownOutput { name: String },

    #[error("State {state} transitions to state {target} on event {event}, but only {n_states} states exist")]
    InvalidTarget {
        state: usize,
        event: usize,
        target: usize,
        n_states: usize,
    },

    #[error("Matrix shape mismatch: {detail}")]
    ShapeMismatch { detail: String },
}
