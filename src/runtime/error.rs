//! Usage and range errors raised by the running machine.

use thiserror::Error;

/// Errors that can occur while configuring or driving a state machine.
///
/// Every variant is a programmer error surfaced immediately; nothing here is
/// transient or retried. The one deliberate exception to loud failure lives
/// in [`force_state`](crate::runtime::StateMachine::force_state) and
/// [`force_output`](crate::runtime::StateMachine::force_output), which
/// warn-and-no-op on an unconfigured machine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("State machine is not configured. Set the matrix, timers, and outputs first")]
    NotConfigured,

    #[error("Cannot modify configuration while the state machine is running")]
    Running,

    #[error("Invalid configuration: {detail}")]
    InvalidConfiguration { detail: String },

    #[error("Invalid state index {index}: the matrix has {n_states} states")]
    InvalidState { index: isize, n_states: usize },

    #[error("Invalid event index {index}: the matrix has {n_events} event columns")]
    InvalidEvent { index: usize, n_events: usize },

    #[error("Invalid output index {index}: the machine has {n_outputs} output channels")]
    InvalidOutput { index: usize, n_outputs: usize },
}
