//! Execution of a configured automaton.
//!
//! [`StateMachine`] runs one matrix at a time: it holds the current state,
//! manages the active state timer and any extra timers, funnels every event
//! through one lookup path, and reports everything through
//! [`Notification`]s. [`MachineDriver`] provides the serialized queue that
//! external producers hand events through.

pub mod driver;
pub mod error;
pub mod machine;
pub mod notify;

pub use driver::{Command, DriverHandle, MachineDriver};
pub use error::RuntimeError;
pub use machine::{MachineInfo, StateMachine};
pub use notify::{ChannelObserver, FnObserver, Notification, Observer};
