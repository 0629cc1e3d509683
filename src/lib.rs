//! Operant: a state machine engine for timed behavioral trials
//!
//! Operant drives the automaton at the heart of a behavioral rig: states
//! with per-state timeouts, transitions triggered by discrete input events
//! (sensor pokes) or timer expiry, and side-effecting outputs (valves,
//! LEDs, sound triggers) applied on state entry.
//!
//! # Core Concepts
//!
//! - **StateMatrix**: name-based, incremental construction of a validated
//!   transition matrix, one per trial template
//! - **StateMachine**: executes a finalized matrix, one event at a time,
//!   with a single cancelable state timer and independent extra timers
//! - **Notifications**: synchronous observer callbacks for every processed
//!   event, state change, and output change
//!
//! # Example
//!
//! ```rust
//! use operant::builder::{StateMatrix, StateSpec};
//! use operant::runtime::{ChannelObserver, StateMachine};
//! use std::sync::mpsc::channel;
//!
//! // Poke the center port within 10 s to open the valve for half a second.
//! let mut sma = StateMatrix::new(&["center"], &["valve"]);
//! sma.add_state(StateSpec {
//!     name: "wait_for_poke",
//!     timer: 10.0,
//!     transitions: &[("centerin", "reward")],
//!     ..StateSpec::default()
//! })?;
//! sma.add_state(StateSpec {
//!     name: "reward",
//!     timer: 0.5,
//!     transitions: &[("Tup", "END")],
//!     outputs_on: &["valve"],
//!     ..StateSpec::default()
//! })?;
//!
//! let mut machine = StateMachine::new();
//! machine.set_matrix(sma.matrix()?, Some(sma.timer_event_index()))?;
//! machine.set_timers(sma.timers()?)?;
//! machine.set_outputs(sma.outputs()?)?;
//! let (tx, rx) = channel();
//! machine.subscribe(ChannelObserver::new(tx));
//!
//! machine.start()?;
//! machine.force_state(1)?;   // begin the trial in 'wait_for_poke'
//! machine.process_input(0)?; // 'centerin'
//! assert_eq!(machine.current_state(), sma.states().index_of("reward").unwrap());
//! assert!(rx.try_iter().count() > 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod core;
pub mod runtime;

// Re-export commonly used types
pub use crate::builder::{BuildError, MatrixAnalysis, StateMatrix, StateSpec};
pub use crate::core::{
    LabelMaps, NameMap, OutputDirective, FORCED_EVENT, INFINITE_TIME, TIMER_EVENT,
};
pub use crate::runtime::{
    ChannelObserver, Command, DriverHandle, FnObserver, MachineDriver, MachineInfo, Notification,
    Observer, RuntimeError, StateMachine,
};
