//! Shared vocabulary for the builder and the runtime.
//!
//! This module holds the types both halves of the crate speak:
//! - Output directives via [`OutputDirective`]
//! - Name↔index tables via [`NameMap`] and [`LabelMaps`]
//! - The infinite timer sentinel [`INFINITE_TIME`]

mod directive;
mod names;

pub use directive::OutputDirective;
pub use names::{LabelMaps, NameMap};

/// Timer duration for states that never time out on their own.
///
/// A state with this duration arms no deadline; it waits for an input event
/// or a forced transition.
pub const INFINITE_TIME: f64 = f64::INFINITY;

/// Name of the state-timer event column.
pub const TIMER_EVENT: &str = "Tup";

/// Reserved pseudo-event index reported for externally forced transitions.
///
/// `FORCED_EVENT` never appears as a matrix column; it only shows up in
/// [`EventProcessed`](crate::runtime::Notification::EventProcessed)
/// notifications and in exported label maps.
pub const FORCED_EVENT: i32 = -1;
