//! Output directives applied when a state is entered.
//!
//! Each state carries one directive per output channel. `NoChange` is the
//! default everywhere, so a state only touches the channels it names.

use serde::{Deserialize, Serialize};

/// What entering a state does to one output channel.
///
/// `NoChange` means "leave exactly as is", including values set by a prior
/// [`force_output`](crate::runtime::StateMachine::force_output) call.
///
/// # Example
///
/// ```rust
/// use operant::core::OutputDirective;
///
/// assert_eq!(OutputDirective::On.as_code(), 1);
/// assert_eq!(OutputDirective::from_code(-1), Some(OutputDirective::NoChange));
/// assert_eq!(OutputDirective::from_code(7), None);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum OutputDirective {
    /// Turn the channel on.
    On,
    /// Turn the channel off.
    Off,
    /// Leave the channel at its previous value.
    NoChange,
}

impl OutputDirective {
    /// Integer code used in exported tables: 1 (on), 0 (off), -1 (no change).
    pub fn as_code(self) -> i32 {
        match self {
            Self::On => 1,
            Self::Off => 0,
            Self::NoChange => -1,
        }
    }

    /// Inverse of [`as_code`](Self::as_code). Returns `None` for any other value.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::On),
            0 => Some(Self::Off),
            -1 => Some(Self::NoChange),
            _ => None,
        }
    }

    /// Single-character cell used in matrix tables: `1`, `0`, or `-`.
    pub fn as_char(self) -> char {
        match self {
            Self::On => '1',
            Self::Off => '0',
            Self::NoChange => '-',
        }
    }
}

impl Default for OutputDirective {
    fn default() -> Self {
        Self::NoChange
    }
}
