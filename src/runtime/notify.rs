//! Outbound notifications and the observer interface.
//!
//! The machine reports everything it does through [`Notification`] values
//! delivered synchronously, in subscription order, to every subscriber.
//! There is no implicit threading: a notification is delivered on whatever
//! thread processed the event, before the next event is looked at. Handlers
//! must not call back into the machine synchronously.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;

/// One observable fact about the machine's execution.
///
/// `EventProcessed` fires for *every* event the machine looks up, including
/// self-loops, so a trial log can distinguish an ignored poke from a real
/// transition. `StateChanged` and the output notifications only fire when
/// something actually changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// The machine entered a new state.
    StateChanged { state: usize },
    /// One output channel flipped. Emitted only on actual change.
    OutputChanged { output: usize, value: bool },
    /// The entered state carries a nonzero integer code (e.g. a sound index).
    IntegerOutput { value: i32 },
    /// The entered state carries a nonzero serial byte.
    SerialOutput { value: u8 },
    /// An event was looked up in the matrix. `event` is the column index, or
    /// [`FORCED_EVENT`](crate::core::FORCED_EVENT) for forced transitions;
    /// `next_state` may equal the current state (self-loop).
    EventProcessed {
        event: i32,
        timestamp: DateTime<Utc>,
        next_state: usize,
    },
}

/// Receives machine notifications.
pub trait Observer: Send + Sync {
    /// Called synchronously for every notification.
    fn notify(&self, notification: Notification);
}

/// Function-based observer for simple cases.
pub struct FnObserver<F: Fn(Notification) + Send + Sync>(pub F);

impl<F: Fn(Notification) + Send + Sync> Observer for FnObserver<F> {
    fn notify(&self, notification: Notification) {
        (self.0)(notification);
    }
}

/// Channel-based observer: forwards notifications to an mpsc channel.
///
/// A disconnected receiver is ignored, so observers can outlive their
/// consumers during shutdown.
pub struct ChannelObserver {
    sender: mpsc::Sender<Notification>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::Sender<Notification>) -> Self {
        Self { sender }
    }
}

impl Observer for ChannelObserver {
    fn notify(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }
}

/// The machine's subscriber list.
#[derive(Default)]
pub(crate) struct ObserverSet {
    observers: Vec<Box<dyn Observer>>,
}

impl ObserverSet {
    pub(crate) fn subscribe(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub(crate) fn emit(&self, notification: Notification) {
        for observer in &self.observers {
            observer.notify(notification.clone());
        }
    }
}
