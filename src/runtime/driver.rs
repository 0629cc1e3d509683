//! Serialized event queue around one machine.
//!
//! The runtime assumes single-threaded dispatch; this driver is the
//! mutual-exclusion boundary the concurrency model calls for. It owns the
//! machine on the calling thread, drains one mpsc queue, and between
//! commands sleeps no longer than the machine's next deadline. Hardware
//! callbacks and UI threads talk to it through cloned [`DriverHandle`]s, so
//! timer expiry and external input land in one ordered stream: whichever is
//! enqueued first wins, and the loser is simply processed against the state
//! the machine is in by then.

use crate::runtime::machine::StateMachine;
use log::warn;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Instant;

/// A control message for the driver's queue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Process an input event.
    Input(usize),
    /// Force a transition; -1 targets the last state.
    ForceState(isize),
    /// Force one output channel.
    ForceOutput(usize, bool),
    /// Start the machine.
    Start,
    /// Stop the machine, canceling pending deadlines.
    Stop,
    /// Exit the loop and hand the machine back.
    Shutdown,
}

/// Cloneable sender half used by event producers.
#[derive(Clone)]
pub struct DriverHandle {
    sender: Sender<Command>,
}

impl DriverHandle {
    /// Enqueue a command. Returns false if the driver has shut down.
    pub fn send(&self, command: Command) -> bool {
        self.sender.send(command).is_ok()
    }

    /// Enqueue an input event.
    pub fn input(&self, event: usize) -> bool {
        self.send(Command::Input(event))
    }

    /// Enqueue a forced transition; -1 targets the last state.
    pub fn force_state(&self, state_index: isize) -> bool {
        self.send(Command::ForceState(state_index))
    }

    /// Enqueue a forced output write.
    pub fn force_output(&self, output: usize, value: bool) -> bool {
        self.send(Command::ForceOutput(output, value))
    }

    /// Ask the driver loop to exit.
    pub fn shutdown(&self) -> bool {
        self.send(Command::Shutdown)
    }
}

/// Owns a machine and runs its event loop.
///
/// ```rust,no_run
/// use operant::runtime::{Command, MachineDriver, StateMachine};
///
/// let machine = StateMachine::new();
/// // ... configure and subscribe ...
/// let (driver, handle) = MachineDriver::new(machine);
/// let worker = std::thread::spawn(move || driver.run());
/// handle.send(Command::Start);
/// handle.force_state(1);
/// handle.input(0);
/// handle.shutdown();
/// let machine = worker.join().expect("driver thread panicked");
/// # let _ = machine;
/// ```
pub struct MachineDriver {
    machine: StateMachine,
    commands: Receiver<Command>,
}

impl MachineDriver {
    /// Wrap a machine, returning the driver and a handle for producers.
    pub fn new(machine: StateMachine) -> (Self, DriverHandle) {
        let (sender, commands) = channel();
        (Self { machine, commands }, DriverHandle { sender })
    }

    /// Run until [`Command::Shutdown`] arrives or every handle is dropped,
    /// then return the machine for reconfiguration.
    pub fn run(mut self) -> StateMachine {
        loop {
            // Advance zero-duration chains before sleeping.
            while self.machine.poll_timers() > 0 {}

            let received = match self.machine.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    self.commands.recv_timeout(wait)
                }
                None => self
                    .commands
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.apply(command),
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        self.machine
    }

    fn apply(&mut self, command: Command) {
        let result = match command {
            Command::Input(event) => self.machine.process_input(event),
            Command::ForceState(state_index) => self.machine.force_state(state_index),
            Command::ForceOutput(output, value) => self.machine.force_output(output, value),
            Command::Start => self.machine.start(),
            Command::Stop => {
                self.machine.stop();
                Ok(())
            }
            Command::Shutdown => Ok(()),
        };
        if let Err(error) = result {
            warn!("dropping {command:?}: {error}");
        }
    }
}
