//! Execution of one configured automaton.
//!
//! The machine is single-threaded and single-owner: events are processed one
//! at a time, and each lookup-diff-rearm-notify sequence runs to completion
//! before the next event is considered. Timer expiry is not a special code
//! path; due deadlines are funneled through the same matrix lookup as
//! external inputs by [`StateMachine::poll_timers`].

use crate::core::{OutputDirective, FORCED_EVENT, INFINITE_TIME};
use crate::runtime::error::RuntimeError;
use crate::runtime::notify::{Notification, Observer, ObserverSet};
use chrono::Utc;
use log::{debug, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

/// An independently-running timer with its own event column.
struct ExtraTimer {
    duration: f64,
    trigger: usize,
    event: usize,
    deadline: Option<Instant>,
}

/// Snapshot of the machine for logging and diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct MachineInfo {
    pub current_state: usize,
    pub is_running: bool,
    pub is_configured: bool,
    pub n_states: usize,
    pub n_events: usize,
    pub n_outputs: usize,
    pub output_states: Vec<bool>,
    pub state_timers: Option<Vec<f64>>,
}

/// State machine driven by a transition matrix.
///
/// Configure with the arrays from a finalized
/// [`StateMatrix`](crate::builder::StateMatrix), subscribe observers, then
/// `start()` and feed events. The machine parks in the last state (END)
/// after configuration; the surrounding trial controller forces it into the
/// first behavioral state to begin a trial.
///
/// # Example
///
/// ```rust
/// use operant::builder::{StateMatrix, StateSpec};
/// use operant::runtime::StateMachine;
///
/// let mut sma = StateMatrix::new(&["center"], &["valve"]);
/// sma.add_state(StateSpec {
///     name: "wait",
///     transitions: &[("centerin", "reward")],
///     ..StateSpec::default()
/// })?;
/// sma.add_state(StateSpec {
///     name: "reward",
///     timer: 0.5,
///     transitions: &[("Tup", "END")],
///     outputs_on: &["valve"],
///     ..StateSpec::default()
/// })?;
///
/// let mut machine = StateMachine::new();
/// machine.set_matrix(sma.matrix()?, Some(sma.timer_event_index()))?;
/// machine.set_timers(sma.timers()?)?;
/// machine.set_outputs(sma.outputs()?)?;
/// machine.start()?;
/// machine.force_state(1)?; // wait
/// machine.process_input(0)?; // centerin
/// assert_eq!(machine.current_state(), 2); // reward
/// assert!(machine.output_state(0)?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct StateMachine {
    matrix: Option<Vec<Vec<usize>>>,
    state_timers: Option<Vec<f64>>,
    state_outputs: Option<Vec<Vec<OutputDirective>>>,
    integer_outputs: Option<Vec<i32>>,
    serial_outputs: Option<Vec<u8>>,
    extra_timers: Vec<ExtraTimer>,
    timer_event_index: usize,
    n_states: usize,
    n_events: usize,
    n_outputs: usize,
    current_state: usize,
    running: bool,
    output_states: Vec<bool>,
    state_deadline: Option<Instant>,
    observers: ObserverSet,
}

impl StateMachine {
    /// Create an unconfigured machine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe an observer to every notification, in subscription order.
    pub fn subscribe<O: Observer + 'static>(&mut self, observer: O) {
        self.observers.subscribe(Box::new(observer));
    }

    /// Set the transition matrix, `[state][event]` → next state.
    ///
    /// `timer_event_index` is the `Tup` column; `None` means the last
    /// column, which is only correct when there are no extra timers. Parks
    /// `current_state` at the last state and clears any extra timer
    /// configuration (extra timers are matrix-shaped; reconfigure them with
    /// [`set_extra_timers`](Self::set_extra_timers) after this).
    pub fn set_matrix(
        &mut self,
        matrix: Vec<Vec<usize>>,
        timer_event_index: Option<usize>,
    ) -> Result<(), RuntimeError> {
        if self.running {
            return Err(RuntimeError::Running);
        }
        let n_states = matrix.len();
        if n_states == 0 {
            return Err(RuntimeError::InvalidConfiguration {
                detail: "state matrix cannot be empty".to_string(),
            });
        }
        let n_events = matrix[0].len();
        if n_events == 0 {
            return Err(RuntimeError::InvalidConfiguration {
                detail: "state matrix must have at least one event column".to_string(),
            });
        }
        for (state, row) in matrix.iter().enumerate() {
            if row.len() != n_events {
                return Err(RuntimeError::InvalidConfiguration {
                    detail: format!(
                        "state {state} has {} event columns, expected {n_events}",
                        row.len()
                    ),
                });
            }
            for &target in row {
                if target >= n_states {
                    return Err(RuntimeError::InvalidConfiguration {
                        detail: format!(
                            "state {state} transitions to state {target}, but only {n_states} states exist"
                        ),
                    });
                }
            }
        }
        let timer_event_index = match timer_event_index {
            Some(index) if index < n_events => index,
            Some(index) => {
                return Err(RuntimeError::InvalidEvent {
                    index,
                    n_events,
                })
            }
            None => n_events - 1,
        };

        // Resize existing timers to the new state count, keeping the prefix.
        if let Some(timers) = &mut self.state_timers {
            timers.resize(n_states, INFINITE_TIME);
        }

        self.matrix = Some(matrix);
        self.timer_event_index = timer_event_index;
        self.n_states = n_states;
        self.n_events = n_events;
        self.extra_timers.clear();
        self.current_state = n_states - 1;
        Ok(())
    }

    /// Set per-state timer durations in seconds.
    pub fn set_timers(&mut self, timers: Vec<f64>) -> Result<(), RuntimeError> {
        if self.running {
            return Err(RuntimeError::Running);
        }
        if self.matrix.is_some() && timers.len() != self.n_states {
            return Err(RuntimeError::InvalidConfiguration {
                detail: format!(
                    "{} state timers for {} states",
                    timers.len(),
                    self.n_states
                ),
            });
        }
        self.state_timers = Some(timers);
        Ok(())
    }

    /// Set per-state output directives, `[state][channel]`.
    ///
    /// Resets every output channel to off.
    pub fn set_outputs(
        &mut self,
        outputs: Vec<Vec<OutputDirective>>,
    ) -> Result<(), RuntimeError> {
        if self.running {
            return Err(RuntimeError::Running);
        }
        if self.matrix.is_some() && outputs.len() != self.n_states {
            return Err(RuntimeError::InvalidConfiguration {
                detail: format!(
                    "{} output rows for {} states",
                    outputs.len(),
                    self.n_states
                ),
            });
        }
        let n_outputs = outputs.first().map_or(0, Vec::len);
        for (state, row) in outputs.iter().enumerate() {
            if row.len() != n_outputs {
                return Err(RuntimeError::InvalidConfiguration {
                    detail: format!(
                        "state {state} has {} output directives, expected {n_outputs}",
                        row.len()
                    ),
                });
            }
        }
        self.state_outputs = Some(outputs);
        self.n_outputs = n_outputs;
        self.output_states = vec![false; n_outputs];
        Ok(())
    }

    /// Set per-state integer codes (0 = none), emitted as
    /// [`Notification::IntegerOutput`] on entry.
    pub fn set_integer_outputs(&mut self, outputs: Vec<i32>) -> Result<(), RuntimeError> {
        if self.running {
            return Err(RuntimeError::Running);
        }
        if self.matrix.is_some() && outputs.len() != self.n_states {
            return Err(RuntimeError::InvalidConfiguration {
                detail: format!(
                    "{} integer outputs for {} states",
                    outputs.len(),
                    self.n_states
                ),
            });
        }
        self.integer_outputs = Some(outputs);
        Ok(())
    }

    /// Set per-state serial bytes (0 = none), emitted as
    /// [`Notification::SerialOutput`] on entry.
    pub fn set_serial_outputs(&mut self, outputs: Vec<u8>) -> Result<(), RuntimeError> {
        if self.running {
            return Err(RuntimeError::Running);
        }
        if self.matrix.is_some() && outputs.len() != self.n_states {
            return Err(RuntimeError::InvalidConfiguration {
                detail: format!(
                    "{} serial outputs for {} states",
                    outputs.len(),
                    self.n_states
                ),
            });
        }
        self.serial_outputs = Some(outputs);
        Ok(())
    }

    /// Configure the independently-running extra timers.
    ///
    /// `durations[i]` and `triggers[i]` describe the timer owning event
    /// column `timer_event_index + 1 + i`. Call after
    /// [`set_matrix`](Self::set_matrix).
    pub fn set_extra_timers(
        &mut self,
        durations: Vec<f64>,
        triggers: Vec<usize>,
    ) -> Result<(), RuntimeError> {
        if self.running {
            return Err(RuntimeError::Running);
        }
        if self.matrix.is_none() {
            return Err(RuntimeError::NotConfigured);
        }
        if durations.len() != triggers.len() {
            return Err(RuntimeError::InvalidConfiguration {
                detail: format!(
                    "{} extra timer durations but {} triggers",
                    durations.len(),
                    triggers.len()
                ),
            });
        }
        let first_column = self.timer_event_index + 1;
        if first_column + durations.len() > self.n_events {
            return Err(RuntimeError::InvalidConfiguration {
                detail: format!(
                    "{} extra timers need event columns {first_column}..{}, but the matrix has {}",
                    durations.len(),
                    first_column + durations.len(),
                    self.n_events
                ),
            });
        }
        for &trigger in &triggers {
            if trigger >= self.n_states {
                return Err(RuntimeError::InvalidState {
                    index: trigger as isize,
                    n_states: self.n_states,
                });
            }
        }
        self.extra_timers = durations
            .into_iter()
            .zip(triggers)
            .enumerate()
            .map(|(i, (duration, trigger))| ExtraTimer {
                duration,
                trigger,
                event: first_column + i,
                deadline: None,
            })
            .collect();
        Ok(())
    }

    /// Clear all configuration, stopping the machine if it is running.
    pub fn reset(&mut self) {
        if self.running {
            self.stop();
        }
        self.matrix = None;
        self.state_timers = None;
        self.state_outputs = None;
        self.integer_outputs = None;
        self.serial_outputs = None;
        self.extra_timers.clear();
        self.timer_event_index = 0;
        self.n_states = 0;
        self.n_events = 0;
        self.n_outputs = 0;
        self.current_state = 0;
        self.output_states.clear();
    }

    /// Whether matrix, timers, and outputs have all been set.
    pub fn is_configured(&self) -> bool {
        self.matrix.is_some() && self.state_timers.is_some() && self.state_outputs.is_some()
    }

    /// Whether the machine is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start processing events.
    ///
    /// The machine enters whatever `current_state` was left at, which is
    /// the last state (END) after configuration, without notifying or
    /// arming a timer. The first forced transition begins the trial.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if !self.is_configured() {
            return Err(RuntimeError::NotConfigured);
        }
        self.validate_shapes()?;
        self.running = true;
        Ok(())
    }

    /// Cross-check array lengths that the independent setters could not.
    fn validate_shapes(&self) -> Result<(), RuntimeError> {
        let timers_len = self.state_timers.as_ref().map_or(0, Vec::len);
        let outputs_len = self.state_outputs.as_ref().map_or(0, Vec::len);
        if timers_len != self.n_states || outputs_len != self.n_states {
            return Err(RuntimeError::InvalidConfiguration {
                detail: format!(
                    "{} states but {timers_len} timers and {outputs_len} output rows",
                    self.n_states
                ),
            });
        }
        for (name, len) in [
            ("integer", self.integer_outputs.as_ref().map(Vec::len)),
            ("serial", self.serial_outputs.as_ref().map(Vec::len)),
        ] {
            if let Some(len) = len {
                if len != self.n_states {
                    return Err(RuntimeError::InvalidConfiguration {
                        detail: format!("{len} {name} outputs for {} states", self.n_states),
                    });
                }
            }
        }
        Ok(())
    }

    /// Stop processing events and cancel every pending deadline.
    ///
    /// Configuration is kept; `start()` resumes from the current state.
    pub fn stop(&mut self) {
        self.running = false;
        self.state_deadline = None;
        for timer in &mut self.extra_timers {
            timer.deadline = None;
        }
    }

    /// Process an external input event.
    ///
    /// No-op while stopped. Always emits one
    /// [`Notification::EventProcessed`]; transitions only when the matrix
    /// names a different state.
    pub fn process_input(&mut self, event: usize) -> Result<(), RuntimeError> {
        if !self.running {
            return Ok(());
        }
        if !self.is_configured() {
            return Err(RuntimeError::NotConfigured);
        }
        if event >= self.n_events {
            return Err(RuntimeError::InvalidEvent {
                index: event,
                n_events: self.n_events,
            });
        }
        self.process_event(event);
        Ok(())
    }

    /// Fire every deadline that is due, oldest first, and return how many
    /// fired.
    ///
    /// Each due deadline is consumed and funneled through the same matrix
    /// lookup as an external input. Deadlines armed *during* this call wait
    /// for the next call, so a chain of zero-duration states advances one
    /// step per poll.
    pub fn poll_timers(&mut self) -> usize {
        if !self.running {
            return 0;
        }
        let now = Instant::now();
        let mut due: Vec<(Instant, usize)> = Vec::new();
        if let Some(deadline) = self.state_deadline {
            if deadline <= now {
                due.push((deadline, self.timer_event_index));
                self.state_deadline = None;
            }
        }
        for timer in &mut self.extra_timers {
            if let Some(deadline) = timer.deadline {
                if deadline <= now {
                    due.push((deadline, timer.event));
                    timer.deadline = None;
                }
            }
        }
        due.sort_by_key(|&(deadline, _)| deadline);
        let fired = due.len();
        for (_, event) in due {
            self.process_event(event);
        }
        fired
    }

    /// The earliest pending deadline, if any.
    ///
    /// A driver can sleep exactly until this instant and then call
    /// [`poll_timers`](Self::poll_timers).
    pub fn next_deadline(&self) -> Option<Instant> {
        self.extra_timers
            .iter()
            .filter_map(|timer| timer.deadline)
            .chain(self.state_deadline)
            .min()
    }

    /// Force a transition to a specific state, bypassing the matrix.
    ///
    /// `-1` targets the last state (END). Takes effect only while running
    /// and only when the target differs from the current state; the
    /// [`Notification::EventProcessed`] it emits carries the
    /// [`FORCED_EVENT`] sentinel. On an unconfigured machine this warns and
    /// does nothing, so unconditional cleanup code can call it safely.
    pub fn force_state(&mut self, state_index: isize) -> Result<(), RuntimeError> {
        if !self.is_configured() {
            warn!("force_state({state_index}) ignored: state machine is not configured");
            return Ok(());
        }
        let target = if state_index == -1 {
            self.n_states - 1
        } else if state_index < 0 || state_index as usize >= self.n_states {
            return Err(RuntimeError::InvalidState {
                index: state_index,
                n_states: self.n_states,
            });
        } else {
            state_index as usize
        };
        if self.running && target != self.current_state {
            self.observers.emit(Notification::EventProcessed {
                event: FORCED_EVENT,
                timestamp: Utc::now(),
                next_state: target,
            });
            self.enter_state(target);
        }
        Ok(())
    }

    /// Force one output channel, independent of the current state.
    ///
    /// The forced value persists until a state whose directive for this
    /// channel is `On`/`Off` is entered, or until the next force. Warns and
    /// does nothing on an unconfigured machine.
    pub fn force_output(&mut self, output: usize, value: bool) -> Result<(), RuntimeError> {
        if !self.is_configured() {
            warn!("force_output({output}, {value}) ignored: state machine is not configured");
            return Ok(());
        }
        if output >= self.n_outputs {
            return Err(RuntimeError::InvalidOutput {
                index: output,
                n_outputs: self.n_outputs,
            });
        }
        if self.output_states[output] != value {
            self.output_states[output] = value;
            self.observers
                .emit(Notification::OutputChanged { output, value });
        }
        Ok(())
    }

    /// Change one state's timer duration.
    ///
    /// When the target is the current state of a running machine, the
    /// deadline is re-armed from now with the new duration.
    pub fn set_state_timer(&mut self, state: usize, duration: f64) -> Result<(), RuntimeError> {
        if !self.is_configured() {
            return Err(RuntimeError::NotConfigured);
        }
        if state >= self.n_states {
            return Err(RuntimeError::InvalidState {
                index: state as isize,
                n_states: self.n_states,
            });
        }
        if let Some(timers) = &mut self.state_timers {
            timers[state] = duration;
        }
        if state == self.current_state && self.running {
            self.arm_state_timer();
        }
        Ok(())
    }

    /// Current state index.
    pub fn current_state(&self) -> usize {
        self.current_state
    }

    /// Current value of one output channel.
    pub fn output_state(&self, output: usize) -> Result<bool, RuntimeError> {
        if output >= self.n_outputs {
            return Err(RuntimeError::InvalidOutput {
                index: output,
                n_outputs: self.n_outputs,
            });
        }
        Ok(self.output_states[output])
    }

    /// The full transition row for one state.
    pub fn transitions_from_state(&self, state: usize) -> Result<Vec<usize>, RuntimeError> {
        let matrix = self.matrix.as_ref().ok_or(RuntimeError::NotConfigured)?;
        if state >= self.n_states {
            return Err(RuntimeError::InvalidState {
                index: state as isize,
                n_states: self.n_states,
            });
        }
        Ok(matrix[state].clone())
    }

    /// The full matrix column for one event, across all states.
    pub fn transitions_for_event(&self, event: usize) -> Result<Vec<usize>, RuntimeError> {
        let matrix = self.matrix.as_ref().ok_or(RuntimeError::NotConfigured)?;
        if event >= self.n_events {
            return Err(RuntimeError::InvalidEvent {
                index: event,
                n_events: self.n_events,
            });
        }
        Ok(matrix.iter().map(|row| row[event]).collect())
    }

    /// States whose directive for `output` is `On` (`value` = true) or
    /// `Off` (`value` = false).
    pub fn states_with_output(
        &self,
        output: usize,
        value: bool,
    ) -> Result<Vec<usize>, RuntimeError> {
        let outputs = self
            .state_outputs
            .as_ref()
            .ok_or(RuntimeError::NotConfigured)?;
        if output >= self.n_outputs {
            return Err(RuntimeError::InvalidOutput {
                index: output,
                n_outputs: self.n_outputs,
            });
        }
        let wanted = if value {
            OutputDirective::On
        } else {
            OutputDirective::Off
        };
        Ok(outputs
            .iter()
            .enumerate()
            .filter(|(_, row)| row[output] == wanted)
            .map(|(state, _)| state)
            .collect())
    }

    /// Snapshot of the machine for logging and diagnostics.
    pub fn info(&self) -> MachineInfo {
        MachineInfo {
            current_state: self.current_state,
            is_running: self.running,
            is_configured: self.is_configured(),
            n_states: self.n_states,
            n_events: self.n_events,
            n_outputs: self.n_outputs,
            output_states: self.output_states.clone(),
            state_timers: self.state_timers.clone(),
        }
    }

    /// The single lookup path shared by inputs, timer expiry, and extra
    /// timers.
    fn process_event(&mut self, event: usize) {
        let Some(matrix) = &self.matrix else { return };
        let next_state = matrix[self.current_state][event];
        debug!(
            "event {event} in state {}: next state {next_state}",
            self.current_state
        );
        self.observers.emit(Notification::EventProcessed {
            event: event as i32,
            timestamp: Utc::now(),
            next_state,
        });
        if next_state != self.current_state {
            self.enter_state(next_state);
        }
    }

    /// Full state-entry sequence: stop the old timer, apply output
    /// directives, emit coded outputs, arm timers, notify.
    fn enter_state(&mut self, state: usize) {
        self.state_deadline = None;
        self.current_state = state;
        self.apply_output_directives();
        self.apply_coded_outputs();
        self.arm_extra_timers();
        self.arm_state_timer();
        self.observers.emit(Notification::StateChanged { state });
    }

    fn apply_output_directives(&mut self) {
        let Some(outputs) = &self.state_outputs else { return };
        let directives = &outputs[self.current_state];
        let mut changes: Vec<(usize, bool)> = Vec::new();
        for (channel, directive) in directives.iter().enumerate() {
            let wanted = match directive {
                OutputDirective::On => true,
                OutputDirective::Off => false,
                OutputDirective::NoChange => continue,
            };
            if self.output_states[channel] != wanted {
                changes.push((channel, wanted));
            }
        }
        for (output, value) in changes {
            self.output_states[output] = value;
            self.observers
                .emit(Notification::OutputChanged { output, value });
        }
    }

    fn apply_coded_outputs(&mut self) {
        if let Some(codes) = &self.integer_outputs {
            let value = codes[self.current_state];
            if value != 0 {
                self.observers.emit(Notification::IntegerOutput { value });
            }
        }
        if let Some(bytes) = &self.serial_outputs {
            let value = bytes[self.current_state];
            if value != 0 {
                self.observers.emit(Notification::SerialOutput { value });
            }
        }
    }

    /// Arm extra timers triggered by the state just entered. A timer that is
    /// already pending keeps its original deadline.
    fn arm_extra_timers(&mut self) {
        let now = Instant::now();
        for timer in &mut self.extra_timers {
            if timer.trigger == self.current_state
                && timer.deadline.is_none()
                && timer.duration.is_finite()
                && timer.duration >= 0.0
            {
                timer.deadline = Some(now + Duration::from_secs_f64(timer.duration));
            }
        }
    }

    fn arm_state_timer(&mut self) {
        let Some(timers) = &self.state_timers else { return };
        let duration = timers[self.current_state];
        if duration.is_finite() && duration >= 0.0 {
            self.state_deadline = Some(Instant::now() + Duration::from_secs_f64(duration));
        } else {
            self.state_deadline = None;
        }
    }
}
