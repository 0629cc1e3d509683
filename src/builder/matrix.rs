//! Incremental, name-based assembly of a trial's transition matrix.
//!
//! A [`StateMatrix`] is built once per trial template: declare inputs and
//! outputs up front, add extra timers, then add states by name. Rows grow as
//! names appear; finalizers validate the whole table, append the END state,
//! and hand out frozen arrays for the runtime.

use crate::builder::error::BuildError;
use crate::core::{LabelMaps, NameMap, OutputDirective, FORCED_EVENT, INFINITE_TIME, TIMER_EVENT};
use serde::Serialize;
use std::fmt;

/// One state definition for [`StateMatrix::add_state`].
///
/// Stands in for keyword arguments: name what you need, default the rest.
///
/// # Example
///
/// ```rust
/// use operant::builder::{StateMatrix, StateSpec};
///
/// let mut sma = StateMatrix::new(&["center"], &["valve"]);
/// sma.add_state(StateSpec {
///     name: "wait",
///     timer: 10.0,
///     transitions: &[("centerin", "reward")],
///     ..StateSpec::default()
/// })
/// .unwrap();
/// ```
#[derive(Clone, Copy, Debug)]
pub struct StateSpec<'a> {
    /// State name; created on first use, fully replaced on reuse.
    pub name: &'a str,
    /// Seconds until the state's `Tup` event fires; [`INFINITE_TIME`] for never.
    pub timer: f64,
    /// `(event name, target state name)` pairs; unnamed events self-loop.
    pub transitions: &'a [(&'a str, &'a str)],
    /// Outputs switched on when the state is entered.
    pub outputs_on: &'a [&'a str],
    /// Outputs switched off when the state is entered.
    pub outputs_off: &'a [&'a str],
    /// Extra timers (re)bound to start when this state is entered.
    pub trigger: &'a [&'a str],
    /// Byte sent to the serial collaborator on entry; 0 means none.
    pub serial_out: u8,
}

impl Default for StateSpec<'_> {
    fn default() -> Self {
        Self {
            name: "",
            timer: INFINITE_TIME,
            transitions: &[],
            outputs_on: &[],
            outputs_off: &[],
            trigger: &[],
            serial_out: 0,
        }
    }
}

/// Structural summary of a finalized matrix.
///
/// Forced transitions can reach any state at runtime, so `unreachable_states`
/// means "no matrix path from START", not "never entered".
#[derive(Clone, Debug, Serialize)]
pub struct MatrixAnalysis {
    pub n_states: usize,
    pub n_events: usize,
    /// States reachable from START through matrix transitions, ascending.
    pub reachable_states: Vec<usize>,
    /// States no matrix path leads to, ascending.
    pub unreachable_states: Vec<usize>,
    /// States whose every event self-loops (END is always one).
    pub dead_end_states: Vec<usize>,
    /// Distinct transition targets divided by the number of states.
    pub connectivity_ratio: f64,
    pub is_fully_connected: bool,
    /// Fraction of cells that are not the self-loop default.
    pub matrix_density: f64,
}

/// Frozen arrays produced by the finalizers.
#[derive(Clone, Debug, PartialEq)]
struct Frozen {
    matrix: Vec<Vec<usize>>,
    timers: Vec<f64>,
    outputs: Vec<Vec<OutputDirective>>,
    serials: Vec<u8>,
}

/// Builder for a complete automaton definition.
///
/// Construction is cheap and mutable; the finalizers ([`matrix`],
/// [`outputs`], [`timers`], [`serial_outputs`]) validate once per mutation
/// and return fixed-shape arrays.
///
/// Column layout: `{input}in` and `{input}out` for each declared input (even
/// and odd adjacent indices), then [`TIMER_EVENT`] (`Tup`), then one column
/// per extra timer. Every `(state, event)` cell defaults to a self-loop, so
/// the runtime never sees an undefined transition.
///
/// The START state (index 0) is created immediately with a zero-duration
/// timer and `Tup` → state 1; the END state is appended by the finalizers as
/// the last state, with an infinite timer, when no state of that name exists.
///
/// [`matrix`]: StateMatrix::matrix
/// [`outputs`]: StateMatrix::outputs
/// [`timers`]: StateMatrix::timers
/// [`serial_outputs`]: StateMatrix::serial_outputs
#[derive(Clone, Debug)]
pub struct StateMatrix {
    inputs: NameMap,
    output_names: NameMap,
    events: NameMap,
    states: NameMap,
    /// Input-edge columns plus `Tup`; extra timer columns come after.
    n_input_events: usize,
    rows: Vec<Vec<usize>>,
    state_timers: Vec<f64>,
    state_outputs: Vec<Vec<OutputDirective>>,
    serial_outputs: Vec<u8>,
    extra_timers: NameMap,
    extra_durations: Vec<f64>,
    extra_triggers: Vec<usize>,
    frozen: Option<Frozen>,
}

impl StateMatrix {
    /// Create a builder for the given input and output channels.
    ///
    /// Each input `name` contributes two event columns, `{name}in` and
    /// `{name}out`. Duplicate names collapse to one entry.
    pub fn new(inputs: &[&str], outputs: &[&str]) -> Self {
        let mut input_map = NameMap::new();
        let mut events = NameMap::new();
        for name in inputs {
            input_map.insert(name);
            events.insert(&format!("{name}in"));
            events.insert(&format!("{name}out"));
        }
        events.insert(TIMER_EVENT);

        let mut output_map = NameMap::new();
        for name in outputs {
            output_map.insert(name);
        }

        let mut sma = Self {
            inputs: input_map,
            output_names: output_map,
            n_input_events: events.len(),
            events,
            states: NameMap::new(),
            rows: Vec::new(),
            state_timers: Vec::new(),
            state_outputs: Vec::new(),
            serial_outputs: Vec::new(),
            extra_timers: NameMap::new(),
            extra_durations: Vec::new(),
            extra_triggers: Vec::new(),
            frozen: None,
        };
        sma.init_start_state();
        sma
    }

    /// START: state 0, zero timer, advances to state 1 on `Tup`.
    fn init_start_state(&mut self) {
        let start = self.state_index_or_create("START");
        let tup = self.timer_event_index();
        self.state_timers[start] = 0.0;
        self.rows[start][tup] = 1;
    }

    /// Total number of event columns (input edges + `Tup` + extra timers).
    pub fn n_events(&self) -> usize {
        self.n_input_events + self.extra_timers.len()
    }

    /// Number of output channels.
    pub fn n_outputs(&self) -> usize {
        self.output_names.len()
    }

    /// Number of states currently known (END may not exist yet).
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    /// Column index of the state-timer event (`Tup`).
    pub fn timer_event_index(&self) -> usize {
        self.n_input_events - 1
    }

    /// Declared input channels.
    pub fn inputs(&self) -> &NameMap {
        &self.inputs
    }

    /// Declared output channels.
    pub fn output_channels(&self) -> &NameMap {
        &self.output_names
    }

    /// Event name table (matrix columns; `Forced` is not a column).
    pub fn events(&self) -> &NameMap {
        &self.events
    }

    /// State name table.
    pub fn states(&self) -> &NameMap {
        &self.states
    }

    /// Extra timer durations, in timer order.
    pub fn extra_timer_durations(&self) -> &[f64] {
        &self.extra_durations
    }

    /// State index that starts each extra timer, in timer order.
    pub fn extra_timer_triggers(&self) -> &[usize] {
        &self.extra_triggers
    }

    fn default_row(&self, state: usize) -> Vec<usize> {
        vec![state; self.n_events()]
    }

    fn state_index_or_create(&mut self, name: &str) -> usize {
        if let Some(index) = self.states.index_of(name) {
            return index;
        }
        let index = self.states.insert(name);
        self.rows.push(self.default_row(index));
        self.state_timers.push(INFINITE_TIME);
        self.state_outputs
            .push(vec![OutputDirective::NoChange; self.n_outputs()]);
        self.serial_outputs.push(0);
        index
    }

    /// Add an independently-running timer with its own event column.
    ///
    /// Must be called while START is the only state; extra timers widen every
    /// row, so they come first. The timer's trigger state defaults to START
    /// until some [`add_state`](Self::add_state) call names it in `trigger`.
    pub fn add_extra_timer(&mut self, name: &str, duration: f64) -> Result<(), BuildError> {
        if self.states.len() > 1 {
            return Err(BuildError::ExtraTimerAfterStates {
                name: name.to_string(),
            });
        }
        // A clash with any existing event column corrupts the layout.
        if self.extra_timers.contains(name) || self.events.contains(name) {
            return Err(BuildError::DuplicateExtraTimer {
                name: name.to_string(),
            });
        }
        self.extra_timers.insert(name);
        self.events.insert(name);
        self.extra_durations.push(duration);
        self.extra_triggers.push(0);

        // START's row predates the new column; rebuild it at the new width.
        self.rows[0] = self.default_row(0);
        let tup = self.timer_event_index();
        self.rows[0][tup] = 1;
        self.frozen = None;
        Ok(())
    }

    /// Change the duration of an existing extra timer.
    pub fn set_extra_timer_duration(&mut self, name: &str, duration: f64) -> Result<(), BuildError> {
        let index = self
            .extra_timers
            .index_of(name)
            .ok_or_else(|| BuildError::UnknownExtraTimer {
                name: name.to_string(),
            })?;
        self.extra_durations[index] = duration;
        self.frozen = None;
        Ok(())
    }

    /// Add a state, or fully replace one that already exists.
    ///
    /// Transition targets that name unknown states are created on the spot
    /// with a self-loop row, infinite timer, and all-NoChange outputs. Name
    /// lookups are checked before anything is mutated, so a failed call
    /// leaves the builder unchanged.
    pub fn add_state(&mut self, spec: StateSpec<'_>) -> Result<(), BuildError> {
        let mut event_cols = Vec::with_capacity(spec.transitions.len());
        for (event_name, _) in spec.transitions {
            let col = self
                .events
                .index_of(event_name)
                .ok_or_else(|| BuildError::UnknownEvent {
                    name: event_name.to_string(),
                })?;
            event_cols.push(col);
        }
        let mut on_channels = Vec::with_capacity(spec.outputs_on.len());
        for name in spec.outputs_on {
            on_channels.push(self.output_index(name)?);
        }
        let mut off_channels = Vec::with_capacity(spec.outputs_off.len());
        for name in spec.outputs_off {
            off_channels.push(self.output_index(name)?);
        }
        let mut timer_indices = Vec::with_capacity(spec.trigger.len());
        for name in spec.trigger {
            let index =
                self.extra_timers
                    .index_of(name)
                    .ok_or_else(|| BuildError::UnknownExtraTimer {
                        name: name.to_string(),
                    })?;
            timer_indices.push(index);
        }

        let this_state = self.state_index_or_create(spec.name);
        let mut new_row = self.default_row(this_state);
        for (col, (_, target_name)) in event_cols.iter().zip(spec.transitions) {
            new_row[*col] = self.state_index_or_create(target_name);
        }
        self.rows[this_state] = new_row;
        self.state_timers[this_state] = spec.timer;

        let mut directives = vec![OutputDirective::NoChange; self.n_outputs()];
        for channel in on_channels {
            directives[channel] = OutputDirective::On;
        }
        for channel in off_channels {
            directives[channel] = OutputDirective::Off;
        }
        self.state_outputs[this_state] = directives;
        self.serial_outputs[this_state] = spec.serial_out;

        // Last binding wins; extra timers have a single trigger state.
        for index in timer_indices {
            self.extra_triggers[index] = this_state;
        }
        self.frozen = None;
        Ok(())
    }

    fn output_index(&self, name: &str) -> Result<usize, BuildError> {
        self.output_names
            .index_of(name)
            .ok_or_else(|| BuildError::UnknownOutput {
                name: name.to_string(),
            })
    }

    /// Restore every state to self-loop, infinite timer, and no output
    /// change, keeping all names and indices.
    ///
    /// START's managed row (zero timer, `Tup` → 1) is re-established, so a
    /// trial template can be rebuilt with plain `add_state` calls.
    pub fn reset_transitions(&mut self) {
        for state in 0..self.states.len() {
            self.rows[state] = self.default_row(state);
            self.state_timers[state] = INFINITE_TIME;
            self.state_outputs[state] = vec![OutputDirective::NoChange; self.n_outputs()];
        }
        self.init_start_state();
        self.frozen = None;
    }

    fn ensure_end_state(&mut self) {
        if !self.states.contains("END") {
            self.state_index_or_create("END");
        }
    }

    fn validate(&self) -> Result<(), BuildError> {
        let n_states = self.states.len();
        let n_events = self.n_events();
        if self.rows.len() != n_states
            || self.state_timers.len() != n_states
            || self.state_outputs.len() != n_states
            || self.serial_outputs.len() != n_states
        {
            return Err(BuildError::ShapeMismatch {
                detail: format!(
                    "{} states but {} rows, {} timers, {} output rows, {} serial codes",
                    n_states,
                    self.rows.len(),
                    self.state_timers.len(),
                    self.state_outputs.len(),
                    self.serial_outputs.len()
                ),
            });
        }
        for (state, row) in self.rows.iter().enumerate() {
            if row.len() != n_events {
                return Err(BuildError::ShapeMismatch {
                    detail: format!(
                        "state {state} has {} transition cells, expected {n_events}",
                        row.len()
                    ),
                });
            }
            for (event, &target) in row.iter().enumerate() {
                if target >= n_states {
                    return Err(BuildError::InvalidTarget {
                        state,
                        event,
                        target,
                        n_states,
                    });
                }
            }
        }
        for (state, directives) in self.state_outputs.iter().enumerate() {
            if directives.len() != self.n_outputs() {
                return Err(BuildError::ShapeMismatch {
                    detail: format!(
                        "state {state} has {} output directives, expected {}",
                        directives.len(),
                        self.n_outputs()
                    ),
                });
            }
        }
        Ok(())
    }

    fn freeze(&mut self) -> Result<&Frozen, BuildError> {
        if self.frozen.is_none() {
            self.ensure_end_state();
            self.validate()?;
            self.frozen = Some(Frozen {
                matrix: self.rows.clone(),
                timers: self.state_timers.clone(),
                outputs: self.state_outputs.clone(),
                serials: self.serial_outputs.clone(),
            });
        }
        Ok(self.frozen.as_ref().expect("cache was just populated"))
    }

    /// Finalize and return the transition matrix, `[state][event]` → state.
    ///
    /// The first call after a mutation appends END if needed and validates;
    /// further calls return identical arrays.
    pub fn matrix(&mut self) -> Result<Vec<Vec<usize>>, BuildError> {
        Ok(self.freeze()?.matrix.clone())
    }

    /// Finalize and return per-state output directives, `[state][channel]`.
    pub fn outputs(&mut self) -> Result<Vec<Vec<OutputDirective>>, BuildError> {
        Ok(self.freeze()?.outputs.clone())
    }

    /// Finalize and return per-state timer durations in seconds.
    pub fn timers(&mut self) -> Result<Vec<f64>, BuildError> {
        Ok(self.freeze()?.timers.clone())
    }

    /// Finalize and return per-state serial bytes (0 = none).
    pub fn serial_outputs(&mut self) -> Result<Vec<u8>, BuildError> {
        Ok(self.freeze()?.serials.clone())
    }

    /// Export the name tables behind the matrix for a session record.
    ///
    /// Ensures END exists so the state table is complete. Event indices are
    /// signed and include the `Forced` pseudo-event at -1.
    pub fn label_maps(&mut self) -> LabelMaps {
        self.ensure_end_state();
        let mut events: Vec<(String, i32)> = self
            .events
            .iter()
            .map(|(index, name)| (name.to_string(), index as i32))
            .collect();
        events.push(("Forced".to_string(), FORCED_EVENT));
        LabelMaps {
            events,
            outputs: self
                .output_names
                .iter()
                .map(|(index, name)| (name.to_string(), index))
                .collect(),
            states: self
                .states
                .iter()
                .map(|(index, name)| (name.to_string(), index))
                .collect(),
        }
    }

    /// Summarize the finalized matrix: reachability from START, dead ends,
    /// and how much of the table is non-default.
    ///
    /// Useful for catching template mistakes (an orphaned state, a reward
    /// state nothing transitions to) before a session starts.
    pub fn analyze(&mut self) -> Result<MatrixAnalysis, BuildError> {
        let frozen = self.freeze()?;
        let matrix = &frozen.matrix;
        let n_states = matrix.len();
        let n_events = matrix.first().map_or(0, Vec::len);

        let mut reachable = vec![false; n_states];
        reachable[0] = true;
        let mut frontier = vec![0];
        while let Some(state) = frontier.pop() {
            for &target in &matrix[state] {
                if !reachable[target] {
                    reachable[target] = true;
                    frontier.push(target);
                }
            }
        }

        let mut distinct_targets = vec![false; n_states];
        let mut non_default_cells = 0usize;
        for (state, row) in matrix.iter().enumerate() {
            for &target in row {
                distinct_targets[target] = true;
                if target != state {
                    non_default_cells += 1;
                }
            }
        }

        let unreachable_states: Vec<usize> =
            (0..n_states).filter(|&state| !reachable[state]).collect();
        Ok(MatrixAnalysis {
            n_states,
            n_events,
            reachable_states: (0..n_states).filter(|&state| reachable[state]).collect(),
            is_fully_connected: unreachable_states.is_empty(),
            unreachable_states,
            dead_end_states: matrix
                .iter()
                .enumerate()
                .filter(|(state, row)| row.iter().all(|&target| target == *state))
                .map(|(state, _)| state)
                .collect(),
            connectivity_ratio: distinct_targets.iter().filter(|&&seen| seen).count() as f64
                / n_states as f64,
            matrix_density: non_default_cells as f64 / (n_states * n_events) as f64,
        })
    }
}

impl fmt::Display for StateMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, name) in self.extra_timers.iter() {
            let trigger = self
                .states
                .name_of(self.extra_triggers[index])
                .unwrap_or("[nothing]");
            writeln!(
                f,
                "{name}:\t{:0.2} triggered by {trigger}",
                self.extra_durations[index]
            )?;
        }
        let header: Vec<String> = self
            .events
            .iter()
            .map(|(_, name)| name.chars().take(4).collect())
            .collect();
        writeln!(f, "\t\t\t{}\t\tTimers\tOutputs\tSerialOut", header.join("\t"))?;
        for (index, name) in self.states.iter() {
            let cells: Vec<String> = self.rows[index].iter().map(|t| t.to_string()).collect();
            let directives: String = self.state_outputs[index]
                .iter()
                .map(|d| d.as_char())
                .collect();
            writeln!(
                f,
                "{:<16} [{index}] \t{}\t|\t{:0.2}\t{directives}\t{}",
                name,
                cells.join("\t"),
                self.state_timers[index],
                self.serial_outputs[index]
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_port() -> StateMatrix {
        StateMatrix::new(&["L", "R"], &["ValveL", "ValveR"])
    }

    #[test]
    fn events_follow_in_out_scheme() {
        let sma = two_port();
        assert_eq!(sma.events().index_of("Lin"), Some(0));
        assert_eq!(sma.events().index_of("Lout"), Some(1));
        assert_eq!(sma.events().index_of("Rin"), Some(2));
        assert_eq!(sma.events().index_of("Rout"), Some(3));
        assert_eq!(sma.events().index_of(TIMER_EVENT), Some(4));
        assert_eq!(sma.timer_event_index(), 4);
        assert_eq!(sma.n_events(), 5);
    }

    #[test]
    fn start_state_advances_on_timeout() {
        let mut sma = two_port();
        assert_eq!(sma.states().index_of("START"), Some(0));
        let timers = sma.timers().unwrap();
        assert_eq!(timers[0], 0.0);
        let matrix = sma.matrix().unwrap();
        assert_eq!(matrix[0][sma.timer_event_index()], 1);
    }

    #[test]
    fn end_state_is_appended_last_with_infinite_timer() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "wait",
            ..StateSpec::default()
        })
        .unwrap();
        let matrix = sma.matrix().unwrap();
        let end = sma.states().index_of("END").unwrap();
        assert_eq!(end, matrix.len() - 1);
        assert_eq!(sma.timers().unwrap()[end], INFINITE_TIME);
        // END self-loops everywhere.
        assert!(matrix[end].iter().all(|&t| t == end));
    }

    #[test]
    fn finalizers_are_idempotent() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "wait",
            timer: 2.0,
            transitions: &[("Lin", "rewardL")],
            ..StateSpec::default()
        })
        .unwrap();
        let first = sma.matrix().unwrap();
        let n_states = sma.n_states();
        let second = sma.matrix().unwrap();
        assert_eq!(first, second);
        assert_eq!(sma.n_states(), n_states);
        assert_eq!(sma.timers().unwrap().len(), n_states);
    }

    #[test]
    fn add_state_creates_targets_on_demand() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "wait",
            transitions: &[("Lin", "rewardL"), ("Rin", "rewardR")],
            ..StateSpec::default()
        })
        .unwrap();
        let wait = sma.states().index_of("wait").unwrap();
        let reward_l = sma.states().index_of("rewardL").unwrap();
        let reward_r = sma.states().index_of("rewardR").unwrap();
        let matrix = sma.matrix().unwrap();
        assert_eq!(matrix[wait][0], reward_l);
        assert_eq!(matrix[wait][2], reward_r);
        // Auto-created states self-loop until defined.
        assert_eq!(matrix[reward_l][0], reward_l);
        assert_eq!(sma.timers().unwrap()[reward_l], INFINITE_TIME);
    }

    #[test]
    fn add_state_replaces_existing_definition() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "wait",
            timer: 5.0,
            transitions: &[("Lin", "rewardL")],
            outputs_on: &["ValveL"],
            serial_out: 3,
            ..StateSpec::default()
        })
        .unwrap();
        let wait = sma.states().index_of("wait").unwrap();
        sma.add_state(StateSpec {
            name: "wait",
            transitions: &[("Rin", "rewardR")],
            ..StateSpec::default()
        })
        .unwrap();
        assert_eq!(sma.states().index_of("wait"), Some(wait));
        let matrix = sma.matrix().unwrap();
        // The old Lin transition and outputs are gone, not merged.
        assert_eq!(matrix[wait][0], wait);
        assert_eq!(sma.timers().unwrap()[wait], INFINITE_TIME);
        assert_eq!(
            sma.outputs().unwrap()[wait],
            vec![OutputDirective::NoChange, OutputDirective::NoChange]
        );
        assert_eq!(sma.serial_outputs().unwrap()[wait], 0);
    }

    #[test]
    fn unknown_event_is_rejected_without_mutation() {
        let mut sma = two_port();
        let result = sma.add_state(StateSpec {
            name: "wait",
            transitions: &[("Cin", "reward")],
            ..StateSpec::default()
        });
        assert!(matches!(result, Err(BuildError::UnknownEvent { .. })));
        assert_eq!(sma.states().index_of("wait"), None);
        assert_eq!(sma.states().index_of("reward"), None);
    }

    #[test]
    fn unknown_output_is_rejected() {
        let mut sma = two_port();
        let result = sma.add_state(StateSpec {
            name: "wait",
            outputs_on: &["Laser"],
            ..StateSpec::default()
        });
        assert!(matches!(result, Err(BuildError::UnknownOutput { .. })));
    }

    #[test]
    fn output_directives_are_recorded() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "rewardL",
            outputs_on: &["ValveL"],
            outputs_off: &["ValveR"],
            ..StateSpec::default()
        })
        .unwrap();
        let index = sma.states().index_of("rewardL").unwrap();
        assert_eq!(
            sma.outputs().unwrap()[index],
            vec![OutputDirective::On, OutputDirective::Off]
        );
    }

    #[test]
    fn extra_timer_must_come_before_states() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "wait",
            ..StateSpec::default()
        })
        .unwrap();
        let result = sma.add_extra_timer("punish", 2.0);
        assert!(matches!(
            result,
            Err(BuildError::ExtraTimerAfterStates { .. })
        ));
    }

    #[test]
    fn extra_timer_adds_one_event_column() {
        let mut sma = two_port();
        sma.add_extra_timer("punish", 2.0).unwrap();
        assert_eq!(sma.n_events(), 6);
        assert_eq!(sma.events().index_of("punish"), Some(5));
        assert_eq!(sma.timer_event_index(), 4);
        // START's row was rebuilt at the new width.
        let matrix = sma.matrix().unwrap();
        assert_eq!(matrix[0].len(), 6);
        assert_eq!(matrix[0][4], 1);
        assert_eq!(matrix[0][5], 0);
        assert_eq!(sma.extra_timer_durations(), &[2.0]);
        assert_eq!(sma.extra_timer_triggers(), &[0]);
    }

    #[test]
    fn duplicate_extra_timer_is_rejected() {
        let mut sma = two_port();
        sma.add_extra_timer("punish", 2.0).unwrap();
        assert!(matches!(
            sma.add_extra_timer("punish", 3.0),
            Err(BuildError::DuplicateExtraTimer { .. })
        ));
    }

    #[test]
    fn extra_timer_duration_can_be_updated() {
        let mut sma = two_port();
        sma.add_extra_timer("punish", 2.0).unwrap();
        sma.set_extra_timer_duration("punish", 4.5).unwrap();
        assert_eq!(sma.extra_timer_durations(), &[4.5]);
        assert!(matches!(
            sma.set_extra_timer_duration("reward", 1.0),
            Err(BuildError::UnknownExtraTimer { .. })
        ));
    }

    #[test]
    fn trigger_rebinding_overwrites_previous_state() {
        let mut sma = two_port();
        sma.add_extra_timer("punish", 2.0).unwrap();
        sma.add_state(StateSpec {
            name: "wrong_poke",
            trigger: &["punish"],
            ..StateSpec::default()
        })
        .unwrap();
        let wrong = sma.states().index_of("wrong_poke").unwrap();
        assert_eq!(sma.extra_timer_triggers(), &[wrong]);
        sma.add_state(StateSpec {
            name: "other",
            trigger: &["punish"],
            ..StateSpec::default()
        })
        .unwrap();
        let other = sma.states().index_of("other").unwrap();
        assert_eq!(sma.extra_timer_triggers(), &[other]);
    }

    #[test]
    fn reset_preserves_indices_and_start_row() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "wait",
            timer: 1.0,
            transitions: &[("Lin", "rewardL")],
            outputs_on: &["ValveL"],
            ..StateSpec::default()
        })
        .unwrap();
        let _ = sma.matrix().unwrap();
        let wait = sma.states().index_of("wait").unwrap();
        let end = sma.states().index_of("END").unwrap();

        sma.reset_transitions();

        assert_eq!(sma.states().index_of("wait"), Some(wait));
        assert_eq!(sma.states().index_of("END"), Some(end));
        let matrix = sma.matrix().unwrap();
        assert!(matrix[wait].iter().all(|&t| t == wait));
        assert_eq!(sma.timers().unwrap()[wait], INFINITE_TIME);
        assert_eq!(
            sma.outputs().unwrap()[wait],
            vec![OutputDirective::NoChange, OutputDirective::NoChange]
        );
        // START stays managed.
        assert_eq!(sma.timers().unwrap()[0], 0.0);
        assert_eq!(matrix[0][sma.timer_event_index()], 1);
    }

    #[test]
    fn label_maps_include_forced_pseudo_event() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "wait",
            ..StateSpec::default()
        })
        .unwrap();
        let labels = sma.label_maps();
        assert!(labels.events.contains(&("Forced".to_string(), -1)));
        assert!(labels.events.contains(&("Tup".to_string(), 4)));
        assert!(labels.states.iter().any(|(name, _)| name == "END"));
        let json = serde_json::to_value(&labels).unwrap();
        assert!(json["events"].is_array());
    }

    #[test]
    fn analyze_reports_full_connectivity_for_a_complete_trial() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "wait",
            transitions: &[("Lin", "rewardL"), ("Rin", "rewardR")],
            ..StateSpec::default()
        })
        .unwrap();
        sma.add_state(StateSpec {
            name: "rewardL",
            timer: 0.1,
            transitions: &[("Tup", "END")],
            ..StateSpec::default()
        })
        .unwrap();
        sma.add_state(StateSpec {
            name: "rewardR",
            timer: 0.1,
            transitions: &[("Tup", "END")],
            ..StateSpec::default()
        })
        .unwrap();

        let analysis = sma.analyze().unwrap();
        assert_eq!(analysis.n_states, 5);
        assert_eq!(analysis.reachable_states, vec![0, 1, 2, 3, 4]);
        assert!(analysis.unreachable_states.is_empty());
        assert!(analysis.is_fully_connected);
        let end = sma.states().index_of("END").unwrap();
        assert_eq!(analysis.dead_end_states, vec![end]);
        assert!(analysis.matrix_density > 0.0 && analysis.matrix_density < 1.0);
    }

    #[test]
    fn analyze_flags_orphaned_states() {
        let mut sma = two_port();
        sma.add_state(StateSpec {
            name: "wait",
            transitions: &[("Lin", "rewardL")],
            ..StateSpec::default()
        })
        .unwrap();
        // Nothing transitions into 'orphan'.
        sma.add_state(StateSpec {
            name: "orphan",
            ..StateSpec::default()
        })
        .unwrap();

        let analysis = sma.analyze().unwrap();
        let orphan = sma.states().index_of("orphan").unwrap();
        assert!(analysis.unreachable_states.contains(&orphan));
        assert!(!analysis.is_fully_connected);
        assert!(analysis.dead_end_states.contains(&orphan));
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["n_states"], 5);
    }

    #[test]
    fn display_renders_one_line_per_state() {
        let mut sma = two_port();
        sma.add_extra_timer("punish", 2.0).unwrap();
        sma.add_state(StateSpec {
            name: "wait",
            transitions: &[("Lin", "rewardL")],
            ..StateSpec::default()
        })
        .unwrap();
        let text = format!("{sma}");
        assert!(text.contains("START"));
        assert!(text.contains("wait"));
        assert!(text.contains("punish"));
        assert!(text.contains("Tup"));
    }
}
