//! End-to-end trial scenarios exercised through the public API.
//!
//! These mirror how a trial controller actually uses the crate: build a
//! template, configure a machine, run one trial, rebuild, run the next.

use operant::builder::{StateMatrix, StateSpec};
use operant::runtime::{
    ChannelObserver, Command, MachineDriver, Notification, StateMachine,
};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

/// The two-port reward task: poke left or right, get the matching valve.
///
/// States: START 0, wait 1, rewardL 2, rewardR 3, END 4.
/// Events: Lin 0, Lout 1, Rin 2, Rout 3, Tup 4.
fn two_port_template() -> StateMatrix {
    let mut sma = StateMatrix::new(&["L", "R"], &["ValveL", "ValveR"]);
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
        outputs_on: &["ValveL"],
        ..StateSpec::default()
    })
    .unwrap();
    sma.add_state(StateSpec {
        name: "rewardR",
        timer: 0.1,
        transitions: &[("Tup", "END")],
        outputs_on: &["ValveR"],
        ..StateSpec::default()
    })
    .unwrap();
    sma
}

fn configure(sma: &mut StateMatrix) -> (StateMachine, Receiver<Notification>) {
    let mut machine = StateMachine::new();
    machine
        .set_matrix(sma.matrix().unwrap(), Some(sma.timer_event_index()))
        .unwrap();
    machine.set_timers(sma.timers().unwrap()).unwrap();
    machine.set_outputs(sma.outputs().unwrap()).unwrap();
    machine
        .set_extra_timers(
            sma.extra_timer_durations().to_vec(),
            sma.extra_timer_triggers().to_vec(),
        )
        .unwrap();
    let (tx, rx) = channel();
    machine.subscribe(ChannelObserver::new(tx));
    (machine, rx)
}

fn wait_for_state(rx: &Receiver<Notification>, state: usize) {
    loop {
        match rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Notification::StateChanged { state: seen }) if seen == state => return,
            Ok(_) => {}
            Err(_) => panic!("timed out waiting for state {state}"),
        }
    }
}

#[test]
fn left_poke_opens_left_valve_and_end_leaves_it_open() {
    let mut sma = two_port_template();
    let (mut machine, rx) = configure(&mut sma);
    let wait = sma.states().index_of("wait").unwrap() as isize;
    let reward_l = sma.states().index_of("rewardL").unwrap();
    let valve_l = 0;

    machine.start().unwrap();
    machine.force_state(wait).unwrap();
    let _ = rx.try_iter().count();

    machine.process_input(0).unwrap(); // Lin
    let after_poke: Vec<Notification> = rx.try_iter().collect();
    assert!(after_poke.contains(&Notification::StateChanged { state: reward_l }));
    assert!(after_poke.contains(&Notification::OutputChanged {
        output: valve_l,
        value: true
    }));
    assert!(machine.next_deadline().is_some());

    // Manual Tup injection stands in for the 0.1 s expiry.
    machine.process_input(sma.timer_event_index()).unwrap();
    let after_timeout: Vec<Notification> = rx.try_iter().collect();
    let end = sma.states().index_of("END").unwrap();
    assert_eq!(machine.current_state(), end);
    // END has no Off directive for the valve: NO-CHANGE means the reward
    // valve stays open until something turns it off.
    assert!(machine.output_state(valve_l).unwrap());
    assert!(!after_timeout.contains(&Notification::OutputChanged {
        output: valve_l,
        value: false
    }));
}

#[test]
fn driver_runs_the_same_trial_on_real_time() {
    let mut sma = two_port_template();
    let (machine, rx) = configure(&mut sma);
    let reward_r = sma.states().index_of("rewardR").unwrap();
    let end = sma.states().index_of("END").unwrap();

    let (driver, handle) = MachineDriver::new(machine);
    let worker = std::thread::spawn(move || driver.run());
    handle.send(Command::Start);
    handle.force_state(1);
    wait_for_state(&rx, 1);

    handle.input(2); // Rin
    wait_for_state(&rx, reward_r);
    wait_for_state(&rx, end); // reward timer expires on its own

    handle.shutdown();
    let machine = worker.join().expect("driver thread panicked");
    assert_eq!(machine.current_state(), end);
    assert!(machine.output_state(1).unwrap());
}

#[test]
fn punish_timer_fires_once_independent_of_transitions() {
    // wrong_poke starts a punishment countdown, but the trial keeps moving:
    // the machine bounces between wait and wrong_poke while the punish
    // clock runs out on its own column.
    let mut sma = StateMatrix::new(&["L"], &[]);
    sma.add_extra_timer("punish", 0.25).unwrap();
    sma.add_state(StateSpec {
        name: "wait",
        transitions: &[("Lin", "wrong_poke")],
        ..StateSpec::default()
    })
    .unwrap();
    sma.add_state(StateSpec {
        name: "wrong_poke",
        timer: 0.04,
        transitions: &[("Tup", "wait")],
        trigger: &["punish"],
        ..StateSpec::default()
    })
    .unwrap();
    let punish_column = sma.events().index_of("punish").unwrap() as i32;

    let (mut machine, rx) = configure(&mut sma);
    machine.start().unwrap();
    machine.force_state(1).unwrap();

    let armed_at = Instant::now();
    machine.process_input(0).unwrap(); // first wrong poke arms 'punish'
    while armed_at.elapsed() < Duration::from_millis(400) {
        machine.poll_timers();
        // Ordinary transitions keep happening while the punish clock runs.
        if machine.current_state() == 1 {
            machine.process_input(0).unwrap();
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let punish_events = rx
        .try_iter()
        .filter(|n| matches!(n, Notification::EventProcessed { event, .. } if *event == punish_column))
        .count();
    assert_eq!(punish_events, 1);
}

#[test]
fn template_rebuild_between_trials_keeps_indices() {
    let mut sma = two_port_template();
    let (mut machine, rx) = configure(&mut sma);
    let wait = sma.states().index_of("wait").unwrap();
    let reward_l = sma.states().index_of("rewardL").unwrap();
    let reward_r = sma.states().index_of("rewardR").unwrap();

    // Trial 1: left poke rewards left.
    machine.start().unwrap();
    machine.force_state(wait as isize).unwrap();
    machine.process_input(0).unwrap();
    assert_eq!(machine.current_state(), reward_l);

    // Between trials: stop, rebuild the template with the contingency
    // swapped, reconfigure the same machine.
    machine.stop();
    sma.reset_transitions();
    sma.add_state(StateSpec {
        name: "wait",
        transitions: &[("Lin", "rewardR"), ("Rin", "rewardL")],
        ..StateSpec::default()
    })
    .unwrap();
    sma.add_state(StateSpec {
        name: "rewardL",
        timer: 0.1,
        transitions: &[("Tup", "END")],
        outputs_on: &["ValveL"],
        ..StateSpec::default()
    })
    .unwrap();
    sma.add_state(StateSpec {
        name: "rewardR",
        timer: 0.1,
        transitions: &[("Tup", "END")],
        outputs_on: &["ValveR"],
        ..StateSpec::default()
    })
    .unwrap();
    assert_eq!(sma.states().index_of("wait"), Some(wait));
    assert_eq!(sma.states().index_of("rewardL"), Some(reward_l));

    machine
        .set_matrix(sma.matrix().unwrap(), Some(sma.timer_event_index()))
        .unwrap();
    machine.set_timers(sma.timers().unwrap()).unwrap();
    machine.set_outputs(sma.outputs().unwrap()).unwrap();

    // Trial 2: the same left poke now rewards right.
    machine.start().unwrap();
    machine.force_state(wait as isize).unwrap();
    machine.process_input(0).unwrap();
    assert_eq!(machine.current_state(), reward_r);
    let _ = rx.try_iter().count();
}

#[test]
fn label_maps_export_round_trips_through_json() {
    let mut sma = two_port_template();
    let labels = sma.label_maps();
    let json = serde_json::to_string_pretty(&labels).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let events: Vec<(String, i64)> = value["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|pair| {
            (
                pair[0].as_str().unwrap().to_string(),
                pair[1].as_i64().unwrap(),
            )
        })
        .collect();
    assert!(events.contains(&("Lin".to_string(), 0)));
    assert!(events.contains(&("Tup".to_string(), 4)));
    assert!(events.contains(&("Forced".to_string(), -1)));
    assert!(value["states"]
        .as_array()
        .unwrap()
        .iter()
        .any(|pair| pair[0] == "END"));
}
