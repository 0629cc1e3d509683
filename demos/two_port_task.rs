//! Two-Port Choice Task
//!
//! This example runs one trial of a two-port choice task: the subject pokes
//! the left or right port and the matching valve opens for 100 ms.
//!
//! Key concepts:
//! - Building a trial template by state name
//! - Driving the machine on a worker thread with MachineDriver
//! - Watching notifications through a channel observer
//!
//! Run with: cargo run --example two_port_task

use operant::builder::{StateMatrix, StateSpec};
use operant::runtime::{ChannelObserver, Command, MachineDriver, Notification, StateMachine};
use std::sync::mpsc::channel;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Two-Port Choice Task ===\n");

    let mut sma = StateMatrix::new(&["L", "R"], &["ValveL", "ValveR"]);
    sma.add_state(StateSpec {
        name: "wait",
        transitions: &[("Lin", "rewardL"), ("Rin", "rewardR")],
        ..StateSpec::default()
    })?;
    sma.add_state(StateSpec {
        name: "rewardL",
        timer: 0.1,
        transitions: &[("Tup", "END")],
        outputs_on: &["ValveL"],
        ..StateSpec::default()
    })?;
    sma.add_state(StateSpec {
        name: "rewardR",
        timer: 0.1,
        transitions: &[("Tup", "END")],
        outputs_on: &["ValveR"],
        ..StateSpec::default()
    })?;

    println!("Trial template:\n{sma}");

    let mut machine = StateMachine::new();
    machine.set_matrix(sma.matrix()?, Some(sma.timer_event_index()))?;
    machine.set_timers(sma.timers()?)?;
    machine.set_outputs(sma.outputs()?)?;
    let (tx, rx) = channel();
    machine.subscribe(ChannelObserver::new(tx));

    let (driver, handle) = MachineDriver::new(machine);
    let worker = thread::spawn(move || driver.run());

    handle.send(Command::Start);
    handle.force_state(1); // begin the trial in 'wait'

    // Simulate a left poke from the hardware thread.
    let lin = sma.events().index_of("Lin").expect("Lin exists");
    handle.input(lin);

    // Let the 100 ms reward timer expire on its own.
    thread::sleep(Duration::from_millis(300));
    handle.shutdown();
    let machine = worker.join().expect("driver thread panicked");

    println!("Trial log:");
    for notification in rx.try_iter() {
        match notification {
            Notification::EventProcessed {
                event, next_state, ..
            } => println!("  event {event:>2} -> state {next_state}"),
            Notification::StateChanged { state } => {
                let name = sma.states().name_of(state).unwrap_or("?");
                println!("  entered {name} [{state}]");
            }
            Notification::OutputChanged { output, value } => {
                println!("  output {output} -> {value}");
            }
            other => println!("  {other:?}"),
        }
    }

    let end = sma.states().index_of("END").expect("END exists");
    assert_eq!(machine.current_state(), end);
    println!("\nFinal state: END; ValveL still open = {}", machine.output_state(0)?);

    println!("\n=== Example Complete ===");
    Ok(())
}
