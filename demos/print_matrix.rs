//! Matrix Inspection
//!
//! Builds a trial template with an extra timer and prints the transition
//! table plus the exported name maps, the way a session record stores them.
//!
//! Run with: cargo run --example print_matrix

use operant::builder::{StateMatrix, StateSpec};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut sma = StateMatrix::new(&["C", "L", "R"], &["ValveL", "ValveR", "LED"]);
    sma.add_extra_timer("punish", 2.0)?;
    sma.add_state(StateSpec {
        name: "wait",
        timer: 10.0,
        transitions: &[("Lin", "rewardL"), ("Rin", "wrong_poke"), ("Tup", "END")],
        outputs_on: &["LED"],
        ..StateSpec::default()
    })?;
    sma.add_state(StateSpec {
        name: "rewardL",
        timer: 0.2,
        transitions: &[("Tup", "END")],
        outputs_on: &["ValveL"],
        outputs_off: &["LED"],
        serial_out: 1,
        ..StateSpec::default()
    })?;
    sma.add_state(StateSpec {
        name: "wrong_poke",
        timer: 0.5,
        transitions: &[("Tup", "END"), ("punish", "END")],
        trigger: &["punish"],
        serial_out: 2,
        ..StateSpec::default()
    })?;

    println!("{sma}");
    println!("name maps:\n{}", serde_json::to_string_pretty(&sma.label_maps())?);
    println!("analysis:\n{}", serde_json::to_string_pretty(&sma.analyze()?)?);
    Ok(())
}
