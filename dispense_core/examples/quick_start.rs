//! Quick Start Example
//!
//! Sets up a fully simulated dispense and runs it to completion.
//!
//! # Usage
//!
//! Run with `cargo run -p dispense_core --example quick_start`. The rig and
//! the engine share a manual clock, so the whole run finishes instantly while
//! still exercising the real polling loop.

use std::sync::Arc;
use std::time::Duration;

use dispense_core::mocks::SimRig;
use dispense_core::{DispensingEngine, RunOutcome, run_to_end};
use dispense_traits::ManualClock;

fn main() -> Result<(), eyre::Report> {
    let clock = ManualClock::new();
    // Bench rig flowing 2 L/min while a relay is energized
    let rig = SimRig::new(2.0, clock.clone());

    let mut engine = DispensingEngine::builder(rig.actuator())
        .with_channels(2)
        .with_clock(Arc::new(clock.clone()))
        .build()?;

    engine.start_dispensing(1, 0.75, true)?;

    let mut meter = rig.meter();
    let outcome = run_to_end(&mut engine, &mut meter, 1, 10, Duration::from_millis(50), None);

    match outcome {
        RunOutcome::Complete => println!(
            "dispensed {:.3} L in {} ms",
            engine.current_volume(1),
            engine.elapsed(1).as_millis()
        ),
        RunOutcome::Faulted(cause) => println!("faulted: {cause}"),
        RunOutcome::Idle => println!("nothing to do"),
    }

    Ok(())
}
