//! Clock-driven behavior: elapsed time, pause bookkeeping, timeouts, ETA.

use std::sync::Arc;
use std::time::Duration;

use dispense_core::mocks::RecordingActuator;
use dispense_core::{DispensingEngine, FaultCause, SessionDefaults};
use dispense_traits::ManualClock;

fn engine_with(
    clock: &ManualClock,
    defaults: SessionDefaults,
) -> DispensingEngine<RecordingActuator> {
    DispensingEngine::builder(RecordingActuator::new())
        .with_defaults(defaults)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("engine")
}

fn engine(clock: &ManualClock) -> DispensingEngine<RecordingActuator> {
    engine_with(clock, SessionDefaults::default())
}

#[test]
fn elapsed_is_zero_before_any_run() {
    let clock = ManualClock::new();
    let engine = engine(&clock);
    clock.advance(Duration::from_secs(30));
    assert_eq!(engine.elapsed(1), Duration::ZERO);
}

#[test]
fn elapsed_tracks_the_clock_while_dispensing() {
    let clock = ManualClock::new();
    let mut engine = engine(&clock);

    engine.start_dispensing(1, 1.0, true).expect("start");
    clock.advance(Duration::from_secs(3));
    assert_eq!(engine.elapsed(1), Duration::from_secs(3));
}

#[test]
fn pause_freezes_elapsed_time() {
    let clock = ManualClock::new();
    let mut engine = engine(&clock);

    // Start at t=0, pause at t=10s, resume at t=40s: at t=50s the run has
    // 20s of active time.
    engine.start_dispensing(1, 1.0, true).expect("start");
    clock.advance(Duration::from_secs(10));
    engine.pause_dispensing(1);

    clock.advance(Duration::from_secs(30));
    assert_eq!(engine.elapsed(1), Duration::from_secs(10));

    engine.resume_dispensing(1);
    clock.advance(Duration::from_secs(10));
    assert_eq!(engine.elapsed(1), Duration::from_secs(20));
}

#[test]
fn elapsed_keeps_counting_after_completion() {
    let clock = ManualClock::new();
    let mut engine = engine(&clock);

    engine.start_dispensing(1, 1.0, true).expect("start");
    engine.update(1.0);
    clock.advance(Duration::from_secs(5));
    engine.update(2.0);
    assert!(engine.is_complete(1));

    clock.advance(Duration::from_secs(3));
    assert_eq!(engine.elapsed(1), Duration::from_secs(8));
}

#[test]
fn overrunning_the_timeout_faults_the_channel() {
    let clock = ManualClock::new();
    let defaults = SessionDefaults {
        timeout_ms: 5_000,
        ..SessionDefaults::default()
    };
    let actuator = RecordingActuator::new();
    let mut engine = DispensingEngine::builder(actuator.clone())
        .with_defaults(defaults)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("engine");

    engine.start_dispensing(1, 10.0, true).expect("start");
    engine.update(1.0);

    clock.advance(Duration::from_secs(4));
    engine.update(1.5);
    assert!(engine.is_dispensing(1));

    clock.advance(Duration::from_secs(2));
    engine.update(1.6);
    assert!(engine.has_fault(1));
    assert!(!actuator.energized(1));
    assert!(engine.fault_message(1).contains("took too long"));
    assert!(matches!(
        engine.fault_cause(1),
        Some(FaultCause::Timeout {
            elapsed_ms: 6_000,
            limit_ms: 5_000,
        })
    ));
}

#[test]
fn completion_wins_when_target_and_timeout_coincide() {
    let clock = ManualClock::new();
    let defaults = SessionDefaults {
        timeout_ms: 5_000,
        ..SessionDefaults::default()
    };
    let mut engine = engine_with(&clock, defaults);

    engine.start_dispensing(1, 1.0, true).expect("start");
    engine.update(5.0);

    // Past the deadline, but the same tick also reaches the target.
    clock.advance(Duration::from_secs(6));
    engine.update(6.0);
    assert!(engine.is_complete(1));
    assert!(!engine.has_fault(1));
}

#[test]
fn paused_interval_does_not_count_toward_the_timeout() {
    let clock = ManualClock::new();
    let defaults = SessionDefaults {
        timeout_ms: 5_000,
        ..SessionDefaults::default()
    };
    let mut engine = engine_with(&clock, defaults);

    engine.start_dispensing(1, 10.0, true).expect("start");
    engine.update(1.0);
    clock.advance(Duration::from_secs(3));
    engine.pause_dispensing(1);

    // Ten seconds parked, well past the 5s budget.
    clock.advance(Duration::from_secs(10));
    engine.resume_dispensing(1);
    clock.advance(Duration::from_secs(1));
    engine.update(1.2);

    assert!(engine.is_dispensing(1));
    assert_eq!(engine.elapsed(1), Duration::from_secs(4));
}

#[test]
fn policy_changes_only_affect_later_sessions() {
    let clock = ManualClock::new();
    let mut engine = engine(&clock);

    engine.start_dispensing(1, 10.0, true).expect("start");
    engine.update(1.0);

    // Shrink the timeout while channel 1 is mid-run.
    engine.set_default_timeout(Duration::from_secs(2));
    clock.advance(Duration::from_secs(10));
    engine.update(1.5);
    assert!(engine.is_dispensing(1), "running session keeps its timeout");

    // A session started after the change picks it up.
    engine.start_dispensing(2, 10.0, true).expect("start 2");
    engine.update_channel(2, 2.0);
    clock.advance(Duration::from_secs(3));
    engine.update_channel(2, 2.1);
    assert!(engine.has_fault(2));
}

#[test]
fn estimated_remaining_reflects_the_average_rate() {
    let clock = ManualClock::new();
    let mut engine = engine(&clock);

    engine.start_dispensing(1, 3.0, true).expect("start");
    engine.update(1.0);
    clock.advance(Duration::from_secs(60));
    engine.update(2.0);

    // 1.0 L in 60 s with 2.0 L to go: two more minutes.
    let eta = engine.estimated_remaining(1);
    assert!((eta.as_secs_f64() - 120.0).abs() < 0.5, "eta = {eta:?}");
}

#[test]
fn estimated_remaining_is_zero_when_idle_or_unmeasured() {
    let clock = ManualClock::new();
    let mut engine = engine(&clock);
    assert_eq!(engine.estimated_remaining(1), Duration::ZERO);

    // No volume yet: no honest estimate.
    engine.start_dispensing(1, 3.0, true).expect("start");
    clock.advance(Duration::from_secs(5));
    engine.update(0.0);
    assert_eq!(engine.estimated_remaining(1), Duration::ZERO);
}

#[test]
fn estimated_remaining_saturates_to_zero_on_vanishing_rates() {
    let clock = ManualClock::new();
    let mut engine = engine(&clock);

    // A sub-normal trickle projects a time to target far beyond what a
    // Duration can hold; the estimate saturates to zero.
    engine.start_dispensing(1, 10.0, true).expect("start");
    engine.update(1e-300);
    clock.advance(Duration::from_secs(1));
    engine.update(2e-300);

    assert!(engine.is_dispensing(1));
    assert_eq!(engine.estimated_remaining(1), Duration::ZERO);
}
