//! Event emission: ordering and payloads, plus channel delivery.

use std::sync::Arc;

use dispense_core::mocks::{RecordingActuator, RecordingSink};
use dispense_core::{ChannelSink, DispensingEngine, EngineEvent, FaultCause};
use dispense_traits::ManualClock;

fn observed_engine() -> (DispensingEngine<RecordingActuator>, RecordingSink) {
    let sink = RecordingSink::new();
    let engine = DispensingEngine::builder(RecordingActuator::new())
        .with_clock(Arc::new(ManualClock::new()))
        .with_event_sink(Box::new(sink.clone()))
        .build()
        .expect("engine");
    (engine, sink)
}

#[test]
fn lifecycle_events_arrive_in_order() {
    let (mut engine, sink) = observed_engine();

    engine.start_dispensing(1, 1.0, true).expect("start");
    engine.pause_dispensing(1);
    engine.resume_dispensing(1);
    engine.update(2.0);
    engine.update(3.0);

    assert_eq!(
        sink.events(),
        vec![
            EngineEvent::Started {
                pump: 1,
                target_l: 1.0,
            },
            EngineEvent::Paused { pump: 1 },
            EngineEvent::Resumed { pump: 1 },
            EngineEvent::Completed {
                pump: 1,
                dispensed_l: 1.0,
            },
        ]
    );
}

#[test]
fn stopped_event_carries_the_partial_total() {
    let (mut engine, sink) = observed_engine();

    engine.start_dispensing(1, 5.0, true).expect("start");
    engine.update(1.0);
    engine.update(1.8);
    engine.stop_dispensing(1);

    let events = sink.events();
    match events.last() {
        Some(EngineEvent::Stopped { pump: 1, dispensed_l }) => {
            assert!((dispensed_l - 0.8).abs() < 1e-9);
        }
        other => panic!("expected Stopped, got {other:?}"),
    }
}

#[test]
fn no_op_commands_emit_nothing() {
    let (mut engine, sink) = observed_engine();

    engine.pause_dispensing(1);
    engine.resume_dispensing(1);
    engine.stop_dispensing(1);
    engine.clear_fault(1);
    engine.update(4.2);

    assert!(sink.events().is_empty());
}

#[test]
fn estop_emits_per_channel_faults_then_a_marker() {
    let (mut engine, sink) = observed_engine();

    engine.start_dispensing(1, 5.0, true).expect("start");
    engine.emergency_stop_all();

    let events = sink.events();
    assert_eq!(
        &events[1..],
        &[
            EngineEvent::Faulted {
                pump: 1,
                cause: FaultCause::EmergencyStop,
            },
            EngineEvent::Faulted {
                pump: 2,
                cause: FaultCause::EmergencyStop,
            },
            EngineEvent::EmergencyStop,
        ]
    );
}

#[test]
fn fault_clear_round_trip_is_visible() {
    let (mut engine, sink) = observed_engine();

    engine.emergency_stop_all();
    engine.clear_fault(2);

    let events = sink.events();
    assert_eq!(events.last(), Some(&EngineEvent::FaultCleared { pump: 2 }));
}

#[test]
fn channel_sink_delivers_to_a_receiver() {
    let (sink, rx) = ChannelSink::bounded(16);
    let mut engine = DispensingEngine::builder(RecordingActuator::new())
        .with_clock(Arc::new(ManualClock::new()))
        .with_event_sink(Box::new(sink))
        .build()
        .expect("engine");

    engine.start_dispensing(1, 2.0, true).expect("start");
    engine.stop_dispensing(1);

    let received: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        received,
        vec![
            EngineEvent::Started {
                pump: 1,
                target_l: 2.0,
            },
            EngineEvent::Stopped {
                pump: 1,
                dispensed_l: 0.0,
            },
        ]
    );
}
