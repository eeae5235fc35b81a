//! Run orchestration: config mapping, rig assembly, and dispense execution.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dispense_core::error::Result as CoreResult;
use dispense_core::mocks::SimRig;
use dispense_core::runner::{RunOutcome, run_to_end};
use dispense_core::{
    ChannelSink, DispensingEngine, EngineEvent, FaultCause, PumpState, SessionDefaults,
};
use dispense_traits::{Actuator, FlowMeter, ManualClock};

use crate::cli::{CliPolicy, LAST_POLICY};

pub fn fault_name(cause: &FaultCause) -> &'static str {
    use FaultCause::*;
    match cause {
        Timeout { .. } => "Timeout",
        EmergencyStop => "EmergencyStop",
    }
}

pub fn state_name(state: Option<PumpState>) -> &'static str {
    match state {
        Some(PumpState::Ready) => "ready",
        Some(PumpState::Dispensing) => "dispensing",
        Some(PumpState::Paused) => "paused",
        Some(PumpState::Complete) => "complete",
        Some(PumpState::Faulted(_)) => "faulted",
        None => "unknown",
    }
}

/// Everything a single run needs, resolved from config plus CLI overrides.
pub struct RunSpec {
    pub pump: u8,
    pub target_l: f64,
    pub auto_stop: bool,
    pub rate_lpm: f64,
    pub poll_hz: u32,
    pub read_timeout: Duration,
    pub defaults: SessionDefaults,
    pub channels: u8,
}

/// Station status for one pump after the run, one JSONL line each.
pub struct PumpSnapshot {
    pub pump: u8,
    pub state: &'static str,
    pub target_l: f64,
    pub dispensed_l: f64,
    pub progress: f64,
    pub elapsed_ms: u64,
    pub eta_s: f64,
    pub fault: Option<String>,
}

pub struct RunReport {
    pub outcome: RunOutcome,
    pub snapshots: Vec<PumpSnapshot>,
    pub events: Vec<EngineEvent>,
}

/// Run one dispense on the simulated rig until it completes, faults, or is
/// shut down. The rig runs on a manual clock, so even multi-minute sessions
/// finish in wall-microseconds.
pub fn run_dispense(spec: &RunSpec, shutdown: Arc<AtomicBool>) -> CoreResult<RunReport> {
    let _ = LAST_POLICY.set(CliPolicy {
        timeout_ms: spec.defaults.timeout_ms,
        completion_threshold_l: spec.defaults.completion_threshold_l,
        max_flow_lpm: spec.defaults.max_flow_lpm,
    });

    let clock = ManualClock::new();
    let rig = SimRig::new(spec.rate_lpm, clock.clone());
    let (sink, events) = ChannelSink::bounded(256);

    let mut engine = DispensingEngine::builder(rig.actuator())
        .with_channels(spec.channels)
        .with_defaults(spec.defaults)
        .with_clock(Arc::new(clock))
        .with_event_sink(Box::new(sink))
        .build()?;

    engine.start_dispensing(spec.pump, spec.target_l, spec.auto_stop)?;
    tracing::info!(
        pump = spec.pump,
        target_l = spec.target_l,
        rate_lpm = spec.rate_lpm,
        "dispense start"
    );

    let mut meter = rig.meter();
    let outcome = run_to_end(
        &mut engine,
        &mut meter,
        spec.pump,
        spec.poll_hz,
        spec.read_timeout,
        Some(&shutdown),
    );

    let snapshots = (1..=engine.channels())
        .map(|pump| snapshot_of(&engine, pump))
        .collect();
    Ok(RunReport {
        outcome,
        snapshots,
        events: events.try_iter().collect(),
    })
}

/// Build the station with the configured pump count and take one meter
/// reading. Returns the pump count on success.
pub fn self_check(cfg: &dispense_config::Config) -> CoreResult<u8> {
    let clock = ManualClock::new();
    let rig = SimRig::new(0.0, clock.clone());
    let engine = DispensingEngine::builder(rig.actuator())
        .with_channels(cfg.station.pumps)
        .with_defaults(SessionDefaults::from(&cfg.session))
        .with_clock(Arc::new(clock))
        .build()?;

    let mut meter = rig.meter();
    let total_l = meter
        .total_volume(Duration::from_millis(cfg.feed.read_timeout_ms))
        .map_err(|e| eyre::eyre!("meter read failed: {e}"))?;
    tracing::debug!(total_l, pumps = engine.channels(), "self-check read");
    Ok(engine.channels())
}

fn snapshot_of<A: Actuator>(engine: &DispensingEngine<A>, pump: u8) -> PumpSnapshot {
    let fault = engine.has_fault(pump).then(|| engine.fault_message(pump));
    PumpSnapshot {
        pump,
        state: state_name(engine.state(pump)),
        target_l: engine.target_volume(pump),
        dispensed_l: engine.current_volume(pump),
        progress: engine.progress(pump),
        elapsed_ms: u64::try_from(engine.elapsed(pump).as_millis()).unwrap_or(u64::MAX),
        eta_s: engine.estimated_remaining(pump).as_secs_f64(),
        fault,
    }
}

/// One status line per pump, schema-stable for scripting.
pub fn snapshot_json(snap: &PumpSnapshot) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
    serde_json::json!({
        "timestamp": timestamp,
        "pump": snap.pump,
        "state": snap.state,
        "target_l": snap.target_l,
        "dispensed_l": snap.dispensed_l,
        "progress": snap.progress,
        "elapsed_ms": snap.elapsed_ms,
        "eta_s": snap.eta_s,
        "fault": snap.fault,
    })
    .to_string()
}
