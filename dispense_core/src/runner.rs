//! Polling front end for [`DispensingEngine`].
//!
//! `run_to_end` owns the read/update/sleep loop so callers only wire up a
//! meter and an engine. Sleeping goes through the engine clock, which makes
//! the loop instant under a manual clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dispense_traits::{Actuator, FlowMeter};

use crate::engine::DispensingEngine;
use crate::error::FaultCause;
use crate::session::PumpState;

const MILLIS_PER_SEC: u64 = 1_000;

/// Terminal result of a polling run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
    /// The watched pump reached its target volume.
    Complete,
    /// The watched pump faulted; the cause is carried along.
    Faulted(FaultCause),
    /// The watched pump is not running (never started, stopped, or unknown).
    Idle,
}

/// Polling period in milliseconds for a given rate in Hz.
/// Clamps `hz` to at least 1 and the result to at least 1 ms.
#[inline]
fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Poll the meter and drive `engine` until `watch_pump` reaches a terminal
/// state. Every channel still ticks on each pass; only the watched pump
/// decides when the loop ends.
///
/// A failed meter read holds the previous reading for one tick instead of
/// skipping the update, so session timeouts keep counting on a dead feed.
/// When `shutdown` flips true, all channels are emergency-stopped and the
/// loop returns the resulting fault.
pub fn run_to_end<A, F>(
    engine: &mut DispensingEngine<A>,
    meter: &mut F,
    watch_pump: u8,
    poll_rate_hz: u32,
    read_timeout: Duration,
    shutdown: Option<&Arc<AtomicBool>>,
) -> RunOutcome
where
    A: Actuator,
    F: FlowMeter,
{
    let period = Duration::from_millis(period_ms(poll_rate_hz));
    let mut last_total: Option<f64> = None;

    tracing::info!(pump = watch_pump, poll_rate_hz, "watching dispense");

    loop {
        if shutdown.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            tracing::warn!("shutdown requested");
            engine.emergency_stop_all();
        }

        let total_l = match meter.total_volume(read_timeout) {
            Ok(v) => {
                last_total = Some(v);
                v
            }
            Err(e) => {
                tracing::warn!(error = %e, "meter read failed; holding last reading");
                last_total.unwrap_or(0.0)
            }
        };
        engine.update(total_l);

        match engine.state(watch_pump) {
            Some(PumpState::Complete) => {
                tracing::info!(pump = watch_pump, "run complete");
                return RunOutcome::Complete;
            }
            Some(PumpState::Faulted(cause)) => {
                tracing::error!(pump = watch_pump, cause = %cause, "run aborted");
                return RunOutcome::Faulted(cause);
            }
            Some(PumpState::Ready) | None => return RunOutcome::Idle,
            Some(PumpState::Dispensing | PumpState::Paused) => {}
        }

        engine.clock().sleep(period);
    }
}
