//! Test and demo doubles for dispense_core.
//!
//! `RecordingActuator` and `RecordingSink` are spies for assertions;
//! `SimRig` is a closed-loop bench stand (relay bank plus flow meter on a
//! shared manual clock) used by the CLI's simulation mode and the
//! integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dispense_traits::{Actuator, FlowMeter, ManualClock};

use crate::events::{EngineEvent, EventSink};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Actuator that records every call as a (channel, energized) pair.
/// Clones share the log, so a test can keep one handle while the engine
/// owns the other.
#[derive(Debug, Default, Clone)]
pub struct RecordingActuator {
    calls: Arc<Mutex<Vec<(u8, bool)>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<(u8, bool)> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Current on/off view of one channel; the last call wins.
    pub fn energized(&self, channel: u8) -> bool {
        self.calls()
            .iter()
            .rev()
            .find(|(ch, _)| *ch == channel)
            .is_some_and(|(_, on)| *on)
    }
}

impl Actuator for RecordingActuator {
    fn activate(&mut self, channel: u8) -> Result<(), BoxError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((channel, true));
        }
        Ok(())
    }

    fn deactivate(&mut self, channel: u8) -> Result<(), BoxError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((channel, false));
        }
        Ok(())
    }
}

/// Actuator whose calls always fail; exercises the best-effort paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingActuator;

impl Actuator for FailingActuator {
    fn activate(&mut self, _channel: u8) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("relay bank offline")))
    }

    fn deactivate(&mut self, _channel: u8) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("relay bank offline")))
    }
}

/// Flow meter that replays a fixed sequence of cumulative readings, then
/// holds the last one.
#[derive(Debug, Default)]
pub struct ScriptedFlowMeter {
    readings: VecDeque<f64>,
    last: f64,
}

impl ScriptedFlowMeter {
    pub fn new(readings: impl IntoIterator<Item = f64>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
            last: 0.0,
        }
    }
}

impl FlowMeter for ScriptedFlowMeter {
    fn total_volume(&mut self, _timeout: Duration) -> Result<f64, BoxError> {
        if let Some(v) = self.readings.pop_front() {
            self.last = v;
        }
        Ok(self.last)
    }
}

/// A meter that always errors on read; useful when sessions are fed
/// through `update()` directly, or to exercise a dead feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFlowMeter;

impl FlowMeter for NoopFlowMeter {
    fn total_volume(&mut self, _timeout: Duration) -> Result<f64, BoxError> {
        Err(Box::new(std::io::Error::other("noop flow meter")))
    }
}

/// Event sink that appends every event to a shared list.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn on_event(&mut self, event: EngineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

// ── Simulated rig ────────────────────────────────────────────────────────

const SIM_CHANNELS: usize = 8;

#[derive(Debug)]
struct SimState {
    on: [bool; SIM_CHANNELS],
    total_l: f64,
    last_ms: u64,
}

impl SimState {
    /// Advance the flow integral to `now_ms`. One shared meter sits
    /// upstream of all channels, so open channels add up.
    fn settle(&mut self, now_ms: u64, rate_lpm: f64) {
        let dt_ms = now_ms.saturating_sub(self.last_ms);
        let open = self.on.iter().filter(|&&v| v).count() as f64;
        self.total_l += rate_lpm * open * dt_ms as f64 / 60_000.0;
        self.last_ms = now_ms;
    }
}

/// Simulated bench rig: a relay bank and a cumulative flow meter sharing
/// one manual clock. While a relay is energized, volume accrues at
/// `rate_lpm` per open channel as the clock advances, so a runner
/// sleeping on the same clock drives the whole loop instantly.
#[derive(Debug, Clone)]
pub struct SimRig {
    clock: ManualClock,
    rate_lpm: f64,
    state: Arc<Mutex<SimState>>,
}

impl SimRig {
    pub fn new(rate_lpm: f64, clock: ManualClock) -> Self {
        Self {
            clock,
            rate_lpm,
            state: Arc::new(Mutex::new(SimState {
                on: [false; SIM_CHANNELS],
                total_l: 0.0,
                last_ms: 0,
            })),
        }
    }

    pub fn actuator(&self) -> SimActuator {
        SimActuator { rig: self.clone() }
    }

    pub fn meter(&self) -> SimFlowMeter {
        SimFlowMeter { rig: self.clone() }
    }

    pub fn clock(&self) -> ManualClock {
        self.clock.clone()
    }

    fn now_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    fn switch(&self, channel: u8, on: bool) -> Result<(), BoxError> {
        let idx = usize::from(channel).checked_sub(1).filter(|i| *i < SIM_CHANNELS);
        let Some(idx) = idx else {
            return Err(Box::new(std::io::Error::other(format!(
                "no relay output {channel}"
            ))));
        };
        let now = self.now_ms();
        if let Ok(mut st) = self.state.lock() {
            st.settle(now, self.rate_lpm);
            st.on[idx] = on;
        }
        Ok(())
    }

    fn read_total(&self) -> f64 {
        let now = self.now_ms();
        match self.state.lock() {
            Ok(mut st) => {
                st.settle(now, self.rate_lpm);
                st.total_l
            }
            Err(_) => 0.0,
        }
    }
}

/// Relay-bank handle of a [`SimRig`].
#[derive(Debug, Clone)]
pub struct SimActuator {
    rig: SimRig,
}

impl Actuator for SimActuator {
    fn activate(&mut self, channel: u8) -> Result<(), BoxError> {
        self.rig.switch(channel, true)
    }

    fn deactivate(&mut self, channel: u8) -> Result<(), BoxError> {
        self.rig.switch(channel, false)
    }
}

/// Meter handle of a [`SimRig`].
#[derive(Debug, Clone)]
pub struct SimFlowMeter {
    rig: SimRig,
}

impl FlowMeter for SimFlowMeter {
    fn total_volume(&mut self, _timeout: Duration) -> Result<f64, BoxError> {
        Ok(self.rig.read_total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispense_traits::Clock;

    #[test]
    fn rig_accrues_volume_only_while_energized() {
        let clock = ManualClock::new();
        let rig = SimRig::new(3.0, clock.clone());
        let mut actuator = rig.actuator();
        let mut meter = rig.meter();
        let t = Duration::from_millis(10);

        clock.advance(Duration::from_secs(10));
        assert_eq!(meter.total_volume(t).ok(), Some(0.0));

        actuator.activate(1).expect("switch on");
        clock.advance(Duration::from_secs(60));
        let total = meter.total_volume(t).expect("read");
        assert!((total - 3.0).abs() < 1e-9);

        actuator.deactivate(1).expect("switch off");
        clock.advance(Duration::from_secs(60));
        let total = meter.total_volume(t).expect("read");
        assert!((total - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rig_meter_is_shared_across_channels() {
        let clock = ManualClock::new();
        let rig = SimRig::new(1.0, clock.clone());
        let mut actuator = rig.actuator();
        let mut meter = rig.meter();

        actuator.activate(1).expect("switch on");
        actuator.activate(2).expect("switch on");
        clock.advance(Duration::from_secs(30));
        let total = meter.total_volume(Duration::ZERO).expect("read");
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rig_rejects_unknown_outputs() {
        let rig = SimRig::new(1.0, ManualClock::new());
        let mut actuator = rig.actuator();
        assert!(actuator.activate(0).is_err());
        assert!(actuator.activate(9).is_err());
    }

    #[test]
    fn manual_clock_sleep_advances_rig_time() {
        let clock = ManualClock::new();
        let rig = SimRig::new(6.0, clock.clone());
        let mut actuator = rig.actuator();
        let mut meter = rig.meter();

        actuator.activate(1).expect("switch on");
        clock.sleep(Duration::from_secs(10));
        let total = meter.total_volume(Duration::ZERO).expect("read");
        assert!((total - 1.0).abs() < 1e-9);
    }
}
