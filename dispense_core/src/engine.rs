//! The multi-channel dispensing engine.
//!
//! `DispensingEngine` owns one [`PumpSession`](crate::session::PumpSession)
//! per channel and is the sole writer of session state. Control commands
//! and meter updates are synchronous; actuator calls are best-effort with
//! the timeout policy as the safety net behind a silently failed relay.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dispense_traits::Actuator;
use dispense_traits::clock::{Clock, MonotonicClock};

use crate::config::SessionDefaults;
use crate::error::{BuildError, CommandError, FaultCause, Result};
use crate::events::{EngineEvent, EventSink};
use crate::session::{PumpSession, PumpState};

pub struct DispensingEngine<A: Actuator> {
    pub(crate) actuator: A,
    pub(crate) sessions: Vec<PumpSession>,
    pub(crate) defaults: SessionDefaults,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) sink: Option<Box<dyn EventSink>>,
}

impl<A: Actuator> core::fmt::Debug for DispensingEngine<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DispensingEngine")
            .field("channels", &self.sessions.len())
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Builder for [`DispensingEngine`]. Everything except the actuator has a
/// working default: two channels, stock session policy, monotonic clock,
/// no event sink.
pub struct EngineBuilder<A: Actuator> {
    actuator: A,
    channels: u8,
    defaults: SessionDefaults,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    sink: Option<Box<dyn EventSink>>,
}

impl<A: Actuator> EngineBuilder<A> {
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_defaults(mut self, defaults: SessionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_event_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<DispensingEngine<A>> {
        if !(1..=8).contains(&self.channels) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "channel count must be in 1..=8",
            )));
        }
        if self.defaults.timeout_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "timeout_ms must be >= 1",
            )));
        }
        if !self.defaults.completion_threshold_l.is_finite()
            || self.defaults.completion_threshold_l < 0.0
        {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "completion_threshold_l must be finite and >= 0",
            )));
        }
        if !self.defaults.max_flow_lpm.is_finite() || self.defaults.max_flow_lpm <= 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "max_flow_lpm must be finite and > 0",
            )));
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let epoch = clock.now();
        let sessions = (1..=self.channels)
            .map(|pump| PumpSession::new(pump, &self.defaults))
            .collect();
        Ok(DispensingEngine {
            actuator: self.actuator,
            sessions,
            defaults: self.defaults,
            clock,
            epoch,
            sink: self.sink,
        })
    }
}

impl<A: Actuator> DispensingEngine<A> {
    pub fn builder(actuator: A) -> EngineBuilder<A> {
        EngineBuilder {
            actuator,
            channels: 2,
            defaults: SessionDefaults::default(),
            clock: None,
            sink: None,
        }
    }

    /// Number of pump channels, numbered 1..=channels().
    pub fn channels(&self) -> u8 {
        self.sessions.len() as u8
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    // ── Control commands ─────────────────────────────────────────────────

    /// Begin a fresh session on `pump`. Allowed from Ready, Complete and
    /// Paused (a paused run is discarded); rejected while Dispensing and
    /// while Faulted until [`clear_fault`](Self::clear_fault).
    pub fn start_dispensing(
        &mut self,
        pump: u8,
        target_l: f64,
        auto_stop: bool,
    ) -> core::result::Result<(), CommandError> {
        let idx = self
            .index_of(pump)
            .ok_or(CommandError::InvalidPump(pump))?;
        if !(target_l.is_finite() && target_l > 0.0) {
            return Err(CommandError::InvalidTarget);
        }
        match self.sessions[idx].state {
            PumpState::Dispensing => return Err(CommandError::AlreadyActive(pump)),
            PumpState::Faulted(_) => return Err(CommandError::Faulted(pump)),
            _ => {}
        }

        let now = self.now_ms();
        let defaults = self.defaults;
        self.sessions[idx].begin(target_l, auto_stop, now, &defaults);
        self.activate(pump);
        tracing::info!(pump, target_l, auto_stop, "dispense start");
        self.emit(EngineEvent::Started { pump, target_l });
        Ok(())
    }

    /// Release `pump` and return its session to Ready. No-op unless the
    /// session is Dispensing or Paused; the last dispensed volume stays
    /// readable until the next start.
    pub fn stop_dispensing(&mut self, pump: u8) {
        let Some(idx) = self.index_of(pump) else {
            return;
        };
        match self.sessions[idx].state {
            PumpState::Dispensing | PumpState::Paused => {}
            _ => return,
        }
        self.deactivate(pump);
        let dispensed_l = self.sessions[idx].dispensed_l;
        self.sessions[idx].finish_ready();
        tracing::info!(pump, dispensed_l, "dispense stop");
        self.emit(EngineEvent::Stopped { pump, dispensed_l });
    }

    /// No-op unless Dispensing.
    pub fn pause_dispensing(&mut self, pump: u8) {
        let Some(idx) = self.index_of(pump) else {
            return;
        };
        if self.sessions[idx].state != PumpState::Dispensing {
            return;
        }
        self.deactivate(pump);
        let now = self.now_ms();
        self.sessions[idx].pause(now);
        tracing::info!(pump, "dispense paused");
        self.emit(EngineEvent::Paused { pump });
    }

    /// No-op unless Paused.
    pub fn resume_dispensing(&mut self, pump: u8) {
        let Some(idx) = self.index_of(pump) else {
            return;
        };
        if self.sessions[idx].state != PumpState::Paused {
            return;
        }
        let now = self.now_ms();
        self.sessions[idx].resume(now);
        self.activate(pump);
        tracing::info!(pump, "dispense resumed");
        self.emit(EngineEvent::Resumed { pump });
    }

    /// Force every channel down and into the faulted state, whatever its
    /// prior stage. Hard override, no validation.
    pub fn emergency_stop_all(&mut self) {
        tracing::warn!("emergency stop, all channels");
        for idx in 0..self.sessions.len() {
            let pump = self.sessions[idx].pump;
            self.deactivate(pump);
            self.sessions[idx].fault(FaultCause::EmergencyStop);
            self.emit(EngineEvent::Faulted {
                pump,
                cause: FaultCause::EmergencyStop,
            });
        }
        self.emit(EngineEvent::EmergencyStop);
    }

    /// Acknowledge a fault: full session reset back to Ready with the
    /// current engine defaults. No-op unless Faulted.
    pub fn clear_fault(&mut self, pump: u8) {
        let Some(idx) = self.index_of(pump) else {
            return;
        };
        if !matches!(self.sessions[idx].state, PumpState::Faulted(_)) {
            return;
        }
        let defaults = self.defaults;
        self.sessions[idx].reset(&defaults);
        tracing::info!(pump, "fault cleared");
        self.emit(EngineEvent::FaultCleared { pump });
    }

    // ── Meter updates ────────────────────────────────────────────────────

    /// Shared-feed tick: apply one cumulative meter reading to every
    /// channel. Installations with one meter per pump use
    /// [`update_channel`](Self::update_channel) instead.
    pub fn update(&mut self, total_l: f64) {
        for pump in 1..=self.sessions.len() as u8 {
            self.tick_channel(pump, total_l);
        }
    }

    /// Addressed-feed tick for a single channel. Unknown channels are
    /// ignored.
    pub fn update_channel(&mut self, pump: u8, total_l: f64) {
        self.tick_channel(pump, total_l);
    }

    fn tick_channel(&mut self, pump: u8, total_l: f64) {
        let Some(idx) = self.index_of(pump) else {
            return;
        };
        if self.sessions[idx].state != PumpState::Dispensing {
            return;
        }
        self.sessions[idx].apply_reading(total_l);
        let now = self.now_ms();

        // Completion first, then timeout; the first transition ends the
        // tick for this channel.
        let (reached, elapsed_ms, limit_ms) = {
            let s = &self.sessions[idx];
            (
                s.auto_stop && s.target_reached(),
                s.elapsed_ms(now),
                s.timeout_ms,
            )
        };

        if reached {
            self.deactivate(pump);
            let dispensed_l = self.sessions[idx].dispensed_l;
            self.sessions[idx].complete();
            tracing::info!(pump, dispensed_l, "dispense complete");
            self.emit(EngineEvent::Completed { pump, dispensed_l });
            return;
        }

        if elapsed_ms > limit_ms {
            let cause = FaultCause::Timeout {
                elapsed_ms,
                limit_ms,
            };
            self.deactivate(pump);
            self.sessions[idx].fault(cause);
            tracing::error!(pump, elapsed_ms, limit_ms, "dispense timeout");
            self.emit(EngineEvent::Faulted { pump, cause });
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn is_dispensing(&self, pump: u8) -> bool {
        self.session(pump)
            .is_some_and(|s| s.state == PumpState::Dispensing)
    }

    pub fn is_paused(&self, pump: u8) -> bool {
        self.session(pump)
            .is_some_and(|s| s.state == PumpState::Paused)
    }

    pub fn is_complete(&self, pump: u8) -> bool {
        self.session(pump)
            .is_some_and(|s| s.state == PumpState::Complete)
    }

    /// True when the session is faulted. An invalid channel also reads as
    /// faulted so polling dashboards fail loud rather than green.
    pub fn has_fault(&self, pump: u8) -> bool {
        match self.session(pump) {
            Some(s) => matches!(s.state, PumpState::Faulted(_)),
            None => true,
        }
    }

    pub fn fault_cause(&self, pump: u8) -> Option<FaultCause> {
        self.session(pump).and_then(|s| match s.state {
            PumpState::Faulted(cause) => Some(cause),
            _ => None,
        })
    }

    /// Human-readable fault text; empty when the session is healthy.
    pub fn fault_message(&self, pump: u8) -> String {
        match self.session(pump) {
            None => CommandError::InvalidPump(pump).to_string(),
            Some(s) => match s.state {
                PumpState::Faulted(cause) => cause.to_string(),
                _ => String::new(),
            },
        }
    }

    /// `None` for an invalid channel, distinct from any in-session state.
    pub fn state(&self, pump: u8) -> Option<PumpState> {
        self.session(pump).map(|s| s.state)
    }

    pub fn progress(&self, pump: u8) -> f64 {
        self.session(pump).map_or(0.0, PumpSession::progress)
    }

    pub fn current_volume(&self, pump: u8) -> f64 {
        self.session(pump).map_or(0.0, |s| s.dispensed_l)
    }

    pub fn target_volume(&self, pump: u8) -> f64 {
        self.session(pump).map_or(0.0, |s| s.target_l)
    }

    pub fn elapsed(&self, pump: u8) -> Duration {
        let now = self.now_ms();
        Duration::from_millis(self.session(pump).map_or(0, |s| s.elapsed_ms(now)))
    }

    /// Advisory time-to-target estimate; zero whenever no honest estimate
    /// exists or the projection does not fit a `Duration`.
    pub fn estimated_remaining(&self, pump: u8) -> Duration {
        let now = self.now_ms();
        let secs = self
            .session(pump)
            .map_or(0.0, |s| s.estimated_remaining_secs(now));
        Duration::try_from_secs_f64(secs).unwrap_or_default()
    }

    // ── Session policy setters ───────────────────────────────────────────

    /// Applies to sessions started after the call; running sessions keep
    /// the timeout they captured at start.
    pub fn set_default_timeout(&mut self, timeout: Duration) {
        if !timeout.is_zero() {
            self.defaults.timeout_ms = timeout.as_millis() as u64;
        }
    }

    pub fn set_completion_threshold(&mut self, liters: f64) {
        if liters.is_finite() && liters >= 0.0 {
            self.defaults.completion_threshold_l = liters;
        }
    }

    pub fn set_max_flow_rate(&mut self, lpm: f64) {
        if lpm.is_finite() && lpm > 0.0 {
            self.defaults.max_flow_lpm = lpm;
        }
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    fn index_of(&self, pump: u8) -> Option<usize> {
        (pump >= 1 && u64::from(pump) <= self.sessions.len() as u64)
            .then(|| usize::from(pump) - 1)
    }

    fn session(&self, pump: u8) -> Option<&PumpSession> {
        self.index_of(pump).map(|i| &self.sessions[i])
    }

    fn activate(&mut self, pump: u8) {
        if let Err(e) = self.actuator.activate(pump) {
            tracing::warn!(pump, error = %e, "actuator activate failed");
        }
    }

    fn deactivate(&mut self, pump: u8) {
        if let Err(e) = self.actuator.deactivate(pump) {
            tracing::warn!(pump, error = %e, "actuator deactivate failed");
        }
    }

    fn emit(&mut self, event: EngineEvent) {
        if let Some(sink) = self.sink.as_mut() {
            sink.on_event(event);
        }
    }
}
