//! Per-pump session record and its volume/timing accounting.
//!
//! `PumpSession` is pure bookkeeping: every method takes caller-supplied
//! millisecond timestamps, so the whole module is testable without a clock.
//! The engine is the only writer and owns all transition policy.

use crate::config::SessionDefaults;
use crate::error::FaultCause;

/// Lifecycle stage of one pump channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Idle, no claim on the actuator.
    Ready,
    /// Actuator energized, volume accruing.
    Dispensing,
    /// Actuator released, session resumable, elapsed frozen.
    Paused,
    /// Target reached; a new start is allowed.
    Complete,
    /// Stopped by policy; inert until the fault is cleared.
    Faulted(FaultCause),
}

/// One pump channel's session record.
#[derive(Debug, Clone)]
pub struct PumpSession {
    pub(crate) pump: u8,
    pub(crate) state: PumpState,
    pub(crate) target_l: f64,
    pub(crate) dispensed_l: f64,
    /// Meter reading at session start; `None` until the first positive
    /// reading arrives after begin().
    pub(crate) baseline_l: Option<f64>,
    pub(crate) started_at_ms: u64,
    /// `Some` exactly while the session is paused.
    pub(crate) paused_at_ms: Option<u64>,
    pub(crate) auto_stop: bool,
    pub(crate) timeout_ms: u64,
    pub(crate) threshold_l: f64,
    pub(crate) max_flow_lpm: f64,
}

impl PumpSession {
    pub(crate) fn new(pump: u8, defaults: &SessionDefaults) -> Self {
        Self {
            pump,
            state: PumpState::Ready,
            target_l: 0.0,
            dispensed_l: 0.0,
            baseline_l: None,
            started_at_ms: 0,
            paused_at_ms: None,
            auto_stop: true,
            timeout_ms: defaults.timeout_ms,
            threshold_l: defaults.completion_threshold_l,
            max_flow_lpm: defaults.max_flow_lpm,
        }
    }

    pub(crate) fn reset(&mut self, defaults: &SessionDefaults) {
        *self = Self::new(self.pump, defaults);
    }

    /// Begin a fresh run. Policy values are captured from the engine
    /// defaults now and stay fixed for the whole run.
    pub(crate) fn begin(
        &mut self,
        target_l: f64,
        auto_stop: bool,
        now_ms: u64,
        defaults: &SessionDefaults,
    ) {
        self.state = PumpState::Dispensing;
        self.target_l = target_l;
        self.dispensed_l = 0.0;
        self.baseline_l = None;
        self.started_at_ms = now_ms;
        self.paused_at_ms = None;
        self.auto_stop = auto_stop;
        self.timeout_ms = defaults.timeout_ms;
        self.threshold_l = defaults.completion_threshold_l;
        self.max_flow_lpm = defaults.max_flow_lpm;
    }

    pub(crate) fn pause(&mut self, now_ms: u64) {
        self.state = PumpState::Paused;
        self.paused_at_ms = Some(now_ms);
    }

    /// Shift the start timestamp forward by the pause duration so completed
    /// pauses never count toward elapsed time.
    pub(crate) fn resume(&mut self, now_ms: u64) {
        if let Some(paused_at) = self.paused_at_ms.take() {
            self.started_at_ms += now_ms.saturating_sub(paused_at);
        }
        self.state = PumpState::Dispensing;
    }

    pub(crate) fn finish_ready(&mut self) {
        self.state = PumpState::Ready;
        self.paused_at_ms = None;
    }

    pub(crate) fn complete(&mut self) {
        self.state = PumpState::Complete;
    }

    pub(crate) fn fault(&mut self, cause: FaultCause) {
        self.state = PumpState::Faulted(cause);
        self.paused_at_ms = None;
    }

    /// Fold one cumulative meter reading into the session. The first
    /// positive reading after begin() becomes the baseline; the dispensed
    /// volume is relative to it and clamped at zero.
    pub(crate) fn apply_reading(&mut self, total_l: f64) {
        if !total_l.is_finite() {
            return;
        }
        if self.baseline_l.is_none() && total_l > 0.0 {
            self.baseline_l = Some(total_l);
        }
        if let Some(base) = self.baseline_l {
            self.dispensed_l = (total_l - base).max(0.0);
        }
    }

    pub(crate) fn target_reached(&self) -> bool {
        self.dispensed_l >= self.target_l - self.threshold_l
    }

    /// Elapsed dispensing time in ms. Frozen while paused, zero when Ready.
    pub(crate) fn elapsed_ms(&self, now_ms: u64) -> u64 {
        match self.state {
            PumpState::Ready => 0,
            PumpState::Paused => self
                .paused_at_ms
                .unwrap_or(now_ms)
                .saturating_sub(self.started_at_ms),
            _ => now_ms.saturating_sub(self.started_at_ms),
        }
    }

    /// Fraction of the target dispensed, clamped to [0, 1].
    pub(crate) fn progress(&self) -> f64 {
        if self.target_l <= 0.0 {
            return 0.0;
        }
        (self.dispensed_l / self.target_l).clamp(0.0, 1.0)
    }

    /// Advisory time-to-target in seconds from the average rate so far.
    /// Returns 0.0 for every degenerate input: not dispensing, no volume
    /// yet, no elapsed time, or target already reached.
    pub(crate) fn estimated_remaining_secs(&self, now_ms: u64) -> f64 {
        if self.state != PumpState::Dispensing {
            return 0.0;
        }
        let remaining = self.target_l - self.dispensed_l;
        if remaining <= 0.0 || self.dispensed_l <= 0.0 {
            return 0.0;
        }
        let elapsed_ms = self.elapsed_ms(now_ms);
        if elapsed_ms == 0 {
            return 0.0;
        }
        let rate_lpm = self.dispensed_l * 60_000.0 / elapsed_ms as f64;
        if rate_lpm <= 0.0 {
            return 0.0;
        }
        remaining / rate_lpm * 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispensing_session() -> PumpSession {
        let mut s = PumpSession::new(1, &SessionDefaults::default());
        s.begin(1.0, true, 0, &SessionDefaults::default());
        s
    }

    #[test]
    fn baseline_waits_for_first_positive_reading() {
        let mut s = dispensing_session();
        s.apply_reading(0.0);
        assert_eq!(s.baseline_l, None);
        assert_eq!(s.dispensed_l, 0.0);

        s.apply_reading(5.0);
        assert_eq!(s.baseline_l, Some(5.0));
        assert_eq!(s.dispensed_l, 0.0);

        s.apply_reading(7.2);
        assert!((s.dispensed_l - 2.2).abs() < 1e-9);
    }

    #[test]
    fn baseline_is_captured_once() {
        let mut s = dispensing_session();
        s.apply_reading(3.0);
        s.apply_reading(9.0);
        assert_eq!(s.baseline_l, Some(3.0));
    }

    #[test]
    fn dispensed_clamps_below_baseline() {
        let mut s = dispensing_session();
        s.apply_reading(5.0);
        s.apply_reading(4.8);
        assert_eq!(s.dispensed_l, 0.0);
    }

    #[test]
    fn non_finite_readings_are_ignored() {
        let mut s = dispensing_session();
        s.apply_reading(5.0);
        s.apply_reading(6.0);
        s.apply_reading(f64::NAN);
        s.apply_reading(f64::INFINITY);
        assert!((s.dispensed_l - 1.0).abs() < 1e-9);
    }

    #[test]
    fn elapsed_is_zero_when_ready_and_frozen_when_paused() {
        let mut s = PumpSession::new(1, &SessionDefaults::default());
        assert_eq!(s.elapsed_ms(5_000), 0);

        s.begin(1.0, true, 1_000, &SessionDefaults::default());
        assert_eq!(s.elapsed_ms(4_000), 3_000);

        s.pause(4_000);
        assert_eq!(s.elapsed_ms(9_000), 3_000);
    }

    #[test]
    fn resume_excludes_the_paused_interval() {
        let mut s = PumpSession::new(1, &SessionDefaults::default());
        s.begin(1.0, true, 0, &SessionDefaults::default());
        s.pause(10_000);
        s.resume(40_000);
        assert_eq!(s.elapsed_ms(50_000), 20_000);
        assert_eq!(s.paused_at_ms, None);
    }

    #[test]
    fn progress_clamps_to_unit_interval() {
        let mut s = dispensing_session();
        assert_eq!(s.progress(), 0.0);
        s.apply_reading(1.0);
        s.apply_reading(1.5);
        assert!((s.progress() - 0.5).abs() < 1e-9);
        s.apply_reading(4.0);
        assert_eq!(s.progress(), 1.0);
    }

    #[test]
    fn eta_reflects_average_rate() {
        let mut s = dispensing_session();
        s.begin(2.0, true, 0, &SessionDefaults::default());
        s.apply_reading(1.0);
        s.apply_reading(2.0); // 1.0 L dispensed
        // 1.0 L over 60 s is 1 L/min; 1.0 L remains.
        assert!((s.estimated_remaining_secs(60_000) - 60.0).abs() < 1e-6);
    }

    #[test]
    fn eta_is_zero_on_degenerate_inputs() {
        let mut s = dispensing_session();
        // No volume yet.
        assert_eq!(s.estimated_remaining_secs(60_000), 0.0);
        // No elapsed time.
        s.apply_reading(1.0);
        s.apply_reading(1.5);
        assert_eq!(s.estimated_remaining_secs(0), 0.0);
        // Target reached.
        s.apply_reading(3.0);
        assert_eq!(s.estimated_remaining_secs(60_000), 0.0);
        // Not dispensing.
        s.complete();
        assert_eq!(s.estimated_remaining_secs(60_000), 0.0);
    }
}
