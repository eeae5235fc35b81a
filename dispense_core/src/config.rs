//! Engine-side session policy, bridged from `dispense_config`.

/// Per-session policy. The engine holds one copy as its defaults; each
/// session captures the values at start and keeps them for the whole run,
/// so setter changes only affect sessions started afterwards.
#[derive(Debug, Clone, Copy)]
pub struct SessionDefaults {
    /// Max elapsed dispensing time before the session faults.
    pub timeout_ms: u64,
    /// Volume tolerance around the target for auto-stop completion.
    pub completion_threshold_l: f64,
    /// Ceiling for future over-rate detection; not enforced yet.
    pub max_flow_lpm: f64,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            completion_threshold_l: 0.01,
            max_flow_lpm: 5.0,
        }
    }
}

impl From<&dispense_config::SessionCfg> for SessionDefaults {
    fn from(c: &dispense_config::SessionCfg) -> Self {
        Self {
            timeout_ms: c.timeout_ms,
            completion_threshold_l: c.completion_threshold_l,
            max_flow_lpm: c.max_flow_lpm,
        }
    }
}
