#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the dispensing station.
//!
//! `Config` and its sub-structs are deserialized from TOML and validated.
//! Every table has working defaults, so an empty file (or no file at all)
//! yields a usable two-pump configuration.
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StationCfg {
    /// Number of pump channels, numbered 1..=pumps.
    pub pumps: u8,
    /// Optional display labels, one per pump when non-empty.
    pub labels: Vec<String>,
}

impl Default for StationCfg {
    fn default() -> Self {
        Self {
            pumps: 2,
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SessionCfg {
    /// Max elapsed dispensing time before a session faults. Also accepts
    /// alias "dispense_timeout_ms".
    #[serde(alias = "dispense_timeout_ms")]
    pub timeout_ms: u64,
    /// Volume tolerance around the target for auto-stop completion.
    pub completion_threshold_l: f64,
    /// Ceiling for future over-rate detection; not enforced yet.
    pub max_flow_lpm: f64,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            completion_threshold_l: 0.01,
            max_flow_lpm: 5.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FeedCfg {
    /// Meter polling rate for the tick driver.
    pub poll_rate_hz: u32,
    /// Max time to wait on a single meter read before skipping the tick.
    pub read_timeout_ms: u64,
}

impl Default for FeedCfg {
    fn default() -> Self {
        Self {
            poll_rate_hz: 10,
            read_timeout_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub station: StationCfg,
    pub session: SessionCfg,
    pub feed: FeedCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Station
        if self.station.pumps == 0 {
            eyre::bail!("station.pumps must be >= 1");
        }
        if self.station.pumps > 8 {
            eyre::bail!("station.pumps is unreasonably large (>8)");
        }
        if !self.station.labels.is_empty() && self.station.labels.len() != self.station.pumps as usize
        {
            eyre::bail!(
                "station.labels must have one entry per pump ({} pumps, {} labels)",
                self.station.pumps,
                self.station.labels.len()
            );
        }

        // Session
        if self.session.timeout_ms == 0 {
            eyre::bail!("session.timeout_ms must be >= 1");
        }
        if self.session.timeout_ms > 24 * 60 * 60 * 1000 {
            eyre::bail!("session.timeout_ms is unreasonably large (>24h)");
        }
        if !self.session.completion_threshold_l.is_finite()
            || self.session.completion_threshold_l < 0.0
        {
            eyre::bail!("session.completion_threshold_l must be finite and >= 0.0");
        }
        if self.session.completion_threshold_l > 1.0 {
            eyre::bail!("session.completion_threshold_l is unreasonably large (>1 L)");
        }
        if !self.session.max_flow_lpm.is_finite() || self.session.max_flow_lpm <= 0.0 {
            eyre::bail!("session.max_flow_lpm must be finite and > 0.0");
        }

        // Feed
        if self.feed.poll_rate_hz == 0 {
            eyre::bail!("feed.poll_rate_hz must be > 0");
        }
        if self.feed.poll_rate_hz > 100 {
            eyre::bail!("feed.poll_rate_hz is unreasonably fast (>100 Hz)");
        }
        if self.feed.read_timeout_ms == 0 {
            eyre::bail!("feed.read_timeout_ms must be >= 1");
        }

        // Logging: rotation strings are parsed leniently by the CLI

        Ok(())
    }
}
