pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Cumulative-volume flow meter. Readings are liters since power-on and
/// never decrease; sessions subtract their own baseline.
pub trait FlowMeter {
    fn total_volume(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;
}

/// On/off actuator bank addressed by channel number. Implementations map
/// the channel to a physical output; both calls must be idempotent.
pub trait Actuator {
    fn activate(&mut self, channel: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn deactivate(&mut self, channel: u8)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
