//! Session lifecycle events and the observer boundary.
//!
//! The engine reports transitions through an optional [`EventSink`].
//! Delivery is fire-and-forget: a slow, full, or absent sink never changes
//! engine behavior.

use crate::error::FaultCause;

/// Lifecycle notification for one pump channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    Started { pump: u8, target_l: f64 },
    Stopped { pump: u8, dispensed_l: f64 },
    Paused { pump: u8 },
    Resumed { pump: u8 },
    Completed { pump: u8, dispensed_l: f64 },
    Faulted { pump: u8, cause: FaultCause },
    FaultCleared { pump: u8 },
    /// All channels were forced down; follows the per-channel `Faulted`
    /// notifications of the sweep.
    EmergencyStop,
}

/// Receiver side of engine notifications. Implementations must not block.
pub trait EventSink {
    fn on_event(&mut self, event: EngineEvent);
}

/// Sink that forwards events over a bounded crossbeam channel so a
/// reporting layer can consume them on its own schedule. Events are
/// dropped when the channel is full or disconnected.
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<EngineEvent>,
}

impl ChannelSink {
    pub fn bounded(cap: usize) -> (Self, crossbeam_channel::Receiver<EngineEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(cap);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_event(&mut self, event: EngineEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::debug!(error = %e, "event channel unavailable; dropping event");
        }
    }
}
