#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Volume-limited dispensing control (hardware-agnostic).
//!
//! This crate provides the hardware-independent dispensing engine. All
//! hardware interactions go through the `dispense_traits::Actuator` and
//! `dispense_traits::FlowMeter` traits.
//!
//! ## Architecture
//!
//! - **Sessions**: per-pump volume and timing bookkeeping (`session` module)
//! - **Engine**: command surface and tick-driven state machine (`engine` module)
//! - **Events**: state-change notifications for observers (`events` module)
//! - **Runner**: polling loop that feeds meter readings in (`runner` module)
//! - **Mocks**: recording doubles and a simulated rig (`mocks` module)
//!
//! ## Volume accounting
//!
//! The flow meter reports one cumulative total in liters. Each session
//! subtracts the baseline captured at its first positive reading, so a run
//! only counts what flowed after it started.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod mocks;
pub mod runner;
pub mod session;

pub use config::SessionDefaults;
pub use engine::{DispensingEngine, EngineBuilder};
pub use error::{BuildError, CommandError, FaultCause, Report, Result};
pub use events::{ChannelSink, EngineEvent, EventSink};
pub use runner::{RunOutcome, run_to_end};
pub use session::PumpState;
