//! Game automation for NGU Idle.
//!
//! This module provides:
//! - The session (window, calibrated origin, OS backends) and input seam
//! - The game action library (`GameActions`)
//! - A pausable executor and the step-driven routines built on it
//! - Progress events, lifetime metrics and the operator controller

pub mod actions;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod input;
pub mod itopod;
pub mod metrics;
pub mod options;
pub mod progress;
pub mod questing;
pub mod routine;
pub mod runner;
pub mod session;
pub mod speedrun;

pub use config::{get_config, init_config, AutomationConfig};
pub use routine::RoutineKind;
pub use runner::{ControlHandle, Connector, Controller, ControllerStatus};
pub use session::Backends;
