//! Error kinds that callers branch on.
//!
//! Backend and startup code uses `anyhow`; these two enums exist where the
//! caller has to tell cancellation from a bounded failure, or report a control
//! problem to the operator.

use std::time::Duration;
use thiserror::Error;

/// Outcome of a failed game action or routine step.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The operator stopped the routine. Not a failure.
    #[error("stopped by operator")]
    Stopped,

    /// A poll never saw the expected state.
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    /// A convergence loop gave up.
    #[error("{what} did not converge after {attempts} attempts")]
    NotConverged { what: String, attempts: u32 },

    /// The screen was read but did not show anything the routine knows.
    #[error("unrecognised {0}")]
    Unrecognised(String),

    /// Backend error (capture, input, OCR process, closed window)
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ActionError {
    /// Soft failures abort the current cycle but not the session.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NotConverged { .. } | Self::Unrecognised(_)
        )
    }
}

pub type ActionResult<T> = Result<T, ActionError>;

/// Problems reported to the operator by the control surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("a routine is already running")]
    AlreadyRunning,
    #[error("no routine is running")]
    NotRunning,
    #[error("not connected to the game (use retry detection)")]
    NotConnected,
    #[error("cannot {event} while {state}")]
    InvalidTransition { state: String, event: String },
    #[error("routine did not reach an action boundary within {0:?}; not paused")]
    PauseTimeout(Duration),
    #[error("routine did not stop within {0:?}")]
    StopTimeout(Duration),
}
