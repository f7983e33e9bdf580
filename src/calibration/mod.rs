//! Calibration of the game's on-screen coordinate frame.
//!
//! - `origin`: landmark search that yields the session's `Origin`
//! - `coords`: fixed game-relative offsets of buttons and text regions

pub mod coords;
pub mod origin;

pub use origin::{calibrate, Landmark, Origin};
