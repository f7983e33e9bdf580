//! Screen perception for the game window.
//!
//! This module provides:
//! - Window discovery and activation (`WindowLocator`)
//! - Pixel sampling, region capture and colour search (`ScreenSampler`)
//! - Geometry and colour primitives

pub mod geometry;
pub mod screen;
pub mod window;

pub use geometry::{Color, Point, Rect};
pub use screen::{CapturedRegion, RgbaImage, ScreenSampler};
pub use window::{WindowHandle, WindowLocator};

#[cfg(windows)]
pub use screen::GdiScreen;
#[cfg(windows)]
pub use window::Win32Locator;
