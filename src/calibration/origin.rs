//! Game origin calibration from a colour landmark.
//!
//! The game's top-left corner is drawn in a fixed colour. Finding the first
//! pixel of that colour inside a bounding box gives the origin, and every
//! coordinate the automation uses is a fixed offset from it.

use anyhow::{anyhow, Result};
use std::fmt;

use crate::capture::{Color, Point, Rect, ScreenSampler};

/// Screen position of the game's logical top-left pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Origin {
    pub x: i32,
    pub y: i32,
}

impl Origin {
    /// Maps a game-relative offset to an absolute screen point.
    pub fn resolve(&self, offset: Point) -> Point {
        Point::new(self.x + offset.x, self.y + offset.y)
    }

    /// Maps a game-relative rectangle to an absolute screen rectangle.
    pub fn resolve_rect(&self, rect: Rect) -> Rect {
        rect.translate(Point::new(self.x, self.y))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Where and what to search for.
#[derive(Clone, Copy, Debug)]
pub struct Landmark {
    pub color: Color,
    /// Bounding box that contains the landmark for any supported window position
    pub search_area: Rect,
    pub tolerance: u8,
}

/// Locates the landmark and returns the game origin.
///
/// Must run before any coordinate-relative action, and again whenever the
/// window moves or resizes; movement is not detected here.
pub fn calibrate(screen: &dyn ScreenSampler, landmark: &Landmark) -> Result<Origin> {
    crate::log(&format!(
        "Calibrating: searching for {} in {:?}",
        landmark.color, landmark.search_area
    ));

    match screen.search_color(landmark.color, landmark.search_area, landmark.tolerance)? {
        Some(p) => {
            let origin = Origin { x: p.x, y: p.y };
            crate::log(&format!("Game detected at: {}", origin));
            Ok(origin)
        }
        None => Err(anyhow!(
            "Window detected, but game not found (no {} pixel in {:?})",
            landmark.color,
            landmark.search_area
        )),
    }
}
