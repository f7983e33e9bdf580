//! The automation session: one game window, one calibrated origin, and the
//! backends that read from and write to it.
//!
//! Everything that needs the origin or the window handle gets it from here;
//! there is no process-wide coordinate state.

use anyhow::{anyhow, Result};

use crate::automation::config::AutomationConfig;
use crate::automation::input::{InputDriver, Key, MouseButton};
use crate::calibration::{calibrate, Landmark, Origin};
use crate::capture::{CapturedRegion, Color, Point, Rect, ScreenSampler, WindowHandle, WindowLocator};
use crate::ocr::TextReader;

/// OS-facing implementations a session is built from.
pub struct Backends {
    pub locator: Box<dyn WindowLocator>,
    pub screen: Box<dyn ScreenSampler>,
    pub input: Box<dyn InputDriver>,
    pub reader: Box<dyn TextReader>,
}

pub struct Session {
    window: WindowHandle,
    origin: Origin,
    landmark: Landmark,
    tolerance: u8,
    locator: Box<dyn WindowLocator>,
    screen: Box<dyn ScreenSampler>,
    input: Box<dyn InputDriver>,
    reader: Box<dyn TextReader>,
}

impl Session {
    /// Finds the game window, brings it to the front and calibrates the origin.
    ///
    /// Fails with "not found" when no window title matches, and with
    /// "game not found" when the window exists but the landmark is not visible.
    pub fn connect(config: &AutomationConfig, backends: Backends) -> Result<Session> {
        let Backends {
            locator,
            screen,
            input,
            reader,
        } = backends;

        let window = locator.find(&config.window_title)?.ok_or_else(|| {
            anyhow!(
                "Game window not found (no window title contains {:?})",
                config.window_title
            )
        })?;
        crate::log(&format!("Window detected: {}", window));

        locator.activate(&window);

        let landmark = Landmark {
            color: config.landmark_color,
            search_area: config.calibration_area,
            tolerance: config.color_tolerance,
        };
        let origin = calibrate(screen.as_ref(), &landmark)?;

        Ok(Session {
            window,
            origin,
            landmark,
            tolerance: config.color_tolerance,
            locator,
            screen,
            input,
            reader,
        })
    }

    pub fn window(&self) -> &WindowHandle {
        &self.window
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Re-runs calibration, e.g. after the window moved.
    pub fn recalibrate(&mut self) -> Result<Origin> {
        self.locator.activate(&self.window);
        self.origin = calibrate(self.screen.as_ref(), &self.landmark)?;
        Ok(self.origin)
    }

    /// Lazy staleness check for the window handle.
    pub fn window_alive(&self) -> bool {
        self.locator.is_alive(&self.window)
    }

    pub fn activate(&self) {
        self.locator.activate(&self.window);
    }

    pub fn click(&self, offset: Point) -> Result<()> {
        self.input.click(self.origin.resolve(offset), MouseButton::Left)
    }

    pub fn right_click(&self, offset: Point) -> Result<()> {
        self.input.click(self.origin.resolve(offset), MouseButton::Right)
    }

    pub fn send_text(&self, text: &str) -> Result<()> {
        self.input.send_text(text)
    }

    pub fn send_key(&self, key: Key) -> Result<()> {
        self.input.send_key(key)
    }

    pub fn pixel(&self, offset: Point) -> Result<Color> {
        self.screen.pixel_at(self.origin.resolve(offset))
    }

    /// Whether the pixel at `offset` matches `color` within the configured tolerance.
    pub fn pixel_matches(&self, offset: Point, color: Color) -> Result<bool> {
        Ok(self.pixel(offset)?.matches(color, self.tolerance))
    }

    pub fn capture(&self, rect: Rect) -> Result<CapturedRegion> {
        self.screen.region(self.origin.resolve_rect(rect))
    }

    /// Captures a game-relative rectangle and runs OCR over it.
    pub fn read_text(&self, rect: Rect) -> Result<String> {
        let region = self.capture(rect)?;
        self.reader.read(&region)
    }
}
