//! Pixel sampling and region capture.
//!
//! `ScreenSampler` is the seam between the perception code and the OS. The
//! colour search is implemented once, on top of `region`, so every backend
//! scans in the same row-major order.

use anyhow::Result;
use image::{ImageBuffer, Rgba};

use super::geometry::{Color, Point, Rect};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// A rectangle of the screen and its pixels at the time of capture.
///
/// Never cached: the game redraws continuously, so every read captures anew.
#[derive(Clone, Debug)]
pub struct CapturedRegion {
    /// Absolute screen rectangle the pixels were taken from
    pub rect: Rect,
    pub image: RgbaImage,
}

impl CapturedRegion {
    pub fn new(rect: Rect, image: RgbaImage) -> Self {
        Self { rect, image }
    }

    /// Colour at an absolute screen point, if the point lies inside the capture.
    pub fn color_at(&self, at: Point) -> Option<Color> {
        if !self.rect.contains(at) {
            return None;
        }
        let x = (at.x - self.rect.x) as u32;
        let y = (at.y - self.rect.y) as u32;
        if x >= self.image.width() || y >= self.image.height() {
            return None;
        }
        let p = self.image.get_pixel(x, y);
        Some(Color::rgb(p[0], p[1], p[2]))
    }

    /// First pixel (row-major from the top-left) within `tolerance` of `target`.
    ///
    /// Returns the absolute screen position of the match.
    pub fn find_color(&self, target: Color, tolerance: u8) -> Option<Point> {
        for y in 0..self.image.height() {
            for x in 0..self.image.width() {
                let p = self.image.get_pixel(x, y);
                if Color::rgb(p[0], p[1], p[2]).matches(target, tolerance) {
                    return Some(Point::new(self.rect.x + x as i32, self.rect.y + y as i32));
                }
            }
        }
        None
    }
}

/// Reads pixels from the screen. All coordinates are absolute.
pub trait ScreenSampler: Send {
    /// Colour of a single screen pixel.
    fn pixel_at(&self, at: Point) -> Result<Color>;

    /// Captures a rectangle of the screen.
    fn region(&self, rect: Rect) -> Result<CapturedRegion>;

    /// Scans `area` row-major for the first pixel within `tolerance` of `target`.
    ///
    /// `Ok(None)` means the rectangle was exhausted without a match. No retry
    /// happens here; polling is the caller's decision.
    fn search_color(&self, target: Color, area: Rect, tolerance: u8) -> Result<Option<Point>> {
        if area.is_empty() {
            return Ok(None);
        }
        let captured = self.region(area)?;
        Ok(captured.find_color(target, tolerance))
    }
}

#[cfg(windows)]
pub use gdi::GdiScreen;

#[cfg(windows)]
mod gdi {
    use anyhow::{anyhow, Result};
    use image::{ImageBuffer, Rgba};

    use windows::Win32::Foundation::HWND;
    use windows::Win32::Graphics::Gdi::{
        BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC,
        GetDIBits, GetPixel, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
        DIB_RGB_COLORS, HGDIOBJ, SRCCOPY,
    };

    use super::{CapturedRegion, ScreenSampler};
    use crate::capture::geometry::{Color, Point, Rect};

    /// Samples the desktop through GDI.
    ///
    /// Reads what is actually composited on screen, so the game window must be
    /// visible and not covered at the sampled positions.
    #[derive(Debug, Default)]
    pub struct GdiScreen;

    impl ScreenSampler for GdiScreen {
        fn pixel_at(&self, at: Point) -> Result<Color> {
            unsafe {
                let screen_dc = GetDC(HWND::default());
                let value = GetPixel(screen_dc, at.x, at.y);
                ReleaseDC(HWND::default(), screen_dc);

                // CLR_INVALID: point outside the clipping region
                if value.0 == u32::MAX {
                    return Err(anyhow!("Pixel ({}, {}) is off screen", at.x, at.y));
                }
                // COLORREF layout: 0x00BBGGRR
                let raw = value.0;
                Ok(Color::rgb(
                    (raw & 0xFF) as u8,
                    ((raw >> 8) & 0xFF) as u8,
                    ((raw >> 16) & 0xFF) as u8,
                ))
            }
        }

        fn region(&self, rect: Rect) -> Result<CapturedRegion> {
            if rect.is_empty() {
                return Err(anyhow!("Cannot capture empty region {:?}", rect));
            }
            let width = rect.width as i32;
            let height = rect.height as i32;

            unsafe {
                let screen_dc = GetDC(HWND::default());
                let mem_dc = CreateCompatibleDC(screen_dc);
                let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
                let previous = SelectObject(mem_dc, HGDIOBJ(bitmap.0));

                let blit = BitBlt(mem_dc, 0, 0, width, height, screen_dc, rect.x, rect.y, SRCCOPY);

                let mut info = BITMAPINFO {
                    bmiHeader: BITMAPINFOHEADER {
                        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: width,
                        // Negative height = top-down rows
                        biHeight: -height,
                        biPlanes: 1,
                        biBitCount: 32,
                        biCompression: BI_RGB.0,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let mut bgra = vec![0u8; (width * height * 4) as usize];
                let lines = GetDIBits(
                    mem_dc,
                    bitmap,
                    0,
                    height as u32,
                    Some(bgra.as_mut_ptr() as *mut _),
                    &mut info,
                    DIB_RGB_COLORS,
                );

                SelectObject(mem_dc, previous);
                let _ = DeleteObject(HGDIOBJ(bitmap.0));
                let _ = DeleteDC(mem_dc);
                ReleaseDC(HWND::default(), screen_dc);

                blit.map_err(|e| anyhow!("BitBlt failed: {}", e))?;
                if lines == 0 {
                    return Err(anyhow!("GetDIBits returned no rows for {:?}", rect));
                }

                // BGRA -> RGBA
                let mut img: ImageBuffer<Rgba<u8>, Vec<u8>> =
                    ImageBuffer::new(rect.width, rect.height);
                for (i, px) in bgra.chunks_exact(4).enumerate() {
                    let x = (i as u32) % rect.width;
                    let y = (i as u32) / rect.width;
                    img.put_pixel(x, y, Rgba([px[2], px[1], px[0], 255]));
                }

                Ok(CapturedRegion::new(rect, img))
            }
        }
    }
}
