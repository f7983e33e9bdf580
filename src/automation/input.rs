//! Mouse and keyboard input synthesis.
//!
//! All coordinates given to an `InputDriver` are absolute screen positions;
//! the session resolves game-relative offsets through the origin first.
//! Inputs go to whatever window has focus. Nothing here checks that the game
//! is foregrounded, so callers activate the window before input-heavy work.
//! There is no settle delay either: waiting for the game's UI to catch up is
//! the caller's job.

use anyhow::Result;

use crate::capture::Point;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// A single key press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    /// Letter, digit or other printable character (game hotkeys are letters)
    Char(char),
    Enter,
    Escape,
    Backspace,
}

/// Synthesizes OS input.
pub trait InputDriver: Send {
    fn click(&self, at: Point, button: MouseButton) -> Result<()>;
    /// Left-button drag from one point to another.
    fn drag(&self, from: Point, to: Point) -> Result<()>;
    /// Types text as unicode key events.
    fn send_text(&self, text: &str) -> Result<()>;
    fn send_key(&self, key: Key) -> Result<()>;
}

#[cfg(windows)]
pub use send_input::SendInputDriver;

#[cfg(windows)]
mod send_input {
    use anyhow::{anyhow, Result};
    use std::time::Duration;

    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
        KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN,
        MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP,
        MOUSE_EVENT_FLAGS, MOUSEINPUT, VIRTUAL_KEY, VK_BACK, VK_ESCAPE, VK_RETURN,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

    use super::{InputDriver, Key, MouseButton};
    use crate::capture::Point;

    /// Gap between press and release so the game registers the click.
    const PRESS_GAP: Duration = Duration::from_millis(20);

    /// Hardware-level input through `SendInput`.
    ///
    /// Moves the real cursor. The game reads raw input, so window messages
    /// (PostMessage) are not an option.
    #[derive(Debug, Default)]
    pub struct SendInputDriver;

    /// Normalizes a screen point to the 0-65535 range MOUSEEVENTF_ABSOLUTE expects.
    fn normalize(at: Point) -> (i32, i32) {
        let screen_width = unsafe { GetSystemMetrics(SM_CXSCREEN) }.max(1);
        let screen_height = unsafe { GetSystemMetrics(SM_CYSCREEN) }.max(1);
        let norm_x = ((at.x as i64 * 65535) / screen_width as i64) as i32;
        let norm_y = ((at.y as i64 * 65535) / screen_height as i64) as i32;
        (norm_x, norm_y)
    }

    fn mouse_input(at: Point, flags: MOUSE_EVENT_FLAGS) -> INPUT {
        let (dx, dy) = normalize(at);
        INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx,
                    dy,
                    dwFlags: flags | MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE,
                    ..Default::default()
                },
            },
        }
    }

    fn key_input(vk: VIRTUAL_KEY, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: vk,
                    wScan: scan,
                    dwFlags: flags,
                    ..Default::default()
                },
            },
        }
    }

    fn send(inputs: &[INPUT]) -> Result<()> {
        let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            return Err(anyhow!(
                "SendInput inserted {}/{} events (blocked by another process?)",
                sent,
                inputs.len()
            ));
        }
        Ok(())
    }

    fn virtual_key(key: Key) -> Option<VIRTUAL_KEY> {
        match key {
            Key::Enter => Some(VK_RETURN),
            Key::Escape => Some(VK_ESCAPE),
            Key::Backspace => Some(VK_BACK),
            // Letters and digits share their uppercase ASCII value with the VK code
            Key::Char(c) if c.is_ascii_alphanumeric() => {
                Some(VIRTUAL_KEY(c.to_ascii_uppercase() as u16))
            }
            Key::Char(_) => None,
        }
    }

    impl InputDriver for SendInputDriver {
        fn click(&self, at: Point, button: MouseButton) -> Result<()> {
            let (down, up) = match button {
                MouseButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
                MouseButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
            };
            send(&[mouse_input(at, MOUSE_EVENT_FLAGS(0))])?;
            send(&[mouse_input(at, down)])?;
            std::thread::sleep(PRESS_GAP);
            send(&[mouse_input(at, up)])
        }

        fn drag(&self, from: Point, to: Point) -> Result<()> {
            send(&[mouse_input(from, MOUSE_EVENT_FLAGS(0))])?;
            send(&[mouse_input(from, MOUSEEVENTF_LEFTDOWN)])?;
            std::thread::sleep(PRESS_GAP);
            send(&[mouse_input(to, MOUSE_EVENT_FLAGS(0))])?;
            std::thread::sleep(PRESS_GAP);
            send(&[mouse_input(to, MOUSEEVENTF_LEFTUP)])
        }

        fn send_text(&self, text: &str) -> Result<()> {
            for unit in text.encode_utf16() {
                send(&[
                    key_input(VIRTUAL_KEY(0), unit, KEYEVENTF_UNICODE),
                    key_input(VIRTUAL_KEY(0), unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP),
                ])?;
            }
            Ok(())
        }

        fn send_key(&self, key: Key) -> Result<()> {
            match virtual_key(key) {
                Some(vk) => {
                    send(&[key_input(vk, 0, KEYBD_EVENT_FLAGS(0))])?;
                    std::thread::sleep(PRESS_GAP);
                    send(&[key_input(vk, 0, KEYEVENTF_KEYUP)])
                }
                None => match key {
                    Key::Char(c) => self.send_text(&c.to_string()),
                    _ => Ok(()),
                },
            }
        }
    }
}
