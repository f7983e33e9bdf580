//! Window discovery and activation for the game window.

use anyhow::Result;
use std::fmt;

/// Opaque reference to the game's top-level window.
///
/// Stored as a raw integer so it can cross thread boundaries; OS handles are
/// valid on any thread. A closed window is only noticed on next use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowHandle {
    pub raw: isize,
    /// Full title of the matched window
    pub title: String,
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" ({:#x})", self.title, self.raw)
    }
}

/// Finds and activates the game window.
pub trait WindowLocator: Send {
    /// First top-level window whose title contains `title_substring`
    /// (case-insensitive), or `None`.
    ///
    /// Never retries on its own: a retry is an operator decision, so a
    /// relaunched game is not picked up behind the operator's back.
    fn find(&self, title_substring: &str) -> Result<Option<WindowHandle>>;

    /// Restores and foregrounds the window. A stale handle is a silent no-op.
    fn activate(&self, handle: &WindowHandle);

    /// Whether the handle still refers to an existing window.
    fn is_alive(&self, handle: &WindowHandle) -> bool;
}

/// Case-insensitive substring match used by every locator.
pub fn title_matches(title: &str, title_substring: &str) -> bool {
    !title.is_empty() && title.to_lowercase().contains(&title_substring.to_lowercase())
}

#[cfg(windows)]
pub use win32::Win32Locator;

#[cfg(windows)]
mod win32 {
    use anyhow::Result;
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;

    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, TRUE};
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowTextLengthW, GetWindowTextW, IsWindow, IsWindowVisible,
        SetForegroundWindow, ShowWindow, SW_RESTORE,
    };

    use super::{title_matches, WindowHandle, WindowLocator};

    /// Locates windows through `EnumWindows`.
    #[derive(Debug, Default)]
    pub struct Win32Locator;

    fn to_hwnd(handle: &WindowHandle) -> HWND {
        HWND(handle.raw as *mut std::ffi::c_void)
    }

    impl WindowLocator for Win32Locator {
        fn find(&self, title_substring: &str) -> Result<Option<WindowHandle>> {
            struct EnumData<'a> {
                needle: &'a str,
                found: Option<WindowHandle>,
            }

            unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
                unsafe {
                    let data = &mut *(lparam.0 as *mut EnumData);

                    if !IsWindowVisible(hwnd).as_bool() {
                        return TRUE;
                    }

                    let title_len = GetWindowTextLengthW(hwnd);
                    if title_len <= 0 {
                        return TRUE;
                    }
                    let mut title_buf: Vec<u16> = vec![0; (title_len + 1) as usize];
                    let copied = GetWindowTextW(hwnd, &mut title_buf);
                    let title = OsString::from_wide(&title_buf[..copied.max(0) as usize])
                        .to_string_lossy()
                        .to_string();

                    if title_matches(&title, data.needle) {
                        crate::log(&format!("  matched window \"{}\"", title));
                        data.found = Some(WindowHandle {
                            raw: hwnd.0 as isize,
                            title,
                        });
                        return BOOL(0); // Stop enumeration
                    }

                    TRUE
                }
            }

            crate::log(&format!(
                "Searching for window with title containing \"{}\"...",
                title_substring
            ));
            let mut data = EnumData {
                needle: title_substring,
                found: None,
            };
            unsafe {
                // EnumWindows reports FALSE when the callback stops it early,
                // which is the success path here
                let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
            }

            Ok(data.found)
        }

        fn activate(&self, handle: &WindowHandle) {
            let hwnd = to_hwnd(handle);
            unsafe {
                let _ = ShowWindow(hwnd, SW_RESTORE);
                let _ = SetForegroundWindow(hwnd);
            }
        }

        fn is_alive(&self, handle: &WindowHandle) -> bool {
            unsafe { IsWindow(to_hwnd(handle)).as_bool() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLocator;

    #[test]
    fn test_title_matches_case_insensitive() {
        assert!(title_matches("NGU Idle", "ngu idle"));
        assert!(title_matches("Play NGU IDLE - Kongregate", "ngu idle"));
        assert!(!title_matches("Notepad", "ngu idle"));
        assert!(!title_matches("", ""));
    }

    #[test]
    fn test_find_first_match() {
        let locator = FakeLocator::with_titles(&["Explorer", "NGU Idle", "ngu idle (2)"]);
        let found = locator.find("NGU IDLE").unwrap().unwrap();
        assert_eq!(found.title, "NGU Idle");
    }

    #[test]
    fn test_find_not_found() {
        let locator = FakeLocator::with_titles(&["Explorer"]);
        assert!(locator.find("ngu idle").unwrap().is_none());
    }
}
