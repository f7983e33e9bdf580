//! NGU Idle Automation
//!
//! A Windows system tray application that drives the NGU Idle game window:
//! speedrun rebirths, ITOPOD sniping and questing, controlled through global
//! hotkeys and the tray menu.

// Hide console window on Windows for GUI mode
#![windows_subsystem = "windows"]

mod automation;
mod calibration;
mod capture;
mod ocr;
mod paths;
#[cfg(test)]
mod testing;

use anyhow::Result;
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

const LOG_FILE: &str = "ngu_automation.log";

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join(LOG_FILE);
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(line.as_bytes());
    }
}

fn main() -> Result<()> {
    // Set up panic hook to log panics
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        let log_msg = format!("[PANIC]{} {}\n", location, msg);
        eprintln!("{}", log_msg);
        let log_path = paths::get_logs_dir().join(LOG_FILE);
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = file.write_all(log_msg.as_bytes());
        }
    }));

    // Ensure output directories exist
    paths::ensure_directories()?;

    // Load configuration
    automation::init_config();

    run_tray_app()
}

#[cfg(not(windows))]
fn run_tray_app() -> Result<()> {
    log("NGU Idle Automation drives the game through Win32 and only runs on Windows");
    Err(anyhow::anyhow!("unsupported platform"))
}

#[cfg(windows)]
fn run_tray_app() -> Result<()> {
    tray::run()
}

#[cfg(windows)]
mod tray {
    use anyhow::{anyhow, Result};
    use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
    use std::thread;

    use windows::core::w;
    use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, POINT, WPARAM};
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT,
    };
    use windows::Win32::UI::Shell::{
        Shell_NotifyIconW, NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NOTIFYICONDATAW,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        CreatePopupMenu, CreateWindowExW, DefWindowProcW, DestroyMenu, DestroyWindow,
        DispatchMessageW, GetCursorPos, GetMessageW, InsertMenuW, LoadIconW, PostQuitMessage,
        RegisterClassW, SetForegroundWindow, TrackPopupMenu, TranslateMessage, CS_HREDRAW,
        CS_VREDRAW, CW_USEDEFAULT, IDI_APPLICATION, MF_BYPOSITION, MF_SEPARATOR, MF_STRING, MSG,
        TPM_BOTTOMALIGN, TPM_LEFTALIGN, TPM_RIGHTBUTTON, WM_COMMAND, WM_DESTROY, WM_HOTKEY,
        WM_LBUTTONDBLCLK, WM_RBUTTONUP, WM_USER, WNDCLASSW, WS_OVERLAPPEDWINDOW,
    };

    use crate::automation::clock::SystemClock;
    use crate::automation::error::ControlError;
    use crate::automation::executor::ScriptState;
    use crate::automation::input::SendInputDriver;
    use crate::automation::{
        get_config, AutomationConfig, Backends, ControlHandle, Connector, Controller, RoutineKind,
    };
    use crate::capture::{GdiScreen, Win32Locator};
    use crate::ocr::{ensure_tesseract, TesseractReader};
    use crate::{log, paths};

    const HOTKEY_SPEEDRUN: i32 = 1;
    const HOTKEY_ITOPOD: i32 = 2;
    const HOTKEY_QUESTING: i32 = 3;
    const HOTKEY_PAUSE: i32 = 4;
    const HOTKEY_STOP: i32 = 5;
    const HOTKEY_RETRY: i32 = 6;
    const WM_TRAYICON: u32 = WM_USER + 1;

    // Menu item IDs
    const MENU_SPEEDRUN: usize = 1001;
    const MENU_ITOPOD: usize = 1002;
    const MENU_QUESTING: usize = 1003;
    const MENU_PAUSE: usize = 1004;
    const MENU_STOP: usize = 1005;
    const MENU_RETRY: usize = 1006;
    const MENU_EXIT: usize = 1007;

    /// (id, virtual key, description)
    const HOTKEYS: [(i32, u32, &str); 6] = [
        (HOTKEY_SPEEDRUN, 0x52, "Ctrl+Shift+R (speedrun)"),
        (HOTKEY_ITOPOD, 0x49, "Ctrl+Shift+I (ITOPOD)"),
        (HOTKEY_QUESTING, 0x55, "Ctrl+Shift+U (questing)"),
        (HOTKEY_PAUSE, 0x50, "Ctrl+Shift+P (pause/resume)"),
        (HOTKEY_STOP, 0x51, "Ctrl+Shift+Q (stop)"),
        (HOTKEY_RETRY, 0x57, "Ctrl+Shift+W (retry detection)"),
    ];

    static CONTROLLER: Mutex<Option<Controller>> = Mutex::new(None);
    /// Pause and stop go through here so they never queue behind the controller lock.
    static CONTROL: OnceLock<ControlHandle> = OnceLock::new();

    #[derive(Clone, Copy, Debug)]
    enum Command {
        Run(RoutineKind),
        TogglePause,
        Stop,
        Retry,
    }

    fn lock_controller() -> MutexGuard<'static, Option<Controller>> {
        CONTROLLER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Builds the real Win32 + Tesseract backends for each connection attempt.
    fn connector(config: &AutomationConfig) -> Connector {
        let preprocess = config.ocr;
        Box::new(move || {
            let tesseract = ensure_tesseract()?;
            Ok(Backends {
                locator: Box::new(Win32Locator),
                screen: Box::new(GdiScreen),
                input: Box::new(SendInputDriver),
                reader: Box::new(TesseractReader::new(tesseract, preprocess)),
            })
        })
    }

    fn connect(controller: &mut Controller) {
        match controller.connect() {
            Ok(()) => log("Game detected. Ready."),
            Err(e) => {
                log(&format!("Detection failed: {:#}", e));
                log("Open the game and press Ctrl+Shift+W (or tray > Retry detection)");
            }
        }
    }

    /// Runs a control command off the message loop; pause and stop block for a bounded time.
    fn with_controller(
        f: impl FnOnce(&mut Controller) -> Result<(), ControlError>,
    ) -> Result<(), ControlError> {
        match lock_controller().as_mut() {
            Some(controller) => f(controller),
            None => Ok(()),
        }
    }

    fn dispatch(command: Command) {
        let Some(control) = CONTROL.get() else {
            return;
        };
        thread::spawn(move || {
            let result = match command {
                Command::Run(kind) => with_controller(|c| c.run(kind)),
                Command::TogglePause => match control.state() {
                    Some(ScriptState::Paused | ScriptState::PauseRequested) => control.resume(),
                    _ => control.pause(),
                },
                // Signal the worker first, then join it under the lock
                Command::Stop => control.stop().and_then(|()| with_controller(|c| c.stop())),
                Command::Retry => with_controller(|c| {
                    connect(c);
                    Ok(())
                }),
            };
            if let Err(e) = result {
                log(&format!("{:?}: {}", command, e));
            }
        });
    }

    /// Runs the main system tray application with hotkey handling.
    pub fn run() -> Result<()> {
        let config = get_config();
        let mut controller = Controller::new(
            config.clone(),
            connector(config),
            Arc::new(SystemClock),
            paths::get_stats_path(),
        );
        connect(&mut controller);
        let _ = CONTROL.set(controller.control());
        *lock_controller() = Some(controller);

        // Create hidden window for message handling
        let hwnd = create_message_window()?;

        // Add system tray icon
        add_tray_icon(hwnd)?;

        for (id, vk, _) in HOTKEYS {
            unsafe {
                RegisterHotKey(hwnd, id, MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT, vk)?;
            }
        }

        log("NGU Idle Automation started");
        for (_, _, description) in HOTKEYS {
            log(&format!("Hotkey: {}", description));
        }
        log("Right-click tray icon for the menu");

        // Message loop
        let mut msg = MSG::default();
        unsafe {
            while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            // Cleanup
            for (id, _, _) in HOTKEYS {
                let _ = UnregisterHotKey(hwnd, id);
            }
            remove_tray_icon(hwnd);
            let _ = DestroyWindow(hwnd);
        }

        if let Some(mut controller) = lock_controller().take() {
            controller.shutdown();
        }
        log("NGU Idle Automation exited");
        Ok(())
    }

    fn create_message_window() -> Result<HWND> {
        unsafe {
            let hinstance = GetModuleHandleW(None)?;
            let class_name = w!("NguAutomationClass");

            let wc = WNDCLASSW {
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(window_proc),
                hInstance: hinstance.into(),
                lpszClassName: class_name,
                ..Default::default()
            };

            let atom = RegisterClassW(&wc);
            if atom == 0 {
                return Err(anyhow!("Failed to register window class"));
            }

            let hwnd = CreateWindowExW(
                Default::default(),
                class_name,
                w!("NGU Idle Automation"),
                WS_OVERLAPPEDWINDOW,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                None,
                None,
                hinstance,
                None,
            )?;

            Ok(hwnd)
        }
    }

    fn hotkey_command(id: i32) -> Option<Command> {
        match id {
            HOTKEY_SPEEDRUN => Some(Command::Run(RoutineKind::Speedrun)),
            HOTKEY_ITOPOD => Some(Command::Run(RoutineKind::Itopod)),
            HOTKEY_QUESTING => Some(Command::Run(RoutineKind::Questing)),
            HOTKEY_PAUSE => Some(Command::TogglePause),
            HOTKEY_STOP => Some(Command::Stop),
            HOTKEY_RETRY => Some(Command::Retry),
            _ => None,
        }
    }

    fn menu_command(id: usize) -> Option<Command> {
        match id {
            MENU_SPEEDRUN => Some(Command::Run(RoutineKind::Speedrun)),
            MENU_ITOPOD => Some(Command::Run(RoutineKind::Itopod)),
            MENU_QUESTING => Some(Command::Run(RoutineKind::Questing)),
            MENU_PAUSE => Some(Command::TogglePause),
            MENU_STOP => Some(Command::Stop),
            MENU_RETRY => Some(Command::Retry),
            _ => None,
        }
    }

    unsafe extern "system" fn window_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        unsafe {
            match msg {
                WM_HOTKEY => {
                    if let Some(command) = hotkey_command(wparam.0 as i32) {
                        log(&format!("Hotkey pressed: {:?}", command));
                        dispatch(command);
                    }
                    LRESULT(0)
                }
                WM_TRAYICON => {
                    let event = (lparam.0 & 0xFFFF) as u32;
                    match event {
                        WM_RBUTTONUP => {
                            show_context_menu(hwnd);
                        }
                        WM_LBUTTONDBLCLK => {
                            if let Ok(mut guard) = CONTROLLER.try_lock() {
                                if let Some(controller) = guard.as_mut() {
                                    log(&format!(
                                        "Status: {:?}. {}",
                                        controller.status(),
                                        controller.summary()
                                    ));
                                }
                            } else {
                                log("Status: busy");
                            }
                        }
                        _ => {}
                    }
                    LRESULT(0)
                }
                WM_COMMAND => {
                    let cmd = wparam.0 & 0xFFFF;
                    if cmd == MENU_EXIT {
                        log("Exit requested");
                        PostQuitMessage(0);
                    } else if let Some(command) = menu_command(cmd) {
                        log(&format!("Menu: {:?}", command));
                        dispatch(command);
                    }
                    LRESULT(0)
                }
                WM_DESTROY => {
                    PostQuitMessage(0);
                    LRESULT(0)
                }
                _ => DefWindowProcW(hwnd, msg, wparam, lparam),
            }
        }
    }

    fn add_tray_icon(hwnd: HWND) -> Result<()> {
        unsafe {
            let mut nid = NOTIFYICONDATAW {
                cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
                hWnd: hwnd,
                uID: 1,
                uFlags: NIF_ICON | NIF_MESSAGE | NIF_TIP,
                uCallbackMessage: WM_TRAYICON,
                hIcon: LoadIconW(None, IDI_APPLICATION)?,
                ..Default::default()
            };

            // Set tooltip
            let tip = "NGU Idle Automation (Ctrl+Shift+R/I/U)";
            let tip_wide: Vec<u16> = tip.encode_utf16().chain(std::iter::once(0)).collect();
            let len = tip_wide.len().min(nid.szTip.len());
            nid.szTip[..len].copy_from_slice(&tip_wide[..len]);

            if !Shell_NotifyIconW(NIM_ADD, &nid).as_bool() {
                return Err(anyhow!("Failed to add tray icon"));
            }

            Ok(())
        }
    }

    fn remove_tray_icon(hwnd: HWND) {
        unsafe {
            let nid = NOTIFYICONDATAW {
                cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
                hWnd: hwnd,
                uID: 1,
                ..Default::default()
            };
            let _ = Shell_NotifyIconW(NIM_DELETE, &nid);
        }
    }

    fn show_context_menu(hwnd: HWND) {
        unsafe {
            let Ok(menu) = CreatePopupMenu() else {
                log("Failed to create tray menu");
                return;
            };

            // Inserted in reverse order since position 0
            let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_EXIT, w!("Exit"));
            let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_SEPARATOR, 0, None);
            let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_RETRY, w!("Retry detection"));
            let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_STOP, w!("Stop"));
            let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_PAUSE, w!("Pause / Resume"));
            let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_SEPARATOR, 0, None);
            let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_QUESTING, w!("Run questing"));
            let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_ITOPOD, w!("Run ITOPOD"));
            let _ = InsertMenuW(menu, 0, MF_BYPOSITION | MF_STRING, MENU_SPEEDRUN, w!("Run speedrun"));

            let mut pt = POINT::default();
            let _ = GetCursorPos(&mut pt);

            // Required for the menu to work properly
            let _ = SetForegroundWindow(hwnd);

            let _ = TrackPopupMenu(
                menu,
                TPM_BOTTOMALIGN | TPM_LEFTALIGN | TPM_RIGHTBUTTON,
                pt.x,
                pt.y,
                0,
                hwnd,
                None,
            );

            let _ = DestroyMenu(menu);
        }
    }
}
