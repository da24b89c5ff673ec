//! Window readiness and foreground control
//!
//! The launch engine only talks to the `WindowDriver` trait; retry and
//! backoff orchestration stays OS-agnostic. The Win32 implementation
//! carries the foreground-switch workarounds; other hosts get a null
//! driver that reports nothing visible.

/// Result of a focus attempt, confirmed by reading the current foreground
/// window back after the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusResult {
    /// The target window (or another window of the same process) owns the
    /// foreground
    Confirmed,
    /// The request ran but the foreground read-back disagrees
    Unconfirmed,
    /// No visible top-level window found for the process
    NoWindow,
}

/// OS window-automation capability used by the launch engine
pub trait WindowDriver: Send + Sync {
    /// True once the process owns a visible top-level window
    fn is_visible(&self, pid: u32) -> bool;

    /// True once that window's input queue is idle, meaning the
    /// application has finished loading enough to accept input
    fn is_ready(&self, pid: u32) -> bool;

    /// Bring the process's top-level window to the foreground
    fn set_focus(&self, pid: u32) -> FocusResult;
}

/// Driver for hosts without window automation support. Window readiness
/// is skipped and focus is reported unconfirmed, which the engine maps to
/// a warning outcome rather than a failure.
pub struct NullDriver;

impl WindowDriver for NullDriver {
    fn is_visible(&self, _pid: u32) -> bool {
        false
    }

    fn is_ready(&self, _pid: u32) -> bool {
        false
    }

    fn set_focus(&self, _pid: u32) -> FocusResult {
        FocusResult::NoWindow
    }
}

/// The window driver for the host OS
pub fn platform_driver() -> Box<dyn WindowDriver> {
    #[cfg(windows)]
    {
        Box::new(win32::Win32Driver)
    }
    #[cfg(not(windows))]
    {
        Box::new(NullDriver)
    }
}

#[cfg(windows)]
mod win32 {
    use super::{FocusResult, WindowDriver};
    use tracing::{debug, warn};
    use windows::Win32::Foundation::{BOOL, HWND, LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        AttachThreadInput, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT,
        KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP, VK_MENU,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        AllowSetForegroundWindow, BringWindowToTop, EnumWindows, GetForegroundWindow,
        GetWindowTextLengthW, GetWindowThreadProcessId, IsIconic, IsWindowVisible,
        SendMessageTimeoutW, SetForegroundWindow, ShowWindow, ASFW_ANY, SMTO_ABORTIFHUNG,
        SW_RESTORE, SW_SHOW, WM_NULL,
    };

    pub struct Win32Driver;

    struct EnumState {
        pid: u32,
        hwnd: Option<HWND>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        let state = &mut *(lparam.0 as *mut EnumState);
        let mut owner_pid = 0u32;
        GetWindowThreadProcessId(hwnd, Some(&mut owner_pid));
        if owner_pid == state.pid
            && IsWindowVisible(hwnd).as_bool()
            && GetWindowTextLengthW(hwnd) > 0
        {
            state.hwnd = Some(hwnd);
            return BOOL(0);
        }
        BOOL(1)
    }

    /// First visible, titled top-level window owned by the pid
    fn top_window(pid: u32) -> Option<HWND> {
        let mut state = EnumState { pid, hwnd: None };
        unsafe {
            let _ = EnumWindows(
                Some(enum_callback),
                LPARAM(&mut state as *mut EnumState as isize),
            );
        }
        state.hwnd
    }

    /// Synthesize a neutral Alt press and release. Windows locks foreground
    /// switches to the process that last received input; the key event
    /// marks this process as active so SetForegroundWindow is permitted.
    fn nudge_foreground_lock() {
        let make_input = |flags: KEYBD_EVENT_FLAGS| INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VK_MENU,
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        let inputs = [
            make_input(KEYBD_EVENT_FLAGS(0)),
            make_input(KEYEVENTF_KEYUP),
        ];
        unsafe {
            SendInput(&inputs, std::mem::size_of::<INPUT>() as i32);
        }
    }

    impl WindowDriver for Win32Driver {
        fn is_visible(&self, pid: u32) -> bool {
            top_window(pid).is_some()
        }

        fn is_ready(&self, pid: u32) -> bool {
            let Some(hwnd) = top_window(pid) else {
                return false;
            };
            // The window answers WM_NULL within the timeout once its
            // message queue is pumping and not hung mid-load.
            unsafe {
                SendMessageTimeoutW(
                    hwnd,
                    WM_NULL,
                    WPARAM(0),
                    LPARAM(0),
                    SMTO_ABORTIFHUNG,
                    1000,
                    None,
                )
                .0 != 0
            }
        }

        fn set_focus(&self, pid: u32) -> FocusResult {
            let Some(hwnd) = top_window(pid) else {
                debug!("no visible window found for pid {}", pid);
                return FocusResult::NoWindow;
            };

            unsafe {
                nudge_foreground_lock();
                if let Err(e) = AllowSetForegroundWindow(ASFW_ANY) {
                    debug!("AllowSetForegroundWindow failed: {}", e);
                }

                let current_tid = GetCurrentThreadId();
                let mut target_pid = 0u32;
                let target_tid = GetWindowThreadProcessId(hwnd, Some(&mut target_pid));
                let attached = current_tid != target_tid
                    && AttachThreadInput(current_tid, target_tid, true).as_bool();

                if IsIconic(hwnd).as_bool() {
                    let _ = ShowWindow(hwnd, SW_RESTORE);
                } else {
                    let _ = ShowWindow(hwnd, SW_SHOW);
                }
                let _ = BringWindowToTop(hwnd);
                let _ = SetForegroundWindow(hwnd);

                if attached {
                    let _ = AttachThreadInput(current_tid, target_tid, false);
                }

                let foreground = GetForegroundWindow();
                if foreground == hwnd {
                    return FocusResult::Confirmed;
                }

                // A child or owner window of the same process may hold the
                // focus instead of the handle we raised.
                let mut foreground_pid = 0u32;
                GetWindowThreadProcessId(foreground, Some(&mut foreground_pid));
                if foreground_pid == pid {
                    return FocusResult::Confirmed;
                }

                warn!(
                    "window {:?} raised but foreground belongs to pid {}",
                    hwnd, foreground_pid
                );
                FocusResult::Unconfirmed
            }
        }
    }
}
