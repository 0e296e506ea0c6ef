//! Global pointer-button event source.
//!
//! On Windows, installs a low-level mouse hook (WH_MOUSE_LL) on a dedicated
//! thread running a message pump. The hook procedure does nothing but convert
//! the OS record into a `PointerEvent` and enqueue it; all press logic runs on
//! the consumer side. Blocking or panicking inside the hook procedure would
//! get the hook evicted by the OS.
//!
//! On non-Windows, provides a stub that fails to start.

use std::time::Instant;

use pressvox_core::error::{PressvoxError, Result};
use tokio::sync::mpsc;

/// Which edge of the button press occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventKind {
    Down,
    Up,
}

/// One physical button transition with screen position.
#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub x: i32,
    pub y: i32,
    /// When the transition was observed, on the monotonic clock.
    pub timestamp: Instant,
}

impl PointerEvent {
    pub fn down(x: i32, y: i32) -> Self {
        Self {
            kind: PointerEventKind::Down,
            x,
            y,
            timestamp: Instant::now(),
        }
    }

    pub fn up(x: i32, y: i32) -> Self {
        Self {
            kind: PointerEventKind::Up,
            x,
            y,
            timestamp: Instant::now(),
        }
    }
}

/// Owns the global mouse hook and its message-pump thread.
///
/// The hook delivers left-button Down/Up transitions for the whole desktop
/// into the channel given to `start`. At most one hook can be installed per
/// process, and a stopped listener cannot be restarted.
pub struct PointerListener {
    #[cfg(target_os = "windows")]
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PointerListener {
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "windows")]
            thread: None,
        }
    }

    /// Install the hook and begin delivering events into `events`.
    ///
    /// Returns once the hook is confirmed installed. Fails if the hook is
    /// already running, was already started once in this process, or the OS
    /// rejects the hook.
    #[cfg(target_os = "windows")]
    pub fn start(&mut self, events: mpsc::UnboundedSender<PointerEvent>) -> Result<()> {
        if self.thread.is_some() {
            return Err(PressvoxError::Input("Pointer hook already running".into()));
        }

        hook::set_sender(events)?;

        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("pressvox-mouse-hook".to_string())
            .spawn(move || hook::run(ready_tx))
            .map_err(|e| PressvoxError::Input(format!("Failed to spawn hook thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(true) => {
                self.thread = Some(handle);
                Ok(())
            }
            _ => {
                let _ = handle.join();
                Err(PressvoxError::Input(
                    "Failed to install low-level mouse hook".into(),
                ))
            }
        }
    }

    /// Stub start on non-Windows platforms.
    #[cfg(not(target_os = "windows"))]
    pub fn start(&mut self, _events: mpsc::UnboundedSender<PointerEvent>) -> Result<()> {
        tracing::warn!("Global pointer hook is only available on Windows");
        Err(PressvoxError::Input(
            "Global pointer hook is only available on Windows".into(),
        ))
    }

    /// Whether the hook thread is running.
    #[cfg(target_os = "windows")]
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stub: always false on non-Windows.
    #[cfg(not(target_os = "windows"))]
    pub fn is_running(&self) -> bool {
        false
    }

    /// Remove the hook and join the pump thread.
    #[cfg(target_os = "windows")]
    pub fn stop(&mut self) {
        if let Some(handle) = self.thread.take() {
            hook::request_stop();
            let _ = handle.join();
            tracing::info!("Pointer listener stopped");
        }
    }

    /// Stub stop.
    #[cfg(not(target_os = "windows"))]
    pub fn stop(&mut self) {}
}

impl Default for PointerListener {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "windows")]
impl Drop for PointerListener {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Windows hook internals
// ---------------------------------------------------------------------------

#[cfg(target_os = "windows")]
mod hook {
    use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};
    use std::sync::OnceLock;
    use std::time::Instant;

    use tokio::sync::mpsc;
    use windows_sys::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
    use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows_sys::Win32::System::Threading::GetCurrentThreadId;
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, GetMessageW, PostThreadMessageW, SetWindowsHookExW,
        UnhookWindowsHookEx, MSG, MSLLHOOKSTRUCT, WH_MOUSE_LL, WM_LBUTTONDOWN, WM_LBUTTONUP,
        WM_QUIT,
    };

    use super::{PointerEvent, PointerEventKind};
    use pressvox_core::error::{PressvoxError, Result};

    /// Event sink for the hook procedure. The procedure is a plain function
    /// pointer and cannot carry instance state, so the sender lives in a
    /// process-wide static set exactly once.
    static SENDER: OnceLock<mpsc::UnboundedSender<PointerEvent>> = OnceLock::new();
    static HOOK: AtomicIsize = AtomicIsize::new(0);
    static PUMP_THREAD_ID: AtomicU32 = AtomicU32::new(0);

    pub(super) fn set_sender(events: mpsc::UnboundedSender<PointerEvent>) -> Result<()> {
        SENDER.set(events).map_err(|_| {
            PressvoxError::Input("Pointer hook can only be started once per process".into())
        })
    }

    /// Hook thread body: install the hook, report readiness, pump messages
    /// until WM_QUIT, then unhook.
    pub(super) fn run(ready: std::sync::mpsc::Sender<bool>) {
        unsafe {
            PUMP_THREAD_ID.store(GetCurrentThreadId(), Ordering::SeqCst);

            let module = GetModuleHandleW(std::ptr::null());
            let hook = SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), module, 0);
            if hook == 0 {
                tracing::error!("SetWindowsHookExW failed, pointer events unavailable");
                let _ = ready.send(false);
                return;
            }
            HOOK.store(hook, Ordering::SeqCst);
            let _ = ready.send(true);
            tracing::info!("Low-level mouse hook installed");

            // The hook procedure is dispatched from this pump.
            let mut msg: MSG = std::mem::zeroed();
            while GetMessageW(&mut msg, 0, 0, 0) > 0 {}

            let hook = HOOK.swap(0, Ordering::SeqCst);
            if hook != 0 {
                UnhookWindowsHookEx(hook);
            }
            tracing::info!("Low-level mouse hook removed");
        }
    }

    /// Unhook and ask the pump thread to exit. Safe to call from any thread.
    pub(super) fn request_stop() {
        let hook = HOOK.swap(0, Ordering::SeqCst);
        if hook != 0 {
            unsafe {
                UnhookWindowsHookEx(hook);
            }
        }
        let thread_id = PUMP_THREAD_ID.load(Ordering::SeqCst);
        if thread_id != 0 {
            unsafe {
                PostThreadMessageW(thread_id, WM_QUIT, 0, 0);
            }
        }
    }

    unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        if code >= 0 {
            let kind = match wparam as u32 {
                WM_LBUTTONDOWN => Some(PointerEventKind::Down),
                WM_LBUTTONUP => Some(PointerEventKind::Up),
                _ => None,
            };

            if let Some(kind) = kind {
                // SAFETY: for mouse messages with code >= 0, lParam points to
                // a valid MSLLHOOKSTRUCT owned by the OS for the duration of
                // this call.
                let info = &*(lparam as *const MSLLHOOKSTRUCT);

                // Enqueue and return. An unbounded send never blocks, and a
                // closed channel (consumer gone) is ignored.
                if let Some(tx) = SENDER.get() {
                    let _ = tx.send(PointerEvent {
                        kind,
                        x: info.pt.x,
                        y: info.pt.y,
                        timestamp: Instant::now(),
                    });
                }
            }
        }

        CallNextHookEx(0, code, wparam, lparam)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_event_constructors() {
        let down = PointerEvent::down(100, 200);
        assert_eq!(down.kind, PointerEventKind::Down);
        assert_eq!(down.x, 100);
        assert_eq!(down.y, 200);

        let up = PointerEvent::up(-5, 0);
        assert_eq!(up.kind, PointerEventKind::Up);
        assert_eq!(up.x, -5);
    }

    #[test]
    fn test_pointer_event_timestamps_are_monotonic() {
        let first = PointerEvent::down(0, 0);
        let second = PointerEvent::up(0, 0);
        assert!(second.timestamp >= first.timestamp);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_listener_stub_start_fails() {
        let mut listener = PointerListener::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = listener.start(tx);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("only available on Windows"));
        assert!(!listener.is_running());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_listener_stub_stop_is_noop() {
        let mut listener = PointerListener::default();
        listener.stop(); // Should not panic
        assert!(!listener.is_running());
    }
}
