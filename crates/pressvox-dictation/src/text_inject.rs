//! Text delivery into the focused application.
//!
//! Two delivery strategies: simulated Unicode keystrokes via `SendInput`, or
//! a clipboard swap followed by a Ctrl+V chord with the previous clipboard
//! contents restored afterwards. Both block the calling thread, so the
//! orchestrator runs them on the blocking pool.

use pressvox_core::error::Result;

#[cfg(not(target_os = "windows"))]
use pressvox_core::error::PressvoxError;

/// Delivers recognized text to whatever application has keyboard focus.
pub trait TextInjector: Send + Sync {
    /// Type `text` as simulated keystrokes, pausing `delay_ms` between
    /// characters. A delay of zero sends the whole text in one batch.
    ///
    /// May block for the duration of the typing.
    fn type_text(&self, text: &str, delay_ms: u64) -> Result<()>;

    /// Place `text` on the clipboard, send a paste chord, then restore the
    /// previous clipboard contents after `restore_delay_ms`.
    ///
    /// May block while the target application reads the clipboard.
    fn insert_via_clipboard(&self, text: &str, restore_delay_ms: u64) -> Result<()>;
}

/// Injector backed by the Windows input and clipboard APIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTextInjector;

impl SystemTextInjector {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "windows")]
impl TextInjector for SystemTextInjector {
    fn type_text(&self, text: &str, delay_ms: u64) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        if delay_ms == 0 {
            let inputs = win::unicode_key_inputs(text.encode_utf16());
            win::send_inputs(&inputs)?;
        } else {
            let delay = std::time::Duration::from_millis(delay_ms);
            let mut buf = [0u16; 2];
            for ch in text.chars() {
                let units = ch.encode_utf16(&mut buf);
                let inputs = win::unicode_key_inputs(units.iter().copied());
                win::send_inputs(&inputs)?;
                std::thread::sleep(delay);
            }
        }

        tracing::debug!("Typed {} characters as simulated keystrokes", text.chars().count());
        Ok(())
    }

    fn insert_via_clipboard(&self, text: &str, restore_delay_ms: u64) -> Result<()> {
        use pressvox_core::error::PressvoxError;

        if text.is_empty() {
            return Ok(());
        }

        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| PressvoxError::Injection(format!("Failed to open clipboard: {}", e)))?;

        let previous = clipboard.get_text().ok();

        clipboard.set_text(text.to_string()).map_err(|e| {
            PressvoxError::Injection(format!("Failed to set clipboard text: {}", e))
        })?;

        // Let the clipboard settle before the paste chord fires.
        std::thread::sleep(std::time::Duration::from_millis(10));

        win::send_inputs(&win::paste_chord_inputs())?;

        // Give the target application time to read the clipboard before the
        // previous contents come back.
        std::thread::sleep(std::time::Duration::from_millis(restore_delay_ms));

        if let Some(previous) = previous {
            if let Err(e) = clipboard.set_text(previous) {
                tracing::warn!("Failed to restore previous clipboard contents: {}", e);
            }
        }

        tracing::debug!("Inserted {} characters via clipboard paste", text.chars().count());
        Ok(())
    }
}

#[cfg(not(target_os = "windows"))]
impl TextInjector for SystemTextInjector {
    fn type_text(&self, _text: &str, _delay_ms: u64) -> Result<()> {
        Err(PressvoxError::Injection(
            "Text injection is only available on Windows".into(),
        ))
    }

    fn insert_via_clipboard(&self, _text: &str, _restore_delay_ms: u64) -> Result<()> {
        Err(PressvoxError::Injection(
            "Text injection is only available on Windows".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Windows input plumbing
// ---------------------------------------------------------------------------

#[cfg(target_os = "windows")]
mod win {
    use pressvox_core::error::{PressvoxError, Result};
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP,
        KEYEVENTF_UNICODE, VK_CONTROL, VK_V,
    };

    fn key_input(vk: u16, scan: u16, flags: u32) -> INPUT {
        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: vk,
                    wScan: scan,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        }
    }

    /// Down/up event pair per UTF-16 code unit, using KEYEVENTF_UNICODE so
    /// the text arrives independent of keyboard layout.
    pub(super) fn unicode_key_inputs(units: impl Iterator<Item = u16>) -> Vec<INPUT> {
        let mut inputs = Vec::new();
        for unit in units {
            inputs.push(key_input(0, unit, KEYEVENTF_UNICODE));
            inputs.push(key_input(0, unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP));
        }
        inputs
    }

    /// Ctrl+V press and release.
    pub(super) fn paste_chord_inputs() -> [INPUT; 4] {
        [
            key_input(VK_CONTROL, 0, 0),
            key_input(VK_V, 0, 0),
            key_input(VK_V, 0, KEYEVENTF_KEYUP),
            key_input(VK_CONTROL, 0, KEYEVENTF_KEYUP),
        ]
    }

    pub(super) fn send_inputs(inputs: &[INPUT]) -> Result<()> {
        if inputs.is_empty() {
            return Ok(());
        }

        // SAFETY: every INPUT record is a fully initialized keyboard event
        // and the slice outlives the call.
        let sent = unsafe {
            SendInput(
                inputs.len() as u32,
                inputs.as_ptr(),
                std::mem::size_of::<INPUT>() as i32,
            )
        };

        if sent as usize != inputs.len() {
            return Err(PressvoxError::Injection(format!(
                "SendInput only sent {} of {} events",
                sent,
                inputs.len()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock implementation
// ---------------------------------------------------------------------------

/// Records delivered text instead of touching the OS. For tests.
#[derive(Debug, Clone, Default)]
pub struct MockTextInjector {
    typed: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    pasted: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    fail_next: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl MockTextInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next delivery fail, once.
    pub fn fail_next_injection(&self) {
        self.fail_next
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Text delivered through `type_text`, in call order.
    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().expect("typed mutex poisoned").clone()
    }

    /// Text delivered through `insert_via_clipboard`, in call order.
    pub fn pasted(&self) -> Vec<String> {
        self.pasted.lock().expect("pasted mutex poisoned").clone()
    }

    fn check_scripted_failure(&self) -> Result<()> {
        if self
            .fail_next
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(pressvox_core::error::PressvoxError::Injection(
                "Scripted injection failure".to_string(),
            ));
        }
        Ok(())
    }
}

impl TextInjector for MockTextInjector {
    fn type_text(&self, text: &str, _delay_ms: u64) -> Result<()> {
        self.check_scripted_failure()?;
        self.typed
            .lock()
            .expect("typed mutex poisoned")
            .push(text.to_string());
        Ok(())
    }

    fn insert_via_clipboard(&self, text: &str, _restore_delay_ms: u64) -> Result<()> {
        self.check_scripted_failure()?;
        self.pasted
            .lock()
            .expect("pasted mutex poisoned")
            .push(text.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
