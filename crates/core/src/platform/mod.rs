pub mod stub;
pub mod native;
pub mod hotkey;

use std::time::Duration;

use anyhow::Result;

use crate::types::*;
use crate::logger;

/// Simulated input and screen access used by step handlers.
///
/// A desktop is created on the thread that executes the workflow and never
/// leaves it, so implementations need not be `Send`.
pub trait Desktop {
    /// Glide the pointer to `to` over `duration` (instant when zero).
    fn move_pointer(&mut self, to: Point, duration: Duration) -> Result<()>;
    fn click(&mut self, button: MouseButton) -> Result<()>;
    /// Type literal text, pausing `interval` between characters.
    fn type_text(&mut self, text: &str, interval: Duration) -> Result<()>;
    /// Press and release one named key (`enter`, `tab`, `f5`, `a`, ...).
    fn press_key(&mut self, key: &str) -> Result<()>;
    /// Press `keys` in order, then release them in reverse order.
    fn press_chord(&mut self, keys: &[String]) -> Result<()>;
    /// Capture the primary screen.
    fn capture_screen(&mut self) -> Result<Capture>;
}

/// Create the desktop backend. Falls back to the stub when native input
/// cannot be initialised (no display, missing permissions).
pub fn create_desktop(force_stub: bool) -> Box<dyn Desktop> {
    logger::register_prefix("stub", logger::COLOR_GRAY);
    logger::register_prefix("native", logger::COLOR_GRAY);
    if force_stub {
        return Box::new(stub::StubDesktop::new());
    }
    match native::NativeDesktop::new() {
        Ok(d) => Box::new(d),
        Err(e) => {
            logger::error_p("native", &format!("input simulation unavailable, using stub: {:#}", e));
            Box::new(stub::StubDesktop::new())
        }
    }
}

/// Normalize a user-facing key name ("Enter", "Escape", "Page Up") to the
/// lower-case name the backends understand.
pub fn normalize_key_name(key: &str) -> String {
    let lower = key.trim().to_lowercase();
    match lower.as_str() {
        "escape" => "esc".to_string(),
        "return" => "enter".to_string(),
        "windows" | "super" | "meta" => "win".to_string(),
        "control" => "ctrl".to_string(),
        "page up" => "pageup".to_string(),
        "page down" => "pagedown".to_string(),
        _ => lower,
    }
}
