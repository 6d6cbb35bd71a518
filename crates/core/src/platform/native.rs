use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::types::*;
use crate::logger;
use super::{Desktop, normalize_key_name};

// Pointer glide granularity.
const GLIDE_TICK: Duration = Duration::from_millis(10);

/// Real input through enigo, screen capture through xcap.
pub struct NativeDesktop {
    enigo: Enigo,
}

impl NativeDesktop {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow!("failed to initialise input simulator: {}", e))?;
        Ok(Self { enigo })
    }

    fn key(&mut self, name: &str, direction: Direction) -> Result<()> {
        let key = key_from_name(name).ok_or_else(|| anyhow!("unknown key name \"{}\"", name))?;
        self.enigo
            .key(key, direction)
            .with_context(|| format!("key {:?} {:?}", name, direction))
    }
}

impl Desktop for NativeDesktop {
    fn move_pointer(&mut self, to: Point, duration: Duration) -> Result<()> {
        let ticks = (duration.as_millis() / GLIDE_TICK.as_millis()) as i32;
        if ticks > 1 {
            let (fx, fy) = self.enigo.location().context("failed to read pointer location")?;
            let started = Instant::now();
            for n in 1..ticks {
                let x = fx + (to.x - fx) * n / ticks;
                let y = fy + (to.y - fy) * n / ticks;
                self.enigo.move_mouse(x, y, Coordinate::Abs).context("pointer move failed")?;
                let due = GLIDE_TICK * n as u32;
                if let Some(wait) = due.checked_sub(started.elapsed()) {
                    std::thread::sleep(wait);
                }
            }
        }
        self.enigo.move_mouse(to.x, to.y, Coordinate::Abs).context("pointer move failed")
    }

    fn click(&mut self, button: MouseButton) -> Result<()> {
        let b = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        self.enigo.button(b, Direction::Click).context("mouse click failed")
    }

    fn type_text(&mut self, text: &str, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return self.enigo.text(text).context("typing failed");
        }
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.enigo.text(ch.encode_utf8(&mut buf)).context("typing failed")?;
            std::thread::sleep(interval);
        }
        Ok(())
    }

    fn press_key(&mut self, key: &str) -> Result<()> {
        self.key(key, Direction::Click)
    }

    fn press_chord(&mut self, keys: &[String]) -> Result<()> {
        let mut pressed = Vec::with_capacity(keys.len());
        let mut outcome = Ok(());
        for k in keys {
            match self.key(k, Direction::Press) {
                Ok(()) => pressed.push(k.as_str()),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        // Always release what went down, even after a failure.
        for k in pressed.iter().rev() {
            if let Err(e) = self.key(k, Direction::Release) {
                logger::warn_p("native", &format!("release of {} failed: {:#}", k, e));
            }
        }
        outcome
    }

    fn capture_screen(&mut self) -> Result<Capture> {
        let monitors = xcap::Monitor::all().map_err(|e| anyhow!("failed to enumerate monitors: {}", e))?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary().unwrap_or(false))
            .or_else(|| monitors.first())
            .ok_or_else(|| anyhow!("no monitor found"))?;

        let x = monitor.x().map_err(|e| anyhow!("failed to get monitor x: {}", e))?;
        let y = monitor.y().map_err(|e| anyhow!("failed to get monitor y: {}", e))?;
        let image = monitor
            .capture_image()
            .map_err(|e| anyhow!("screen capture failed: {}", e))?;

        Ok(Capture::from_rgba(image, Point::new(x, y)))
    }
}

fn key_from_name(name: &str) -> Option<Key> {
    let name = normalize_key_name(name);
    let key = match name.as_str() {
        "enter" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "esc" => Key::Escape,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,
        "capslock" => Key::CapsLock,
        "ctrl" => Key::Control,
        "alt" => Key::Alt,
        "shift" => Key::Shift,
        "win" | "cmd" | "command" => Key::Meta,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return None,
            }
        }
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_name() {
        assert_eq!(key_from_name("Enter"), Some(Key::Return));
        assert_eq!(key_from_name("windows"), Some(Key::Meta));
        assert_eq!(key_from_name("F12"), Some(Key::F12));
        assert_eq!(key_from_name("c"), Some(Key::Unicode('c')));
        assert_eq!(key_from_name("hyper"), None);
    }
}
