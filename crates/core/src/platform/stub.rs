use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::types::*;
use crate::logger;
use super::Desktop;

/// One simulated action, as seen by the stub.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Move(Point),
    Click(MouseButton),
    Type(String),
    Key(String),
    Chord(Vec<String>),
    Capture,
}

pub type ActionLog = Arc<Mutex<Vec<Action>>>;

/// Desktop that performs nothing: it logs each call, optionally records it,
/// and serves a fixed screen image.
pub struct StubDesktop {
    screen: Capture,
    pointer: Point,
    actions: Option<ActionLog>,
    fail_input: bool,
}

impl StubDesktop {
    pub fn new() -> Self {
        Self {
            screen: Capture {
                data: vec![0; 64 * 48 * 4],
                width: 64,
                height: 48,
                origin: Point::default(),
            },
            pointer: Point::default(),
            actions: None,
            fail_input: false,
        }
    }

    /// Record every action into `log`.
    pub fn recording(log: ActionLog) -> Self {
        Self { actions: Some(log), ..Self::new() }
    }

    /// Serve `screen` from `capture_screen`.
    pub fn with_screen(mut self, screen: Capture) -> Self {
        self.screen = screen;
        self
    }

    /// Make every input call fail, as a backend without permissions would.
    pub fn failing_input(mut self) -> Self {
        self.fail_input = true;
        self
    }

    pub fn pointer(&self) -> Point {
        self.pointer
    }

    fn record(&self, action: Action) -> Result<()> {
        if self.fail_input && action != Action::Capture {
            return Err(anyhow!("stub input disabled ({:?})", action));
        }
        if let Some(log) = &self.actions {
            log.lock().unwrap().push(action);
        }
        Ok(())
    }
}

impl Default for StubDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl Desktop for StubDesktop {
    fn move_pointer(&mut self, to: Point, duration: Duration) -> Result<()> {
        logger::info_p("stub", &format!("move_pointer({}, {}) over {:?}", to.x, to.y, duration));
        self.record(Action::Move(to))?;
        self.pointer = to;
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> Result<()> {
        logger::info_p("stub", &format!("click({:?}) at ({}, {})", button, self.pointer.x, self.pointer.y));
        self.record(Action::Click(button))
    }

    fn type_text(&mut self, text: &str, interval: Duration) -> Result<()> {
        logger::info_p("stub", &format!("type_text(\"{}\", {:?})", text, interval));
        self.record(Action::Type(text.to_string()))
    }

    fn press_key(&mut self, key: &str) -> Result<()> {
        logger::info_p("stub", &format!("press_key(\"{}\")", key));
        self.record(Action::Key(key.to_string()))
    }

    fn press_chord(&mut self, keys: &[String]) -> Result<()> {
        logger::info_p("stub", &format!("press_chord({})", keys.join("+")));
        self.record(Action::Chord(keys.to_vec()))
    }

    fn capture_screen(&mut self) -> Result<Capture> {
        self.record(Action::Capture)?;
        Ok(self.screen.clone())
    }
}
