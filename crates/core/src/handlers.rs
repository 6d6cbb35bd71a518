use std::time::Duration;

use crate::control::RunControl;
use crate::error::StepError;
use crate::locate::Locator;
use crate::platform::{normalize_key_name, Desktop};
use crate::settings::Settings;
use crate::sleep::sleep_interruptible;
use crate::step::*;
use crate::telemetry::Telemetry;
use crate::types::Point;

/// Rotating cursors of multiple-mode steps, one slot per step position.
/// Reset at the start of every global loop pass.
#[derive(Debug, Clone, Default)]
pub struct ExecState {
    text: Vec<usize>,
    image: Vec<usize>,
}

impl ExecState {
    pub fn new(len: usize) -> Self {
        Self { text: vec![0; len], image: vec![0; len] }
    }

    pub fn reset(&mut self) {
        self.text.iter_mut().for_each(|c| *c = 0);
        self.image.iter_mut().for_each(|c| *c = 0);
    }

    pub fn text_cursor(&self, index: usize) -> usize {
        self.text.get(index).copied().unwrap_or(0)
    }

    /// Take the current text position for step `index` and advance it.
    fn next_text(&mut self, index: usize, len: usize) -> Option<usize> {
        slot(&mut self.text, index).and_then(|c| rotate(c, len))
    }

    fn next_image(&mut self, index: usize, len: usize) -> Option<usize> {
        slot(&mut self.image, index).and_then(|c| rotate(c, len))
    }
}

fn slot(cursors: &mut Vec<usize>, index: usize) -> Option<&mut usize> {
    if index >= cursors.len() {
        cursors.resize(index + 1, 0);
    }
    cursors.get_mut(index)
}

fn rotate(cursor: &mut usize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if *cursor >= len {
        *cursor = 0;
    }
    let current = *cursor;
    *cursor = (current + 1) % len;
    Some(current)
}

/// Everything a handler may touch while performing one step.
pub struct StepContext<'a> {
    pub desktop: &'a mut dyn Desktop,
    pub telemetry: &'a Telemetry,
    pub locator: &'a Locator,
    pub settings: &'a Settings,
    pub control: &'a RunControl,
}

/// Perform one executable step. Loop markers are handled by the
/// interpreter and are a no-op here.
pub fn run_step(
    ctx: &mut StepContext,
    state: &mut ExecState,
    index: usize,
    step: &Step,
) -> Result<(), StepError> {
    match &step.kind {
        StepKind::MouseClick(p) => mouse_click(ctx, state, index, p),
        StepKind::KeyboardType(p) => keyboard_type(ctx, state, index, p),
        StepKind::KeyboardSpecial(p) => keyboard_special(ctx, p),
        StepKind::Wait(p) => wait(ctx, p),
        StepKind::LoopStart(_) | StepKind::LoopEnd => Ok(()),
        StepKind::Unknown(tag) => Err(StepError::UnknownStepKind(tag.clone())),
    }
}

/// Seconds from a document field. Negative and NaN read as zero; a value
/// too large for a `Duration` is rejected.
fn secs(name: &str, value: f64) -> Result<Duration, StepError> {
    if value.is_nan() || value <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(value).map_err(|_| StepError::InvalidParameter {
        name: name.to_string(),
        reason: format!("{} seconds is out of range", value),
    })
}

fn mouse_click(
    ctx: &mut StepContext,
    state: &mut ExecState,
    index: usize,
    p: &MouseClick,
) -> Result<(), StepError> {
    let target = match p.click_type {
        ClickTarget::Coordinates => Point::new(p.x, p.y),
        ClickTarget::Image => {
            if !(0.0..=1.0).contains(&p.confidence) {
                return Err(StepError::InvalidParameter {
                    name: "confidence".to_string(),
                    reason: format!("{} is outside 0..1", p.confidence),
                });
            }
            let name = match p.input_type {
                InputMode::Single => p.image_path.as_str(),
                InputMode::Multiple => {
                    let i = state
                        .next_image(index, p.image_list.len())
                        .ok_or_else(|| StepError::NoInputAvailable("the image list is empty".to_string()))?;
                    p.image_list[i].as_str()
                }
            };
            if name.trim().is_empty() {
                return Err(StepError::not_found("reference image", "no image selected"));
            }

            let path = ctx.settings.resolve_image(name);
            ctx.telemetry.debug(&format!("Searching for {} (confidence {:.2})", path.display(), p.confidence));
            ctx.locator
                .find_image(ctx.desktop, ctx.telemetry, &path, p.confidence)?
                .ok_or_else(|| {
                    StepError::not_found(name, format!("no match reached confidence {:.2}", p.confidence))
                })?
        }
    };

    ctx.telemetry.debug(&format!("Clicking {:?} at ({}, {})", p.button, target.x, target.y));
    ctx.desktop.move_pointer(target, secs("duration", p.duration)?)?;
    ctx.desktop.click(p.button)?;

    // The special key only follows typed text.
    if p.type_after_click && !p.text_to_type.is_empty() {
        if !sleep_interruptible(secs("type_delay", p.type_delay)?, ctx.settings.poll_interval(), ctx.control) {
            return Ok(());
        }
        ctx.desktop.type_text(&p.text_to_type, Duration::ZERO)?;
        press_special(ctx, p.special_key.as_deref())?;
    }
    Ok(())
}

fn keyboard_type(
    ctx: &mut StepContext,
    state: &mut ExecState,
    index: usize,
    p: &KeyboardType,
) -> Result<(), StepError> {
    let text = match p.input_type {
        InputMode::Single => p.text.as_str(),
        InputMode::Multiple => {
            let i = state
                .next_text(index, p.text_list.len())
                .ok_or_else(|| StepError::NoInputAvailable("the text list is empty".to_string()))?;
            ctx.telemetry.debug(&format!("Using text {}/{}", i + 1, p.text_list.len()));
            p.text_list[i].as_str()
        }
    };

    ctx.desktop.type_text(text, secs("delay", p.delay / 1000.0)?)?;
    press_special(ctx, p.special_key.as_deref())
}

fn press_special(ctx: &mut StepContext, key: Option<&str>) -> Result<(), StepError> {
    let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
        return Ok(());
    };
    ctx.desktop.press_key(&normalize_key_name(key))?;
    std::thread::sleep(ctx.settings.key_settle());
    Ok(())
}

fn keyboard_special(ctx: &mut StepContext, p: &KeyboardSpecial) -> Result<(), StepError> {
    let chord = compose_chord(&p.key, &p.modifiers)?;
    ctx.telemetry.debug(&format!("Pressing {}", chord.join("+")));
    ctx.desktop.press_chord(&chord)?;
    std::thread::sleep(ctx.settings.key_settle());
    Ok(())
}

/// Chord order: `win` first when it is the key or a modifier, then `ctrl`,
/// `alt`, `shift`, then the key itself (omitted when the key is `win`).
/// A key that also appears among the modifiers is not repeated.
pub fn compose_chord(key: &str, modifiers: &[String]) -> Result<Vec<String>, StepError> {
    let key = normalize_key_name(key);
    if key.is_empty() {
        return Err(StepError::InvalidParameter {
            name: "key".to_string(),
            reason: "no key selected".to_string(),
        });
    }
    let mods: Vec<String> = modifiers
        .iter()
        .map(|m| normalize_key_name(m))
        .filter(|m| *m != key)
        .collect();
    let has = |m: &str| mods.iter().any(|x| x == m);

    let mut chord = Vec::new();
    if key == "win" || has("win") {
        chord.push("win".to_string());
    }
    for m in ["ctrl", "alt", "shift"] {
        if has(m) {
            chord.push(m.to_string());
        }
    }
    if key != "win" {
        chord.push(key);
    }
    Ok(chord)
}

fn wait(ctx: &mut StepContext, p: &Wait) -> Result<(), StepError> {
    let total = secs("duration", p.duration)?;
    if !sleep_interruptible(total, ctx.settings.poll_interval(), ctx.control) {
        ctx.telemetry.debug(&format!("Wait of {:.1}s interrupted", total.as_secs_f64()));
    }
    Ok(())
}
