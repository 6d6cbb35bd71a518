use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::MouseButton;

pub const TAG_MOUSE_CLICK: &str = "Mouse Click";
pub const TAG_KEYBOARD_TYPE: &str = "Keyboard Type";
pub const TAG_KEYBOARD_SPECIAL: &str = "Keyboard Special";
pub const TAG_WAIT: &str = "Wait";
pub const TAG_LOOP_START: &str = "Loop Start";
pub const TAG_LOOP_END: &str = "Loop End";

/// One entry of a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: Option<String>,
    pub enable_loop: bool,
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    MouseClick(MouseClick),
    KeyboardType(KeyboardType),
    KeyboardSpecial(KeyboardSpecial),
    Wait(Wait),
    LoopStart(LoopStart),
    LoopEnd,
    /// A record whose type tag this build does not know; fails when executed.
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickTarget {
    #[default]
    Coordinates,
    Image,
}

/// Single fixed value, or a rotating list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Single,
    Multiple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseClick {
    pub click_type: ClickTarget,
    pub button: MouseButton,
    pub x: i32,
    pub y: i32,
    /// Pointer travel time in seconds.
    pub duration: f64,
    pub confidence: f64,
    pub input_type: InputMode,
    pub image_path: String,
    pub image_list: Vec<String>,
    pub type_after_click: bool,
    pub text_to_type: String,
    /// Seconds between the click and the typed text.
    pub type_delay: f64,
    pub special_key: Option<String>,
}

impl Default for MouseClick {
    fn default() -> Self {
        Self {
            click_type: ClickTarget::Coordinates,
            button: MouseButton::Left,
            x: 0,
            y: 0,
            duration: 0.5,
            confidence: 0.9,
            input_type: InputMode::Single,
            image_path: String::new(),
            image_list: Vec::new(),
            type_after_click: false,
            text_to_type: String::new(),
            type_delay: 1.0,
            special_key: None,
        }
    }
}

impl MouseClick {
    pub fn at(x: i32, y: i32) -> Self {
        Self { x, y, ..Self::default() }
    }

    pub fn on_image(path: impl Into<String>, confidence: f64) -> Self {
        Self {
            click_type: ClickTarget::Image,
            image_path: path.into(),
            confidence,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardType {
    pub input_type: InputMode,
    pub text: String,
    pub text_list: Vec<String>,
    pub special_key: Option<String>,
    /// Milliseconds between keystrokes.
    pub delay: f64,
}

impl Default for KeyboardType {
    fn default() -> Self {
        Self {
            input_type: InputMode::Single,
            text: String::new(),
            text_list: Vec::new(),
            special_key: None,
            delay: 10.0,
        }
    }
}

impl KeyboardType {
    pub fn single(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn multiple<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self {
            input_type: InputMode::Multiple,
            text_list: texts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardSpecial {
    pub key: String,
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wait {
    /// Seconds.
    pub duration: f64,
}

impl Default for Wait {
    fn default() -> Self {
        Self { duration: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopStart {
    pub iterations: i64,
}

impl Default for LoopStart {
    fn default() -> Self {
        Self { iterations: 1 }
    }
}

impl StepKind {
    /// Type tag as written in workflow documents and shown to the user.
    pub fn tag(&self) -> &str {
        match self {
            StepKind::MouseClick(_) => TAG_MOUSE_CLICK,
            StepKind::KeyboardType(_) => TAG_KEYBOARD_TYPE,
            StepKind::KeyboardSpecial(_) => TAG_KEYBOARD_SPECIAL,
            StepKind::Wait(_) => TAG_WAIT,
            StepKind::LoopStart(_) => TAG_LOOP_START,
            StepKind::LoopEnd => TAG_LOOP_END,
            StepKind::Unknown(tag) => tag,
        }
    }
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self { name: None, enable_loop: true, kind }
    }

    pub fn named(name: impl Into<String>, kind: StepKind) -> Self {
        Self { name: Some(name.into()), ..Self::new(kind) }
    }

    /// Display name, falling back to the 1-based position.
    pub fn display_name(&self, index: usize) -> String {
        match &self.name {
            Some(n) if !n.is_empty() => n.clone(),
            _ => format!("Step {}", index + 1),
        }
    }

    pub fn from_record(record: &StepRecord) -> Result<Self> {
        let params = match &record.params {
            Value::Null => Value::Object(Map::new()),
            v @ Value::Object(_) => v.clone(),
            other => return Err(anyhow!("params of \"{}\" is not an object: {}", record.kind, other)),
        };

        let name = params.get("name").and_then(Value::as_str).map(str::to_string);
        let enable_loop = params.get("enable_loop").and_then(Value::as_bool).unwrap_or(true);

        let kind = match record.kind.as_str() {
            TAG_MOUSE_CLICK => StepKind::MouseClick(parse_params(params)?),
            TAG_KEYBOARD_TYPE => StepKind::KeyboardType(parse_params(params)?),
            TAG_KEYBOARD_SPECIAL => StepKind::KeyboardSpecial(parse_params(params)?),
            TAG_WAIT => StepKind::Wait(parse_params(params)?),
            TAG_LOOP_START => StepKind::LoopStart(parse_params(params)?),
            TAG_LOOP_END => StepKind::LoopEnd,
            other => StepKind::Unknown(other.to_string()),
        };

        Ok(Self { name, enable_loop, kind })
    }

    pub fn to_record(&self) -> Result<StepRecord> {
        let params = match &self.kind {
            StepKind::MouseClick(p) => serde_json::to_value(p)?,
            StepKind::KeyboardType(p) => serde_json::to_value(p)?,
            StepKind::KeyboardSpecial(p) => serde_json::to_value(p)?,
            StepKind::Wait(p) => serde_json::to_value(p)?,
            StepKind::LoopStart(p) => serde_json::to_value(p)?,
            StepKind::LoopEnd | StepKind::Unknown(_) => Value::Object(Map::new()),
        };

        let mut params = match params {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        params.insert("name".into(), Value::String(self.name.clone().unwrap_or_default()));
        params.insert("enable_loop".into(), Value::Bool(self.enable_loop));

        Ok(StepRecord {
            kind: self.kind.tag().to_string(),
            params: Value::Object(params),
        })
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).context("invalid step parameters")
}

/// The `{type, params}` form a step takes inside a workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}
