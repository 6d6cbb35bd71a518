use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};

use chrono::Local;

pub const LOG_FILE: &str = "automation.log";

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: Option<File>,
    tui_tx: Option<mpsc::Sender<String>>,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for TUI rendering (mapped in ui.rs)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;

/// Initialize the global logger, appending to `automation.log` in `log_dir`.
/// If the file cannot be opened the logger still feeds the TUI.
pub fn init(log_dir: &Path) {
    fs::create_dir_all(log_dir).ok();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))
        .ok();

    let fresh = LOGGER
        .set(Mutex::new(Logger { file, tui_tx: None, prefixes: HashMap::new() }))
        .is_ok();

    if fresh {
        if let Some(logger) = LOGGER.get() {
            let mut l = logger.lock().unwrap();
            if let Some(f) = l.file.as_mut() {
                writeln!(f, "==== session {} ====", Local::now().format("%Y-%m-%d %H:%M:%S")).ok();
            }
        }
    }
}

/// Wire the TUI log channel.
pub fn set_tui_sender(tx: mpsc::Sender<String>) {
    if let Some(logger) = LOGGER.get() {
        logger.lock().unwrap().tui_tx = Some(tx);
    }
}

/// Register a prefix with a color used by the `*_p` functions.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(logger) = LOGGER.get() {
        logger.lock().unwrap().prefixes.insert(prefix.to_string(), color);
    }
}

/// Internal: format for TUI channel uses \x1f as field separator:
/// level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage
fn write_log(level: &str, prefix: &str, msg: &str) {
    let Some(logger) = LOGGER.get() else { return };
    let Ok(mut l) = logger.lock() else { return };

    let now = Local::now();
    let color = l.prefixes.get(prefix).copied().unwrap_or(0);

    // Multi-line messages are flattened for the file; the TUI wraps them itself.
    if let Some(f) = l.file.as_mut() {
        let ts = now.format("%Y-%m-%d %H:%M:%S%.3f");
        let flat = msg.replace('\n', " | ");
        if prefix.is_empty() {
            writeln!(f, "{} - {} - {}", ts, level, flat).ok();
        } else {
            writeln!(f, "{} - {} - [{}] {}", ts, level, prefix, flat).ok();
        }
    }

    if let Some(tx) = &l.tui_tx {
        let ts = now.format("%H:%M:%S");
        for line in msg.lines().filter(|s| !s.trim().is_empty()) {
            tx.send(format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", level, prefix, color, ts, line)).ok();
        }
    }
}

pub fn info(msg: &str) {
    write_log("INFO", "", msg);
}

pub fn warn(msg: &str) {
    write_log("WARN", "", msg);
}

pub fn error(msg: &str) {
    write_log("ERROR", "", msg);
}

/// Log with a registered prefix.
pub fn info_p(prefix: &str, msg: &str) {
    write_log("INFO", prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log("WARN", prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log("ERROR", prefix, msg);
}
