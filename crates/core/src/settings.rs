use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Host configuration, persisted as `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub debug_mode: bool,
    pub debug_dir: PathBuf,
    pub images_dir: PathBuf,
    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub key_settle_ms: u64,
    pub stop_grace_ms: u64,
    pub emergency_grace_ms: u64,
    pub last_workflow: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_mode: true,
            debug_dir: PathBuf::from("debug"),
            images_dir: PathBuf::from("images"),
            poll_interval_ms: 100,
            settle_delay_ms: 500,
            key_settle_ms: 100,
            stop_grace_ms: 2000,
            emergency_grace_ms: 1000,
            last_workflow: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = std::fs::write(path, json);
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn key_settle(&self) -> Duration {
        Duration::from_millis(self.key_settle_ms)
    }

    /// Resolve a reference image: absolute paths are used as is, anything
    /// else is looked up by file name in `images_dir`.
    pub fn resolve_image(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            return p.to_path_buf();
        }
        match p.file_name() {
            Some(name) => self.images_dir.join(name),
            None => self.images_dir.join(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"debug_mode": false, "poll_interval_ms": 50}"#).unwrap();
        let s = Settings::load(&path);
        assert!(!s.debug_mode);
        assert_eq!(s.poll_interval(), Duration::from_millis(50));
        assert_eq!(s.stop_grace_ms, 2000);
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_resolve_image() {
        let s = Settings { images_dir: PathBuf::from("imgs"), ..Settings::default() };
        assert_eq!(s.resolve_image("shots/button.png"), PathBuf::from("imgs").join("button.png"));
        let abs = std::env::temp_dir().join("x.png");
        assert_eq!(s.resolve_image(abs.to_str().unwrap()), abs);
    }
}
