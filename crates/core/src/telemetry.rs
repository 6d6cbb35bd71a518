use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use image::DynamicImage;

use crate::events::{EventSink, ExecutorEvent};
use crate::logger;
use crate::platform::Desktop;

/// Where the interpreter's progress goes: events to the host, text to the
/// log, and (in debug mode) screenshots and match images to `debug_dir`.
///
/// Nothing here fails the run. Artifact I/O errors are logged and dropped.
pub struct Telemetry {
    sink: Box<dyn EventSink>,
    debug_dir: PathBuf,
    enabled: bool,
}

impl Telemetry {
    pub fn new(sink: Box<dyn EventSink>, debug_dir: PathBuf, enabled: bool) -> Self {
        logger::register_prefix("debug", logger::COLOR_GRAY);
        if enabled {
            if let Err(e) = fs::create_dir_all(&debug_dir) {
                logger::warn_p("debug", &format!("cannot create {}: {}", debug_dir.display(), e));
            }
        }
        Self { sink, debug_dir, enabled }
    }

    /// Debug artifacts are written only when enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn emit(&self, event: ExecutorEvent) {
        self.sink.emit(event);
    }

    /// Log `msg` and forward it to the host as `debug_info`.
    pub fn debug(&self, msg: &str) {
        logger::info_p("exec", msg);
        self.sink.emit(ExecutorEvent::DebugInfo(msg.to_string()));
    }

    pub fn warn(&self, msg: &str) {
        logger::warn_p("exec", msg);
        self.sink.emit(ExecutorEvent::DebugInfo(format!("Warning: {}", msg)));
    }

    /// Capture the screen into `{label}_{timestamp}.png`.
    pub fn step_screenshot(&self, desktop: &mut dyn Desktop, label: &str) {
        if !self.enabled {
            return;
        }
        let name = format!("{}_{}.png", label, Local::now().format("%Y%m%d_%H%M%S_%3f"));
        let result = desktop.capture_screen().and_then(|capture| {
            let image = capture
                .to_rgba()
                .ok_or_else(|| anyhow!("capture buffer does not match its size"))?;
            self.write_png(&name, &DynamicImage::ImageRgba8(image))
        });
        if let Err(e) = result {
            logger::warn_p("debug", &format!("screenshot {} skipped: {:#}", name, e));
        }
    }

    /// Save a named localization artifact (`template.png`, `match_result.png`, ...).
    pub fn save_artifact(&self, name: &str, image: impl Into<DynamicImage>) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.write_png(name, &image.into()) {
            logger::warn_p("debug", &format!("artifact {} skipped: {:#}", name, e));
        }
    }

    fn write_png(&self, name: &str, image: &DynamicImage) -> Result<()> {
        let path = self.debug_dir.join(name);
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubDesktop;
    use image::GrayImage;
    use std::sync::mpsc;

    #[test]
    fn test_debug_reaches_sink() {
        let (tx, rx) = mpsc::channel();
        let t = Telemetry::new(Box::new(tx), PathBuf::from("unused"), false);
        t.debug("hello");
        t.warn("careful");
        assert_eq!(rx.try_recv().unwrap(), ExecutorEvent::DebugInfo("hello".into()));
        assert_eq!(rx.try_recv().unwrap(), ExecutorEvent::DebugInfo("Warning: careful".into()));
    }

    #[test]
    fn test_screenshot_written_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let t = Telemetry::new(Box::new(crate::events::NullSink), dir.path().to_path_buf(), true);
        t.step_screenshot(&mut StubDesktop::new(), "step_1_before");
        t.save_artifact("template.png", GrayImage::new(4, 4));

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("step_1_before_") && n.ends_with(".png")));
        assert!(names.contains(&"template.png".to_string()));
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let t = Telemetry::new(Box::new(crate::events::NullSink), dir.path().to_path_buf(), false);
        t.step_screenshot(&mut StubDesktop::new(), "x");
        t.save_artifact("template.png", GrayImage::new(4, 4));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_dir_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        fs::write(&file, b"x").unwrap();
        let t = Telemetry::new(Box::new(crate::events::NullSink), file, true);
        t.step_screenshot(&mut StubDesktop::new(), "x");
    }
}
