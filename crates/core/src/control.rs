use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Run-state flags shared between the execution thread and its controller.
///
/// `running` only goes from true to false during one execution; a fresh
/// execution re-arms it with [`RunControl::begin`]. `paused` toggles freely.
/// Nothing here interrupts an input call already in flight: the interpreter
/// sees changes at its next poll point.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    inner: Arc<Flags>,
}

#[derive(Debug, Default)]
struct Flags {
    running: AtomicBool,
    paused: AtomicBool,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) {
        self.inner.paused.store(false, Ordering::Release);
        self.inner.running.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
    }

    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Block while paused. Returns whether execution should continue.
    pub fn wait_while_paused(&self, poll: Duration) -> bool {
        while self.is_paused() && self.is_running() {
            std::thread::sleep(poll);
        }
        self.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_clones_share_flags() {
        let ctl = RunControl::new();
        let remote = ctl.clone();
        ctl.begin();
        assert!(remote.is_running());
        remote.pause();
        assert!(ctl.is_paused());
        remote.resume();
        assert!(!ctl.is_paused());
        remote.stop();
        assert!(!ctl.is_running());
    }

    #[test]
    fn test_begin_clears_pause() {
        let ctl = RunControl::new();
        ctl.pause();
        ctl.begin();
        assert!(!ctl.is_paused());
        assert!(ctl.is_running());
    }

    #[test]
    fn test_stop_releases_paused_wait() {
        let ctl = RunControl::new();
        ctl.begin();
        ctl.pause();
        let remote = ctl.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.stop();
        });
        let started = Instant::now();
        assert!(!ctl.wait_while_paused(Duration::from_millis(10)));
        assert!(started.elapsed() < Duration::from_secs(2));
        t.join().unwrap();
    }
}
