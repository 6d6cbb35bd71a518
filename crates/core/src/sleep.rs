use std::thread;
use std::time::{Duration, Instant};

use crate::control::RunControl;

/// Sleep for `total` in `step` increments, re-checking the run state after
/// each one. Time spent paused does not count toward `total`.
/// Returns false if a stop was observed before the full duration elapsed.
pub fn sleep_interruptible(total: Duration, step: Duration, control: &RunControl) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if !control.wait_while_paused(step) {
            return false;
        }
        let slice = remaining.min(step);
        let started = Instant::now();
        thread::sleep(slice);
        remaining = remaining.saturating_sub(started.elapsed().max(slice));
    }
    control.is_running()
}
