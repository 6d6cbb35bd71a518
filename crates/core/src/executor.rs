use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::control::RunControl;
use crate::events::{EventSink, ExecutorEvent};
use crate::handlers::{self, ExecState, StepContext};
use crate::locate::Locator;
use crate::logger;
use crate::platform::{self, Desktop};
use crate::settings::Settings;
use crate::step::{Step, StepKind};
use crate::telemetry::Telemetry;
use crate::workflow::Workflow;

/// Progress of one active loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopFrame {
    pub start_index: usize,
    pub iterations_requested: u32,
    pub iterations_completed: u32,
}

/// The workflow interpreter. Walks the step list with an instruction
/// pointer and a stack of loop frames, dispatching executable steps to
/// their handlers. A failing step is reported and skipped; only a stop
/// request or the last global iteration ends a run.
pub struct Executor {
    desktop: Box<dyn Desktop>,
    control: RunControl,
    telemetry: Telemetry,
    locator: Locator,
    settings: Settings,
}

impl Executor {
    pub fn new(desktop: Box<dyn Desktop>, control: RunControl, sink: Box<dyn EventSink>, settings: Settings) -> Self {
        logger::register_prefix("exec", logger::COLOR_BLUE);
        let telemetry = Telemetry::new(sink, settings.debug_dir.clone(), settings.debug_mode);
        let locator = Locator::detect();
        match locator.ocr_name() {
            Some(name) => telemetry.debug(&format!("OCR engine available: {}", name)),
            None => telemetry.debug("No OCR engine found, text search uses the contour fallback"),
        }
        Self { desktop, control, telemetry, locator, settings }
    }

    /// Replace the localization engine.
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    /// Arm the run state and run to completion on the calling thread.
    pub fn execute(&mut self, steps: &[Step], loop_count: u32) {
        self.control.begin();
        self.run(steps, loop_count);
    }

    /// Run with the run state as it is; returns at once if already stopped.
    /// Emits `WorkflowCompleted` exactly once and leaves the state stopped.
    pub fn run(&mut self, steps: &[Step], loop_count: u32) {
        let loops = loop_count.max(1);
        let mut state = ExecState::new(steps.len());
        self.telemetry.debug(&format!("Starting workflow: {} steps, {} loop(s)", steps.len(), loops));

        for iteration in 1..=loops {
            if !self.control.is_running() {
                break;
            }
            state.reset();
            if loops > 1 {
                self.telemetry.debug(&format!("Global loop {}/{}", iteration, loops));
            }
            self.run_pass(steps, &mut state);
            if self.control.is_running() {
                self.telemetry.emit(ExecutorEvent::LoopIterationCompleted(iteration));
            }
        }

        if self.control.is_running() {
            self.telemetry.debug("Workflow completed");
        } else {
            self.telemetry.debug("Workflow stopped");
        }
        self.telemetry.emit(ExecutorEvent::WorkflowCompleted);
        self.control.stop();
    }

    fn run_pass(&mut self, steps: &[Step], state: &mut ExecState) {
        let poll = self.settings.poll_interval();
        let mut frames: Vec<LoopFrame> = Vec::new();
        let mut i = 0;

        while i < steps.len() {
            if !self.control.wait_while_paused(poll) {
                break;
            }
            let step = &steps[i];
            match &step.kind {
                StepKind::LoopStart(p) => {
                    self.telemetry.emit(ExecutorEvent::StepStarted { index: i, kind: step.kind.tag().to_string() });
                    if frames.last().map_or(true, |f| f.start_index != i) {
                        let requested = p.iterations.clamp(1, u32::MAX as i64) as u32;
                        frames.push(LoopFrame { start_index: i, iterations_requested: requested, iterations_completed: 0 });
                        self.telemetry.debug(&format!("Entering loop at step {} ({} iterations)", i + 1, requested));
                    }
                    self.telemetry.emit(ExecutorEvent::StepCompleted { index: i, elapsed: None });
                    i += 1;
                }
                StepKind::LoopEnd => {
                    let Some(frame) = frames.last_mut() else {
                        self.telemetry.warn(&format!("Loop End at step {} has no matching Loop Start", i + 1));
                        i += 1;
                        continue;
                    };
                    frame.iterations_completed += 1;
                    let (done, total, start) = (frame.iterations_completed, frame.iterations_requested, frame.start_index);
                    self.telemetry.emit(ExecutorEvent::StepCompleted { index: i, elapsed: None });
                    if done < total {
                        self.telemetry.debug(&format!("Loop iteration {}/{} done, repeating", done, total));
                        i = start + 1;
                    } else {
                        frames.pop();
                        self.telemetry.debug(&format!("Loop finished after {} iterations", total));
                        i += 1;
                    }
                }
                _ => {
                    self.run_executable(i, step, state);
                    i += 1;
                }
            }
        }

        if !frames.is_empty() && self.control.is_running() {
            let starts: Vec<String> = frames.iter().map(|f| (f.start_index + 1).to_string()).collect();
            self.telemetry.warn(&format!("Loop Start at step {} has no Loop End", starts.join(", ")));
        }
    }

    fn run_executable(&mut self, index: usize, step: &Step, state: &mut ExecState) {
        let name = step.display_name(index);
        self.telemetry.emit(ExecutorEvent::StepStarted { index, kind: step.kind.tag().to_string() });
        self.telemetry.debug(&format!("Executing {} ({})", name, step.kind.tag()));
        self.telemetry.step_screenshot(self.desktop.as_mut(), &format!("step_{}_before", index + 1));

        let started = Instant::now();
        let result = {
            let mut ctx = StepContext {
                desktop: self.desktop.as_mut(),
                telemetry: &self.telemetry,
                locator: &self.locator,
                settings: &self.settings,
                control: &self.control,
            };
            handlers::run_step(&mut ctx, state, index, step)
        };
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                if self.telemetry.enabled() && self.control.is_running() {
                    thread::sleep(self.settings.settle_delay());
                    self.telemetry.step_screenshot(self.desktop.as_mut(), &format!("step_{}_after", index + 1));
                }
                self.telemetry.emit(ExecutorEvent::StepCompleted { index, elapsed: Some(elapsed) });
            }
            Err(e) => {
                logger::error_p("exec", &format!("{} failed: {}", name, e));
                self.telemetry.emit(ExecutorEvent::StepError { index, message: e.user_message() });
            }
        }
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The execution thread exited within the grace period.
    Graceful,
    /// The thread was still inside an input call and was left to finish on
    /// its own; it exits at its next poll point.
    Detached,
}

/// One workflow execution on its own thread.
pub struct ExecutionHandle {
    control: RunControl,
    thread: Option<JoinHandle<()>>,
}

impl ExecutionHandle {
    /// Run `steps` on a new thread. The desktop is built on that thread.
    pub fn spawn_with<F>(
        steps: Vec<Step>,
        loop_count: u32,
        settings: Settings,
        sink: Box<dyn EventSink>,
        make_desktop: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Box<dyn Desktop> + Send + 'static,
    {
        let control = RunControl::new();
        control.begin();
        let worker_control = control.clone();
        let thread = thread::Builder::new()
            .name("clickflow-exec".to_string())
            .spawn(move || {
                let mut executor = Executor::new(make_desktop(), worker_control, sink, settings);
                executor.run(&steps, loop_count);
            })
            .context("failed to start execution thread")?;
        Ok(Self { control, thread: Some(thread) })
    }

    /// Run `workflow` with the platform desktop. Debug artifacts are kept
    /// only when both the settings and the workflow ask for them.
    pub fn spawn(workflow: &Workflow, settings: &Settings, force_stub: bool, sink: Box<dyn EventSink>) -> Result<Self> {
        let mut settings = settings.clone();
        settings.debug_mode &= workflow.debug_mode;
        Self::spawn_with(
            workflow.steps.clone(),
            workflow.global_loop_count,
            settings,
            sink,
            move || platform::create_desktop(force_stub),
        )
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the run to end on its own.
    pub fn join(mut self) {
        if let Some(t) = self.thread.take() {
            t.join().ok();
        }
    }

    /// Request a stop and wait up to `grace` for the thread to exit.
    pub fn stop(&mut self, grace: Duration) -> StopOutcome {
        self.control.stop();
        let Some(thread) = self.thread.take() else {
            return StopOutcome::Graceful;
        };

        let deadline = Instant::now() + grace;
        while !thread.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        if thread.is_finished() {
            thread.join().ok();
            logger::info_p("exec", "Execution stopped");
            StopOutcome::Graceful
        } else {
            logger::warn_p(
                "exec",
                &format!("Execution did not stop within {} ms, force stopped", grace.as_millis()),
            );
            StopOutcome::Detached
        }
    }

    pub fn emergency_stop(&mut self, grace: Duration) -> StopOutcome {
        logger::warn_p("exec", "EMERGENCY STOP");
        self.stop(grace)
    }
}

impl Drop for ExecutionHandle {
    fn drop(&mut self) {
        self.control.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::{Action, ActionLog, StubDesktop};
    use crate::step::{KeyboardType, LoopStart, Wait};
    use std::sync::{mpsc, Arc, Mutex};

    fn quiet() -> Settings {
        Settings { debug_mode: false, poll_interval_ms: 10, key_settle_ms: 0, ..Settings::default() }
    }

    fn run(steps: &[Step], loops: u32) -> (Vec<ExecutorEvent>, Vec<Action>) {
        let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();
        let mut ex = Executor::new(Box::new(StubDesktop::recording(log.clone())), RunControl::new(), Box::new(tx), quiet())
            .with_locator(Locator::new(None));
        ex.execute(steps, loops);
        drop(ex);
        let events = rx.iter().filter(|e| !matches!(e, ExecutorEvent::DebugInfo(_))).collect();
        let actions = log.lock().unwrap().clone();
        (events, actions)
    }

    fn typed(actions: &[Action]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Type(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    fn completed(events: &[ExecutorEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                ExecutorEvent::StepCompleted { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    fn text(t: &str) -> Step {
        Step::new(StepKind::KeyboardType(KeyboardType::single(t)))
    }

    fn loop_start(n: i64) -> Step {
        Step::new(StepKind::LoopStart(LoopStart { iterations: n }))
    }

    fn loop_end() -> Step {
        Step::new(StepKind::LoopEnd)
    }

    #[test]
    fn test_linear_steps_complete_in_order() {
        let (events, actions) = run(&[text("a"), text("b"), text("c")], 1);
        assert_eq!(completed(&events), vec![0, 1, 2]);
        assert_eq!(typed(&actions), vec!["a", "b", "c"]);
        assert_eq!(events.last(), Some(&ExecutorEvent::WorkflowCompleted));
        assert_eq!(events.iter().filter(|e| **e == ExecutorEvent::LoopIterationCompleted(1)).count(), 1);
    }

    #[test]
    fn test_loop_body_runs_n_times() {
        let (events, actions) = run(&[loop_start(3), text("x"), loop_end(), text("after")], 1);
        assert_eq!(typed(&actions), vec!["x", "x", "x", "after"]);
        assert_eq!(completed(&events), vec![0, 1, 2, 1, 2, 1, 2, 3]);
        assert!(!events.iter().any(|e| matches!(e, ExecutorEvent::StepError { .. })));
    }

    #[test]
    fn test_nested_loops() {
        let steps = [
            loop_start(2),
            text("o"),
            loop_start(3),
            text("i"),
            loop_end(),
            loop_end(),
        ];
        let (_, actions) = run(&steps, 1);
        assert_eq!(typed(&actions), vec!["o", "i", "i", "i", "o", "i", "i", "i"]);
    }

    #[test]
    fn test_rotating_text_in_loop_resets_per_global_pass() {
        let steps = [
            loop_start(3),
            Step::new(StepKind::KeyboardType(KeyboardType::multiple(["a", "b"]))),
            loop_end(),
        ];
        let (events, actions) = run(&steps, 2);
        assert_eq!(typed(&actions), vec!["a", "b", "a", "a", "b", "a"]);
        assert!(events.contains(&ExecutorEvent::LoopIterationCompleted(2)));
    }

    #[test]
    fn test_dangling_loop_end_is_skipped() {
        let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();
        let mut ex = Executor::new(Box::new(StubDesktop::recording(log.clone())), RunControl::new(), Box::new(tx), quiet())
            .with_locator(Locator::new(None));
        ex.execute(&[loop_end(), text("z")], 1);
        drop(ex);
        let events: Vec<_> = rx.iter().collect();
        assert!(events.iter().any(|e| matches!(e, ExecutorEvent::DebugInfo(m) if m.starts_with("Warning: Loop End"))));
        assert_eq!(completed(&events), vec![1]);
        assert_eq!(typed(&log.lock().unwrap()), vec!["z"]);
    }

    #[test]
    fn test_zero_iterations_clamped_and_unterminated_loop() {
        let (_, actions) = run(&[loop_start(0), text("q"), loop_end()], 1);
        assert_eq!(typed(&actions), vec!["q"]);
        let (events, actions) = run(&[loop_start(4), text("w")], 1);
        assert_eq!(typed(&actions), vec!["w"]);
        assert_eq!(events.last(), Some(&ExecutorEvent::WorkflowCompleted));
    }

    #[test]
    fn test_failing_step_does_not_abort() {
        let steps = [
            Step::new(StepKind::Unknown("Scroll".into())),
            Step::new(StepKind::KeyboardType(KeyboardType::multiple(Vec::<String>::new()))),
            text("ok"),
        ];
        let (events, actions) = run(&steps, 1);
        let errors: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ExecutorEvent::StepError { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![0, 1]);
        assert_eq!(completed(&events), vec![2]);
        assert_eq!(typed(&actions), vec!["ok"]);
    }

    #[test]
    fn test_stop_during_wait() {
        let (tx, rx) = mpsc::channel();
        let steps = vec![Step::new(StepKind::Wait(Wait { duration: 10.0 })), text("never")];
        let mut handle = ExecutionHandle::spawn_with(steps, 1, quiet(), Box::new(tx), || {
            Box::new(StubDesktop::new()) as Box<dyn Desktop>
        })
        .unwrap();

        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                ExecutorEvent::StepStarted { index: 0, .. } => break,
                _ => continue,
            }
        }
        let started = Instant::now();
        assert_eq!(handle.stop(Duration::from_secs(2)), StopOutcome::Graceful);
        assert!(started.elapsed() < Duration::from_millis(500));

        let rest: Vec<_> = rx.try_iter().collect();
        assert!(!rest.iter().any(|e| matches!(e, ExecutorEvent::StepStarted { index: 1, .. })));
        assert_eq!(rest.iter().filter(|e| **e == ExecutorEvent::WorkflowCompleted).count(), 1);
        assert!(!rest.iter().any(|e| matches!(e, ExecutorEvent::LoopIterationCompleted(_))));
    }

    #[test]
    fn test_pause_holds_progress() {
        let (tx, rx) = mpsc::channel();
        let steps = vec![Step::new(StepKind::Wait(Wait { duration: 0.1 })), text("2")];
        let handle = ExecutionHandle::spawn_with(steps, 1, quiet(), Box::new(tx), || {
            Box::new(StubDesktop::new()) as Box<dyn Desktop>
        })
        .unwrap();

        loop {
            if let ExecutorEvent::StepStarted { index: 0, .. } = rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                break;
            }
        }
        handle.pause();
        thread::sleep(Duration::from_millis(400));
        let during: Vec<_> = rx.try_iter().collect();
        assert!(!during.iter().any(|e| matches!(e, ExecutorEvent::StepStarted { index: 1, .. })));
        assert!(!handle.is_finished());

        handle.resume();
        handle.join();
        let after: Vec<_> = rx.try_iter().collect();
        assert!(after.iter().any(|e| matches!(e, ExecutorEvent::StepStarted { index: 1, .. })));
        assert!(after.contains(&ExecutorEvent::WorkflowCompleted));
    }
}
