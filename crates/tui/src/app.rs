use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use clickflow_core::events::ExecutorEvent;
use clickflow_core::executor::{ExecutionHandle, StopOutcome};
use clickflow_core::logger;
use clickflow_core::settings::Settings;
use clickflow_core::workflow::Workflow;

#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    Pending,
    Running,
    Done(Option<Duration>),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Stopped,
}

pub struct StepRow {
    pub name: String,
    pub kind: String,
    pub status: StepStatus,
}

pub struct App {
    pub workflow: Workflow,
    pub workflow_path: Option<PathBuf>,
    pub settings: Settings,
    pub force_stub: bool,
    pub rows: Vec<StepRow>,
    pub run_state: RunState,
    pub loops_done: u32,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub should_quit: bool,
    handle: Option<ExecutionHandle>,
    event_rx: Option<mpsc::Receiver<ExecutorEvent>>,
}

impl App {
    pub fn new(
        workflow: Workflow,
        workflow_path: Option<PathBuf>,
        settings: Settings,
        force_stub: bool,
        log_rx: mpsc::Receiver<String>,
    ) -> Self {
        let rows = workflow
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepRow {
                name: s.display_name(i),
                kind: s.kind.tag().to_string(),
                status: StepStatus::Pending,
            })
            .collect();
        Self {
            workflow,
            workflow_path,
            settings,
            force_stub,
            rows,
            run_state: RunState::Idle,
            loops_done: 0,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            should_quit: false,
            handle: None,
            event_rx: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn drain_logs(&mut self) {
        while let Ok(msg) = self.log_rx.try_recv() {
            self.log_messages.push(msg);
        }
    }

    /// Apply executor progress and reap a finished run.
    pub fn drain_events(&mut self) {
        let events: Vec<ExecutorEvent> = match &self.event_rx {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        };
        for event in events {
            self.apply_event(event);
        }
        if self.handle.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(h) = self.handle.take() {
                h.join();
            }
        }
    }

    pub fn apply_event(&mut self, event: ExecutorEvent) {
        match event {
            ExecutorEvent::StepStarted { index, .. } => self.set_status(index, StepStatus::Running),
            ExecutorEvent::StepCompleted { index, elapsed } => self.set_status(index, StepStatus::Done(elapsed)),
            ExecutorEvent::StepError { index, message } => {
                logger::error(&format!("step {}: {}", index + 1, message));
                self.set_status(index, StepStatus::Error(message));
            }
            ExecutorEvent::LoopIterationCompleted(n) => {
                self.loops_done = n;
                if n < self.workflow.global_loop_count {
                    self.reset_rows();
                }
            }
            ExecutorEvent::WorkflowCompleted => {
                if self.run_state != RunState::Stopped {
                    self.run_state = RunState::Idle;
                }
                self.event_rx = None;
            }
            ExecutorEvent::DebugInfo(_) => {} // already in the log
        }
    }

    fn set_status(&mut self, index: usize, status: StepStatus) {
        if let Some(row) = self.rows.get_mut(index) {
            row.status = status;
        }
    }

    fn reset_rows(&mut self) {
        for row in &mut self.rows {
            row.status = StepStatus::Pending;
        }
    }

    pub fn start_run(&mut self) {
        if self.is_active() {
            logger::warn("a workflow is already running");
            return;
        }
        if self.workflow.steps.is_empty() {
            logger::warn("no steps to run");
            return;
        }
        let (tx, rx) = mpsc::channel();
        match ExecutionHandle::spawn(&self.workflow, &self.settings, self.force_stub, Box::new(tx)) {
            Ok(handle) => {
                self.reset_rows();
                self.loops_done = 0;
                self.handle = Some(handle);
                self.event_rx = Some(rx);
                self.run_state = RunState::Running;
                logger::info(&format!(
                    "running {} step(s), {} loop(s)",
                    self.workflow.steps.len(),
                    self.workflow.global_loop_count
                ));
            }
            Err(e) => logger::error(&format!("cannot start workflow: {:#}", e)),
        }
    }

    pub fn toggle_pause(&mut self) {
        let Some(handle) = self.handle.as_ref().filter(|h| !h.is_finished()) else {
            return;
        };
        if handle.is_paused() {
            handle.resume();
            self.run_state = RunState::Running;
            logger::info("resumed");
        } else {
            handle.pause();
            self.run_state = RunState::Paused;
            logger::info("paused, takes effect after the current step action");
        }
    }

    pub fn stop(&mut self) {
        let grace = Duration::from_millis(self.settings.stop_grace_ms);
        self.halt(grace, false);
    }

    pub fn emergency_stop(&mut self) {
        let grace = Duration::from_millis(self.settings.emergency_grace_ms);
        self.halt(grace, true);
    }

    fn halt(&mut self, grace: Duration, emergency: bool) {
        let Some(mut handle) = self.handle.take() else { return };
        self.run_state = RunState::Stopped;
        let outcome = if emergency { handle.emergency_stop(grace) } else { handle.stop(grace) };
        // Pick up the events the run sent while exiting.
        self.drain_events();
        if outcome == StopOutcome::Detached {
            self.event_rx = None;
        }
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    /// Stop any run, remember the workflow, and leave.
    pub fn quit(&mut self) {
        if self.is_active() {
            self.stop();
        }
        if let Some(path) = &self.workflow_path {
            self.settings.last_workflow = Some(path.clone());
            self.settings.save(&settings_path());
        }
        self.should_quit = true;
    }
}

pub fn settings_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickflow_core::step::{KeyboardType, Step, StepKind};

    fn app() -> App {
        let (_tx, rx) = mpsc::channel();
        let wf = Workflow::new(vec![
            Step::new(StepKind::KeyboardType(KeyboardType::single("a"))),
            Step::named("second", StepKind::KeyboardType(KeyboardType::single("b"))),
        ])
        .with_loops(2);
        App::new(wf, None, Settings::default(), true, rx)
    }

    #[test]
    fn test_events_update_rows() {
        let mut app = app();
        assert_eq!(app.rows[0].name, "Step 1");
        assert_eq!(app.rows[1].name, "second");

        app.apply_event(ExecutorEvent::StepStarted { index: 0, kind: "Keyboard Type".into() });
        assert_eq!(app.rows[0].status, StepStatus::Running);
        app.apply_event(ExecutorEvent::StepError { index: 1, message: "nope".into() });
        assert_eq!(app.rows[1].status, StepStatus::Error("nope".into()));

        app.apply_event(ExecutorEvent::LoopIterationCompleted(1));
        assert_eq!(app.loops_done, 1);
        assert!(app.rows.iter().all(|r| r.status == StepStatus::Pending));

        app.apply_event(ExecutorEvent::StepCompleted { index: 7, elapsed: None });
    }

    #[test]
    fn test_completion_keeps_stopped_banner() {
        let mut app = app();
        app.run_state = RunState::Stopped;
        app.apply_event(ExecutorEvent::WorkflowCompleted);
        assert_eq!(app.run_state, RunState::Stopped);

        app.run_state = RunState::Running;
        app.apply_event(ExecutorEvent::WorkflowCompleted);
        assert_eq!(app.run_state, RunState::Idle);
    }
}
