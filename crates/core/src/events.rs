use std::sync::mpsc;
use std::time::Duration;

/// Progress notifications published by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    StepStarted { index: usize, kind: String },
    StepCompleted { index: usize, elapsed: Option<Duration> },
    StepError { index: usize, message: String },
    LoopIterationCompleted(u32),
    WorkflowCompleted,
    DebugInfo(String),
}

/// Receiver side of the executor's event stream. Implementations are called
/// from the execution thread.
pub trait EventSink: Send {
    fn emit(&self, event: ExecutorEvent);
}

impl EventSink for mpsc::Sender<ExecutorEvent> {
    fn emit(&self, event: ExecutorEvent) {
        // A host that dropped its receiver no longer cares.
        self.send(event).ok();
    }
}

/// Sink that discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ExecutorEvent) {}
}
