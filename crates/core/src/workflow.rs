use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::step::{Step, StepRecord};

pub const DOCUMENT_VERSION: &str = "1.0";

/// Ordered steps plus how many times the whole list is replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub steps: Vec<Step>,
    pub global_loop_count: u32,
    pub debug_mode: bool,
}

impl Workflow {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps, global_loop_count: 1, debug_mode: true }
    }

    pub fn with_loops(mut self, count: u32) -> Self {
        self.global_loop_count = count.max(1);
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read workflow {}", path.display()))?;
        let doc: WorkflowDocument = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse workflow {}", path.display()))?;
        Self::from_document(&doc)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).ok();
        }
        let json = serde_json::to_string_pretty(&self.to_document()?)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write workflow {}", path.display()))
    }

    pub fn from_document(doc: &WorkflowDocument) -> Result<Self> {
        let steps = doc
            .steps
            .iter()
            .enumerate()
            .map(|(i, r)| Step::from_record(r).with_context(|| format!("step {} ({})", i + 1, r.kind)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            steps,
            global_loop_count: doc.loop_count.unwrap_or(1).max(1),
            debug_mode: doc.debug_mode,
        })
    }

    pub fn to_document(&self) -> Result<WorkflowDocument> {
        Ok(WorkflowDocument {
            version: DOCUMENT_VERSION.to_string(),
            created_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            debug_mode: self.debug_mode,
            loop_count: Some(self.global_loop_count),
            steps: self.steps.iter().map(Step::to_record).collect::<Result<Vec<_>>>()?,
        })
    }
}

/// On-disk workflow file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default = "default_debug_mode")]
    pub debug_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<u32>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

fn default_debug_mode() -> bool {
    true
}
