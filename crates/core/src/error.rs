use thiserror::Error;

/// Why a single step failed. None of these end the workflow.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("target not found: {target} ({reason})")]
    TargetNotFound { target: String, reason: String },

    #[error("no input available: {0}")]
    NoInputAvailable(String),

    #[error("unknown step type: {0}")]
    UnknownStepKind(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("input backend failed: {0:#}")]
    Input(#[from] anyhow::Error),
}

impl StepError {
    pub fn not_found(target: impl Into<String>, reason: impl Into<String>) -> Self {
        StepError::TargetNotFound { target: target.into(), reason: reason.into() }
    }

    /// Short message suitable for the step list; the `Display` form keeps the
    /// technical detail for the log.
    pub fn user_message(&self) -> String {
        match self {
            StepError::TargetNotFound { target, reason } => {
                format!("Could not find {}: {}", target, reason)
            }
            StepError::NoInputAvailable(what) => {
                format!("No inputs available: {}", what)
            }
            StepError::UnknownStepKind(kind) => {
                format!("This step type is not supported: \"{}\"", kind)
            }
            StepError::InvalidParameter { name, reason } => {
                format!("Step setting \"{}\" is invalid: {}", name, reason)
            }
            StepError::Input(_) => {
                "The mouse or keyboard action could not be performed".to_string()
            }
        }
    }
}
