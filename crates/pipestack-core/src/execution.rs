//! Stage-by-stage execution model for a declared pipeline.
//!
//! Stages run strictly in declaration order. A failed stage halts the
//! execution; later stages are never started and stay `Pending`.

use std::fmt;

use tracing::{info, warn};

use crate::codepipeline::PipelineHandle;
use crate::{Error, Result};

/// State of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed { message: String },
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Succeeded | StageState::Failed { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageState::Succeeded)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Pending => write!(f, "pending"),
            StageState::Running => write!(f, "running"),
            StageState::Succeeded => write!(f, "succeeded"),
            StageState::Failed { message } => write!(f, "failed: {}", message),
        }
    }
}

/// Result reported for a running stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// No stage has started yet.
    Pending,
    /// A stage is running or the next one is ready to start.
    InProgress,
    Succeeded,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "Pending"),
            ExecutionStatus::InProgress => write!(f, "InProgress"),
            ExecutionStatus::Succeeded => write!(f, "Succeeded"),
            ExecutionStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// One run of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineExecution {
    stages: Vec<(String, StageState)>,
}

impl PipelineExecution {
    pub fn from_stage_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: names
                .into_iter()
                .map(|n| (n.into(), StageState::Pending))
                .collect(),
        }
    }

    pub fn for_pipeline(pipeline: &PipelineHandle) -> Self {
        Self::from_stage_names(pipeline.stage_names())
    }

    pub fn stages(&self) -> impl Iterator<Item = (&str, &StageState)> {
        self.stages.iter().map(|(name, state)| (name.as_str(), state))
    }

    pub fn stage_state(&self, name: &str) -> Option<&StageState> {
        self.stages.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn status(&self) -> ExecutionStatus {
        if self.stages.iter().any(|(_, s)| matches!(s, StageState::Failed { .. })) {
            return ExecutionStatus::Failed;
        }
        if self.stages.iter().all(|(_, s)| s.is_success()) {
            return ExecutionStatus::Succeeded;
        }
        if self.stages.iter().all(|(_, s)| *s == StageState::Pending) {
            return ExecutionStatus::Pending;
        }
        ExecutionStatus::InProgress
    }

    /// Move the next pending stage to `Running` and return its name.
    ///
    /// Returns `None` once the execution has finished or failed.
    pub fn start_next(&mut self) -> Result<Option<String>> {
        if self.status() == ExecutionStatus::Failed {
            return Ok(None);
        }
        if let Some((name, _)) = self.stages.iter().find(|(_, s)| *s == StageState::Running) {
            return Err(Error::InvalidInput(format!(
                "stage '{}' is still running",
                name
            )));
        }

        let Some((name, state)) = self.stages.iter_mut().find(|(_, s)| *s == StageState::Pending) else {
            return Ok(None);
        };
        *state = StageState::Running;
        info!(stage = %name, "Stage started");
        Ok(Some(name.clone()))
    }

    /// Record the outcome of the running stage.
    pub fn complete(&mut self, name: &str, outcome: StageOutcome) -> Result<()> {
        let Some((_, state)) = self.stages.iter_mut().find(|(n, _)| n == name) else {
            return Err(Error::NotFound(format!("stage '{}'", name)));
        };
        if *state != StageState::Running {
            return Err(Error::InvalidInput(format!(
                "stage '{}' is {}, not running",
                name, state
            )));
        }

        *state = match outcome {
            StageOutcome::Succeeded => {
                info!(stage = %name, "Stage succeeded");
                StageState::Succeeded
            }
            StageOutcome::Failed(message) => {
                warn!(stage = %name, %message, "Stage failed, halting execution");
                StageState::Failed { message }
            }
        };
        Ok(())
    }

    /// Drive every stage through `run` until the execution finishes.
    pub fn run_with<F>(&mut self, mut run: F) -> Result<ExecutionStatus>
    where
        F: FnMut(&str) -> StageOutcome,
    {
        while let Some(stage) = self.start_next()? {
            let outcome = run(&stage);
            self.complete(&stage, outcome)?;
        }
        let status = self.status();
        info!(%status, "Execution finished");
        Ok(status)
    }
}
