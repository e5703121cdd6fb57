use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::observability::SummaryCollector;
use crate::process::CommandRunner;

/// Whether a step's failure halts the pipeline. Fixed at stage construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Fatal,
    Advisory,
}

/// Tagged outcome of one executed step, consumed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    AdvisoryFailure(String),
    FatalFailure(String),
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Success => "success",
            StepOutcome::AdvisoryFailure(_) => "advisory-failure",
            StepOutcome::FatalFailure(_) => "fatal-failure",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            StepOutcome::Success => None,
            StepOutcome::AdvisoryFailure(reason) | StepOutcome::FatalFailure(reason) => {
                Some(reason)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub step: String,
    pub outcome: StepOutcome,
    pub duration: std::time::Duration,
}

/// Orchestrator states. The run advances through the build states in fixed
/// order and terminates in Done or Aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Init,
    CheckingDeps,
    Syncing,
    ManagedBuild,
    Collecting,
    SystemsBuild,
    Testing,
    Done,
    Aborted,
}

/// One pipeline stage. Implementations perform a unit of build work through
/// the command-runner seam; the orchestrator maps their errors to advisory or
/// fatal outcomes according to [`BuildStage::severity`].
pub trait BuildStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn severity(&self) -> Severity;
    fn state(&self) -> PipelineState;
    fn run(&self, ctx: &StageContext<'_>) -> Result<(), BuildError>;
}

/// Everything a stage may touch: configuration, the host command seam and the
/// shared run summary.
pub struct StageContext<'a> {
    pub config: &'a BuildConfig,
    pub runner: &'a dyn CommandRunner,
    pub summary: &'a SummaryCollector,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub steps: Vec<StepResult>,
    pub success: bool,
}

impl PipelineOutcome {
    /// The step the run aborted at, if it did.
    pub fn aborted_step(&self) -> Option<&StepResult> {
        if self.state == PipelineState::Aborted {
            self.steps.last()
        } else {
            None
        }
    }
}

/// Sequential orchestrator over a fixed stage order. Owns the run summary.
pub struct Pipeline {
    stages: Vec<Box<dyn BuildStage>>,
    summary: SummaryCollector,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn BuildStage>>) -> Self {
        Self {
            stages,
            summary: SummaryCollector::new(),
        }
    }

    /// The standard six-stage sequence for a full local run.
    pub fn standard(skip_sync: bool, skip_tests: bool) -> Self {
        Self::new(crate::stages::default_stages(skip_sync, skip_tests))
    }

    pub fn summary(&self) -> SummaryCollector {
        self.summary.clone()
    }

    /// Execute every stage in order, aborting at the first fatal failure and
    /// continuing past advisory ones.
    pub fn execute(&self, config: &BuildConfig, runner: &dyn CommandRunner) -> PipelineOutcome {
        self.summary.reset();
        let total_start = Instant::now();
        let ctx = StageContext {
            config,
            runner,
            summary: &self.summary,
        };

        let mut steps = Vec::with_capacity(self.stages.len());
        let mut aborted = false;

        for stage in &self.stages {
            let span = tracing::span!(tracing::Level::INFO, "step", step = stage.name());
            let _guard = span.enter();
            debug!(state = ?stage.state(), "entering state");
            info!("starting step");

            let started = Instant::now();
            let outcome = match stage.run(&ctx) {
                Ok(()) => StepOutcome::Success,
                Err(err) => match stage.severity() {
                    Severity::Advisory => StepOutcome::AdvisoryFailure(err.to_string()),
                    Severity::Fatal => StepOutcome::FatalFailure(err.to_string()),
                },
            };
            let duration = started.elapsed();

            match &outcome {
                StepOutcome::Success => info!("step completed"),
                StepOutcome::AdvisoryFailure(reason) => {
                    self.summary
                        .record_warning(format!("{}: {reason}", stage.name()));
                }
                StepOutcome::FatalFailure(reason) => {
                    error!(%reason, "step failed (fatal), aborting pipeline");
                }
            }
            self.summary.record_step(
                stage.name(),
                outcome.label(),
                outcome.detail().map(str::to_string),
                duration,
            );

            let fatal = matches!(outcome, StepOutcome::FatalFailure(_));
            steps.push(StepResult {
                step: stage.name().to_string(),
                outcome,
                duration,
            });
            if fatal {
                aborted = true;
                break;
            }
        }

        self.summary.record_total_duration(total_start.elapsed());
        let state = if aborted {
            PipelineState::Aborted
        } else {
            PipelineState::Done
        };
        PipelineOutcome {
            state,
            steps,
            success: !aborted,
        }
    }
}
