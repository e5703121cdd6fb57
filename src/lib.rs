pub mod artifacts;
pub mod config;
pub mod error;
pub mod matrix;
pub mod observability;
pub mod pipeline;
pub mod process;
pub mod release;
pub mod stages;
pub mod toolchain;
pub mod validation;

pub use config::BuildConfig;
pub use error::BuildError;
pub use pipeline::{Pipeline, PipelineOutcome, PipelineState, Severity, StepOutcome};
pub use process::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
