use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the build pipeline.
///
/// Whether a given variant aborts the run is decided by the severity of the
/// step that raised it, not by the variant itself; the orchestrator downgrades
/// errors from advisory steps to recorded warnings.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("required tool '{0}' not found on this host")]
    ToolMissing(String),

    #[error("managed runtime version too low: found {found}, required {required}")]
    VersionTooLow { found: u32, required: u32 },

    #[error("SDK project directory missing: {0}")]
    ProjectDirectoryMissing(PathBuf),

    #[error("managed build failed with exit code {0}")]
    ManagedBuildFailed(i32),

    #[error("dependency synchronization failed: {0}")]
    SyncFailed(String),

    #[error("no native library artifacts found in any export project")]
    NoArtifactsFound,

    #[error("workspace build failed with exit code {0}")]
    WorkspaceBuildFailed(i32),

    #[error("workspace tests failed with exit code {0}")]
    TestsFailed(i32),

    #[error("matrix cell '{0}' left no output directory")]
    MatrixCellCritical(String),

    #[error("no artifact directory for declared platform '{0}'")]
    PlatformOutputMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
