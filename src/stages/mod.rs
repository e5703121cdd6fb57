//! The fixed build stages composed into the local pipeline.

use tracing::{info, warn};

use crate::artifacts;
use crate::error::BuildError;
use crate::pipeline::{BuildStage, PipelineState, Severity, StageContext};
use crate::process::CommandSpec;
use crate::toolchain;

/// Environment variable consumer builds use to locate staged libraries.
pub const LIB_DIR_ENV: &str = "PROTON_SDK_LIB_DIR";

/// The standard stage sequence for a full local run, in fixed order.
pub fn default_stages(skip_sync: bool, skip_tests: bool) -> Vec<Box<dyn BuildStage>> {
    let mut stages: Vec<Box<dyn BuildStage>> = vec![Box::new(ToolchainCheckStage)];
    if skip_sync {
        info!("dependency sync excluded from this run");
    } else {
        stages.push(Box::new(SubmoduleSyncStage));
    }
    stages.push(Box::new(ManagedBuildStage));
    stages.push(Box::new(CollectArtifactsStage));
    stages.push(Box::new(SystemsBuildStage));
    if skip_tests {
        info!("workspace tests excluded from this run");
    } else {
        stages.push(Box::new(WorkspaceTestStage));
    }
    stages
}

/// Verifies both required toolchains and the managed-runtime version floor.
pub struct ToolchainCheckStage;

impl BuildStage for ToolchainCheckStage {
    fn name(&self) -> &'static str {
        "check-toolchains"
    }

    fn severity(&self) -> Severity {
        Severity::Fatal
    }

    fn state(&self) -> PipelineState {
        PipelineState::CheckingDeps
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), BuildError> {
        toolchain::verify(ctx.runner).map(|_| ())
    }
}

/// Brings the nested SDK checkout up to date. A stale checkout from an
/// earlier run is still buildable, so failure never blocks the pipeline.
pub struct SubmoduleSyncStage;

impl BuildStage for SubmoduleSyncStage {
    fn name(&self) -> &'static str {
        "sync-dependencies"
    }

    fn severity(&self) -> Severity {
        Severity::Advisory
    }

    fn state(&self) -> PipelineState {
        PipelineState::Syncing
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), BuildError> {
        let spec = CommandSpec::new("git")
            .args(["submodule", "update", "--init", "--recursive"])
            .cwd(ctx.config.base_dir.clone());
        match ctx.runner.run(&spec) {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(BuildError::SyncFailed(format!(
                "git exited with code {}",
                output.code_or_default()
            ))),
            Err(err) => Err(BuildError::SyncFailed(err.to_string())),
        }
    }
}

/// Runs the managed release build inside the SDK tree.
pub struct ManagedBuildStage;

impl BuildStage for ManagedBuildStage {
    fn name(&self) -> &'static str {
        "managed-build"
    }

    fn severity(&self) -> Severity {
        Severity::Fatal
    }

    fn state(&self) -> PipelineState {
        PipelineState::ManagedBuild
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), BuildError> {
        let sdk_dir = ctx.config.sdk_dir();
        if !sdk_dir.is_dir() {
            return Err(BuildError::ProjectDirectoryMissing(sdk_dir));
        }

        let spec = CommandSpec::new(toolchain::MANAGED_TOOL)
            .args(["build", "-c", "Release"])
            .cwd(sdk_dir);
        let output = ctx.runner.run(&spec)?;
        if !output.success() {
            return Err(BuildError::ManagedBuildFailed(output.code_or_default()));
        }
        Ok(())
    }
}

/// Collects matching native libraries from the export projects into the flat
/// output directory and records the count on the run summary.
pub struct CollectArtifactsStage;

impl BuildStage for CollectArtifactsStage {
    fn name(&self) -> &'static str {
        "collect-artifacts"
    }

    fn severity(&self) -> Severity {
        Severity::Fatal
    }

    fn state(&self) -> PipelineState {
        PipelineState::Collecting
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), BuildError> {
        let count = artifacts::collect(&ctx.config.sdk_dir(), &ctx.config.native_libs_dir())?;
        ctx.summary.record_artifacts(count);
        Ok(())
    }
}

/// Three cargo invocations of increasing scope. The package-scoped builds
/// exist to surface early diagnostics and only warn; the workspace build is
/// the authoritative gate.
pub struct SystemsBuildStage;

impl SystemsBuildStage {
    fn cargo_build(ctx: &StageContext<'_>, scope_args: &[&str]) -> std::io::Result<Option<i32>> {
        let lib_dir = ctx.config.native_libs_dir();
        let spec = CommandSpec::new(toolchain::SYSTEMS_TOOL)
            .args(["build", "--release"])
            .args(scope_args.iter().copied())
            .cwd(ctx.config.workspace_dir())
            .env(LIB_DIR_ENV, lib_dir.to_string_lossy());
        let output = ctx.runner.run(&spec)?;
        if output.success() {
            Ok(None)
        } else {
            Ok(Some(output.code_or_default()))
        }
    }
}

impl BuildStage for SystemsBuildStage {
    fn name(&self) -> &'static str {
        "systems-build"
    }

    fn severity(&self) -> Severity {
        Severity::Fatal
    }

    fn state(&self) -> PipelineState {
        PipelineState::SystemsBuild
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), BuildError> {
        for package in [&ctx.config.sys_package, &ctx.config.wrapper_package] {
            match Self::cargo_build(ctx, &["-p", package.as_str()]) {
                Ok(None) => info!(package = package.as_str(), "package build succeeded"),
                Ok(Some(code)) => ctx.summary.record_warning(format!(
                    "package build failed for '{package}' (exit code {code})"
                )),
                Err(err) => ctx
                    .summary
                    .record_warning(format!("package build not invocable for '{package}': {err}")),
            }
        }

        match Self::cargo_build(ctx, &["--workspace"])? {
            None => Ok(()),
            Some(code) => Err(BuildError::WorkspaceBuildFailed(code)),
        }
    }
}

/// Runs the workspace test suite. Test failures are diagnostic, not
/// release-blocking.
pub struct WorkspaceTestStage;

impl BuildStage for WorkspaceTestStage {
    fn name(&self) -> &'static str {
        "workspace-tests"
    }

    fn severity(&self) -> Severity {
        Severity::Advisory
    }

    fn state(&self) -> PipelineState {
        PipelineState::Testing
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<(), BuildError> {
        let spec = CommandSpec::new(toolchain::SYSTEMS_TOOL)
            .args(["test", "--workspace"])
            .cwd(ctx.config.workspace_dir())
            .env(
                LIB_DIR_ENV,
                ctx.config.native_libs_dir().to_string_lossy(),
            );
        match ctx.runner.run(&spec) {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(BuildError::TestsFailed(output.code_or_default())),
            Err(err) => {
                warn!(error = %err, "test runner not invocable");
                Err(BuildError::Io(err))
            }
        }
    }
}
