use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use proton_sdk_build::artifacts;
use proton_sdk_build::config::BuildConfig;
use proton_sdk_build::error::BuildError;
use proton_sdk_build::matrix::{self, CellStatus, PLATFORM_MATRIX, PlatformTarget};
use proton_sdk_build::observability::{SummaryCollector, log_summary};
use proton_sdk_build::pipeline::{Pipeline, StageContext};
use proton_sdk_build::process::{CommandRunner, CommandSpec, ProcessRunner};
use proton_sdk_build::release;
use proton_sdk_build::stages::SubmoduleSyncStage;
use proton_sdk_build::toolchain;
use proton_sdk_build::validation::validate_config;
use serde_json::to_writer_pretty;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    let config = load_config(cli.config.as_deref(), cli.base_dir)?;

    match cli.command {
        None => run_pipeline(&config, RunOptions::default()),
        Some(Commands::Run {
            skip_sync,
            skip_tests,
            print_summary,
            summary_json,
        }) => run_pipeline(
            &config,
            RunOptions {
                skip_sync,
                skip_tests,
                print_summary,
                summary_json,
            },
        ),
        Some(Commands::Check) => check(),
        Some(Commands::Sync) => sync(&config),
        Some(Commands::Collect) => collect(&config),
        Some(Commands::Matrix { only, host }) => run_matrix(&config, only, host),
        Some(Commands::Package { tag }) => package(&config, &tag),
        Some(Commands::Clean) => clean(&config),
        Some(Commands::Completions { shell }) => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "proton-sdk-build", &mut io::stdout());
            Ok(())
        }
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

fn load_config(config_path: Option<&std::path::Path>, base_dir: Option<PathBuf>) -> Result<BuildConfig> {
    let mut config = match config_path {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::default(),
    };
    if let Some(base_dir) = base_dir {
        config.base_dir = base_dir;
    }

    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!("{warning}");
    }
    if !report.is_ok() {
        bail!(
            "Invalid build configuration: {}",
            report.errors.join("; ")
        );
    }
    Ok(config)
}

#[derive(Debug, Default)]
struct RunOptions {
    skip_sync: bool,
    skip_tests: bool,
    print_summary: bool,
    summary_json: Option<PathBuf>,
}

fn run_pipeline(config: &BuildConfig, options: RunOptions) -> Result<()> {
    let pipeline = Pipeline::standard(options.skip_sync, options.skip_tests);
    let runner = ProcessRunner::new();
    let outcome = pipeline.execute(config, &runner);
    let summary = pipeline.summary().snapshot();

    if options.print_summary {
        log_summary(&summary);
    }
    if let Some(path) = options.summary_json {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create summary directory: {}", parent.display())
            })?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create summary file: {}", path.display()))?;
        to_writer_pretty(file, &summary)
            .with_context(|| format!("Failed to write summary JSON: {}", path.display()))?;
        info!(summary = %path.display(), "Summary JSON written");
    }

    if outcome.success {
        println!(
            "Build completed successfully: {} artifact(s) collected, {} warning(s)",
            summary.artifacts_copied,
            summary.warnings.len()
        );
        Ok(())
    } else {
        let position = outcome.steps.len();
        let step = outcome
            .aborted_step()
            .map(|result| result.step.clone())
            .unwrap_or_else(|| "unknown".to_string());
        bail!("Build aborted at step {position} ({step})");
    }
}

fn check() -> Result<()> {
    let runner = ProcessRunner::new();
    let versions = toolchain::verify(&runner)?;
    println!("dotnet: {}", versions.dotnet);
    println!("cargo: {}", versions.cargo);
    Ok(())
}

fn sync(config: &BuildConfig) -> Result<()> {
    use proton_sdk_build::pipeline::BuildStage;

    let runner = ProcessRunner::new();
    let summary = SummaryCollector::new();
    let ctx = StageContext {
        config,
        runner: &runner,
        summary: &summary,
    };
    // Advisory even when invoked standalone; a stale checkout is usable.
    if let Err(err) = SubmoduleSyncStage.run(&ctx) {
        warn!(error = %err, "dependency sync failed");
    }
    Ok(())
}

fn collect(config: &BuildConfig) -> Result<()> {
    let count = artifacts::collect(&config.sdk_dir(), &config.native_libs_dir())?;
    println!(
        "Collected {count} native librar{} into {}",
        if count == 1 { "y" } else { "ies" },
        config.native_libs_dir().display()
    );
    Ok(())
}

fn run_matrix(config: &BuildConfig, only: Option<String>, host: bool) -> Result<()> {
    let targets: Vec<PlatformTarget> = if host {
        let target = matrix::detect_host()
            .ok_or_else(|| anyhow!("This host is not part of the declared platform matrix"))?;
        vec![target]
    } else {
        match only {
            Some(rid) => {
                let target = matrix::find_target(&rid).ok_or_else(|| {
                    anyhow!(
                        "Unknown platform '{rid}'. Declared platforms: {}",
                        PLATFORM_MATRIX
                            .iter()
                            .map(|t| t.rid)
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                })?;
                vec![target]
            }
            None => PLATFORM_MATRIX.to_vec(),
        }
    };

    let runner = ProcessRunner::new();
    let reports = matrix::run_cells(config, &runner, &targets);

    for report in &reports {
        let status = match report.status {
            CellStatus::Built => "built",
            CellStatus::Degraded => "degraded (placeholder)",
            CellStatus::Critical => "CRITICAL (no output)",
        };
        println!(
            "{:<12} {:<24} {}",
            report.target.rid,
            status,
            report.output_dir.display()
        );
        if let Some(detail) = &report.detail {
            info!(rid = report.target.rid, detail = detail.as_str(), "cell detail");
        }
    }

    if let Some(report) = reports
        .iter()
        .find(|report| report.status == CellStatus::Critical)
    {
        return Err(BuildError::MatrixCellCritical(report.target.rid.to_string()).into());
    }
    Ok(())
}

fn package(config: &BuildConfig, tag: &str) -> Result<()> {
    let manifest =
        release::package_release(tag, &config.native_libs_dir(), &config.release_dist_dir())?;
    for bundle in &manifest.bundles {
        println!(
            "{} <- {}{}",
            bundle.archive,
            bundle.rid,
            if bundle.placeholder {
                " (placeholder)"
            } else {
                ""
            }
        );
    }
    println!("{}", manifest.combined_archive);
    println!(
        "Release {} packaged into {}{}",
        manifest.tag,
        config.release_dist_dir().display(),
        if manifest.prerelease {
            " (pre-release)"
        } else {
            ""
        }
    );
    Ok(())
}

fn clean(config: &BuildConfig) -> Result<()> {
    let targets = [
        (config.native_libs_dir(), "native libraries"),
        (config.release_dist_dir(), "release bundles"),
        (config.crypto_dir().join("bin"), "crypto build outputs"),
        (config.crypto_dir().join("obj"), "crypto intermediates"),
        (config.base_dir.join("matrix-work"), "matrix work trees"),
    ];
    for (path, what) in targets {
        remove_tree(&path, what);
    }

    // Managed build intermediates across all SDK sub-projects.
    for pattern in ["src/**/bin", "src/**/obj"] {
        let full = format!("{}/{pattern}", config.sdk_dir().display());
        if let Ok(paths) = glob::glob(&full) {
            for path in paths.flatten() {
                remove_tree(&path, "managed build outputs");
            }
        }
    }

    let workspace = config.workspace_dir();
    if workspace.is_dir() {
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new(toolchain::SYSTEMS_TOOL)
            .arg("clean")
            .cwd(&workspace);
        match runner.run(&spec) {
            Ok(output) if output.success() => info!("cargo clean completed"),
            Ok(output) => warn!(code = output.code_or_default(), "cargo clean failed"),
            Err(err) => warn!(error = %err, "cargo clean not invocable"),
        }
    }

    println!("Clean completed");
    Ok(())
}

fn remove_tree(path: &std::path::Path, what: &str) {
    if !path.exists() {
        return;
    }
    match fs::remove_dir_all(path) {
        Ok(()) => info!(path = %path.display(), what, "removed"),
        Err(err) => warn!(path = %path.display(), what, error = %err, "could not remove"),
    }
}

#[derive(Parser)]
#[command(
    name = "proton-sdk-build",
    version,
    about = "Build pipeline for the Proton SDK native libraries and Rust bindings"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Optional YAML config overriding the default layout.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Base directory holding the SDK checkout and consumer workspace.
    #[arg(long = "base-dir", global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full build pipeline (the default when no command is given).
    Run {
        /// Skip the dependency synchronization step.
        #[arg(long = "skip-sync")]
        skip_sync: bool,
        /// Skip the workspace test step.
        #[arg(long = "skip-tests")]
        skip_tests: bool,
        /// Log the per-step summary after the run.
        #[arg(long = "print-summary")]
        print_summary: bool,
        /// Write the run summary as JSON.
        #[arg(long = "summary-json")]
        summary_json: Option<PathBuf>,
    },
    /// Verify host toolchains without building anything.
    Check,
    /// Synchronize the nested source dependencies.
    Sync,
    /// Collect native libraries from the export projects.
    Collect,
    /// Run the per-platform build matrix.
    Matrix {
        /// Restrict the matrix to a single runtime identifier.
        #[arg(long)]
        only: Option<String>,
        /// Restrict the matrix to the invoking host's cell.
        #[arg(long, conflicts_with = "only")]
        host: bool,
    },
    /// Assemble release archives from the per-platform directories.
    Package {
        /// Release tag the bundle is keyed by.
        #[arg(long)]
        tag: String,
    },
    /// Remove build outputs and staged libraries.
    Clean,
    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}
