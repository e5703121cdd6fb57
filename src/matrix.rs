//! CI platform-matrix fan-out: the per-platform sub-pipeline, run once per
//! (OS, architecture) cell with no shared mutable state between cells.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::process::{CommandRunner, CommandSpec};

/// Marker file written into a placeholder output directory when a cell's
/// native build is infeasible in the current environment.
pub const PLACEHOLDER_MARKER: &str = "UNSUPPORTED.txt";

/// The export project published per cell to produce the native library.
const NATIVE_EXPORT_PROJECT: &str = "Proton.Sdk.Drive.CExports";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Linux,
    Macos,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Macos => "macos",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }
}

/// One matrix cell definition, fixed at build-definition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformTarget {
    pub os: OsFamily,
    pub arch: Arch,
    pub rid: &'static str,
}

/// The fixed release matrix.
pub const PLATFORM_MATRIX: [PlatformTarget; 4] = [
    PlatformTarget {
        os: OsFamily::Windows,
        arch: Arch::Amd64,
        rid: "win-x64",
    },
    PlatformTarget {
        os: OsFamily::Linux,
        arch: Arch::Amd64,
        rid: "linux-x64",
    },
    PlatformTarget {
        os: OsFamily::Macos,
        arch: Arch::Amd64,
        rid: "osx-x64",
    },
    PlatformTarget {
        os: OsFamily::Macos,
        arch: Arch::Arm64,
        rid: "osx-arm64",
    },
];

pub fn find_target(rid: &str) -> Option<PlatformTarget> {
    PLATFORM_MATRIX.iter().copied().find(|t| t.rid == rid)
}

/// The matrix cell matching the invoking host, if the host is part of the
/// declared matrix.
pub fn detect_host() -> Option<PlatformTarget> {
    let os = match std::env::consts::OS {
        "windows" => OsFamily::Windows,
        "linux" => OsFamily::Linux,
        "macos" => OsFamily::Macos,
        _ => return None,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => Arch::Amd64,
        "aarch64" => Arch::Arm64,
        _ => return None,
    };
    PLATFORM_MATRIX
        .iter()
        .copied()
        .find(|t| t.os == os && t.arch == arch)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    /// Real native output staged.
    Built,
    /// Build failed; a placeholder directory stands in for the output.
    Degraded,
    /// No output directory at all; fatal for this cell's artifacts.
    Critical,
}

#[derive(Debug, Clone)]
pub struct CellReport {
    pub target: PlatformTarget,
    pub status: CellStatus,
    pub output_dir: PathBuf,
    pub detail: Option<String>,
}

/// Run the per-platform sub-pipeline for every given target, cells in
/// parallel and fully independent. Each cell works in its own checkout under
/// `matrix-work/<rid>/` and stages into `native-libs/<rid>/`.
pub fn run_cells(
    config: &BuildConfig,
    runner: &dyn CommandRunner,
    targets: &[PlatformTarget],
) -> Vec<CellReport> {
    targets
        .par_iter()
        .map(|target| run_cell(config, runner, *target))
        .collect()
}

fn run_cell(config: &BuildConfig, runner: &dyn CommandRunner, target: PlatformTarget) -> CellReport {
    let cell_dir = config.native_libs_dir().join(target.rid);
    let span = tracing::span!(tracing::Level::INFO, "cell", rid = target.rid);
    let _guard = span.enter();

    let (status, detail) = match build_cell(config, runner, target, &cell_dir) {
        Ok(staged) => {
            info!(staged, "cell built");
            (CellStatus::Built, Some(format!("{staged} files staged")))
        }
        Err(err) => {
            warn!(error = %err, "cell build failed, degrading to placeholder");
            match write_placeholder(&cell_dir, target, &format!("{err:#}")) {
                Ok(()) => (CellStatus::Degraded, Some(format!("{err:#}"))),
                Err(io_err) => (
                    CellStatus::Critical,
                    Some(format!("placeholder write failed: {io_err}")),
                ),
            }
        }
    };

    // A cell that leaves nothing behind is critical no matter what happened
    // above; packaging needs a directory per declared platform.
    let status = if cell_dir.is_dir() {
        status
    } else {
        CellStatus::Critical
    };

    CellReport {
        target,
        status,
        output_dir: cell_dir,
        detail,
    }
}

fn build_cell(
    config: &BuildConfig,
    runner: &dyn CommandRunner,
    target: PlatformTarget,
    cell_dir: &Path,
) -> Result<usize> {
    let work_dir = config.base_dir.join("matrix-work").join(target.rid);
    fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create cell work directory: {}", work_dir.display()))?;

    let crypto_dir = work_dir.join(&config.crypto_project);
    let sdk_dir = work_dir.join(&config.sdk_project);
    clone_if_missing(runner, &config.crypto_repo, &crypto_dir)?;
    clone_if_missing(runner, &config.sdk_repo, &sdk_dir)?;

    run_checked(
        runner,
        CommandSpec::new("dotnet")
            .args(["pack", "-c", "Release"])
            .cwd(&crypto_dir),
        "crypto dependency build",
    )?;

    run_checked(
        runner,
        CommandSpec::new("dotnet")
            .args(["build", "-c", "Release"])
            .cwd(&sdk_dir),
        "managed SDK build",
    )?;

    let project = format!("src/{NATIVE_EXPORT_PROJECT}/{NATIVE_EXPORT_PROJECT}.csproj");
    run_checked(
        runner,
        CommandSpec::new("dotnet")
            .args([
                "publish",
                project.as_str(),
                "-r",
                target.rid,
                "--self-contained",
                "-p:PublishAot=true",
            ])
            .cwd(&sdk_dir),
        "native library publish",
    )?;

    stage_cell_output(&sdk_dir, target, cell_dir)
}

fn clone_if_missing(runner: &dyn CommandRunner, repo: &str, dest: &Path) -> Result<()> {
    if dest.is_dir() {
        info!(dest = %dest.display(), "checkout already present, skipping clone");
        return Ok(());
    }
    let dest_arg = dest.to_string_lossy();
    run_checked(
        runner,
        CommandSpec::new("git").args(["clone", repo, dest_arg.as_ref()]),
        "dependency clone",
    )
}

fn run_checked(runner: &dyn CommandRunner, spec: CommandSpec, what: &str) -> Result<()> {
    let output = runner
        .run(&spec)
        .with_context(|| format!("{what} not invocable ({})", spec.display_line()))?;
    if !output.success() {
        bail!("{what} failed with exit code {}", output.code_or_default());
    }
    Ok(())
}

/// Copy the publish output for the cell's RID into its output directory,
/// excluding debug symbol files. The previous cell output is replaced.
fn stage_cell_output(sdk_dir: &Path, target: PlatformTarget, cell_dir: &Path) -> Result<usize> {
    let source = locate_publish_dir(sdk_dir, target.rid)
        .ok_or_else(|| anyhow!("no publish output found for '{}'", target.rid))?;
    info!(source = %source.display(), "staging cell output");

    if cell_dir.exists() {
        fs::remove_dir_all(cell_dir)?;
    }
    fs::create_dir_all(cell_dir)?;

    let mut staged = 0usize;
    for entry in WalkDir::new(&source)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdb"))
        {
            debug!(file = %path.display(), "skipping debug symbols");
            continue;
        }
        let rel = path.strip_prefix(&source)?;
        let dest = cell_dir.join(rel);
        if let Some(parent) = dest.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &dest)?;
        staged += 1;
    }

    if staged == 0 {
        bail!(
            "publish directory '{}' contained no stageable files",
            source.display()
        );
    }
    Ok(staged)
}

fn locate_publish_dir(sdk_dir: &Path, rid: &str) -> Option<PathBuf> {
    let base = sdk_dir
        .join("src")
        .join(NATIVE_EXPORT_PROJECT)
        .join("bin")
        .join("Release")
        .join("net9.0")
        .join(rid);
    for candidate in [base.join("publish"), base] {
        if candidate.is_dir() {
            return Some(candidate);
        }
    }

    // Fallback: any framework directory carrying output for this RID.
    for suffix in [format!("{rid}/publish"), rid.to_string()] {
        let pattern = format!("{}/src/**/bin/Release/net*.0/{suffix}", sdk_dir.display());
        if let Ok(paths) = glob::glob(&pattern) {
            for path in paths.flatten() {
                if path.is_dir() {
                    return Some(path);
                }
            }
        }
    }
    None
}

/// Replace the cell's output directory with a placeholder containing only the
/// explanatory marker.
pub fn write_placeholder(cell_dir: &Path, target: PlatformTarget, reason: &str) -> io::Result<()> {
    if cell_dir.exists() {
        fs::remove_dir_all(cell_dir)?;
    }
    fs::create_dir_all(cell_dir)?;
    let body = format!(
        "Native libraries for {rid} ({os}/{arch}) could not be produced in this environment.\n\
         \n\
         Reason: {reason}\n\
         \n\
         This directory is a placeholder so release packaging can proceed with\n\
         an explicitly labeled gap for this platform.\n",
        rid = target.rid,
        os = target.os.as_str(),
        arch = target.arch.as_str(),
    );
    fs::write(cell_dir.join(PLACEHOLDER_MARKER), body)
}

/// True when the directory's sole entry is the placeholder marker.
pub fn is_placeholder(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    let names: Vec<_> = entries.flatten().map(|entry| entry.file_name()).collect();
    names.len() == 1 && names[0] == PLACEHOLDER_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_declares_four_fixed_cells() {
        let rids: Vec<_> = PLATFORM_MATRIX.iter().map(|t| t.rid).collect();
        assert_eq!(rids, ["win-x64", "linux-x64", "osx-x64", "osx-arm64"]);
    }

    #[test]
    fn find_target_by_rid() {
        let target = find_target("osx-arm64").unwrap();
        assert_eq!(target.os, OsFamily::Macos);
        assert_eq!(target.arch, Arch::Arm64);
        assert!(find_target("freebsd-x64").is_none());
    }

    #[test]
    fn placeholder_roundtrip() {
        let temp = tempfile::tempdir().unwrap();
        let cell_dir = temp.path().join("win-x64");
        write_placeholder(&cell_dir, PLATFORM_MATRIX[0], "no cross toolchain").unwrap();

        assert!(is_placeholder(&cell_dir));
        let body = fs::read_to_string(cell_dir.join(PLACEHOLDER_MARKER)).unwrap();
        assert!(body.contains("win-x64"));
        assert!(body.contains("no cross toolchain"));
    }

    #[test]
    fn placeholder_replaces_previous_output() {
        let temp = tempfile::tempdir().unwrap();
        let cell_dir = temp.path().join("linux-x64");
        fs::create_dir_all(&cell_dir).unwrap();
        fs::write(cell_dir.join("stale.so"), b"old").unwrap();

        write_placeholder(&cell_dir, PLATFORM_MATRIX[1], "publish failed").unwrap();
        assert!(is_placeholder(&cell_dir));
    }

    #[test]
    fn directory_with_real_output_is_not_a_placeholder() {
        let temp = tempfile::tempdir().unwrap();
        let cell_dir = temp.path().join("osx-x64");
        fs::create_dir_all(&cell_dir).unwrap();
        fs::write(cell_dir.join(PLACEHOLDER_MARKER), b"marker").unwrap();
        fs::write(cell_dir.join("libproton_sdk.dylib"), b"bits").unwrap();
        assert!(!is_placeholder(&cell_dir));
    }
}
