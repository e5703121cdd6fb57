//! Discovery, classification and collection of native export libraries.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::BuildError;

/// Managed sub-projects expected to emit native export libraries.
pub const EXPORT_PROJECTS: [ExportProject; 3] = [
    ExportProject {
        name: "Proton.Sdk.CExports",
    },
    ExportProject {
        name: "Proton.Sdk.Drive.CExports",
    },
    ExportProject {
        name: "Proton.Sdk.Instrumentation.CExports",
    },
];

/// Platform-native dynamic-library extensions.
pub const LIBRARY_EXTENSIONS: [&str; 3] = ["dll", "so", "dylib"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProject {
    pub name: &'static str,
}

impl ExportProject {
    /// Release output directory relative to the SDK root.
    pub fn output_dir(&self, sdk_dir: &Path) -> PathBuf {
        sdk_dir
            .join("src")
            .join(self.name)
            .join("bin")
            .join("Release")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Match,
    Skip,
}

/// A candidate binary discovered under an export project's output tree.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub source_path: PathBuf,
    pub file_name: String,
    pub classification: Classification,
}

/// Classify a file name: Match iff it contains the case-sensitive substring
/// `"proton"` anywhere.
pub fn classify(file_name: &str) -> Classification {
    if file_name.contains("proton") {
        Classification::Match
    } else {
        Classification::Skip
    }
}

fn is_library_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| LIBRARY_EXTENSIONS.contains(&ext))
}

/// Recursively enumerate candidate libraries under one output directory.
pub fn discover(output_dir: &Path) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    for entry in WalkDir::new(output_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        if !is_library_file(path) {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        artifacts.push(Artifact {
            source_path: path.to_path_buf(),
            file_name: file_name.to_string(),
            classification: classify(file_name),
        });
    }
    artifacts
}

/// Walk every present export-project output directory under `sdk_dir`, copy
/// matching libraries flat into `dest` (last write wins on name collisions)
/// and return the total match count. Absent project directories are skipped
/// with a warning; zero matches across all present directories is fatal.
pub fn collect(sdk_dir: &Path, dest: &Path) -> Result<u64, BuildError> {
    fs::create_dir_all(dest)?;

    let mut copied = 0u64;
    for project in EXPORT_PROJECTS {
        let output_dir = project.output_dir(sdk_dir);
        if !output_dir.is_dir() {
            warn!(
                project = project.name,
                dir = %output_dir.display(),
                "export project output missing, skipping"
            );
            continue;
        }

        for artifact in discover(&output_dir) {
            match artifact.classification {
                Classification::Skip => {
                    debug!(file = artifact.file_name.as_str(), "skipping unmatched library");
                }
                Classification::Match => {
                    let target = dest.join(&artifact.file_name);
                    fs::copy(&artifact.source_path, &target)?;
                    copied += 1;
                    info!(
                        project = project.name,
                        file = artifact.file_name.as_str(),
                        "collected native library"
                    );
                }
            }
        }
    }

    if copied == 0 {
        return Err(BuildError::NoArtifactsFound);
    }
    info!(count = copied, dest = %dest.display(), "native libraries collected");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_substring_anywhere() {
        assert_eq!(classify("libproton_sdk.dll"), Classification::Match);
        assert_eq!(classify("proton_crypto.so"), Classification::Match);
        assert_eq!(classify("proton"), Classification::Match);
        assert_eq!(classify("helper.dll"), Classification::Skip);
    }

    #[test]
    fn classify_is_case_sensitive() {
        assert_eq!(classify("Proton.Sdk.dll"), Classification::Skip);
        assert_eq!(classify("LIBPROTON.DLL"), Classification::Skip);
    }

    #[test]
    fn library_extension_filter() {
        assert!(is_library_file(Path::new("a/libproton.so")));
        assert!(is_library_file(Path::new("proton.dll")));
        assert!(is_library_file(Path::new("proton.dylib")));
        assert!(!is_library_file(Path::new("proton.pdb")));
        assert!(!is_library_file(Path::new("proton.json")));
        assert!(!is_library_file(Path::new("proton")));
    }

    #[test]
    fn export_project_output_layout() {
        let dir = EXPORT_PROJECTS[1].output_dir(Path::new("/sdk"));
        assert_eq!(
            dir,
            Path::new("/sdk/src/Proton.Sdk.Drive.CExports/bin/Release")
        );
    }
}
