//! Release packaging: one archive per platform, one combined archive, digest
//! sidecars, release notes and the manifest keyed by the release tag.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::error::BuildError;
use crate::matrix::{self, OsFamily, PLATFORM_MATRIX, PlatformTarget};

pub const COMBINED_ARCHIVE_NAME: &str = "proton-sdk-native-all-platforms.tar.gz";
pub const RELEASE_NOTES_NAME: &str = "RELEASE_NOTES.md";
pub const MANIFEST_NAME: &str = "release.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Format rule: zip for the windows family, tar+gzip otherwise.
    pub fn for_family(os: OsFamily) -> Self {
        match os {
            OsFamily::Windows => ArchiveFormat::Zip,
            OsFamily::Linux | OsFamily::Macos => ArchiveFormat::TarGz,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

/// Per-platform archive file name, e.g. `proton-sdk-native-linux-x64.tar.gz`.
pub fn archive_name(target: PlatformTarget) -> String {
    format!(
        "proton-sdk-native-{}.{}",
        target.rid,
        ArchiveFormat::for_family(target.os).extension()
    )
}

/// A tag containing a hyphen marks a pre-release (`1.2.3-rc.1`).
pub fn is_prerelease(tag: &str) -> bool {
    tag.contains('-')
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseBundle {
    pub rid: String,
    pub os: &'static str,
    pub archive: String,
    pub format: ArchiveFormat,
    pub sha256: String,
    pub placeholder: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseManifest {
    pub tag: String,
    pub prerelease: bool,
    pub created_at: String,
    pub bundles: Vec<ReleaseBundle>,
    pub combined_archive: String,
    pub combined_sha256: String,
}

/// Package the release for `tag` from the per-platform directories under
/// `native_root` into `dist_dir`.
///
/// The matrix stage is a synchronization barrier: every declared platform
/// must have left an output directory (real or placeholder) or packaging
/// fails before writing anything.
pub fn package_release(tag: &str, native_root: &Path, dist_dir: &Path) -> Result<ReleaseManifest> {
    for target in PLATFORM_MATRIX {
        let dir = native_root.join(target.rid);
        if !dir.is_dir() {
            return Err(BuildError::PlatformOutputMissing(target.rid.to_string()).into());
        }
    }

    fs::create_dir_all(dist_dir)
        .with_context(|| format!("Failed to create dist directory: {}", dist_dir.display()))?;

    let mut bundles = Vec::with_capacity(PLATFORM_MATRIX.len());
    for target in PLATFORM_MATRIX {
        let dir = native_root.join(target.rid);
        let format = ArchiveFormat::for_family(target.os);
        let name = archive_name(target);
        let archive_path = dist_dir.join(&name);

        match format {
            ArchiveFormat::Zip => archive_zip(&dir, target.rid, &archive_path)?,
            ArchiveFormat::TarGz => {
                archive_tar_gz(&[(target.rid, dir.clone())], &archive_path)?
            }
        }
        let sha256 = write_sha256_sidecar(&archive_path)?;
        let placeholder = matrix::is_placeholder(&dir);
        info!(
            archive = name.as_str(),
            placeholder, "platform archive written"
        );

        bundles.push(ReleaseBundle {
            rid: target.rid.to_string(),
            os: target.os.as_str(),
            archive: name,
            format,
            sha256,
            placeholder,
        });
    }

    let combined_path = dist_dir.join(COMBINED_ARCHIVE_NAME);
    let entries: Vec<(&str, PathBuf)> = PLATFORM_MATRIX
        .iter()
        .map(|target| (target.rid, native_root.join(target.rid)))
        .collect();
    archive_tar_gz(&entries, &combined_path)?;
    let combined_sha256 = write_sha256_sidecar(&combined_path)?;
    info!(archive = COMBINED_ARCHIVE_NAME, "combined archive written");

    let manifest = ReleaseManifest {
        tag: tag.to_string(),
        prerelease: is_prerelease(tag),
        created_at: Utc::now().to_rfc3339(),
        bundles,
        combined_archive: COMBINED_ARCHIVE_NAME.to_string(),
        combined_sha256,
    };

    write_release_notes(&manifest, dist_dir)?;
    let file = File::create(dist_dir.join(MANIFEST_NAME))
        .with_context(|| format!("Failed to create manifest in {}", dist_dir.display()))?;
    serde_json::to_writer_pretty(file, &manifest).context("Failed to write release manifest")?;

    Ok(manifest)
}

fn archive_zip(dir: &Path, prefix: &str, dest: &Path) -> Result<()> {
    let file = File::create(dest)
        .with_context(|| format!("Failed to create archive: {}", dest.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let rel = entry.path().strip_prefix(dir)?;
        let name = format!("{prefix}/{}", rel.to_string_lossy().replace('\\', "/"));
        writer.start_file(name, options)?;
        let mut source = File::open(entry.path())?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}

fn archive_tar_gz(entries: &[(&str, PathBuf)], dest: &Path) -> Result<()> {
    let file = File::create(dest)
        .with_context(|| format!("Failed to create archive: {}", dest.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (prefix, dir) in entries {
        builder
            .append_dir_all(prefix, dir)
            .with_context(|| format!("Failed to archive directory: {}", dir.display()))?;
    }
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Compute the SHA256 digest of the file at `path` as a hex string.
pub fn compute_sha256(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn write_sha256_sidecar(path: &Path) -> Result<String> {
    let digest = compute_sha256(path)?;
    let sidecar = PathBuf::from(format!("{}.sha256", path.display()));
    let mut file = File::create(&sidecar)
        .with_context(|| format!("Failed to create digest file: {}", sidecar.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    writeln!(file, "{digest}  {name}")?;
    Ok(digest)
}

fn write_release_notes(manifest: &ReleaseManifest, dist_dir: &Path) -> Result<()> {
    let mut notes = String::new();
    notes.push_str(&format!(
        "# Proton SDK native libraries {}\n\n",
        manifest.tag
    ));
    if manifest.prerelease {
        notes.push_str("This is a pre-release build.\n\n");
    }
    notes.push_str(&format!("Created: {}\n\n", manifest.created_at));
    notes.push_str("| Platform | Archive | Contents | SHA256 |\n");
    notes.push_str("|----------|---------|----------|--------|\n");
    for bundle in &manifest.bundles {
        let contents = if bundle.placeholder {
            "placeholder (build unavailable)"
        } else {
            "native libraries"
        };
        notes.push_str(&format!(
            "| {} | {} | {} | `{}` |\n",
            bundle.rid, bundle.archive, contents, bundle.sha256
        ));
    }
    notes.push_str(&format!(
        "\nAll platforms combined: `{}` (`{}`).\n",
        manifest.combined_archive, manifest.combined_sha256
    ));

    fs::write(dist_dir.join(RELEASE_NOTES_NAME), notes)
        .with_context(|| format!("Failed to write release notes in {}", dist_dir.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::find_target;

    #[test]
    fn windows_family_gets_zip_others_tar_gz() {
        assert_eq!(
            ArchiveFormat::for_family(OsFamily::Windows),
            ArchiveFormat::Zip
        );
        assert_eq!(
            ArchiveFormat::for_family(OsFamily::Linux),
            ArchiveFormat::TarGz
        );
        assert_eq!(
            ArchiveFormat::for_family(OsFamily::Macos),
            ArchiveFormat::TarGz
        );
    }

    #[test]
    fn archive_names_follow_rid_and_format() {
        assert_eq!(
            archive_name(find_target("win-x64").unwrap()),
            "proton-sdk-native-win-x64.zip"
        );
        assert_eq!(
            archive_name(find_target("osx-arm64").unwrap()),
            "proton-sdk-native-osx-arm64.tar.gz"
        );
    }

    #[test]
    fn hyphenated_tags_are_prereleases() {
        assert!(is_prerelease("1.2.3-rc.1"));
        assert!(!is_prerelease("1.2.3"));
        assert!(!is_prerelease("v2"));
    }

    #[test]
    fn sha256_is_stable_and_content_sensitive() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.bin");
        let b = temp.path().join("b.bin");
        fs::write(&a, b"proton").unwrap();
        fs::write(&b, b"neutron").unwrap();

        let first = compute_sha256(&a).unwrap();
        let second = compute_sha256(&a).unwrap();
        let other = compute_sha256(&b).unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, second);
        assert_ne!(first, other);
    }
}
