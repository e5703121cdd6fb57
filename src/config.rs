use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Run-wide layout and package names.
///
/// Defaults mirror the conventional checkout layout: the SDK source tree and
/// the Rust consumer workspace live side by side under the base directory,
/// and collected libraries land in a flat `native-libs/` directory. A YAML
/// file can override any subset of fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub base_dir: PathBuf,
    pub sdk_project: String,
    pub crypto_project: String,
    pub workspace_project: String,
    pub output_dir: String,
    pub dist_dir: String,
    pub sys_package: String,
    pub wrapper_package: String,
    pub sdk_repo: String,
    pub crypto_repo: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            sdk_project: "Proton.SDK".to_string(),
            crypto_project: "dotnet-crypto".to_string(),
            workspace_project: "proton-sdk-rs".to_string(),
            output_dir: "native-libs".to_string(),
            dist_dir: "dist".to_string(),
            sys_package: "proton-sdk-sys".to_string(),
            wrapper_package: "proton-sdk-rs".to_string(),
            sdk_repo: "https://github.com/4tkbytes/Proton.SDK".to_string(),
            crypto_repo: "https://github.com/4tkbytes/dotnet-crypto".to_string(),
        }
    }
}

impl BuildConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: BuildConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config YAML: {}", path.display()))?;
        Ok(config)
    }

    /// Managed SDK source tree.
    pub fn sdk_dir(&self) -> PathBuf {
        self.base_dir.join(&self.sdk_project)
    }

    /// Crypto dependency checkout.
    pub fn crypto_dir(&self) -> PathBuf {
        self.base_dir.join(&self.crypto_project)
    }

    /// Rust consumer workspace.
    pub fn workspace_dir(&self) -> PathBuf {
        self.base_dir.join(&self.workspace_project)
    }

    /// Flat directory receiving collected native libraries (local runs);
    /// matrix cells stage into per-RID subdirectories of it.
    pub fn native_libs_dir(&self) -> PathBuf {
        self.base_dir.join(&self.output_dir)
    }

    /// Release bundle output directory.
    pub fn release_dist_dir(&self) -> PathBuf {
        self.base_dir.join(&self.dist_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_resolve_against_base_dir() {
        let config = BuildConfig {
            base_dir: PathBuf::from("/work"),
            ..BuildConfig::default()
        };
        assert_eq!(config.sdk_dir(), PathBuf::from("/work/Proton.SDK"));
        assert_eq!(config.native_libs_dir(), PathBuf::from("/work/native-libs"));
        assert_eq!(config.workspace_dir(), PathBuf::from("/work/proton-sdk-rs"));
    }

    #[test]
    fn yaml_overrides_subset_of_fields() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("build.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "base_dir: /opt/sdk\noutput_dir: libs").unwrap();

        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/opt/sdk"));
        assert_eq!(config.output_dir, "libs");
        assert_eq!(config.sys_package, "proton-sdk-sys");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("build.yaml");
        std::fs::write(&path, "no_such_field: 1\n").unwrap();
        assert!(BuildConfig::load(&path).is_err());
    }
}
