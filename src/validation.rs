use serde::Serialize;

use crate::config::BuildConfig;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Sanity-check a build configuration before any step runs.
///
/// Errors block the run; warnings are surfaced but tolerated (a missing base
/// directory may be populated by the sync step).
pub fn validate_config(config: &BuildConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.base_dir.as_os_str().is_empty() {
        report.errors.push("Base directory cannot be empty".into());
    }

    for (label, value) in [
        ("SDK project", &config.sdk_project),
        ("crypto project", &config.crypto_project),
        ("workspace project", &config.workspace_project),
        ("output directory", &config.output_dir),
        ("dist directory", &config.dist_dir),
    ] {
        if value.trim().is_empty() {
            report.errors.push(format!("{label} name cannot be empty"));
        }
    }

    for (label, value) in [
        ("sys package", &config.sys_package),
        ("wrapper package", &config.wrapper_package),
    ] {
        if value.trim().is_empty() {
            report.errors.push(format!("{label} name cannot be empty"));
        } else if value.contains(char::is_whitespace) {
            report
                .errors
                .push(format!("{label} name '{value}' contains whitespace"));
        }
    }

    if config.output_dir == config.dist_dir {
        report.errors.push(format!(
            "Output directory and dist directory collide: '{}'",
            config.output_dir
        ));
    }

    if !config.base_dir.as_os_str().is_empty() && !config.base_dir.is_dir() {
        report.warnings.push(format!(
            "Base directory '{}' does not exist yet",
            config.base_dir.display()
        ));
    }

    report
}
