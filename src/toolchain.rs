//! Host toolchain verification: the pipeline's entry gate.

use tracing::{info, warn};

use crate::error::BuildError;
use crate::process::{CommandRunner, CommandSpec};

/// Managed-runtime build tool (builds the SDK export libraries).
pub const MANAGED_TOOL: &str = "dotnet";
/// Systems package manager (builds the Rust consumer packages).
pub const SYSTEMS_TOOL: &str = "cargo";

/// Minimum supported managed runtime, encoded as `major * 10 + minor`.
pub const MIN_MANAGED_VERSION: u32 = 90;

/// Reported versions of the two required toolchains.
#[derive(Debug, Clone)]
pub struct Versions {
    pub dotnet: String,
    pub cargo: String,
}

/// Probe both required toolchains and enforce the managed-runtime version
/// floor. Any failure here is fatal to the pipeline.
pub fn verify(runner: &dyn CommandRunner) -> Result<Versions, BuildError> {
    let dotnet = probe(runner, MANAGED_TOOL)?;
    let cargo = probe(runner, SYSTEMS_TOOL)?;

    let Some((major, minor)) = parse_major_minor(&dotnet) else {
        warn!(tool = MANAGED_TOOL, reported = %dotnet, "unparseable version string");
        return Err(BuildError::ToolMissing(MANAGED_TOOL.to_string()));
    };
    let found = encode_version(major, minor);
    if found < MIN_MANAGED_VERSION {
        return Err(BuildError::VersionTooLow {
            found,
            required: MIN_MANAGED_VERSION,
        });
    }

    info!(dotnet = %dotnet, cargo = %cargo, "toolchains verified");
    Ok(Versions { dotnet, cargo })
}

fn probe(runner: &dyn CommandRunner, tool: &str) -> Result<String, BuildError> {
    let spec = CommandSpec::new(tool).arg("--version");
    match runner.capture(&spec) {
        Ok(output) if output.success() => {
            let version = output.stdout.trim().to_string();
            info!(tool, version = %version, "tool present");
            Ok(version)
        }
        Ok(output) => {
            warn!(tool, code = output.code_or_default(), "version query failed");
            Err(BuildError::ToolMissing(tool.to_string()))
        }
        Err(err) => {
            warn!(tool, error = %err, "tool not invocable");
            Err(BuildError::ToolMissing(tool.to_string()))
        }
    }
}

/// Extract major and minor components from a reported version string.
///
/// Accepts plain `9.0.100` output as well as `cargo 1.81.0` style prefixes on
/// the first numeric token.
pub fn parse_major_minor(version: &str) -> Option<(u32, u32)> {
    let token = version
        .split_whitespace()
        .find(|word| word.chars().next().is_some_and(|c| c.is_ascii_digit()))?;
    let mut parts = token.split('.');
    let major = leading_number(parts.next()?)?;
    let minor = parts.next().and_then(leading_number).unwrap_or(0);
    Some((major, minor))
}

/// Encode a version pair for threshold comparison.
pub fn encode_version(major: u32, minor: u32) -> u32 {
    major * 10 + minor
}

fn leading_number(part: &str) -> Option<u32> {
    let digits: &str = part
        .find(|c: char| !c.is_ascii_digit())
        .map_or(part, |end| &part[..end]);
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_semver() {
        assert_eq!(parse_major_minor("9.0.100"), Some((9, 0)));
        assert_eq!(parse_major_minor("10.1"), Some((10, 1)));
        assert_eq!(parse_major_minor("8.9"), Some((8, 9)));
    }

    #[test]
    fn parses_prefixed_tool_banner() {
        assert_eq!(parse_major_minor("cargo 1.81.0 (abc 2024-01-01)"), Some((1, 81)));
    }

    #[test]
    fn parses_bare_major() {
        assert_eq!(parse_major_minor("9"), Some((9, 0)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_major_minor("not a version"), None);
        assert_eq!(parse_major_minor(""), None);
    }

    #[test]
    fn version_gate_boundaries() {
        assert!(encode_version(8, 9) < MIN_MANAGED_VERSION);
        assert!(encode_version(9, 0) >= MIN_MANAGED_VERSION);
        assert!(encode_version(10, 1) >= MIN_MANAGED_VERSION);
    }
}
