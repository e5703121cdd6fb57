use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// A single external command invocation: program, arguments, optional
/// working-directory override and extra environment variables.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// The command as a single display line, e.g. `dotnet build -c Release`.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Uniform result capture for an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code, with signal termination mapped to -1.
    pub fn code_or_default(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

/// The narrow seam between the orchestrator and the host: run an external
/// command, report its exit code. Build stages only ever talk to toolchains
/// through this trait, which is what keeps the pipeline testable with
/// scripted runners.
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion, streaming its output to the console.
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;

    /// Run the command with captured stdout/stderr (version probes and other
    /// short queries). Defaults to `run` for runners that capture anyway.
    fn capture(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        self.run(spec)
    }
}

/// Production runner backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &spec.envs {
            command.env(key, value);
        }
        command
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        info!(command = %spec.display_line(), cwd = ?spec.cwd, "running command");
        let started = Instant::now();
        let status = self.command(spec).status()?;
        let duration = started.elapsed();
        debug!(
            command = %spec.display_line(),
            code = ?status.code(),
            duration_ms = duration.as_secs_f64() * 1_000.0,
            "command finished"
        );
        Ok(CommandOutput {
            code: status.code(),
            stdout: String::new(),
            stderr: String::new(),
            duration,
        })
    }

    fn capture(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        debug!(command = %spec.display_line(), "probing command");
        let started = Instant::now();
        let output = self
            .command(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_line_joins_program_and_args() {
        let spec = CommandSpec::new("dotnet").args(["build", "-c", "Release"]);
        assert_eq!(spec.display_line(), "dotnet build -c Release");
    }

    #[test]
    fn output_success_requires_zero_exit() {
        let ok = CommandOutput {
            code: Some(0),
            ..CommandOutput::default()
        };
        let failed = CommandOutput {
            code: Some(2),
            ..CommandOutput::default()
        };
        let killed = CommandOutput {
            code: None,
            ..CommandOutput::default()
        };
        assert!(ok.success());
        assert!(!failed.success());
        assert!(!killed.success());
        assert_eq!(killed.code_or_default(), -1);
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_captures_output() {
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "echo hello"]);
        let output = runner.capture(&spec).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_reports_failure_code() {
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "exit 3"]);
        let output = runner.capture(&spec).unwrap();
        assert!(!output.success());
        assert_eq!(output.code, Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_respects_cwd() {
        let temp = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new();
        let spec = CommandSpec::new("sh")
            .args(["-c", "touch marker"])
            .cwd(temp.path());
        assert!(runner.run(&spec).unwrap().success());
        assert!(temp.path().join("marker").exists());
    }
}
