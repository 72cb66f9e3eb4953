use crate::command::Command;
use crate::ExecError;
use std::process::{Child, Stdio};

/// Executes one [`Command`] and returns its stdout.
///
/// Implementations must report a non-zero exit as [`ExecError::NonZeroExit`],
/// carrying whatever stdout was produced.
pub trait Runner: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, command: &Command) -> Result<Vec<u8>, ExecError>;

    /// Start a long-lived process without waiting for it. Runners that do not
    /// create real processes return `None`.
    fn spawn(&self, command: &Command) -> Result<Option<Child>, ExecError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn name(&self) -> &str {
        "system"
    }

    fn execute(&self, command: &Command) -> Result<Vec<u8>, ExecError> {
        let output = Self::process(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Self::spawn_error(command, e))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(ExecError::NonZeroExit {
                command: command.summary(),
                code: output.status.code().unwrap_or(-1),
                stdout: output.stdout,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }

    fn spawn(&self, command: &Command) -> Result<Option<Child>, ExecError> {
        Self::process(command)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(Some)
            .map_err(|e| Self::spawn_error(command, e))
    }
}

impl SystemRunner {
    fn process(command: &Command) -> std::process::Command {
        let mut process = std::process::Command::new(command.program());
        process.args(command.args()).stdin(Stdio::null());
        for (key, value) in command.envs() {
            process.env(key, value);
        }
        process
    }

    fn spawn_error(command: &Command, source: std::io::Error) -> ExecError {
        ExecError::Spawn {
            program: command.program().to_owned(),
            source,
        }
    }
}

pub fn select_runner(name: &str) -> Result<Box<dyn Runner>, ExecError> {
    match name {
        "system" => Ok(Box::new(SystemRunner)),
        "mock" => Ok(Box::new(crate::mock::MockRunner::new())),
        other => Err(ExecError::RunnerUnavailable(other.to_owned())),
    }
}
