use crate::command::Command;
use crate::runner::Runner;
use crate::ExecError;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Built,
    Completed,
    Failed,
}

impl std::fmt::Display for ShellState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellState::Built => write!(f, "built"),
            ShellState::Completed => write!(f, "completed"),
            ShellState::Failed => write!(f, "failed"),
        }
    }
}

/// An ordered batch of commands aimed at one target.
///
/// Commands run strictly in order. The first failure stops the batch; outputs
/// of the commands that already completed stay available.
#[derive(Debug)]
pub struct Shell {
    target: String,
    commands: Vec<Command>,
    outputs: Vec<Vec<u8>>,
    state: ShellState,
}

impl Shell {
    pub fn new<S: AsRef<str>>(
        target: &str,
        instructions: &[S],
        scripts_dir: &Path,
    ) -> Result<Self, ExecError> {
        let commands = instructions
            .iter()
            .map(|i| Command::parse(i.as_ref(), scripts_dir))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_commands(target, commands))
    }

    pub fn from_commands(target: &str, commands: Vec<Command>) -> Self {
        Self {
            target: target.to_owned(),
            commands,
            outputs: Vec::new(),
            state: ShellState::Built,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Run every command once. A batch runs at most once; executing a
    /// completed or failed batch is an error and runs nothing.
    pub fn execute(&mut self, runner: &dyn Runner) -> Result<(), ExecError> {
        if self.state != ShellState::Built {
            return Err(ExecError::BatchFinished {
                target: self.target.clone(),
                state: self.state,
            });
        }
        debug!(
            "batch of {} command(s) for {}",
            self.commands.len(),
            self.target
        );
        for command in &mut self.commands {
            match command.run(runner) {
                Ok(output) => self.outputs.push(output.to_vec()),
                Err(e) => {
                    self.state = ShellState::Failed;
                    return Err(e);
                }
            }
        }
        self.state = ShellState::Completed;
        Ok(())
    }

    /// Outputs of completed commands, in order.
    pub fn outputs(&self) -> &[Vec<u8>] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> Option<&[u8]> {
        self.outputs.get(index).map(Vec::as_slice)
    }

    pub fn into_outputs(self) -> Vec<Vec<u8>> {
        self.outputs
    }
}
