//! Execution layer for Corral: turning instructions into processes.
//!
//! This crate implements everything that touches the outside world: parsing an
//! instruction into a `Command` (with heredoc-style payload extraction and
//! script mode for cloud-config launches), running ordered batches in a
//! `Shell`, the bounded `[RETRY]` poll protocol, the pluggable `Runner` seam
//! (real processes or an in-memory control-plane fake), staging directories
//! for image jobs, and SSH control-master sessions into guests.

pub mod command;
pub mod mock;
pub mod retry;
pub mod runner;
pub mod session;
pub mod shell;
pub mod staging;

pub use command::{wrap_payload, Command, CommandState, RETRY_SENTINEL};
pub use mock::MockRunner;
pub use retry::{is_retry_sentinel, poll_with_retry, RetryPolicy};
pub use runner::{select_runner, Runner, SystemRunner};
pub use session::{compose_remote_instruction, join_quoted, RemoteSession};
pub use shell::{Shell, ShellState};
pub use staging::{read_staged_files, JobDir, JobKind, StagingLayout};

use corral_schema::AuthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("exec I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' exited with code {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stdout: Vec<u8>,
        stderr: String,
    },
    #[error("empty instruction")]
    EmptyInstruction,
    #[error("command '{command}' cannot run from state {state}")]
    InvalidState {
        command: String,
        state: CommandState,
    },
    #[error("batch for '{target}' cannot run again from state {state}")]
    BatchFinished { target: String, state: ShellState },
    #[error("runner '{0}' is not available")]
    RunnerUnavailable(String),
    #[error("session precondition failed: {0}")]
    Auth(#[from] AuthError),
    #[error("session to {0} is not open")]
    SessionClosed(String),
    #[error("session to {0} could not be established")]
    SessionFailed(String),
}

impl ExecError {
    /// Stdout captured before a non-zero exit, if any.
    pub fn stdout(&self) -> Option<&[u8]> {
        match self {
            Self::NonZeroExit { stdout, .. } => Some(stdout),
            _ => None,
        }
    }
}
