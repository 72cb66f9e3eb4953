use crate::config::Settings;
use crate::CoreError;
use corral_exec::{poll_with_retry, Command, Runner, Shell, StagingLayout};
use std::sync::Arc;
use tracing::debug;

/// Orchestrates container and cluster workflows against one control plane.
///
/// Workflows live in `container`, `image` and `cluster` as further `impl`
/// blocks. The engine holds no entity state; callers own their `Container`
/// and `Cluster` values and pass them in.
pub struct Engine {
    runner: Arc<dyn Runner>,
    staging: StagingLayout,
    settings: Settings,
}

impl Engine {
    pub fn new(runner: Arc<dyn Runner>, settings: Settings) -> Self {
        let staging = StagingLayout::new(&settings.staging_root);
        Self {
            runner,
            staging,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn staging(&self) -> &StagingLayout {
        &self.staging
    }

    pub fn runner(&self) -> &Arc<dyn Runner> {
        &self.runner
    }

    /// A control-plane instruction: `<lxc_binary> <args>`.
    pub(crate) fn lxc(&self, args: &str) -> String {
        format!("{} {args}", self.settings.lxc_binary)
    }

    /// Run `instructions` in order against `target`, stopping at the first failure.
    pub(crate) fn run_batch<S: AsRef<str>>(
        &self,
        target: &str,
        instructions: &[S],
    ) -> Result<Vec<Vec<u8>>, CoreError> {
        let mut shell = Shell::new(target, instructions, &self.staging.inits_dir())?;
        shell.execute(self.runner.as_ref())?;
        Ok(shell.into_outputs())
    }

    pub(crate) fn run_one(&self, target: &str, instruction: &str) -> Result<Vec<u8>, CoreError> {
        Ok(self
            .run_batch(target, &[instruction])?
            .pop()
            .unwrap_or_default())
    }

    /// Run a command built from an argument vector, for arguments that must
    /// not be re-tokenized (filesystem paths).
    pub(crate) fn run_argv(&self, args: &[String]) -> Result<Vec<u8>, CoreError> {
        let mut command = Command::from_argv(&self.settings.lxc_binary, args.iter().cloned());
        let output = command.run(self.runner.as_ref())?;
        Ok(output.to_vec())
    }

    /// Run a query that may answer `[RETRY]`, within the lease retry bounds.
    pub(crate) fn query_with_retry(
        &self,
        target: &str,
        instruction: &str,
    ) -> Result<Vec<u8>, CoreError> {
        poll_with_retry(self.settings.retry_policy(), |attempt| {
            debug!("{target}: query attempt {attempt}");
            self.run_one(target, instruction)
        })
    }
}
