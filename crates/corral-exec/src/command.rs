use crate::runner::Runner;
use crate::ExecError;
use regex::{Captures, Regex};
use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use uuid::Uuid;

const PAYLOAD_OPEN: &str = "<<~";
const PAYLOAD_CLOSE: &str = "~>>";
const CLOUD_CONFIG_MARKER: &str = "#cloud-config";
const SCRIPT_SHELL: &str = "/bin/sh";

/// Output substituted for a bare `[]`: the control plane has no data yet.
pub const RETRY_SENTINEL: &str = "[RETRY]";

fn payload_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<<~(.*?)~>>").expect("payload pattern compiles"))
}

/// Wrap a multi-line payload so it survives instruction tokenization as part
/// of a single argument.
pub fn wrap_payload(payload: &str) -> String {
    format!("{PAYLOAD_OPEN}{payload}{PAYLOAD_CLOSE}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Built,
    Started,
    Completed,
    Failed,
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandState::Built => write!(f, "built"),
            CommandState::Started => write!(f, "started"),
            CommandState::Completed => write!(f, "completed"),
            CommandState::Failed => write!(f, "failed"),
        }
    }
}

/// One external process invocation and its captured stdout.
///
/// Instructions are whitespace-tokenized after wrapped payloads have been
/// masked out, so a payload always lands intact inside the word that held
/// it. An instruction carrying a `#cloud-config` payload runs in script mode:
/// it is written to `<scripts_dir>/<uuid>.sh` with each payload turned into a
/// quoted heredoc and executed by `/bin/sh`. The script is removed once the
/// command has run (or is dropped unrun).
#[derive(Debug)]
pub struct Command {
    raw: String,
    words: Vec<String>,
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    script: Option<PathBuf>,
    state: CommandState,
    output: Vec<u8>,
}

impl Command {
    pub fn parse(raw: &str, scripts_dir: &Path) -> Result<Self, ExecError> {
        let words = tokenize(raw);
        let Some((first, rest)) = words.split_first() else {
            return Err(ExecError::EmptyInstruction);
        };
        let (mut program, mut args) = (first.clone(), rest.to_vec());

        let mut script = None;
        if raw.contains(CLOUD_CONFIG_MARKER) {
            let path = write_script(scripts_dir, raw)?;
            debug!("staged {program} instruction as script {}", path.display());
            program = SCRIPT_SHELL.to_owned();
            args = vec![path.to_string_lossy().into_owned()];
            script = Some(path);
        }

        Ok(Self {
            raw: raw.to_owned(),
            words,
            program,
            args,
            envs: Vec::new(),
            script,
            state: CommandState::Built,
            output: Vec::new(),
        })
    }

    /// Build a command from an already split argument vector.
    pub fn from_argv<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(program.to_owned());
        words.extend(args.iter().cloned());
        Self {
            raw: words.join(" "),
            words,
            program: program.to_owned(),
            args,
            envs: Vec::new(),
            script: None,
            state: CommandState::Built,
            output: Vec::new(),
        }
    }

    #[must_use]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.envs.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The instruction's words with payloads restored, independent of how it runs.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn script_path(&self) -> Option<&Path> {
        self.script.as_deref()
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// First two words, for logs; payloads may hold secrets.
    pub fn summary(&self) -> String {
        self.words
            .iter()
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Execute once through `runner`, capturing stdout.
    ///
    /// A successful run whose output is `[]` (ignoring whitespace) yields
    /// [`RETRY_SENTINEL`] instead.
    pub fn run(&mut self, runner: &dyn Runner) -> Result<&[u8], ExecError> {
        if self.state != CommandState::Built {
            return Err(ExecError::InvalidState {
                command: self.summary(),
                state: self.state,
            });
        }
        self.state = CommandState::Started;
        debug!(runner = runner.name(), "exec: {}", self.summary());

        let result = runner.execute(self);
        self.remove_script();

        match result {
            Ok(stdout) => {
                self.output = if is_empty_listing(&stdout) {
                    RETRY_SENTINEL.as_bytes().to_vec()
                } else {
                    stdout
                };
                self.state = CommandState::Completed;
                Ok(&self.output)
            }
            Err(e) => {
                debug!("{} failed: {e}", self.summary());
                self.state = CommandState::Failed;
                Err(e)
            }
        }
    }

    fn remove_script(&mut self) {
        if let Some(path) = self.script.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("failed to remove script {}: {e}", path.display());
            }
        }
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        self.remove_script();
    }
}

fn tokenize(raw: &str) -> Vec<String> {
    let mut payloads: Vec<(String, String)> = Vec::new();
    let masked = payload_regex().replace_all(raw, |caps: &Captures<'_>| {
        let placeholder = format!("__payload_{}__", Uuid::new_v4().simple());
        payloads.push((placeholder.clone(), caps[1].to_owned()));
        placeholder
    });

    masked
        .split_whitespace()
        .map(|word| {
            payloads
                .iter()
                .fold(word.to_owned(), |acc, (placeholder, body)| {
                    acc.replace(placeholder, body)
                })
        })
        .collect()
}

/// Render `raw` as a shell script.
///
/// Each payload is read from a quoted heredoc into a variable first, and the
/// instruction then references `"$var"`. Command substitution drops trailing
/// newlines, so the heredoc output is followed by a marker byte that is
/// stripped again together with the newline the heredoc adds.
fn render_script(raw: &str) -> String {
    let mut prelude = String::new();
    let mut count = 0usize;
    let body = payload_regex().replace_all(raw, |caps: &Captures<'_>| {
        let var = format!("corral_payload_{count}");
        count += 1;
        let fence = format!("CORRAL_EOF_{}", Uuid::new_v4().simple());
        let _ = write!(
            prelude,
            "{var}=$(cat <<'{fence}'\n{}\n{fence}\nprintf x)\n{var}=${{{var}%?x}}\n",
            &caps[1]
        );
        format!("\"${var}\"")
    });
    format!("#!/bin/sh\nset -e\n{prelude}{body}\n")
}

/// Write the script owner-only: it can carry bootstrap credentials.
fn write_script(dir: &Path, raw: &str) -> Result<PathBuf, ExecError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.sh", Uuid::new_v4()));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&path)?;
    file.write_all(render_script(raw).as_bytes())?;
    Ok(path)
}

fn is_empty_listing(stdout: &[u8]) -> bool {
    let mut significant = stdout.iter().filter(|b| !b.is_ascii_whitespace());
    significant.next() == Some(&b'[') && significant.next() == Some(&b']') && significant.next().is_none()
}
