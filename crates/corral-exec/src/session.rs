use crate::command::Command;
use crate::runner::Runner;
use crate::ExecError;
use corral_schema::Auth;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MASTER_CHECK_ATTEMPTS: u32 = 40;
const MASTER_CHECK_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_SSH_PORT: u16 = 22;

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Join argument words into one instruction, quoting each word that the
/// guest shell would otherwise split or expand.
pub fn join_quoted<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| {
            let w = w.as_ref();
            let plain = !w.is_empty()
                && w
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
            if plain {
                w.to_owned()
            } else {
                shell_quote(w)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wrap `instruction` for execution on a guest.
///
/// With a login user the instruction runs in that user's login shell through
/// `sudo -i -u`. Without one, compound instructions (`&&`, `||`, `;`, `|`)
/// run under `sudo sh -c` so every part gets the same privileges; simple
/// instructions are passed through unchanged.
pub fn compose_remote_instruction(instruction: &str, login_user: Option<&str>) -> String {
    if let Some(user) = login_user {
        return format!(
            "sudo -i -u {} -- sh -c {}",
            shell_quote(user),
            shell_quote(instruction)
        );
    }
    let compound = ["&&", "||", ";", "|"]
        .iter()
        .any(|op| instruction.contains(op));
    if compound {
        format!("sudo sh -c {}", shell_quote(instruction))
    } else {
        instruction.to_owned()
    }
}

/// A password-authenticated SSH connection to a guest, multiplexed through a
/// control-master socket.
///
/// Close it with [`RemoteSession::close`]; dropping an open session kills the
/// master and logs a warning.
pub struct RemoteSession {
    runner: Arc<dyn Runner>,
    host: String,
    port: u16,
    user: String,
    socket: PathBuf,
    master: Option<Child>,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("runner", &self.runner.name())
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("socket", &self.socket)
            .finish_non_exhaustive()
    }
}

impl RemoteSession {
    /// Dial `host` with `auth`.
    ///
    /// Incomplete credentials fail before any process is started. A stale
    /// host key for the address is forgotten first, since guests reuse
    /// addresses across recreations.
    pub fn open(
        runner: Arc<dyn Runner>,
        host: &str,
        auth: &Auth,
        control_dir: &Path,
    ) -> Result<Self, ExecError> {
        auth.validate()?;
        if host.is_empty() {
            return Err(ExecError::SessionFailed("<no address>".to_owned()));
        }
        let port = auth.port.unwrap_or(DEFAULT_SSH_PORT);

        std::fs::create_dir_all(control_dir)?;
        let id = Uuid::new_v4().simple().to_string();
        let socket = control_dir.join(format!("{}.sock", &id[..12]));

        let known_host = if port == DEFAULT_SSH_PORT {
            host.to_owned()
        } else {
            format!("[{host}]:{port}")
        };
        let mut forget = Command::from_argv("ssh-keygen", ["-R", known_host.as_str()]);
        if let Err(e) = forget.run(runner.as_ref()) {
            debug!("ssh-keygen -R {known_host}: {e}");
        }

        let mut session = Self {
            runner,
            host: host.to_owned(),
            port,
            user: auth.user.clone(),
            socket,
            master: None,
        };

        let mut master_args = ["-e", "ssh", "-M", "-N"].map(str::to_owned).to_vec();
        master_args.extend(session.base_args());
        master_args.extend(
            [
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "PreferredAuthentications=password",
                "-o",
                "PubkeyAuthentication=no",
            ]
            .map(str::to_owned),
        );
        master_args.push(session.destination());
        let master = Command::from_argv("sshpass", master_args).env("SSHPASS", &auth.secret);
        session.master = session.runner.spawn(&master)?;

        session.wait_for_master()?;
        info!(
            "session open to {}@{}:{}",
            session.user, session.host, session.port
        );
        Ok(session)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "-S".to_owned(),
            self.socket.to_string_lossy().into_owned(),
            "-p".to_owned(),
            self.port.to_string(),
        ]
    }

    fn control(&self, op: &str) -> Result<Vec<u8>, ExecError> {
        let mut args = self.base_args();
        args.extend(["-O".to_owned(), op.to_owned(), self.destination()]);
        let mut cmd = Command::from_argv("ssh", args);
        let output = cmd.run(self.runner.as_ref())?;
        Ok(output.to_vec())
    }

    fn master_exited(&mut self) -> bool {
        match self.master.as_mut().map(Child::try_wait) {
            Some(Ok(Some(status))) => {
                debug!("control master for {} exited: {status}", self.host);
                true
            }
            Some(Err(e)) => {
                warn!("cannot poll control master for {}: {e}", self.host);
                true
            }
            Some(Ok(None)) | None => false,
        }
    }

    fn wait_for_master(&mut self) -> Result<(), ExecError> {
        for attempt in 1..=MASTER_CHECK_ATTEMPTS {
            if self.master_exited() {
                self.master = None;
                return Err(ExecError::SessionFailed(self.destination()));
            }
            match self.control("check") {
                Ok(_) => return Ok(()),
                Err(e) => debug!("control master not ready (attempt {attempt}): {e}"),
            }
            std::thread::sleep(MASTER_CHECK_INTERVAL);
        }
        self.shutdown_master();
        Err(ExecError::SessionFailed(self.destination()))
    }

    /// Run `instruction` on the guest and return its stdout.
    pub fn exec(&mut self, instruction: &str, login_user: Option<&str>) -> Result<Vec<u8>, ExecError> {
        if self.master_exited() {
            self.master = None;
            return Err(ExecError::SessionClosed(self.destination()));
        }
        let mut args = self.base_args();
        args.push(self.destination());
        args.push(compose_remote_instruction(instruction, login_user));
        let mut cmd = Command::from_argv("ssh", args);
        let output = cmd.run(self.runner.as_ref())?;
        Ok(output.to_vec())
    }

    /// Tear down the control master and remove its socket.
    pub fn close(mut self) -> Result<(), ExecError> {
        if let Err(e) = self.control("exit") {
            debug!("control exit for {}: {e}", self.host);
        }
        if let Some(mut master) = self.master.take() {
            master.wait()?;
        }
        self.remove_socket();
        info!("session closed to {}", self.host);
        Ok(())
    }

    fn shutdown_master(&mut self) {
        if let Some(mut master) = self.master.take() {
            let _ = master.kill();
            let _ = master.wait();
        }
        self.remove_socket();
    }

    fn remove_socket(&self) {
        if let Err(e) = std::fs::remove_file(&self.socket) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove control socket {}: {e}", self.socket.display());
            }
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if self.master.is_some() {
            warn!("session to {} dropped without close", self.host);
            self.shutdown_master();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_quoted_keeps_argument_boundaries() {
        assert_eq!(join_quoted(&["uptime", "-p"]), "uptime -p");
        assert_eq!(
            join_quoted(&["echo", "a b", "", "it's", "$HOME"]),
            "echo 'a b' '' 'it'\\''s' '$HOME'"
        );
        let args = vec!["touch".to_owned(), "/tmp/my file".to_owned()];
        assert_eq!(join_quoted(&args), "touch '/tmp/my file'");
    }
    use crate::mock::MockRunner;
    use corral_schema::{AuthError, CredentialKind};

    fn open_with(runner: &Arc<MockRunner>, auth: &Auth) -> Result<RemoteSession, ExecError> {
        let dir = tempfile::tempdir().unwrap();
        let shared: Arc<dyn Runner> = runner.clone();
        RemoteSession::open(shared, "10.0.3.11", auth, dir.path())
    }

    #[test]
    fn incomplete_auth_fails_before_any_command() {
        let runner = Arc::new(MockRunner::new());
        let cases = [
            (Auth::password("", "pw", 22), AuthError::MissingUser),
            (
                Auth {
                    kind: CredentialKind::None,
                    ..Auth::password("u", "pw", 22)
                },
                AuthError::MissingCredentialKind,
            ),
            (Auth::password("u", "", 22), AuthError::MissingSecret),
            (
                Auth {
                    port: None,
                    ..Auth::password("u", "pw", 22)
                },
                AuthError::MissingPort,
            ),
        ];
        for (auth, expected) in cases {
            match open_with(&runner, &auth) {
                Err(ExecError::Auth(e)) => assert_eq!(e, expected),
                other => panic!("expected auth error, got {other:?}"),
            }
        }
        assert!(runner.history().is_empty());
    }

    #[test]
    fn mock_session_round_trip() {
        let runner = Arc::new(MockRunner::new());
        let mut session = open_with(&runner, &Auth::password("tester", "pw", 2222)).unwrap();
        session.exec("uptime", None).unwrap();
        session.close().unwrap();

        let history = runner.history();
        assert!(history[0].starts_with("ssh-keygen -R [10.0.3.11]:2222"));
        assert!(history[1].starts_with("sshpass -e ssh -M -N -S "));
        assert!(history[1].ends_with("tester@10.0.3.11"));
        assert!(history.iter().any(|l| l.contains("-O check")));
        assert!(history.iter().any(|l| l.ends_with("tester@10.0.3.11 uptime")));
        assert!(history.last().unwrap().contains("-O exit"));
    }

    #[test]
    fn failed_master_is_reported() {
        let runner = Arc::new(MockRunner::new());
        runner.fail_on("sshpass", "Permission denied");
        assert!(open_with(&runner, &Auth::password("u", "pw", 22)).is_err());
    }

    #[test]
    fn simple_instruction_passes_through() {
        assert_eq!(compose_remote_instruction("uptime -p", None), "uptime -p");
    }

    #[test]
    fn compound_instruction_runs_under_sudo_shell() {
        assert_eq!(
            compose_remote_instruction("apt-get update && apt-get install -y nginx", None),
            "sudo sh -c 'apt-get update && apt-get install -y nginx'"
        );
        assert_eq!(
            compose_remote_instruction("ps aux | grep ssh", None),
            "sudo sh -c 'ps aux | grep ssh'"
        );
    }

    #[test]
    fn login_user_wraps_with_sudo_login() {
        assert_eq!(
            compose_remote_instruction("echo 'hi'; id", Some("app")),
            "sudo -i -u 'app' -- sh -c 'echo '\\''hi'\\''; id'"
        );
    }
}
