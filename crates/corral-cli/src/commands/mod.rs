pub mod create;
pub mod delete;
pub mod exec;
pub mod images;
pub mod inspect;
pub mod list;
pub mod power;
pub mod snapshots;
pub mod wait;

use corral_core::{Engine, Freshness};
use corral_schema::{Auth, Cluster, Container, ContainerStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_PRECONDITION: u8 = 2;
pub const EXIT_TIMEOUT: u8 = 3;

/// Environment variable holding the SSH password for `--user`.
pub const PASSWORD_ENV: &str = "CORRAL_PASSWORD";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_status(status: &ContainerStatus) -> String {
    use console::Style;
    let text = status.to_string();
    match status {
        ContainerStatus::Running => Style::new().green().bold().apply_to(text).to_string(),
        ContainerStatus::Initializing => Style::new().yellow().apply_to(text).to_string(),
        ContainerStatus::Stopped => Style::new().dim().apply_to(text).to_string(),
        ContainerStatus::Deleted => Style::new().red().apply_to(text).to_string(),
        ContainerStatus::Other(_) => text,
    }
}

/// The cluster every CLI invocation works against: the local control plane.
pub fn local_cluster() -> Cluster {
    Cluster::new("local", "lxc")
}

/// Scan the local cluster and return a copy of the named container.
pub fn load_container(engine: &Engine, name: &str) -> Result<Container, String> {
    let mut cluster = local_cluster();
    engine.scan(&mut cluster).map_err(|e| e.to_string())?;
    let container = engine
        .get_container(&mut cluster, name, Freshness::Cached)
        .map_err(|e| e.to_string())?;
    Ok(container.clone())
}

/// Password credentials for `user`, read from [`PASSWORD_ENV`].
pub fn password_auth(user: &str, port: u16) -> Result<Auth, String> {
    let secret = std::env::var(PASSWORD_ENV)
        .map_err(|_| format!("auth error: {PASSWORD_ENV} is not set"))?;
    let auth = Auth::password(user, &secret, port);
    auth.validate().map_err(|e| format!("auth error: {e}"))?;
    Ok(auth)
}

/// Map an error message to the process exit code.
pub fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("auth error:")
        || msg.starts_with("exec error: session precondition failed")
        || msg.ends_with("has no known address")
    {
        EXIT_PRECONDITION
    } else if msg.contains("not ready after") {
        EXIT_TIMEOUT
    } else {
        EXIT_FAILURE
    }
}
