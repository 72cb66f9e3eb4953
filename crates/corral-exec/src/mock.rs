use crate::command::Command;
use crate::runner::Runner;
use crate::ExecError;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::path::Path;
use std::process::Child;
use std::sync::{Mutex, MutexGuard, PoisonError};

const MOCK_BRIDGE_PREFIX: &str = "10.0.3";

#[derive(Debug, Clone)]
struct MockInstance {
    os: String,
    release: String,
    running: bool,
    host: u32,
    storage: Option<String>,
    user_data: Option<String>,
    snapshots: Vec<String>,
}

#[derive(Debug, Clone)]
struct MockImage {
    fingerprint: String,
    aliases: Vec<String>,
    contents: Vec<u8>,
    created_at: String,
}

#[derive(Debug, Default)]
struct MockState {
    instances: BTreeMap<String, MockInstance>,
    images: Vec<MockImage>,
    history: Vec<String>,
    next_host: u32,
    hidden_leases: HashSet<String>,
    failures: Vec<(String, String)>,
    system_states: HashMap<String, VecDeque<String>>,
}

impl MockState {
    fn record(&mut self, line: &str) -> Result<(), ExecError> {
        self.history.push(line.to_owned());
        match self
            .failures
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
        {
            Some((_, message)) => Err(fail(line, message)),
            None => Ok(()),
        }
    }

    fn image_index(&self, reference: &str) -> Option<usize> {
        self.images.iter().position(|img| {
            img.aliases.iter().any(|a| a == reference)
                || (!reference.is_empty() && img.fingerprint.starts_with(reference))
        })
    }
}

/// In-memory stand-in for the `lxc` control plane.
///
/// Interprets the words of each command against a small model of instances,
/// snapshots, images and DHCP leases, failing the way the real tool does
/// (non-zero exit, `Error: ...` on stderr). Programs other than `lxc`
/// succeed with no output and are never spawned. Every command is recorded
/// in [`history`].
///
/// [`history`]: MockRunner::history
#[derive(Debug, Default)]
pub struct MockRunner {
    state: Mutex<MockState>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers for successive `systemctl is-system-running` probes in `name`.
    /// Once exhausted the guest reports `running`.
    pub fn queue_system_states(&self, name: &str, states: &[&str]) {
        self.lock()
            .system_states
            .entry(name.to_owned())
            .or_default()
            .extend(states.iter().map(|s| (*s).to_owned()));
    }

    /// Leave `name` out of lease listings.
    pub fn hide_lease(&self, name: &str) {
        self.lock().hidden_leases.insert(name.to_owned());
    }

    /// Fail every command whose text starts with `prefix`.
    pub fn fail_on(&self, prefix: &str, message: &str) {
        self.lock()
            .failures
            .push((prefix.to_owned(), message.to_owned()));
    }

    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    pub fn user_data(&self, name: &str) -> Option<String> {
        self.lock()
            .instances
            .get(name)
            .and_then(|i| i.user_data.clone())
    }

    pub fn storage_pool(&self, name: &str) -> Option<String> {
        self.lock()
            .instances
            .get(name)
            .and_then(|i| i.storage.clone())
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.lock().instances.keys().cloned().collect()
    }

    pub fn is_running(&self, name: &str) -> Option<bool> {
        self.lock().instances.get(name).map(|i| i.running)
    }

    pub fn snapshot_names(&self, name: &str) -> Vec<String> {
        self.lock()
            .instances
            .get(name)
            .map(|i| i.snapshots.clone())
            .unwrap_or_default()
    }

    pub fn image_aliases(&self) -> Vec<String> {
        self.lock()
            .images
            .iter()
            .flat_map(|img| img.aliases.clone())
            .collect()
    }
}

impl Runner for MockRunner {
    fn name(&self) -> &str {
        "mock"
    }

    fn execute(&self, command: &Command) -> Result<Vec<u8>, ExecError> {
        let words = command.words();
        let line = words.join(" ");
        let mut state = self.lock();
        state.record(&line)?;

        let is_lxc = words
            .first()
            .and_then(|p| Path::new(p).file_name())
            .is_some_and(|p| p == "lxc");
        if !is_lxc {
            return Ok(Vec::new());
        }

        let args: Vec<&str> = words[1..].iter().map(String::as_str).collect();
        let out = dispatch(&mut state, &args).map_err(|message| fail(&line, &message))?;
        match out {
            Reply::Ok(text) => Ok(text.into_bytes()),
            Reply::Exit { stdout, code } => Err(ExecError::NonZeroExit {
                command: line,
                code,
                stdout: stdout.into_bytes(),
                stderr: String::new(),
            }),
        }
    }

    fn spawn(&self, command: &Command) -> Result<Option<Child>, ExecError> {
        self.lock().record(&command.words().join(" "))?;
        Ok(None)
    }
}

enum Reply {
    Ok(String),
    Exit { stdout: String, code: i32 },
}

fn fail(line: &str, message: &str) -> ExecError {
    ExecError::NonZeroExit {
        command: line.to_owned(),
        code: 1,
        stdout: Vec::new(),
        stderr: format!("Error: {message}"),
    }
}

type MockResult = Result<Reply, String>;

fn dispatch(state: &mut MockState, args: &[&str]) -> MockResult {
    match args {
        ["launch", image, name, opts @ ..] => launch(state, image, name, opts),
        ["start", name, ..] => set_running(state, name, true),
        ["stop", name, ..] => set_running(state, name, false),
        ["restart", name, ..] => {
            instance_mut(state, name)?.running = true;
            Ok(Reply::Ok(String::new()))
        }
        ["delete", target, ..] => delete(state, target),
        ["exec", name, "--", rest @ ..] => exec(state, name, rest),
        ["snapshot", name, snap, ..] => {
            let inst = instance_mut(state, name)?;
            if inst.snapshots.iter().any(|s| s == snap) {
                return Err(format!("Snapshot \"{snap}\" already exists"));
            }
            inst.snapshots.push((*snap).to_owned());
            Ok(Reply::Ok(String::new()))
        }
        ["restore", name, snap, ..] => {
            let inst = instance_mut(state, name)?;
            if !inst.snapshots.iter().any(|s| s == snap) {
                return Err(format!("Snapshot \"{snap}\" not found"));
            }
            Ok(Reply::Ok(String::new()))
        }
        ["info", name, ..] => info(state, name),
        ["publish", source, opts @ ..] => publish(state, source, opts),
        ["list", ..] => Ok(Reply::Ok(list(state))),
        ["network", "list-leases", _bridge, ..] => Ok(Reply::Ok(leases(state))),
        ["image", "list", ..] => Ok(Reply::Ok(image_list(state))),
        ["image", "export", reference, dir, ..] => image_export(state, reference, dir),
        ["image", "import", rest @ ..] => image_import(state, rest),
        ["image", "delete", reference, ..] => {
            let idx = state
                .image_index(reference)
                .ok_or_else(|| format!("Image \"{reference}\" not found"))?;
            state.images.remove(idx);
            Ok(Reply::Ok(String::new()))
        }
        _ => Err(format!("unknown command: {}", args.join(" "))),
    }
}

fn instance_mut<'a>(state: &'a mut MockState, name: &str) -> Result<&'a mut MockInstance, String> {
    state
        .instances
        .get_mut(name)
        .ok_or_else(|| format!("Instance \"{name}\" not found"))
}

fn option_value<'a>(opts: &[&'a str], flag: &str) -> Option<&'a str> {
    let prefix = format!("{flag}=");
    opts.iter().copied().enumerate().find_map(|(i, opt)| {
        if let Some(value) = opt.strip_prefix(prefix.as_str()) {
            Some(value)
        } else if opt == flag {
            opts.get(i + 1).copied()
        } else {
            None
        }
    })
}

fn image_field(contents: &[u8], key: &str) -> String {
    String::from_utf8_lossy(contents)
        .lines()
        .find_map(|l| l.strip_prefix(key).and_then(|v| v.strip_prefix('=')))
        .unwrap_or_default()
        .to_owned()
}

fn launch(state: &mut MockState, image: &str, name: &str, opts: &[&str]) -> MockResult {
    if state.instances.contains_key(name) {
        return Err(format!("Instance \"{name}\" already exists"));
    }
    let (os, release) = if let Some((_, path)) = image.split_once(':') {
        let mut parts = path.split('/');
        match (parts.next(), parts.next()) {
            (Some(os), Some(release)) if !os.is_empty() && !release.is_empty() => {
                (os.to_owned(), release.to_owned())
            }
            _ => return Err(format!("Image \"{image}\" not found")),
        }
    } else {
        let idx = state
            .image_index(image)
            .ok_or_else(|| format!("Image \"{image}\" not found"))?;
        let contents = &state.images[idx].contents;
        (image_field(contents, "os"), image_field(contents, "release"))
    };

    let user_data = option_value(opts, "--config")
        .and_then(|c| c.strip_prefix("user.user-data="))
        .map(str::to_owned);
    let storage = option_value(opts, "--storage").map(str::to_owned);

    state.next_host += 1;
    let host = state.next_host + 10;
    state.instances.insert(
        name.to_owned(),
        MockInstance {
            os,
            release,
            running: true,
            host,
            storage,
            user_data,
            snapshots: Vec::new(),
        },
    );
    Ok(Reply::Ok(format!("Creating {name}\nStarting {name}\n")))
}

fn set_running(state: &mut MockState, name: &str, running: bool) -> MockResult {
    let inst = instance_mut(state, name)?;
    if inst.running == running {
        let now = if running { "running" } else { "stopped" };
        return Err(format!("The instance is already {now}"));
    }
    inst.running = running;
    Ok(Reply::Ok(String::new()))
}

fn delete(state: &mut MockState, target: &str) -> MockResult {
    if let Some((name, snap)) = target.split_once('/') {
        let inst = instance_mut(state, name)?;
        let before = inst.snapshots.len();
        inst.snapshots.retain(|s| s != snap);
        if inst.snapshots.len() == before {
            return Err(format!("Snapshot \"{snap}\" not found"));
        }
        return Ok(Reply::Ok(String::new()));
    }
    if instance_mut(state, target)?.running {
        return Err("The instance is currently running, stop it first".to_owned());
    }
    state.instances.remove(target);
    Ok(Reply::Ok(String::new()))
}

fn exec(state: &mut MockState, name: &str, rest: &[&str]) -> MockResult {
    if !instance_mut(state, name)?.running {
        return Err(format!("Instance \"{name}\" is not running"));
    }
    let joined = rest.join(" ");
    if joined.contains("is-system-running") {
        let answer = state
            .system_states
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| "running".to_owned());
        let stdout = format!("{answer}\n");
        return Ok(if answer == "running" {
            Reply::Ok(stdout)
        } else {
            Reply::Exit { stdout, code: 1 }
        });
    }
    if joined.contains("reset-failed") {
        return Ok(Reply::Ok(String::new()));
    }
    Ok(Reply::Ok(format!("mock-exec: {joined}\n")))
}

fn info(state: &mut MockState, name: &str) -> MockResult {
    let inst = instance_mut(state, name)?;
    let status = if inst.running { "RUNNING" } else { "STOPPED" };
    let mut out = format!("Name: {name}\nStatus: {status}\nType: container\n");
    if !inst.snapshots.is_empty() {
        out.push_str("Snapshots:\n+------+----------+\n| NAME | STATEFUL |\n+------+----------+\n");
        for snap in &inst.snapshots {
            let _ = writeln!(out, "| {snap} | NO |\n+------+----------+");
        }
    }
    Ok(Reply::Ok(out))
}

fn publish(state: &mut MockState, source: &str, opts: &[&str]) -> MockResult {
    let (name, snap) = match source.split_once('/') {
        Some((n, s)) => (n, Some(s)),
        None => (source, None),
    };
    let inst = instance_mut(state, name)?;
    if let Some(snap) = snap {
        if !inst.snapshots.iter().any(|s| s == snap) {
            return Err(format!("Snapshot \"{snap}\" not found"));
        }
    }
    let contents = format!(
        "corral-mock-image\nos={}\nrelease={}\nsource={source}\n",
        inst.os, inst.release
    )
    .into_bytes();

    let alias = option_value(opts, "--alias");
    if let Some(alias) = alias {
        if state.image_index(alias).is_some() {
            return Err(format!("Alias \"{alias}\" already exists"));
        }
    }
    let fingerprint = add_image(state, contents, alias)?;
    Ok(Reply::Ok(format!(
        "Instance published with fingerprint: {fingerprint}\n"
    )))
}

fn add_image(state: &mut MockState, contents: Vec<u8>, alias: Option<&str>) -> Result<String, String> {
    let fingerprint = blake3::hash(&contents).to_hex().to_string();
    if state.images.iter().any(|img| img.fingerprint == fingerprint) {
        return Err("Image with same fingerprint already exists".to_owned());
    }
    state.images.push(MockImage {
        fingerprint: fingerprint.clone(),
        aliases: alias.map(str::to_owned).into_iter().collect(),
        contents,
        created_at: chrono::Utc::now().to_rfc3339(),
    });
    Ok(fingerprint)
}

fn image_export(state: &mut MockState, reference: &str, dir: &str) -> MockResult {
    let idx = state
        .image_index(reference)
        .ok_or_else(|| format!("Image \"{reference}\" not found"))?;
    let image = &state.images[idx];
    let dest = Path::new(dir).join(format!("{}.tar.gz", image.fingerprint));
    std::fs::write(&dest, &image.contents).map_err(|e| format!("write {}: {e}", dest.display()))?;
    Ok(Reply::Ok("Image exported successfully!\n".to_owned()))
}

fn image_import(state: &mut MockState, rest: &[&str]) -> MockResult {
    let alias = option_value(rest, "--alias");
    let mut files = Vec::new();
    let mut skip_next = false;
    for arg in rest {
        if skip_next {
            skip_next = false;
        } else if *arg == "--alias" {
            skip_next = true;
        } else if !arg.starts_with("--") {
            files.push(*arg);
        }
    }
    if files.is_empty() {
        return Err("no image files given".to_owned());
    }
    if let Some(alias) = alias {
        if state.image_index(alias).is_some() {
            return Err(format!("Alias \"{alias}\" already exists"));
        }
    }
    let mut contents = Vec::new();
    for file in files {
        let bytes = std::fs::read(file).map_err(|e| format!("open {file}: {e}"))?;
        contents.extend(bytes);
    }
    let fingerprint = add_image(state, contents, alias)?;
    Ok(Reply::Ok(format!(
        "Image imported with fingerprint: {fingerprint}\n"
    )))
}

fn list(state: &MockState) -> String {
    let entries: Vec<Value> = state
        .instances
        .iter()
        .map(|(name, inst)| {
            let status = if inst.running { "Running" } else { "Stopped" };
            json!({
                "name": name,
                "status": status,
                "type": "container",
                "config": {
                    "image.os": inst.os,
                    "image.release": inst.release,
                },
            })
        })
        .collect();
    Value::Array(entries).to_string()
}

fn leases(state: &MockState) -> String {
    let entries: Vec<Value> = state
        .instances
        .iter()
        .filter(|(name, _)| !state.hidden_leases.contains(*name))
        .map(|(name, inst)| {
            json!({
                "hostname": name,
                "hwaddr": format!("00:16:3e:00:00:{:02x}", inst.host),
                "address": format!("{MOCK_BRIDGE_PREFIX}.{}", inst.host),
                "type": "DYNAMIC",
                "location": "none",
            })
        })
        .collect();
    Value::Array(entries).to_string()
}

fn image_list(state: &MockState) -> String {
    let entries: Vec<Value> = state
        .images
        .iter()
        .map(|img| {
            json!({
                "fingerprint": img.fingerprint,
                "type": "container",
                "size": img.contents.len(),
                "created_at": img.created_at,
                "aliases": img.aliases.iter().map(|a| json!({ "name": a })).collect::<Vec<_>>(),
            })
        })
        .collect();
    Value::Array(entries).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(runner: &MockRunner, raw: &str) -> Result<Vec<u8>, ExecError> {
        let args: Vec<&str> = raw.split_whitespace().collect();
        let cmd = Command::from_argv(args[0], args[1..].iter().copied());
        runner.execute(&cmd)
    }

    fn text(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn launch_list_and_leases() {
        let runner = MockRunner::new();
        run(&runner, "lxc launch images:ubuntu/jammy/amd64 web1 --storage=fast").unwrap();
        assert_eq!(runner.storage_pool("web1").as_deref(), Some("fast"));

        let listed: Value = serde_json::from_str(&text(run(&runner, "lxc list --format json").unwrap())).unwrap();
        assert_eq!(listed[0]["name"], "web1");
        assert_eq!(listed[0]["status"], "Running");
        assert_eq!(listed[0]["config"]["image.os"], "ubuntu");

        let leases = text(run(&runner, "lxc network list-leases lxdbr0 --format json").unwrap());
        assert!(leases.contains("10.0.3.11"));

        runner.hide_lease("web1");
        let leases = text(run(&runner, "lxc network list-leases lxdbr0 --format json").unwrap());
        assert_eq!(leases, "[]");
    }

    #[test]
    fn empty_store_lists_as_empty_array() {
        let runner = MockRunner::new();
        assert_eq!(run(&runner, "lxc list --format json").unwrap(), b"[]");
        assert_eq!(run(&runner, "lxc image list --format json").unwrap(), b"[]");
    }

    #[test]
    fn power_transitions_fail_like_the_real_tool() {
        let runner = MockRunner::new();
        assert!(run(&runner, "lxc stop ghost").is_err());
        run(&runner, "lxc launch images:debian/bookworm/amd64 c1").unwrap();
        assert!(run(&runner, "lxc start c1").is_err());
        assert!(run(&runner, "lxc delete c1").is_err());
        run(&runner, "lxc stop c1").unwrap();
        assert!(run(&runner, "lxc stop c1").is_err());
        assert_eq!(runner.is_running("c1"), Some(false));
        run(&runner, "lxc delete c1").unwrap();
        assert!(runner.instance_names().is_empty());
    }

    #[test]
    fn system_state_queue() {
        let runner = MockRunner::new();
        run(&runner, "lxc launch images:ubuntu/jammy/amd64 c1").unwrap();
        runner.queue_system_states("c1", &["starting", "degraded"]);
        let probe = "lxc exec c1 -- systemctl is-system-running";

        let err = run(&runner, probe).unwrap_err();
        assert_eq!(err.stdout(), Some(&b"starting\n"[..]));
        let err = run(&runner, probe).unwrap_err();
        assert_eq!(err.stdout(), Some(&b"degraded\n"[..]));
        assert_eq!(run(&runner, probe).unwrap(), b"running\n");
    }

    #[test]
    fn snapshots_show_in_info() {
        let runner = MockRunner::new();
        run(&runner, "lxc launch images:ubuntu/jammy/amd64 c1").unwrap();
        run(&runner, "lxc snapshot c1 c1-snap-2021-01-18T10HH05MM33SS-UTC").unwrap();
        assert!(run(&runner, "lxc snapshot c1 c1-snap-2021-01-18T10HH05MM33SS-UTC").is_err());
        let info = text(run(&runner, "lxc info c1").unwrap());
        assert!(info.contains("| c1-snap-2021-01-18T10HH05MM33SS-UTC |"));
        run(&runner, "lxc delete c1/c1-snap-2021-01-18T10HH05MM33SS-UTC").unwrap();
        assert!(runner.snapshot_names("c1").is_empty());
    }

    #[test]
    fn publish_export_import_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        run(&runner, "lxc launch images:alpine/3.19/amd64 c1").unwrap();
        run(&runner, "lxc snapshot c1 s1").unwrap();
        let out = text(run(&runner, "lxc publish c1/s1 --alias img1").unwrap());
        assert!(out.starts_with("Instance published with fingerprint: "));
        assert!(run(&runner, "lxc publish c1 --alias img1").is_err());

        let export = format!("lxc image export img1 {}", dir.path().display());
        run(&runner, &export).unwrap();
        let file = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap().path();

        let import = format!("lxc image import {} --alias img2", file.display());
        assert!(run(&runner, &import).is_err(), "same fingerprint");
        run(&runner, "lxc image delete img1").unwrap();
        run(&runner, &import).unwrap();

        run(&runner, "lxc launch img2 c2").unwrap();
        let listed = text(run(&runner, "lxc list --format json").unwrap());
        assert!(listed.contains("\"c2\""));
        assert!(listed.contains("alpine"));
    }

    #[test]
    fn scripted_failure_and_history() {
        let runner = MockRunner::new();
        runner.fail_on("lxc list", "connection refused");
        let err = run(&runner, "lxc list --format json").unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        run(&runner, "ssh-keygen -R host").unwrap();
        assert_eq!(
            runner.history(),
            vec!["lxc list --format json", "ssh-keygen -R host"]
        );
    }
}
