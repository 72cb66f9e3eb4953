use crate::engine::Engine;
use crate::CoreError;
use chrono::{TimeDelta, Utc};
use corral_exec::{is_retry_sentinel, wrap_payload, RemoteSession};
use corral_schema::{
    network_for, parse_leases, parse_snapshots, parse_system_state, render_bootstrap, AuthError,
    Container, ContainerStatus, Network, Snapshot, SystemState,
};
use tracing::{debug, info, warn};

impl Engine {
    /// Build the `launch` instruction for `container`.
    ///
    /// With a bootstrap payload the cloud variant of the image is used and the
    /// payload is passed as user-data, which puts the command in script mode.
    pub fn launch_instruction(&self, container: &Container) -> String {
        let s = self.settings();
        let mut instruction = if container.bootstrap.is_empty() {
            self.lxc(&format!(
                "launch {}:{}/{}/{} {}",
                s.image_remote, container.kind, container.release, s.architecture, container.name
            ))
        } else {
            self.lxc(&format!(
                "launch {}:{}/{}/cloud/{} {} --config=user.user-data={}",
                s.image_remote,
                container.kind,
                container.release,
                s.architecture,
                container.name,
                wrap_payload(&String::from_utf8_lossy(&container.bootstrap))
            ))
        };
        if !container.storage.is_empty() {
            instruction.push_str(&format!(" --storage={}", container.storage));
        }
        instruction
    }

    /// Launch `container` and wait until its init system reports running.
    ///
    /// A container with credentials but no explicit bootstrap payload gets
    /// one rendered from its `Auth`.
    pub fn create(&self, container: &mut Container) -> Result<(), CoreError> {
        if container.bootstrap.is_empty() {
            if let Some(script) = container.auth.as_ref().and_then(render_bootstrap) {
                debug!("rendered bootstrap for {}", container.name);
                container.bootstrap = script;
            }
        }
        info!(
            "creating container {} ({}/{})",
            container.name, container.kind, container.release
        );
        self.run_one(&container.name, &self.launch_instruction(container))?;
        container.status = ContainerStatus::Initializing;
        self.ensure_ready(container)?;
        container.status = ContainerStatus::Running;
        Ok(())
    }

    /// Poll `systemctl is-system-running` in the guest until it answers
    /// `running`, resetting failed units whenever it answers `degraded`.
    pub fn ensure_ready(&self, container: &Container) -> Result<(), CoreError> {
        let policy = self.settings().readiness_policy();
        let name = &container.name;
        let probe = self.lxc(&format!("exec {name} -- systemctl is-system-running"));
        let reset = self.lxc(&format!("exec {name} -- systemctl reset-failed"));

        for attempt in 1..=policy.attempts {
            // is-system-running exits non-zero for every state but running.
            let output = match self.run_one(name, &probe) {
                Ok(out) => out,
                Err(CoreError::Exec(e)) if e.stdout().is_some() => {
                    e.stdout().map(<[u8]>::to_vec).unwrap_or_default()
                }
                Err(e) => return Err(e),
            };
            match parse_system_state(&String::from_utf8_lossy(&output)) {
                SystemState::Running => {
                    info!("{name} is running after {attempt} check(s)");
                    return Ok(());
                }
                SystemState::Degraded => {
                    warn!("{name} is degraded, resetting failed units");
                    self.run_one(name, &reset)?;
                }
                SystemState::Other(state) => {
                    debug!("{name} not ready ({state}), check {attempt}/{}", policy.attempts);
                }
            }
            if attempt < policy.attempts {
                std::thread::sleep(policy.interval);
            }
        }
        Err(CoreError::ReadinessTimeout {
            container: name.clone(),
            attempts: policy.attempts,
        })
    }

    pub fn stop(&self, container: &mut Container) -> Result<(), CoreError> {
        info!("stopping {}", container.name);
        self.run_one(&container.name, &self.lxc(&format!("stop {}", container.name)))?;
        container.status = ContainerStatus::Stopped;
        Ok(())
    }

    pub fn boot(&self, container: &mut Container) -> Result<(), CoreError> {
        info!("starting {}", container.name);
        self.run_one(&container.name, &self.lxc(&format!("start {}", container.name)))?;
        container.status = ContainerStatus::Running;
        Ok(())
    }

    pub fn reboot(&self, container: &mut Container) -> Result<(), CoreError> {
        info!("restarting {}", container.name);
        self.run_one(&container.name, &self.lxc(&format!("restart {}", container.name)))?;
        container.status = ContainerStatus::Running;
        Ok(())
    }

    /// Stop then delete `container` as one batch. The stop is skipped when the
    /// container is already known to be stopped.
    pub fn delete(&self, container: &mut Container) -> Result<(), CoreError> {
        info!("deleting {}", container.name);
        let mut instructions = Vec::with_capacity(2);
        if container.status != ContainerStatus::Stopped {
            instructions.push(self.lxc(&format!("stop {}", container.name)));
        }
        instructions.push(self.lxc(&format!("delete {}", container.name)));
        self.run_batch(&container.name, &instructions)?;

        container.snapshots.clear();
        container.network = Network::default();
        container.status = ContainerStatus::Deleted;
        Ok(())
    }

    /// Take a snapshot named `<container>-snap-<timestamp>`.
    ///
    /// Names have one-second resolution; when the name for now is already
    /// known the timestamp moves forward until it is free.
    pub fn snapshot(&self, container: &mut Container) -> Result<Snapshot, CoreError> {
        let mut at = Utc::now();
        let mut snapshot = Snapshot::for_container(&container.name, at);
        while container.snapshot(&snapshot.name).is_some() {
            at += TimeDelta::seconds(1);
            snapshot = Snapshot::for_container(&container.name, at);
        }
        info!("snapshotting {} as {}", container.name, snapshot.name);
        self.run_one(
            &container.name,
            &self.lxc(&format!("snapshot {} {}", container.name, snapshot.name)),
        )?;
        container.add_snapshot(snapshot.clone());
        Ok(snapshot)
    }

    /// Merge snapshots reported by `info` into the local list. Returns how many
    /// were new.
    pub fn refresh_snapshots(&self, container: &mut Container) -> Result<usize, CoreError> {
        let output = self.run_one(&container.name, &self.lxc(&format!("info {}", container.name)))?;
        let found = parse_snapshots(&String::from_utf8_lossy(&output), &container.name);
        Ok(found
            .into_iter()
            .filter(|snapshot| container.add_snapshot(snapshot.clone()))
            .count())
    }

    pub fn delete_snapshot(&self, container: &mut Container, snapshot: &str) -> Result<(), CoreError> {
        info!("deleting snapshot {}/{snapshot}", container.name);
        self.run_one(
            &container.name,
            &self.lxc(&format!("delete {}/{snapshot}", container.name)),
        )?;
        container.snapshots.retain(|s| s.name != snapshot);
        Ok(())
    }

    pub fn restore(&self, container: &mut Container, snapshot: &str) -> Result<(), CoreError> {
        info!("restoring {} to {snapshot}", container.name);
        self.run_one(
            &container.name,
            &self.lxc(&format!("restore {} {snapshot}", container.name)),
        )?;
        Ok(())
    }

    /// Rebuild the container's network from the bridge lease table.
    ///
    /// No matching lease, or a lease table that stays empty through every
    /// retry, leaves an empty network. Advertised connections are kept.
    pub fn refresh_network(&self, container: &mut Container) -> Result<(), CoreError> {
        let instruction = self.lxc(&format!(
            "network list-leases {} --format json",
            self.settings().bridge
        ));
        let output = self.query_with_retry(&container.name, &instruction)?;
        let mut network = if is_retry_sentinel(&output) {
            debug!("no leases on {} yet", self.settings().bridge);
            Network::default()
        } else {
            let leases = parse_leases(&String::from_utf8_lossy(&output))?;
            network_for(&leases, &container.name)
        };
        network.connections = std::mem::take(&mut container.network.connections);
        if network.is_empty() {
            debug!("no lease for {}", container.name);
        }
        container.network = network;
        Ok(())
    }

    /// Open an SSH session to the container's private address.
    pub fn open_session(&self, container: &Container) -> Result<RemoteSession, CoreError> {
        let auth = container
            .auth
            .as_ref()
            .ok_or(AuthError::MissingCredentialKind)?;
        auth.validate()?;
        if container.network.private_address.is_empty() {
            return Err(CoreError::NoAddress(container.name.clone()));
        }
        Ok(RemoteSession::open(
            self.runner().clone(),
            &container.network.private_address,
            auth,
            &self.staging().sessions_dir(),
        )?)
    }
}
