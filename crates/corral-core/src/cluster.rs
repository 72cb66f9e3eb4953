use crate::engine::Engine;
use crate::CoreError;
use corral_schema::{parse_container_list, Cluster, Connection, Container, Image};
use tracing::{debug, info};

const DEFAULT_SSH_PORT: u16 = 22;

/// How [`Engine::get_container`] treats the cluster's cached container list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Freshness {
    /// Re-scan the cluster and refresh the container's network before reading.
    #[default]
    Rescan,
    /// Read the cached list as-is.
    Cached,
}

/// Carry caller-supplied fields from a cached container into its re-scanned
/// replacement. Everything observed comes from the scan.
fn carry_over(fresh: &mut Container, cached: Container) {
    fresh.controller = cached.controller;
    fresh.services = cached.services;
    fresh.storage = cached.storage;
    fresh.auth = cached.auth;
    fresh.snapshots = cached.snapshots;
    fresh.network.connections = cached.network.connections;
}

impl Engine {
    /// Replace the cluster's container list with the control plane's listing
    /// and refresh every container's network.
    pub fn scan(&self, cluster: &mut Cluster) -> Result<(), CoreError> {
        let listing = self.query_once(&cluster.name, &self.lxc("list --format json"))?;
        let mut containers = match listing {
            Some(json) => parse_container_list(&json)?,
            None => Vec::new(),
        };

        let mut cached = std::mem::take(&mut cluster.containers);
        for container in &mut containers {
            if let Some(idx) = cached.iter().position(|c| c.name == container.name) {
                carry_over(container, cached.swap_remove(idx));
            }
            self.refresh_network(container)?;
        }
        debug!("{}: scanned {} container(s)", cluster.name, containers.len());
        cluster.containers = containers;
        Ok(())
    }

    /// Replace the cluster's image list with the control plane's image store.
    pub fn refresh_images(&self, cluster: &mut Cluster) -> Result<(), CoreError> {
        cluster.images = self.list_images()?;
        Ok(())
    }

    /// Look up a container by name.
    ///
    /// With [`Freshness::Rescan`] the whole cluster is scanned first and the
    /// container's network is refreshed once more at the point of read.
    pub fn get_container<'a>(
        &self,
        cluster: &'a mut Cluster,
        name: &str,
        freshness: Freshness,
    ) -> Result<&'a mut Container, CoreError> {
        if freshness == Freshness::Rescan {
            self.scan(cluster)?;
        }
        let container = cluster
            .container_mut(name)
            .ok_or_else(|| CoreError::ContainerNotFound(name.to_owned()))?;
        if freshness == Freshness::Rescan {
            self.refresh_network(container)?;
        }
        Ok(container)
    }

    /// Create `container`, discover its address and add it to the cluster.
    ///
    /// A container with credentials advertises an `ssh` connection.
    pub fn create_container<'a>(
        &self,
        cluster: &'a mut Cluster,
        mut container: Container,
    ) -> Result<&'a Container, CoreError> {
        self.create(&mut container)?;
        self.refresh_network(&mut container)?;
        if let Some(auth) = container.auth.as_ref().filter(|a| a.has_credentials()) {
            let port = auth.port.unwrap_or(DEFAULT_SSH_PORT);
            container
                .network
                .add_connection(Connection::new("ssh", "tcp", port));
        }
        info!("{}: added {}", cluster.name, container.name);
        cluster.containers.push(container);
        Ok(&cluster.containers[cluster.containers.len() - 1])
    }

    /// Delete the named container and drop it from the cached list. Unknown
    /// names are ignored; on failure the container stays cached.
    pub fn delete_container(&self, cluster: &mut Cluster, name: &str) -> Result<(), CoreError> {
        let Some(idx) = cluster.containers.iter().position(|c| c.name == name) else {
            debug!("{}: no container {name}, nothing to delete", cluster.name);
            return Ok(());
        };
        let mut container = cluster.containers.remove(idx);
        if let Err(e) = self.delete(&mut container) {
            cluster.containers.insert(idx, container);
            return Err(e);
        }
        info!("{}: removed {name}", cluster.name);
        Ok(())
    }

    /// Export a cached container to an image.
    pub fn export_container(&self, cluster: &mut Cluster, name: &str) -> Result<Image, CoreError> {
        let container = cluster
            .container_mut(name)
            .ok_or_else(|| CoreError::ContainerNotFound(name.to_owned()))?;
        self.export(container)
    }

    /// Import `image` as container `name` and add it to the cluster.
    pub fn import_container<'a>(
        &self,
        cluster: &'a mut Cluster,
        image: Image,
        name: &str,
    ) -> Result<&'a Container, CoreError> {
        let mut container = self.import(image, name)?;
        self.refresh_network(&mut container)?;
        cluster.containers.push(container);
        Ok(&cluster.containers[cluster.containers.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::mock_engine;
    use corral_schema::{Auth, ContainerStatus};

    #[test]
    fn scan_replaces_cache_and_keeps_caller_fields() {
        let dir = tempfile::tempdir().unwrap();
        let (_, engine) = mock_engine(dir.path());
        let mut cluster = Cluster::new("lab", "ubuntu");

        let c = Container::new("web1", "ubuntu", "jammy")
            .with_auth(Auth::password("tester", "pw", 22))
            .as_controller();
        engine.create_container(&mut cluster, c).unwrap();
        cluster.containers.push(Container::new("ghost", "ubuntu", "jammy"));

        engine.scan(&mut cluster).unwrap();
        assert_eq!(cluster.container_names(), vec!["web1"]);
        let web1 = cluster.container("web1").unwrap();
        assert!(web1.controller);
        assert_eq!(web1.status, ContainerStatus::Running);
        assert_eq!(web1.network.private_address, "10.0.3.11");
        assert_eq!(web1.network.connection("ssh").unwrap().port, 22);
        assert!(web1.auth.is_some());
    }

    #[test]
    fn empty_listing_scans_to_empty_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, engine) = mock_engine(dir.path());
        let mut cluster = Cluster::new("lab", "ubuntu");
        cluster.containers.push(Container::new("stale", "ubuntu", "jammy"));
        engine.scan(&mut cluster).unwrap();
        assert!(cluster.containers.is_empty());
        assert_eq!(runner.history(), vec!["lxc list --format json"]);
    }

    #[test]
    fn get_container_freshness() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, engine) = mock_engine(dir.path());
        let mut cluster = Cluster::new("lab", "ubuntu");
        engine
            .create_container(&mut cluster, Container::new("c1", "ubuntu", "jammy"))
            .unwrap();

        let before = runner.history().len();
        engine
            .get_container(&mut cluster, "c1", Freshness::Cached)
            .unwrap();
        assert_eq!(runner.history().len(), before);

        let c1 = engine
            .get_container(&mut cluster, "c1", Freshness::Rescan)
            .unwrap();
        assert_eq!(c1.network.hostname, "c1");
        let issued: Vec<String> = runner.history().split_off(before);
        assert_eq!(issued[0], "lxc list --format json");
        let lease_queries = issued
            .iter()
            .filter(|l| l.starts_with("lxc network list-leases"))
            .count();
        assert_eq!(lease_queries, 2);

        assert!(matches!(
            engine.get_container(&mut cluster, "nope", Freshness::Cached),
            Err(CoreError::ContainerNotFound(_))
        ));
    }

    #[test]
    fn ssh_connection_only_with_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let (_, engine) = mock_engine(dir.path());
        let mut cluster = Cluster::new("lab", "ubuntu");
        let plain = engine
            .create_container(&mut cluster, Container::new("plain", "ubuntu", "jammy"))
            .unwrap();
        assert!(plain.network.connections.is_empty());

        let with_auth = Container::new("sshd", "ubuntu", "jammy")
            .with_auth(Auth::password("u", "pw", 2200));
        let created = engine.create_container(&mut cluster, with_auth).unwrap();
        assert_eq!(created.network.connection("ssh").unwrap().port, 2200);
    }

    #[test]
    fn delete_unknown_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, engine) = mock_engine(dir.path());
        let mut cluster = Cluster::new("lab", "ubuntu");
        engine.delete_container(&mut cluster, "missing").unwrap();
        assert!(runner.history().is_empty());
    }

    #[test]
    fn failed_delete_keeps_container_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, engine) = mock_engine(dir.path());
        let mut cluster = Cluster::new("lab", "ubuntu");
        for name in ["a", "b", "c"] {
            engine
                .create_container(&mut cluster, Container::new(name, "ubuntu", "jammy"))
                .unwrap();
        }
        runner.fail_on("lxc delete b", "device busy");
        assert!(engine.delete_container(&mut cluster, "b").is_err());
        assert_eq!(cluster.container_names(), vec!["a", "b", "c"]);

        engine.delete_container(&mut cluster, "a").unwrap();
        assert_eq!(cluster.container_names(), vec!["b", "c"]);
    }
}
