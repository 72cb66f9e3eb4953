use corral_core::{CoreError, Engine, Freshness, Settings};
use corral_exec::{Command, MockRunner, Runner};
use corral_schema::{Cluster, Container, ContainerStatus};
use std::path::Path;
use std::sync::Arc;

fn mock_engine(staging: &Path) -> (Arc<MockRunner>, Engine) {
    let settings = Settings {
        retry_interval_secs: 0,
        readiness_interval_secs: 0,
        ..Settings::default()
    }
    .with_staging_root(staging);
    let runner = Arc::new(MockRunner::new());
    let shared: Arc<dyn Runner> = runner.clone();
    (runner, Engine::new(shared, settings))
}

fn count(history: &[String], prefix: &str) -> usize {
    history.iter().filter(|l| l.starts_with(prefix)).count()
}

const PROBE: &str = "lxc exec c1 -- systemctl is-system-running";
const RESET: &str = "lxc exec c1 -- systemctl reset-failed";

#[test]
fn readiness_succeeds_on_first_running_answer() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, engine) = mock_engine(dir.path());
    runner.queue_system_states("c1", &["starting"; 35]);

    let mut c = Container::new("c1", "ubuntu", "jammy");
    engine.create(&mut c).unwrap();
    assert_eq!(c.status, ContainerStatus::Running);
    assert_eq!(count(&runner.history(), PROBE), 36);
}

#[test]
fn readiness_times_out_after_exactly_36_checks() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, engine) = mock_engine(dir.path());
    runner.queue_system_states("c1", &["starting"; 40]);

    let mut c = Container::new("c1", "ubuntu", "jammy");
    let err = engine.create(&mut c).unwrap_err();
    match err {
        CoreError::ReadinessTimeout {
            container,
            attempts,
        } => {
            assert_eq!(container, "c1");
            assert_eq!(attempts, 36);
        }
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(count(&runner.history(), PROBE), 36);
    assert_eq!(c.status, ContainerStatus::Initializing);
}

#[test]
fn readiness_resets_every_degraded_answer() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, engine) = mock_engine(dir.path());
    runner.queue_system_states("c1", &["degraded", "starting", "degraded", "degraded"]);

    let mut c = Container::new("c1", "ubuntu", "jammy");
    engine.create(&mut c).unwrap();
    let history = runner.history();
    assert_eq!(count(&history, RESET), 3);
    assert_eq!(count(&history, PROBE), 5);
}

// Create without bootstrap or auth, no lease for the container, then delete.
#[test]
fn create_without_lease_then_delete() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, engine) = mock_engine(dir.path());
    let mut cluster = Cluster::new("lab", "ubuntu");

    engine
        .create_container(&mut cluster, Container::new("other", "debian", "bookworm"))
        .unwrap();
    runner.hide_lease("C1");

    let c1 = engine
        .create_container(&mut cluster, Container::new("C1", "ubuntu", "jammy"))
        .unwrap();
    assert_eq!(c1.status, ContainerStatus::Running);
    assert!(c1.bootstrap.is_empty());
    assert!(c1.network.is_empty());
    assert!(c1.network.connections.is_empty());
    assert!(runner.user_data("C1").is_none());

    engine.delete_container(&mut cluster, "C1").unwrap();
    engine.scan(&mut cluster).unwrap();
    assert_eq!(cluster.container_names(), vec!["other"]);
    assert!(!cluster.containers[0].network.is_empty());
}

#[test]
fn lone_container_without_lease_gets_empty_network() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, engine) = mock_engine(dir.path());
    runner.hide_lease("C1");
    let mut cluster = Cluster::new("lab", "ubuntu");

    let c1 = engine
        .create_container(&mut cluster, Container::new("C1", "ubuntu", "jammy"))
        .unwrap();
    assert!(c1.network.is_empty());
    // an empty lease table is retried to the bound, then accepted
    assert_eq!(
        count(&runner.history(), "lxc network list-leases lxdbr0"),
        3
    );
}

// Export C1, import it as C2, delete C2; the image is consumed.
#[test]
fn export_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, engine) = mock_engine(dir.path());
    let mut cluster = Cluster::new("lab", "ubuntu");
    engine
        .create_container(&mut cluster, Container::new("C1", "alpine", "3.19"))
        .unwrap();

    let image = engine.export_container(&mut cluster, "C1").unwrap();
    assert_eq!(image.files.len(), 1);
    assert_eq!(cluster.container("C1").unwrap().snapshots.len(), 1);
    let alias = image.name.clone();

    let c2 = engine.import_container(&mut cluster, image, "C2").unwrap();
    assert_eq!(c2.network.hostname, "C2");

    engine.scan(&mut cluster).unwrap();
    let c2 = cluster.container("C2").unwrap();
    assert_eq!(c2.kind, "alpine");
    assert_eq!(c2.release, "3.19");

    engine.delete_container(&mut cluster, "C2").unwrap();
    assert!(cluster.container("C2").is_none());
    engine.scan(&mut cluster).unwrap();
    assert_eq!(cluster.container_names(), vec!["C1"]);

    engine.refresh_images(&mut cluster).unwrap();
    assert!(cluster.image(&alias).is_none());
    let mut relaunch = Command::from_argv("lxc", ["launch", alias.as_str(), "C3"]);
    assert!(relaunch.run(&*runner).is_err());

    for job_dir in ["imports", "exports"] {
        let entries = std::fs::read_dir(dir.path().join(job_dir)).unwrap();
        assert_eq!(entries.count(), 0, "{job_dir} not cleaned");
    }
}

#[test]
fn snapshot_then_export_back_to_back() {
    let dir = tempfile::tempdir().unwrap();
    let (_, engine) = mock_engine(dir.path());
    let mut c = Container::new("c1", "ubuntu", "jammy");
    engine.create(&mut c).unwrap();

    let manual = engine.snapshot(&mut c).unwrap();
    let first = engine.export(&mut c).unwrap();
    let second = engine.export(&mut c).unwrap();
    assert_eq!(c.snapshots.len(), 3);
    assert_eq!(c.snapshots[0], manual);
    assert_ne!(first.name, second.name);
}

#[test]
fn get_container_rescans_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, engine) = mock_engine(dir.path());
    let mut cluster = Cluster::new("lab", "ubuntu");
    engine
        .create_container(&mut cluster, Container::new("c1", "ubuntu", "jammy"))
        .unwrap();

    // stopped behind the cache's back
    let mut stop = Command::from_argv("lxc", ["stop", "c1"]);
    stop.run(&*runner).unwrap();

    let cached = engine
        .get_container(&mut cluster, "c1", Freshness::Cached)
        .unwrap();
    assert_eq!(cached.status, ContainerStatus::Running);

    let fresh = engine
        .get_container(&mut cluster, "c1", Freshness::default())
        .unwrap();
    assert_eq!(fresh.status, ContainerStatus::Stopped);
}

#[test]
fn power_cycle_and_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, engine) = mock_engine(dir.path());
    let mut c = Container::new("c1", "ubuntu", "jammy");
    engine.create(&mut c).unwrap();

    engine.stop(&mut c).unwrap();
    assert_eq!(runner.is_running("c1"), Some(false));
    engine.boot(&mut c).unwrap();
    engine.reboot(&mut c).unwrap();
    assert_eq!(runner.is_running("c1"), Some(true));
    assert!(engine.boot(&mut c).is_err());

    let snap = engine.snapshot(&mut c).unwrap();
    let mut other = c.clone();
    other.snapshots.clear();
    assert_eq!(engine.refresh_snapshots(&mut other).unwrap(), 1);
    assert_eq!(engine.refresh_snapshots(&mut other).unwrap(), 0);
    assert_eq!(other.snapshots, vec![snap]);
}
