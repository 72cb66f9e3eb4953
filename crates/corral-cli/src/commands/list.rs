use super::{colorize_status, json_pretty, local_cluster, EXIT_SUCCESS};
use corral_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let mut cluster = local_cluster();
    engine.scan(&mut cluster).map_err(|e| e.to_string())?;
    let containers = &cluster.containers;
    if json {
        println!("{}", json_pretty(containers)?);
    } else if containers.is_empty() {
        println!("no containers found");
    } else {
        println!(
            "{:<20} {:<12} {:<16} {:<12} SNAPSHOTS",
            "NAME", "STATUS", "ADDRESS", "RELEASE"
        );
        for c in containers {
            let release = format!("{}/{}", c.kind, c.release);
            println!(
                "{:<20} {:<12} {:<16} {:<12} {}",
                c.name,
                colorize_status(&c.status),
                c.network.private_address,
                release,
                c.snapshots.len()
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
