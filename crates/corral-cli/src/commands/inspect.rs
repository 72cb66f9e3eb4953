use super::{colorize_status, json_pretty, local_cluster, EXIT_SUCCESS};
use corral_core::{Engine, Freshness};

pub fn run(engine: &Engine, name: &str, cached: bool, json: bool) -> Result<u8, String> {
    let mut cluster = local_cluster();
    let freshness = if cached {
        engine.scan(&mut cluster).map_err(|e| e.to_string())?;
        Freshness::Cached
    } else {
        Freshness::Rescan
    };
    let container = engine
        .get_container(&mut cluster, name, freshness)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&*container)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("name:      {}", container.name);
    println!("status:    {}", colorize_status(&container.status));
    println!("release:   {}/{}", container.kind, container.release);
    if !container.storage.is_empty() {
        println!("storage:   {}", container.storage);
    }
    let net = &container.network;
    if net.is_empty() {
        println!("address:   (no lease)");
    } else {
        println!("address:   {}", net.private_address);
        println!("hwaddr:    {}", net.hardware_address);
        println!("hostname:  {}", net.hostname);
    }
    println!("snapshots: {}", container.snapshots.len());
    for snap in &container.snapshots {
        println!("  {}", snap.name);
    }
    Ok(EXIT_SUCCESS)
}
