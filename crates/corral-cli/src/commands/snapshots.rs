use super::{json_pretty, load_container, EXIT_SUCCESS};
use corral_core::Engine;

pub fn take(engine: &Engine, name: &str, json: bool) -> Result<u8, String> {
    let mut container = load_container(engine, name)?;
    let snapshot = engine.snapshot(&mut container).map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&snapshot)?);
    } else {
        println!("created snapshot {}", snapshot.name);
    }
    Ok(EXIT_SUCCESS)
}

pub fn list(engine: &Engine, name: &str, json: bool) -> Result<u8, String> {
    let mut container = load_container(engine, name)?;
    engine
        .refresh_snapshots(&mut container)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&container.snapshots)?);
    } else if container.snapshots.is_empty() {
        println!("no snapshots for {name}");
    } else {
        println!("{:<48} CREATED", "NAME");
        for snap in &container.snapshots {
            println!("{:<48} {}", snap.name, snap.taken_at.format("%Y-%m-%d %H:%M:%S"));
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn delete(engine: &Engine, name: &str, snapshot: &str, json: bool) -> Result<u8, String> {
    let mut container = load_container(engine, name)?;
    engine
        .refresh_snapshots(&mut container)
        .map_err(|e| e.to_string())?;
    engine
        .delete_snapshot(&mut container, snapshot)
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&container.snapshots)?);
    } else {
        println!("deleted snapshot {snapshot}");
    }
    Ok(EXIT_SUCCESS)
}

pub fn restore(engine: &Engine, name: &str, snapshot: &str, json: bool) -> Result<u8, String> {
    let mut container = load_container(engine, name)?;
    engine
        .restore(&mut container, snapshot)
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&container)?);
    } else {
        println!("restored {name} to {snapshot}");
    }
    Ok(EXIT_SUCCESS)
}
