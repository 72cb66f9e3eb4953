use super::{local_cluster, EXIT_SUCCESS};
use corral_core::Engine;

pub fn run(engine: &Engine, name: &str, json: bool) -> Result<u8, String> {
    let mut cluster = local_cluster();
    engine.scan(&mut cluster).map_err(|e| e.to_string())?;
    if cluster.container(name).is_none() {
        return Err(format!("container not found: {name}"));
    }
    engine
        .delete_container(&mut cluster, name)
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", serde_json::json!({ "name": name, "deleted": true }));
    } else {
        println!("deleted container {name}");
    }
    Ok(EXIT_SUCCESS)
}
