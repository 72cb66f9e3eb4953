use super::{load_container, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use corral_core::Engine;

pub fn run(engine: &Engine, name: &str, json: bool) -> Result<u8, String> {
    let container = load_container(engine, name)?;
    let pb = (!json).then(|| spinner(&format!("waiting for {name}...")));
    match engine.ensure_ready(&container) {
        Ok(()) => {
            if let Some(pb) = &pb {
                spin_ok(pb, &format!("{name} is ready"));
            } else {
                println!("{}", serde_json::json!({ "name": name, "ready": true }));
            }
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, &format!("{name} is not ready"));
            }
            Err(e.to_string())
        }
    }
}
