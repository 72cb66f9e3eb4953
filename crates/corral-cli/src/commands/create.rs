use super::{json_pretty, local_cluster, password_auth, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use corral_core::Engine;
use corral_schema::Container;
use std::path::Path;

pub struct CreateArgs<'a> {
    pub name: &'a str,
    pub os: &'a str,
    pub release: &'a str,
    pub storage: Option<&'a str>,
    pub bootstrap: Option<&'a Path>,
    pub user: Option<&'a str>,
    pub port: u16,
}

pub fn run(engine: &Engine, args: &CreateArgs<'_>, json: bool) -> Result<u8, String> {
    let mut container = Container::new(args.name, args.os, args.release);
    if let Some(pool) = args.storage {
        container = container.with_storage(pool);
    }
    if let Some(path) = args.bootstrap {
        let payload = std::fs::read(path)
            .map_err(|e| format!("failed to read bootstrap {}: {e}", path.display()))?;
        container = container.with_bootstrap(payload);
    }
    if let Some(user) = args.user {
        container = container.with_auth(password_auth(user, args.port)?);
    }

    let mut cluster = local_cluster();
    let pb = (!json).then(|| spinner(&format!("creating {}...", args.name)));
    let created = match engine.create_container(&mut cluster, container) {
        Ok(c) => c,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, &format!("create {} failed", args.name));
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(created)?);
    } else if let Some(pb) = &pb {
        let address = if created.network.is_empty() {
            "no address yet"
        } else {
            created.network.private_address.as_str()
        };
        spin_ok(pb, &format!("created {} ({address})", created.name));
    }
    Ok(EXIT_SUCCESS)
}
