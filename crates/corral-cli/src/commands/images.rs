use super::{json_pretty, load_container, local_cluster, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use corral_core::Engine;
use corral_exec::read_staged_files;
use corral_schema::{Image, ImageKind, StagedFile};
use std::path::Path;

pub fn publish(engine: &Engine, name: &str, snapshot: Option<&str>, json: bool) -> Result<u8, String> {
    let container = load_container(engine, name)?;
    let image = engine
        .publish(&container, snapshot)
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&image)?);
    } else {
        println!("published {} ({})", image.name, image.fingerprint);
    }
    Ok(EXIT_SUCCESS)
}

pub fn export(engine: &Engine, name: &str, out: &Path, json: bool) -> Result<u8, String> {
    let mut cluster = local_cluster();
    engine.scan(&mut cluster).map_err(|e| e.to_string())?;

    let pb = (!json).then(|| spinner(&format!("exporting {name}...")));
    let image = match engine.export_container(&mut cluster, name) {
        Ok(image) => image,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, &format!("export of {name} failed"));
            }
            return Err(e.to_string());
        }
    };

    std::fs::create_dir_all(out).map_err(|e| format!("failed to create {}: {e}", out.display()))?;
    for file in &image.files {
        let dest = out.join(&file.name);
        std::fs::write(&dest, &file.contents)
            .map_err(|e| format!("failed to write {}: {e}", dest.display()))?;
    }

    if json {
        println!("{}", json_pretty(&image)?);
    } else if let Some(pb) = &pb {
        spin_ok(
            pb,
            &format!(
                "exported {} to {} ({} file(s), {} bytes)",
                image.name,
                out.display(),
                image.files.len(),
                image.size()
            ),
        );
    }
    Ok(EXIT_SUCCESS)
}

fn read_image_dir(dir: &Path) -> Result<Vec<StagedFile>, String> {
    read_staged_files(dir).map_err(|e| format!("failed to read {}: {e}", dir.display()))
}

pub fn import(engine: &Engine, dir: &Path, alias: &str, name: &str, json: bool) -> Result<u8, String> {
    let mut image = Image::new(alias, ImageKind::Container, "");
    image.files = read_image_dir(dir)?;

    let mut cluster = local_cluster();
    let pb = (!json).then(|| spinner(&format!("importing {alias} as {name}...")));
    let container = match engine.import_container(&mut cluster, image, name) {
        Ok(c) => c,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, &format!("import of {alias} failed"));
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(container)?);
    } else if let Some(pb) = &pb {
        spin_ok(pb, &format!("imported {alias} as {}", container.name));
    }
    Ok(EXIT_SUCCESS)
}

pub fn list(engine: &Engine, json: bool) -> Result<u8, String> {
    let images = engine.list_images().map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&images)?);
    } else if images.is_empty() {
        println!("no images found");
    } else {
        println!("{:<36} {:<10} FINGERPRINT", "ALIAS", "KIND");
        for image in &images {
            let kind = match image.kind {
                ImageKind::Container => "container",
                ImageKind::Snapshot => "snapshot",
            };
            println!("{:<36} {:<10} {}", image.name, kind, &image.fingerprint);
        }
    }
    Ok(EXIT_SUCCESS)
}
