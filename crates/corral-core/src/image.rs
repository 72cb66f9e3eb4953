use crate::engine::Engine;
use crate::CoreError;
use chrono::Utc;
use corral_exec::{is_retry_sentinel, JobKind};
use corral_schema::{parse_fingerprint, parse_image_list, Container, Image, ImageKind};
use tracing::info;
use uuid::Uuid;

impl Engine {
    /// Publish `container`, or one of its snapshots, as an image under a
    /// generated alias.
    pub fn publish(&self, container: &Container, snapshot: Option<&str>) -> Result<Image, CoreError> {
        let (source, base, kind) = match snapshot {
            Some(snap) => (
                format!("{}/{snap}", container.name),
                snap.to_owned(),
                ImageKind::Snapshot,
            ),
            None => (container.name.clone(), container.name.clone(), ImageKind::Container),
        };
        let suffix = Uuid::new_v4().simple().to_string();
        let alias = format!("{base}-image-{}", &suffix[..8]);

        info!("publishing {source} as {alias}");
        let output = self.run_one(
            &container.name,
            &self.lxc(&format!("publish {source} --alias {alias}")),
        )?;
        let fingerprint = parse_fingerprint(&String::from_utf8_lossy(&output))?;

        let mut image = Image::new(&alias, kind, &fingerprint);
        image.created_at = Some(Utc::now());
        Ok(image)
    }

    /// Snapshot `container`, publish the snapshot and pull the image files
    /// into memory.
    ///
    /// The intermediate image is removed from the control plane once its files
    /// are staged, so the returned image can be imported again under its alias.
    pub fn export(&self, container: &mut Container) -> Result<Image, CoreError> {
        let snapshot = self.snapshot(container)?;
        let mut image = self.publish(container, Some(&snapshot.name))?;

        let job = self.staging().create_job(JobKind::Export)?;
        info!("exporting {} into job {}", image.name, job.id());
        self.run_argv(&[
            "image".to_owned(),
            "export".to_owned(),
            image.name.clone(),
            job.path().to_string_lossy().into_owned(),
        ])?;
        image.files = job.read_files()?;
        self.run_one(&container.name, &self.lxc(&format!("image delete {}", image.name)))?;
        job.finish()?;

        if image.files.is_empty() {
            return Err(CoreError::EmptyImage(image.name));
        }
        info!(
            "exported {} ({} file(s), {} bytes)",
            image.name,
            image.files.len(),
            image.size()
        );
        Ok(image)
    }

    /// Import `image` and launch a container `name` from it.
    ///
    /// The image is consumed: its alias is deleted from the control plane
    /// after the launch.
    pub fn import(&self, image: Image, name: &str) -> Result<Container, CoreError> {
        if image.files.is_empty() {
            return Err(CoreError::EmptyImage(image.name));
        }
        let job = self.staging().create_job(JobKind::Import)?;
        let paths = job.write_files(&image.files)?;
        info!(
            "importing {} ({} file(s)) as {name}",
            image.name,
            paths.len()
        );

        let mut args = vec!["image".to_owned(), "import".to_owned()];
        args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        args.extend(["--alias".to_owned(), image.name.clone()]);
        self.run_argv(&args)?;

        self.run_batch(
            name,
            &[
                self.lxc(&format!("launch {} {name}", image.name)),
                self.lxc(&format!("image delete {}", image.name)),
            ],
        )?;
        job.finish()?;
        Ok(Container::new(name, "", ""))
    }

    /// Images currently in the control plane's store.
    pub fn list_images(&self) -> Result<Vec<Image>, CoreError> {
        let output = self.query_once("images", &self.lxc("image list --format json"))?;
        Ok(match output {
            Some(json) => parse_image_list(&json)?,
            None => Vec::new(),
        })
    }

    /// Run a JSON listing once; `None` when it came back as `[RETRY]`.
    pub(crate) fn query_once(&self, target: &str, instruction: &str) -> Result<Option<String>, CoreError> {
        let output = self.run_one(target, instruction)?;
        if is_retry_sentinel(&output) {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output).into_owned()))
    }
}
