use corral_schema::StagedFile;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Import,
    Export,
}

impl JobKind {
    fn dir_name(self) -> &'static str {
        match self {
            JobKind::Import => "imports",
            JobKind::Export => "exports",
        }
    }
}

/// Paths under the local staging root.
///
/// ```text
/// <root>/
///   inits/            generated launch scripts
///   sessions/         SSH control sockets
///   imports/<uuid>/   files handed to an image import
///   exports/<uuid>/   files produced by an image export
/// ```
#[derive(Debug, Clone)]
pub struct StagingLayout {
    root: PathBuf,
}

impl StagingLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inits_dir(&self) -> PathBuf {
        self.root.join("inits")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn jobs_dir(&self, kind: JobKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn initialize(&self) -> io::Result<()> {
        fs::create_dir_all(self.inits_dir())?;
        fs::create_dir_all(self.sessions_dir())?;
        fs::create_dir_all(self.jobs_dir(JobKind::Import))?;
        fs::create_dir_all(self.jobs_dir(JobKind::Export))?;
        Ok(())
    }

    /// Create a fresh, uniquely named job directory.
    pub fn create_job(&self, kind: JobKind) -> io::Result<JobDir> {
        let id = Uuid::new_v4().to_string();
        let path = self.jobs_dir(kind).join(&id);
        fs::create_dir_all(&path)?;
        debug!("created job directory {}", path.display());
        Ok(JobDir {
            kind,
            id,
            path,
            removed: false,
        })
    }
}

/// A per-job scratch directory, removed when the job finishes or is dropped.
#[derive(Debug)]
pub struct JobDir {
    kind: JobKind,
    id: String,
    path: PathBuf,
    removed: bool,
}

impl JobDir {
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_files(&self, files: &[StagedFile]) -> io::Result<Vec<PathBuf>> {
        files
            .iter()
            .map(|file| {
                let name = Path::new(&file.name).file_name().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("invalid staged file name '{}'", file.name),
                    )
                })?;
                let dest = self.path.join(name);
                fs::write(&dest, &file.contents)?;
                Ok(dest)
            })
            .collect()
    }

    /// Read every regular file in the job directory, sorted by name.
    pub fn read_files(&self) -> io::Result<Vec<StagedFile>> {
        read_staged_files(&self.path)
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.removed = true;
        fs::remove_dir_all(&self.path)
    }
}

impl Drop for JobDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("failed to clean job directory {}: {e}", self.path.display());
            }
        }
    }
}

/// Read every regular file directly inside `dir` as a staged file, sorted by
/// name. Subdirectories are skipped.
pub fn read_staged_files(dir: &Path) -> io::Result<Vec<StagedFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let contents = fs::read(entry.path())?;
        files.push(StagedFile::new(
            &entry.file_name().to_string_lossy(),
            contents,
        ));
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = StagingLayout::new("/srv/corral");
        assert_eq!(layout.inits_dir(), PathBuf::from("/srv/corral/inits"));
        assert_eq!(
            layout.jobs_dir(JobKind::Export),
            PathBuf::from("/srv/corral/exports")
        );
        assert_eq!(
            layout.jobs_dir(JobKind::Import),
            PathBuf::from("/srv/corral/imports")
        );
    }

    #[test]
    fn jobs_are_unique_and_removed_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StagingLayout::new(dir.path());
        let a = layout.create_job(JobKind::Export).unwrap();
        let b = layout.create_job(JobKind::Export).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(dir.path().join("exports")));

        let path = a.path().to_path_buf();
        a.finish().unwrap();
        assert!(!path.exists());

        let path = b.path().to_path_buf();
        drop(b);
        assert!(!path.exists());
    }

    #[test]
    fn files_round_trip_through_job() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StagingLayout::new(dir.path());
        let job = layout.create_job(JobKind::Import).unwrap();
        let written = job
            .write_files(&[
                StagedFile::new("rootfs.tar.gz", b"bbb".to_vec()),
                StagedFile::new("meta.tar.gz", b"aa".to_vec()),
            ])
            .unwrap();
        assert_eq!(written.len(), 2);
        fs::create_dir(job.path().join("nested")).unwrap();

        let files = job.read_files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "meta.tar.gz");
        assert_eq!(files[1].contents, b"bbb");
    }

    #[test]
    fn read_staged_files_outside_a_job() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.tar.gz"), b"b").unwrap();
        fs::write(dir.path().join("a.tar.gz"), b"a").unwrap();
        let files = read_staged_files(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.tar.gz", "b.tar.gz"]);
        assert!(read_staged_files(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn staged_names_cannot_escape_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let job = StagingLayout::new(dir.path())
            .create_job(JobKind::Import)
            .unwrap();
        let written = job
            .write_files(&[StagedFile::new("../../evil.tar", b"x".to_vec())])
            .unwrap();
        assert_eq!(written[0], job.path().join("evil.tar"));
        assert!(job.write_files(&[StagedFile::new("..", b"x".to_vec())]).is_err());
    }
}
