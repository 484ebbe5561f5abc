//! Session working root and artifact tracking.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
};

use tracing::{debug, info, warn};
use uuid::Uuid;

const SCRATCH_PREFIX: &str = "exec_";
const CONTROL_PREFIX: &str = ".ctl_";
const SCRATCH_ATTEMPTS: usize = 8;

/// Per-call directories: the scratch dir (harvesting surface) and a sibling
/// control dir for interpreter state that must not be harvested.
#[derive(Debug, Clone)]
pub struct ScratchDirs {
    pub id: String,
    pub scratch: PathBuf,
    pub control: PathBuf,
}

impl ScratchDirs {
    pub fn status_path(&self) -> PathBuf {
        self.control.join("status.json")
    }
}

#[derive(Debug)]
pub struct ExecutionSession {
    session_id: String,
    session_root: PathBuf,
    tracked: Mutex<Vec<PathBuf>>,
    closed: AtomicBool,
}

impl ExecutionSession {
    /// Create a fresh session directory under `output_root`.
    pub fn create(output_root: &Path) -> io::Result<Self> {
        let session_id = Uuid::new_v4().to_string();
        fs::create_dir_all(output_root)?;
        let session_root = output_root.join(&session_id);
        fs::create_dir(&session_root)?;
        let session_root = fs::canonicalize(&session_root)?;
        info!(session = %session_id, root = %session_root.display(), "execution session created");
        Ok(Self {
            session_id,
            session_root,
            tracked: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn root(&self) -> &Path {
        &self.session_root
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Allocate a never-before-used scratch dir (and its control dir).
    pub fn scratch_dir(&self) -> io::Result<ScratchDirs> {
        let mut last_err = None;
        for _ in 0..SCRATCH_ATTEMPTS {
            let id = Uuid::new_v4().simple().to_string()[..8].to_string();
            let scratch = self.session_root.join(format!("{SCRATCH_PREFIX}{id}"));
            match fs::create_dir(&scratch) {
                Ok(()) => {
                    let control = self.session_root.join(format!("{CONTROL_PREFIX}{id}"));
                    fs::create_dir(&control)?;
                    debug!(scratch = %scratch.display(), "scratch directory created");
                    return Ok(ScratchDirs { id, scratch, control });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| io::Error::other("could not allocate scratch directory")))
    }

    pub fn track<I>(&self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.lock().extend(paths);
    }

    pub fn tracked(&self) -> Vec<PathBuf> {
        self.lock().clone()
    }

    /// Best-effort teardown: tracked files first, then the whole session root.
    /// Never fails; safe to call repeatedly.
    pub fn cleanup(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let tracked = std::mem::take(&mut *self.lock());
        for path in tracked {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "error removing artifact"),
            }
        }

        match fs::remove_dir_all(&self.session_root) {
            Ok(()) => info!(session = %self.session_id, "execution session cleaned up"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                root = %self.session_root.display(),
                error = %e,
                "error removing session directory"
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        // A panic while appending paths leaves the list usable.
        self.tracked.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_get_distinct_roots() {
        let base = tempfile::tempdir().unwrap();
        let a = ExecutionSession::create(base.path()).unwrap();
        let b = ExecutionSession::create(base.path()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.root(), b.root());
        assert!(a.root().is_dir() && b.root().is_dir());
    }

    #[test]
    fn scratch_dirs_are_unique_and_nested() {
        let base = tempfile::tempdir().unwrap();
        let session = ExecutionSession::create(base.path()).unwrap();
        let first = session.scratch_dir().unwrap();
        let second = session.scratch_dir().unwrap();
        assert_ne!(first.scratch, second.scratch);
        assert!(first.scratch.starts_with(session.root()));
        assert!(first.control.is_dir());
        assert!(first
            .scratch
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(SCRATCH_PREFIX)));
    }

    #[test]
    fn cleanup_removes_everything_and_is_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let session = ExecutionSession::create(base.path()).unwrap();
        let dirs = session.scratch_dir().unwrap();
        let artifact = dirs.scratch.join("out.csv");
        fs::write(&artifact, "a\n1\n").unwrap();
        session.track([artifact.clone(), dirs.scratch.join("already-gone.txt")]);
        assert_eq!(session.tracked().len(), 2);

        session.cleanup();
        assert!(!artifact.exists());
        assert!(!session.root().exists());
        assert!(session.tracked().is_empty());
        assert!(session.is_closed());

        session.cleanup();
        assert!(!session.root().exists());
    }

    #[test]
    fn track_is_append_only() {
        let base = tempfile::tempdir().unwrap();
        let session = ExecutionSession::create(base.path()).unwrap();
        session.track([PathBuf::from("/a")]);
        session.track([PathBuf::from("/b"), PathBuf::from("/c")]);
        assert_eq!(
            session.tracked(),
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
    }
}
