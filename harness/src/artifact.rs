use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::error::{HarnessError, Result};

/// Durable home for each generation's best program. Artifacts are keyed by
/// generation and never overwritten.
pub trait ArtifactStore {
    fn publish(&mut self, generation: usize, source: &str) -> Result<()>;
}

/// Writes `g<generation>.gc` files into one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Creates `root` if it does not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path_for(&self, generation: usize) -> PathBuf {
        self.root.join(format!("g{generation}.gc"))
    }
}

impl ArtifactStore for DirectoryStore {
    fn publish(&mut self, generation: usize, source: &str) -> Result<()> {
        let path = self.path_for(generation);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(HarnessError::ArtifactExists(path))
            }
            Err(err) => return Err(err.into()),
        };
        file.write_all(source.as_bytes())?;
        file.sync_all()?;
        debug!(path = %path.display(), "published artifact");
        Ok(())
    }
}
