use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::v1::config::DEFAULT_STORE_PATH;
use crate::v1::datastore::{DatastoreError, Storage};

/// Persists the whole datastore as one bincode blob.
///
/// Saves go through a sibling `.tmp` file that is renamed over the state file,
/// so an interrupted save leaves the previous state readable.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_PATH)
    }
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileStorage { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<HashMap<String, Vec<u8>>, DatastoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state file yet");
            return Ok(HashMap::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let data: HashMap<String, Vec<u8>> = bincode::deserialize_from(reader)?;
        debug!(path = %self.path.display(), entries = data.len(), "loaded state");
        Ok(data)
    }

    fn save(&self, data: &HashMap<String, Vec<u8>>) -> Result<(), DatastoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staging = self.staging_path();
        let mut writer = BufWriter::new(File::create(&staging)?);
        bincode::serialize_into(&mut writer, data)?;
        writer.flush()?;
        fs::rename(&staging, &self.path)?;
        debug!(path = %self.path.display(), entries = data.len(), "saved state");
        Ok(())
    }
}
