use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::v1::datastore::{DatastoreError, Storage};

/// Keeps state in memory. Clones share the same entries, so a caller can
/// inspect what a `Datastore` saved.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn snapshot(&self) -> Result<HashMap<String, Vec<u8>>, DatastoreError> {
        self.data
            .lock()
            .map(|data| data.clone())
            .map_err(|_| DatastoreError::PoisonError)
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<HashMap<String, Vec<u8>>, DatastoreError> {
        self.snapshot()
    }
    fn save(&self, data: &HashMap<String, Vec<u8>>) -> Result<(), DatastoreError> {
        let mut stored = self.data.lock().map_err(|_| DatastoreError::PoisonError)?;
        *stored = data.clone();
        Ok(())
    }
}
