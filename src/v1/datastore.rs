use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::aws::AwsType;
use super::resource::Resource;
use super::storage::file::FileStorage;

/// Resource state keyed by address, loaded from and saved to a [`Storage`].
#[derive(Clone)]
pub struct Datastore {
    inner: HashMap<String, Vec<u8>>,
    storage: Arc<dyn Storage + Send + Sync>,
}
impl Default for Datastore {
    fn default() -> Self {
        Datastore::new(FileStorage::default())
    }
}
pub trait Storage {
    fn load(&self) -> Result<HashMap<String, Vec<u8>>, DatastoreError>;
    fn save(&self, data: &HashMap<String, Vec<u8>>) -> Result<(), DatastoreError>;
}

#[derive(Serialize, Deserialize)]
struct StoredResource {
    resource_type: AwsType,
    resource: Value,
}

impl Datastore {
    pub fn new(storage: impl Storage + 'static + Send + Sync) -> Self {
        Self {
            inner: Default::default(),
            storage: Arc::new(storage),
        }
    }
    pub fn reload(&mut self) -> Result<(), DatastoreError> {
        let data = self
            .storage
            .load()
            .map_err(|e| DatastoreError::LoadError(e.to_string()))?;
        info!(resources = data.len(), "loaded state");
        for address in data.keys() {
            debug!(%address, "resource loaded from state");
        }
        self.inner = data;
        Ok(())
    }
    pub fn save(&self) -> Result<(), DatastoreError> {
        self.storage.save(&self.inner)
    }
    pub fn insert<Input, Output>(
        &mut self,
        resource_type: AwsType,
        resource: &Resource<Input, Output>,
    ) -> Result<(), DatastoreError>
    where
        Input: Serialize,
        Output: Serialize,
    {
        let stored = StoredResource {
            resource_type,
            resource: serde_json::to_value(resource)?,
        };
        let bytes = serde_json::to_vec(&stored)?;
        debug!(address = %resource.address, "storing resource");
        self.inner.insert(resource.address.clone(), bytes);
        Ok(())
    }

    /// The stored resource at `address`, or `None`. The manager handle is not
    /// persisted; the caller attaches one before operating on it.
    pub fn get<Input, Output>(
        &self,
        resource_type: AwsType,
        address: &str,
    ) -> Result<Option<Resource<Input, Output>>, DatastoreError>
    where
        Input: DeserializeOwned,
        Output: DeserializeOwned,
    {
        match self.stored(address)? {
            None => Ok(None),
            Some(stored) if stored.resource_type != resource_type => {
                Err(DatastoreError::TypeMismatch {
                    address: address.to_string(),
                    expected: resource_type,
                    found: stored.resource_type,
                })
            }
            Some(stored) => Ok(Some(serde_json::from_value(stored.resource)?)),
        }
    }
    pub fn resource_type(&self, address: &str) -> Result<Option<AwsType>, DatastoreError> {
        Ok(self.stored(address)?.map(|stored| stored.resource_type))
    }
    fn stored(&self, address: &str) -> Result<Option<StoredResource>, DatastoreError> {
        self.inner
            .get(address)
            .map(|bytes| serde_json::from_slice(bytes))
            .transpose()
            .map_err(DatastoreError::JsonError)
    }
    pub fn remove(&mut self, address: &str) -> bool {
        debug!(%address, "removing resource from state");
        self.inner.remove(address).is_some()
    }
    pub fn contains(&self, address: &str) -> bool {
        self.inner.contains_key(address)
    }
    /// Stored addresses, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("PoisonError")]
    PoisonError,
    #[error("Load Error error: {0}")]
    LoadError(String),
    #[error("IO Error error: {0}")]
    IOError(#[from] io::Error),
    #[error("Serialization or deserialization error: {0}")]
    BincodeError(#[from] bincode::Error),
    #[error("Serialization or deserialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("{address} is stored as {found}, not {expected}")]
    TypeMismatch {
        address: String,
        expected: AwsType,
        found: AwsType,
    },
}
