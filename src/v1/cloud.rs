use std::{collections::HashSet, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{
    aws::{
        autoscaling::lifecycle_hook::{LifecycleHookInput, LifecycleHookOutput},
        location::map::{MapInput, MapOutput},
        AwsProvider, AwsType,
    },
    config::{self, ConfigError, Declared},
    datastore::{Datastore, DatastoreError},
    manager::{ReadContext, Reconciled, ResourceManager},
    resource::{OperationContext, Resource, ResourceError},
};

pub type LifecycleHookManagerRef = Arc<dyn ResourceManager<LifecycleHookInput, LifecycleHookOutput>>;
pub type MapManagerRef = Arc<dyn ResourceManager<MapInput, MapOutput>>;

/// Drives declared resources against the provider and keeps the datastore in
/// step with what exists remotely.
pub struct Cloud {
    hooks: LifecycleHookManagerRef,
    maps: MapManagerRef,
    datastore: Datastore,
    declarations: Vec<Declared>,
    ctx: OperationContext,
}

impl Cloud {
    pub fn new(
        hooks: LifecycleHookManagerRef,
        maps: MapManagerRef,
        datastore: Datastore,
        ctx: OperationContext,
    ) -> Self {
        Self {
            hooks,
            maps,
            datastore,
            declarations: Vec::new(),
            ctx,
        }
    }
    pub fn from_provider(provider: &AwsProvider, datastore: Datastore, ctx: OperationContext) -> Self {
        Self::new(provider.lifecycle_hooks(), provider.maps(), datastore, ctx)
    }
    pub fn with_declarations(mut self, declarations: Vec<Declared>) -> Self {
        self.declarations = declarations;
        self
    }
    pub fn datastore(&self) -> &Datastore {
        &self.datastore
    }

    /// Destroys stored resources that are no longer declared, then converges
    /// every declaration, replacing resources whose immutable fields changed.
    pub async fn apply(&mut self) -> Result<(), CloudError> {
        self.datastore.reload()?;
        let declared: HashSet<String> = self
            .declarations
            .iter()
            .map(|declaration| declaration.address().to_string())
            .collect();
        for address in self.datastore.keys() {
            if !declared.contains(&address) {
                info!(%address, "resource is no longer declared");
                self.destroy_address(&address).await?;
            }
        }
        for declaration in self.declarations.clone() {
            match declaration {
                Declared::LifecycleHook { address, input } => {
                    let manager = self.hooks.clone();
                    self.converge(manager, AwsType::LifecycleHook, &address, input)
                        .await?
                }
                Declared::Map { address, input } => {
                    let manager = self.maps.clone();
                    self.converge(manager, AwsType::Map, &address, input).await?
                }
            }
        }
        Ok(())
    }

    /// Re-reads every stored resource, dropping the ones deleted out of band.
    pub async fn refresh(&mut self) -> Result<(), CloudError> {
        self.datastore.reload()?;
        for address in self.datastore.keys() {
            match self.datastore.resource_type(&address)? {
                Some(AwsType::LifecycleHook) => {
                    let manager = self.hooks.clone();
                    self.refresh_one(manager, AwsType::LifecycleHook, &address)
                        .await?
                }
                Some(AwsType::Map) => {
                    let manager = self.maps.clone();
                    self.refresh_one(manager, AwsType::Map, &address).await?
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Deletes every stored resource.
    pub async fn destroy(&mut self) -> Result<(), CloudError> {
        self.datastore.reload()?;
        for address in self.datastore.keys().into_iter().rev() {
            self.destroy_address(&address).await?;
        }
        Ok(())
    }

    /// Adopts an existing remote object under `address`. Fails if it does not exist.
    pub async fn import(&mut self, address: &str, external_id: &str) -> Result<(), CloudError> {
        let (resource_type, _) = config::parse_address(address)?;
        self.datastore.reload()?;
        if self.datastore.contains(address) {
            return Err(CloudError::AlreadyManaged(address.to_string()));
        }
        match resource_type {
            AwsType::LifecycleHook => {
                let manager = self.hooks.clone();
                self.import_one(manager, resource_type, address, external_id)
                    .await
            }
            AwsType::Map => {
                let manager = self.maps.clone();
                self.import_one(manager, resource_type, address, external_id)
                    .await
            }
        }
    }

    async fn converge<Input, Output>(
        &mut self,
        manager: Arc<dyn ResourceManager<Input, Output>>,
        resource_type: AwsType,
        address: &str,
        input: Input,
    ) -> Result<(), CloudError>
    where
        Input: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        Output: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let mut resource = match self.datastore.get::<Input, Output>(resource_type, address)? {
            Some(stored) => stored.with_manager(manager),
            None => Resource::new(manager, address, input.clone()),
        };
        let mut result = self.converge_resource(&mut resource, input.clone()).await;
        let replace = match &result {
            Err(ResourceError::RequiresReplacement { fields, .. }) => Some(fields.clone()),
            _ => None,
        };
        if let Some(fields) = replace {
            info!(%address, ?fields, "replacing resource");
            result = match resource.destroy(&self.ctx).await {
                Ok(_) => resource.converge(input, &self.ctx).await.map(|_| ()),
                Err(err) => Err(err),
            };
        }
        // Recorded even on failure once an identity exists.
        self.record(resource_type, &resource)?;
        Ok(result?)
    }

    async fn converge_resource<Input, Output>(
        &self,
        resource: &mut Resource<Input, Output>,
        input: Input,
    ) -> Result<(), ResourceError>
    where
        Input: Clone + Serialize + Send + Sync + 'static,
        Output: Clone + Send + Sync + 'static,
    {
        if resource.exists() {
            resource.reconcile(ReadContext::SteadyState, &self.ctx).await?;
        }
        resource.converge(input, &self.ctx).await.map(|_| ())
    }

    async fn refresh_one<Input, Output>(
        &mut self,
        manager: Arc<dyn ResourceManager<Input, Output>>,
        resource_type: AwsType,
        address: &str,
    ) -> Result<(), CloudError>
    where
        Input: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        Output: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let mut resource = match self.datastore.get::<Input, Output>(resource_type, address)? {
            Some(stored) => stored.with_manager(manager),
            None => return Ok(()),
        };
        if !resource.exists() {
            self.record(resource_type, &resource)?;
            return Ok(());
        }
        if let Reconciled::Deleted = resource
            .reconcile(ReadContext::SteadyState, &self.ctx)
            .await?
        {
            warn!(%address, "resource was deleted outside of rscloud");
        }
        self.record(resource_type, &resource)
    }

    async fn destroy_address(&mut self, address: &str) -> Result<(), CloudError> {
        match self.datastore.resource_type(address)? {
            Some(AwsType::LifecycleHook) => {
                let manager = self.hooks.clone();
                self.destroy_one(manager, AwsType::LifecycleHook, address)
                    .await
            }
            Some(AwsType::Map) => {
                let manager = self.maps.clone();
                self.destroy_one(manager, AwsType::Map, address).await
            }
            None => Ok(()),
        }
    }

    async fn destroy_one<Input, Output>(
        &mut self,
        manager: Arc<dyn ResourceManager<Input, Output>>,
        resource_type: AwsType,
        address: &str,
    ) -> Result<(), CloudError>
    where
        Input: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
        Output: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let mut resource = match self.datastore.get::<Input, Output>(resource_type, address)? {
            Some(stored) => stored.with_manager(manager),
            None => return Ok(()),
        };
        let result = resource.destroy(&self.ctx).await;
        self.record(resource_type, &resource)?;
        result?;
        Ok(())
    }

    async fn import_one<Input, Output>(
        &mut self,
        manager: Arc<dyn ResourceManager<Input, Output>>,
        resource_type: AwsType,
        address: &str,
        external_id: &str,
    ) -> Result<(), CloudError>
    where
        Input: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
        Output: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let mut resource = Resource::import(manager, address, external_id)?;
        if let Reconciled::Deleted = resource
            .reconcile(ReadContext::SteadyState, &self.ctx)
            .await?
        {
            return Err(CloudError::ImportNotFound {
                address: address.to_string(),
                id: external_id.to_string(),
            });
        }
        resource.adopt_remote_input()?;
        self.record(resource_type, &resource)
    }

    /// Stores the resource if it still exists, forgets it otherwise, and saves.
    fn record<Input, Output>(
        &mut self,
        resource_type: AwsType,
        resource: &Resource<Input, Output>,
    ) -> Result<(), CloudError>
    where
        Input: Serialize,
        Output: Serialize,
    {
        if resource.identity.is_some() {
            self.datastore.insert(resource_type, resource)?;
        } else {
            self.datastore.remove(&resource.address);
        }
        self.datastore.save()?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CloudError {
    #[error(transparent)]
    ResourceError(#[from] ResourceError),
    #[error("datastore error: {0}")]
    DatastoreError(#[from] DatastoreError),
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
    #[error("{0} is already managed")]
    AlreadyManaged(String),
    #[error("cannot import {address}: {id} does not exist")]
    ImportNotFound { address: String, id: String },
}
