use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{
    identity::Identity,
    manager::{
        self, ChangedFields, ManagerError, ReadContext, Reconciled, ResourceManager,
    },
    retry::{cancellable, retry_transient, RetryPolicy},
};

/// Knobs shared by every operation of one orchestrator run.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Operation {
    #[strum(serialize = "creating")]
    Create,
    #[strum(serialize = "updating")]
    Update,
    #[strum(serialize = "reading")]
    Read,
    #[strum(serialize = "deleting")]
    Delete,
    #[strum(serialize = "importing")]
    Import,
    #[strum(serialize = "validating")]
    Validate,
}

/// One managed instance: last applied input, identity and the last remote snapshot.
#[derive(Clone, Serialize, Deserialize)]
pub struct Resource<Input, Output> {
    pub address: String,
    pub identity: Option<Identity>,
    pub input: Input,
    pub output: Option<Output>,
    #[serde(skip, default = "default_manager")]
    pub manager: Option<Arc<dyn ResourceManager<Input, Output>>>,
}

impl<Input: fmt::Debug, Output: fmt::Debug> fmt::Debug for Resource<Input, Output> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("address", &self.address)
            .field("identity", &self.identity)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}

pub fn default_manager<Input, Output>() -> Option<Arc<dyn ResourceManager<Input, Output>>> {
    None
}

impl<Input, Output> Resource<Input, Output>
where
    Input: Clone + Serialize + Send + Sync + 'static,
    Output: Clone + Send + Sync + 'static,
{
    pub fn new(
        manager: Arc<dyn ResourceManager<Input, Output>>,
        address: impl ToString,
        input: Input,
    ) -> Self {
        Self {
            address: address.to_string(),
            identity: None,
            input,
            output: None,
            manager: Some(manager),
        }
    }

    /// Adopts an out-of-band resource. Nothing is fetched; the caller must
    /// reconcile next to confirm the resource exists.
    pub fn import(
        manager: Arc<dyn ResourceManager<Input, Output>>,
        address: impl ToString,
        external_id: &str,
    ) -> Result<Self, ResourceError>
    where
        Input: Default,
    {
        let address = address.to_string();
        let identity = manager
            .import(external_id)
            .map_err(|source| ResourceError::Operation {
                operation: Operation::Import,
                resource: format!("{} ({})", address, external_id),
                source,
            })?;
        info!(%address, %identity, "imported resource");
        Ok(Self {
            address,
            identity: Some(identity),
            input: Input::default(),
            output: None,
            manager: Some(manager),
        })
    }

    pub fn with_manager(mut self, manager: Arc<dyn ResourceManager<Input, Output>>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn exists(&self) -> bool {
        self.identity.is_some()
    }

    fn manager(&self) -> Result<Arc<dyn ResourceManager<Input, Output>>, ResourceError> {
        self.manager.clone().ok_or(ResourceError::ManagerNotSet)
    }

    fn wrap(&self, operation: Operation) -> impl FnOnce(ManagerError) -> ResourceError + '_ {
        move |source| ResourceError::Operation {
            operation,
            resource: match &self.identity {
                Some(identity) => format!("{} ({})", self.address, identity),
                None => self.address.clone(),
            },
            source,
        }
    }

    /// Fields of `desired` that differ from the remote snapshot. A field left
    /// unset now and at the last apply, or a computed field left unset now,
    /// keeps whatever the provider has.
    pub fn changes(&self, desired: &Input) -> Result<ChangedFields, ResourceError> {
        let manager = self.manager()?;
        let (remote, derived) = match &self.output {
            Some(output) => (
                manager.input_from_output(output),
                manager.derived_changes(desired, output),
            ),
            None => (self.input.clone(), ChangedFields::new()),
        };
        let mut changes =
            changed_fields(desired, &remote, &self.input, manager.computed_fields())?;
        changes.extend(derived);
        Ok(changes)
    }

    /// Changed fields that cannot be updated in place.
    pub fn replacement_fields(&self, changes: &ChangedFields) -> Result<Vec<String>, ResourceError> {
        let manager = self.manager()?;
        Ok(manager
            .force_new_fields()
            .iter()
            .filter(|field| changes.contains(**field))
            .map(|field| field.to_string())
            .collect())
    }

    /// Makes the remote resource match `desired` and refreshes the snapshot
    /// from the provider afterwards.
    pub async fn converge(
        &mut self,
        desired: Input,
        ctx: &OperationContext,
    ) -> Result<Identity, ResourceError> {
        let manager = self.manager()?;
        manager
            .validate(&desired)
            .map_err(self.wrap(Operation::Validate))?;
        if self.identity.is_some() && self.output.is_none() {
            self.reconcile(ReadContext::SteadyState, ctx).await?;
        }
        let (identity, latest) = match (self.identity.clone(), self.output.clone()) {
            (Some(identity), Some(latest)) => (identity, latest),
            _ => return self.create(manager, desired, ctx).await,
        };

        let changes = self.changes(&desired)?;
        if changes.is_empty() {
            self.input = desired;
            return Ok(identity);
        }
        let replace = self.replacement_fields(&changes)?;
        if !replace.is_empty() {
            return Err(ResourceError::RequiresReplacement {
                address: self.address.clone(),
                fields: replace,
            });
        }
        info!(address = %self.address, %identity, ?changes, "updating resource");
        retry_transient(&ctx.retry, &ctx.cancel, || {
            manager.update(&identity, &latest, &desired, &changes)
        })
        .await
        .map_err(self.wrap(Operation::Update))?;
        self.input = desired;
        self.reconcile(ReadContext::Creating, ctx).await?;
        Ok(identity)
    }

    async fn create(
        &mut self,
        manager: Arc<dyn ResourceManager<Input, Output>>,
        desired: Input,
        ctx: &OperationContext,
    ) -> Result<Identity, ResourceError> {
        info!(address = %self.address, "creating resource");
        let identity = retry_transient(&ctx.retry, &ctx.cancel, || manager.create(&desired))
            .await
            .map_err(self.wrap(Operation::Create))?;
        // Recorded before the read so a failed read still leaves the resource findable.
        self.identity = Some(identity.clone());
        self.input = desired;
        self.output = None;
        self.reconcile(ReadContext::Creating, ctx).await?;
        Ok(identity)
    }

    /// Replaces the snapshot with the provider's current view. `Deleted`
    /// clears the identity.
    pub async fn reconcile(
        &mut self,
        context: ReadContext,
        ctx: &OperationContext,
    ) -> Result<Reconciled<Output>, ResourceError> {
        let manager = self.manager()?;
        let identity = self
            .identity
            .clone()
            .ok_or_else(|| ResourceError::IdentityNotSet(self.address.clone()))?;
        let reconciled = cancellable(&ctx.cancel, manager::reconcile(&*manager, &identity, context))
            .await
            .map_err(self.wrap(Operation::Read))?;
        match &reconciled {
            Reconciled::Present(output) => self.output = Some(output.clone()),
            Reconciled::Deleted => {
                self.identity = None;
                self.output = None;
            }
        }
        Ok(reconciled)
    }

    /// Sets the last applied input to what the provider reports, after an import.
    pub fn adopt_remote_input(&mut self) -> Result<(), ResourceError> {
        let manager = self.manager()?;
        match &self.output {
            Some(output) => {
                self.input = manager.input_from_output(output);
                Ok(())
            }
            None => Err(ResourceError::IdentityNotSet(self.address.clone())),
        }
    }

    /// Returns whether the provider still had something to delete.
    pub async fn destroy(&mut self, ctx: &OperationContext) -> Result<bool, ResourceError> {
        let manager = self.manager()?;
        let identity = match self.identity.clone() {
            Some(identity) => identity,
            None => return Ok(false),
        };
        let deleted = cancellable(&ctx.cancel, manager::ensure_absent(&*manager, &identity))
            .await
            .map_err(self.wrap(Operation::Delete))?;
        info!(address = %self.address, %identity, deleted, "resource is absent");
        self.identity = None;
        self.output = None;
        Ok(deleted)
    }
}

fn as_object<T: Serialize>(value: &T) -> Result<Map<String, Value>, ResourceError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(ResourceError::NotAnObject(other.to_string())),
    }
}

/// Top-level fields where `desired` differs from `remote`. A field null in
/// `desired` is skipped when it is also null in `applied` or listed in
/// `computed`.
pub fn changed_fields<T: Serialize>(
    desired: &T,
    remote: &T,
    applied: &T,
    computed: &[&str],
) -> Result<ChangedFields, ResourceError> {
    let desired = as_object(desired)?;
    let remote = as_object(remote)?;
    let applied = as_object(applied)?;
    Ok(desired
        .iter()
        .filter(|(key, value)| {
            let unset = value.is_null()
                && (computed.contains(&key.as_str())
                    || applied.get(*key).map_or(true, Value::is_null));
            !unset && remote.get(*key) != Some(*value)
        })
        .map(|(key, _)| key.clone())
        .collect())
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{operation} {resource}: {source}")]
    Operation {
        operation: Operation,
        resource: String,
        source: ManagerError,
    },
    #[error("{0}: identity is not set")]
    IdentityNotSet(String),
    #[error("{address}: changing {fields:?} requires replacement")]
    RequiresReplacement { address: String, fields: Vec<String> },
    #[error("ManagerNotSet")]
    ManagerNotSet,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("expected a JSON object, got {0}")]
    NotAnObject(String),
}

impl ResourceError {
    pub fn manager_error(&self) -> Option<&ManagerError> {
        match self {
            ResourceError::Operation { source, .. } => Some(source),
            _ => None,
        }
    }
}
