use std::{collections::BTreeSet, fmt, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use super::identity::{Identity, ImportFormat};

/// Top-level field names of an input that differ from the last applied one.
pub type ChangedFields = BTreeSet<String>;

/// Error returned by a provider API call, reduced to what the adapter inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
    pub fn message_contains(&self, code: &str, needle: &str) -> bool {
        self.has_code(code) && self.message.contains(needle)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("transient error: {0}")]
    Transient(ApiError),
    #[error("operation failed after {attempts} attempts within {timeout:?}: {last}")]
    OperationFailed {
        attempts: u32,
        timeout: Duration,
        last: ApiError,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("empty result: {0}")]
    EmptyResult(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unexpected format ({id:?}), expected {expected}")]
    ImportFormat { id: String, expected: String },
    #[error("{0}")]
    Remote(ApiError),
    #[error("operation cancelled")]
    Cancelled,
}

impl ManagerError {
    /// `EmptyResult` counts as absence, same as `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ManagerError::NotFound(_) | ManagerError::EmptyResult(_))
    }
}

/// Whether the resource was supposedly just written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadContext {
    Creating,
    SteadyState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled<Output> {
    Present(Output),
    Deleted,
}

impl<Output> Reconciled<Output> {
    pub fn present(self) -> Option<Output> {
        match self {
            Reconciled::Present(output) => Some(output),
            Reconciled::Deleted => None,
        }
    }
}

/// One implementation per resource family: thin wrappers over provider calls.
/// The reconciliation contract shared by every family lives in [`reconcile`]
/// and [`ensure_absent`].
#[async_trait]
pub trait ResourceManager<Input, Output>: Send + Sync {
    fn import_format(&self) -> ImportFormat;

    /// Input fields whose change requires destroy-and-recreate.
    fn force_new_fields(&self) -> &'static [&'static str];

    fn validate(&self, input: &Input) -> Result<(), ManagerError>;

    /// Optional input fields the provider fills in when left unset. Omitting
    /// one of them from the desired input is never a change.
    fn computed_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Changes not visible in the input fields themselves, e.g. provider-level
    /// defaults that no longer match the remote snapshot.
    fn derived_changes(&self, _desired: &Input, _latest: &Output) -> ChangedFields {
        ChangedFields::new()
    }

    /// Desired attributes describing an existing remote object, used after import.
    fn input_from_output(&self, output: &Output) -> Input;

    /// Writes a new resource and returns the identity the provider knows it by.
    async fn create(&self, input: &Input) -> Result<Identity, ManagerError>;

    /// Pushes the changed fields of `input` onto an existing resource.
    async fn update(
        &self,
        identity: &Identity,
        latest: &Output,
        input: &Input,
        changes: &ChangedFields,
    ) -> Result<(), ManagerError>;

    /// Fetches the remote snapshot. Absence is `NotFound` or `EmptyResult`.
    async fn lookup(&self, identity: &Identity) -> Result<Output, ManagerError>;

    async fn delete(&self, identity: &Identity) -> Result<(), ManagerError>;

    fn import(&self, external_id: &str) -> Result<Identity, ManagerError> {
        self.import_format().parse(external_id)
    }
}

/// Reads the remote snapshot. Absence is `Deleted` in steady state and an
/// error when the resource was supposedly just written.
pub async fn reconcile<Input, Output>(
    manager: &dyn ResourceManager<Input, Output>,
    identity: &Identity,
    context: ReadContext,
) -> Result<Reconciled<Output>, ManagerError> {
    debug!(%identity, ?context, "reading remote state");
    match manager.lookup(identity).await {
        Ok(output) => Ok(Reconciled::Present(output)),
        Err(err) if err.is_not_found() && context == ReadContext::SteadyState => {
            warn!(%identity, "resource not found, removing from state");
            Ok(Reconciled::Deleted)
        }
        Err(err) => Err(err),
    }
}

/// Deletes the resource, treating "already gone" as success. Returns whether
/// something was actually deleted.
pub async fn ensure_absent<Input, Output>(
    manager: &dyn ResourceManager<Input, Output>,
    identity: &Identity,
) -> Result<bool, ManagerError> {
    match manager.delete(identity).await {
        Ok(()) => Ok(true),
        Err(err) if err.is_not_found() => {
            debug!(%identity, "resource already absent");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
