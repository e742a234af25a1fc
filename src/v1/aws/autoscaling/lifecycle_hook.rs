use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_autoscaling::{types::LifecycleHook, Client};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ERR_CODE_VALIDATION_ERROR;
use crate::v1::{
    aws::api_error,
    identity::{Identity, ImportFormat},
    manager::{ApiError, ChangedFields, ManagerError, ResourceManager},
    resource::Resource,
    retry::{classify, TransientError},
};

pub type LifecycleHookResource = Resource<LifecycleHookInput, LifecycleHookOutput>;

pub const LIFECYCLE_HOOK_IMPORT_FORMAT: ImportFormat = ImportFormat::Hierarchical {
    pattern: "<asg-name>/<lifecycle-hook-name>",
};

/// The notification target may not accept publishes right after it was created.
const TRANSIENT_PUT_ERRORS: &[TransientError] = &[TransientError {
    code: ERR_CODE_VALIDATION_ERROR,
    message: "Unable to publish test message to notification target",
}];

const NOT_FOUND_MESSAGE: &str = "not found";

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LifecycleHookInput {
    pub name: String,
    pub autoscaling_group_name: String,
    pub lifecycle_transition: String,
    pub default_result: Option<String>,
    pub heartbeat_timeout: Option<i32>,
    pub notification_metadata: Option<String>,
    pub notification_target_arn: Option<String>,
    pub role_arn: Option<String>,
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LifecycleHookOutput {
    pub name: String,
    pub autoscaling_group_name: String,
    pub lifecycle_transition: Option<String>,
    pub default_result: Option<String>,
    pub heartbeat_timeout: Option<i32>,
    pub global_timeout: Option<i32>,
    pub notification_metadata: Option<String>,
    pub notification_target_arn: Option<String>,
    pub role_arn: Option<String>,
}

/// Body of a `PutLifecycleHook` call. `None` fields are left out of the request.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct PutLifecycleHookRequest {
    pub lifecycle_hook_name: String,
    pub autoscaling_group_name: String,
    pub lifecycle_transition: Option<String>,
    pub default_result: Option<String>,
    pub heartbeat_timeout: Option<i32>,
    pub notification_metadata: Option<String>,
    pub notification_target_arn: Option<String>,
    pub role_arn: Option<String>,
}

impl From<&LifecycleHookInput> for PutLifecycleHookRequest {
    fn from(input: &LifecycleHookInput) -> Self {
        Self {
            lifecycle_hook_name: input.name.clone(),
            autoscaling_group_name: input.autoscaling_group_name.clone(),
            lifecycle_transition: Some(input.lifecycle_transition.clone()),
            default_result: input.default_result.clone(),
            heartbeat_timeout: input.heartbeat_timeout,
            notification_metadata: input.notification_metadata.clone(),
            notification_target_arn: input.notification_target_arn.clone(),
            role_arn: input.role_arn.clone(),
        }
    }
}

impl From<LifecycleHook> for LifecycleHookOutput {
    fn from(value: LifecycleHook) -> Self {
        Self {
            name: value.lifecycle_hook_name.unwrap_or_default(),
            autoscaling_group_name: value.auto_scaling_group_name.unwrap_or_default(),
            lifecycle_transition: value.lifecycle_transition,
            default_result: value.default_result,
            heartbeat_timeout: value.heartbeat_timeout,
            global_timeout: value.global_timeout,
            notification_metadata: value.notification_metadata,
            notification_target_arn: value.notification_target_arn,
            role_arn: value.role_arn,
        }
    }
}

/// Auto Scaling calls used by the lifecycle hook manager.
#[async_trait]
pub trait LifecycleHookApi: Send + Sync {
    async fn put_lifecycle_hook(&self, request: PutLifecycleHookRequest) -> Result<(), ApiError>;
    /// `Ok(None)` when the response carried no hook list at all.
    async fn describe_lifecycle_hooks(
        &self,
        autoscaling_group_name: &str,
        hook_names: Vec<String>,
    ) -> Result<Option<Vec<LifecycleHookOutput>>, ApiError>;
    async fn delete_lifecycle_hook(
        &self,
        autoscaling_group_name: &str,
        hook_name: &str,
    ) -> Result<(), ApiError>;
}

#[async_trait]
impl LifecycleHookApi for Client {
    async fn put_lifecycle_hook(&self, request: PutLifecycleHookRequest) -> Result<(), ApiError> {
        Client::put_lifecycle_hook(self)
            .lifecycle_hook_name(request.lifecycle_hook_name)
            .auto_scaling_group_name(request.autoscaling_group_name)
            .set_lifecycle_transition(request.lifecycle_transition)
            .set_default_result(request.default_result)
            .set_heartbeat_timeout(request.heartbeat_timeout)
            .set_notification_metadata(request.notification_metadata)
            .set_notification_target_arn(request.notification_target_arn)
            .set_role_arn(request.role_arn)
            .send()
            .await
            .map(|_| ())
            .map_err(api_error)
    }
    async fn describe_lifecycle_hooks(
        &self,
        autoscaling_group_name: &str,
        hook_names: Vec<String>,
    ) -> Result<Option<Vec<LifecycleHookOutput>>, ApiError> {
        Client::describe_lifecycle_hooks(self)
            .auto_scaling_group_name(autoscaling_group_name)
            .set_lifecycle_hook_names(Some(hook_names))
            .send()
            .await
            .map(|output| {
                output
                    .lifecycle_hooks
                    .map(|hooks| hooks.into_iter().map(LifecycleHookOutput::from).collect())
            })
            .map_err(api_error)
    }
    async fn delete_lifecycle_hook(
        &self,
        autoscaling_group_name: &str,
        hook_name: &str,
    ) -> Result<(), ApiError> {
        Client::delete_lifecycle_hook(self)
            .auto_scaling_group_name(autoscaling_group_name)
            .lifecycle_hook_name(hook_name)
            .send()
            .await
            .map(|_| ())
            .map_err(api_error)
    }
}

/// Create and update are the same `PutLifecycleHook` call.
pub struct LifecycleHookManager {
    api: Arc<dyn LifecycleHookApi>,
}

impl LifecycleHookManager {
    pub fn new(api: Arc<dyn LifecycleHookApi>) -> Self {
        Self { api }
    }

    async fn put(&self, input: &LifecycleHookInput) -> Result<Identity, ManagerError> {
        let request = PutLifecycleHookRequest::from(input);
        info!(
            hook = %request.lifecycle_hook_name,
            asg = %request.autoscaling_group_name,
            "putting auto scaling lifecycle hook"
        );
        self.api
            .put_lifecycle_hook(request)
            .await
            .map_err(|err| classify(TRANSIENT_PUT_ERRORS, err))?;
        Ok(Identity::hierarchical(
            &input.autoscaling_group_name,
            &input.name,
        ))
    }
}

fn is_not_found(err: &ApiError) -> bool {
    err.message_contains(ERR_CODE_VALIDATION_ERROR, NOT_FOUND_MESSAGE)
}

fn hook_keys(identity: &Identity) -> Result<(&str, &str), ManagerError> {
    match identity.parent() {
        Some(asg) => Ok((asg, identity.name())),
        None => Err(ManagerError::Validation(format!(
            "lifecycle hook identity {} has no auto scaling group",
            identity
        ))),
    }
}

#[async_trait]
impl ResourceManager<LifecycleHookInput, LifecycleHookOutput> for LifecycleHookManager {
    fn import_format(&self) -> ImportFormat {
        LIFECYCLE_HOOK_IMPORT_FORMAT
    }
    fn force_new_fields(&self) -> &'static [&'static str] {
        &["name", "autoscaling_group_name"]
    }
    fn computed_fields(&self) -> &'static [&'static str] {
        &["default_result", "heartbeat_timeout"]
    }
    fn validate(&self, input: &LifecycleHookInput) -> Result<(), ManagerError> {
        for (field, value) in [
            ("name", &input.name),
            ("autoscaling_group_name", &input.autoscaling_group_name),
            ("lifecycle_transition", &input.lifecycle_transition),
        ] {
            if value.is_empty() {
                return Err(ManagerError::Validation(format!("{} is required", field)));
            }
        }
        Ok(())
    }
    fn input_from_output(&self, output: &LifecycleHookOutput) -> LifecycleHookInput {
        LifecycleHookInput {
            name: output.name.clone(),
            autoscaling_group_name: output.autoscaling_group_name.clone(),
            lifecycle_transition: output.lifecycle_transition.clone().unwrap_or_default(),
            default_result: output.default_result.clone(),
            heartbeat_timeout: output.heartbeat_timeout,
            notification_metadata: output.notification_metadata.clone(),
            notification_target_arn: output.notification_target_arn.clone(),
            role_arn: output.role_arn.clone(),
        }
    }
    async fn create(&self, input: &LifecycleHookInput) -> Result<Identity, ManagerError> {
        self.put(input).await
    }
    async fn update(
        &self,
        _identity: &Identity,
        _latest: &LifecycleHookOutput,
        input: &LifecycleHookInput,
        _changes: &ChangedFields,
    ) -> Result<(), ManagerError> {
        self.put(input).await.map(|_| ())
    }
    async fn lookup(&self, identity: &Identity) -> Result<LifecycleHookOutput, ManagerError> {
        let (asg, name) = hook_keys(identity)?;
        let hooks = self
            .api
            .describe_lifecycle_hooks(asg, vec![name.to_string()])
            .await
            .map_err(|err| {
                if is_not_found(&err) {
                    ManagerError::NotFound(format!("lifecycle hook {}: {}", identity, err))
                } else {
                    ManagerError::Remote(err)
                }
            })?
            .ok_or_else(|| ManagerError::EmptyResult(format!("lifecycle hook {}", identity)))?;
        hooks
            .into_iter()
            .find(|hook| hook.name == name)
            .ok_or_else(|| ManagerError::NotFound(format!("lifecycle hook {}", identity)))
    }
    async fn delete(&self, identity: &Identity) -> Result<(), ManagerError> {
        let (asg, name) = hook_keys(identity)?;
        info!(%identity, "deleting auto scaling lifecycle hook");
        self.api
            .delete_lifecycle_hook(asg, name)
            .await
            .map_err(|err| {
                if is_not_found(&err) {
                    ManagerError::NotFound(format!("lifecycle hook {}: {}", identity, err))
                } else {
                    ManagerError::Remote(err)
                }
            })
    }
}
