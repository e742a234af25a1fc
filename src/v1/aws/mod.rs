pub mod autoscaling;
pub mod location;

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_autoscaling::error::{DisplayErrorContext, ProvideErrorMetadata};
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

use self::{autoscaling::lifecycle_hook::LifecycleHookManager, location::map::MapManager};
use super::{manager::ApiError, tags::TagPolicy};

#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, strum_macros::Display,
)]
pub enum AwsType {
    #[strum(ascii_case_insensitive)]
    LifecycleHook,
    #[strum(ascii_case_insensitive)]
    Map,
}

/// Shared AWS configuration from which every resource manager gets its client.
pub struct AwsProvider {
    config: SdkConfig,
    tag_policy: TagPolicy,
}

impl AwsProvider {
    pub async fn new(region: impl ToString, tag_policy: TagPolicy) -> Self {
        let region = Region::new(region.to_string());
        Self {
            config: aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await,
            tag_policy,
        }
    }
    pub fn region(&self) -> Option<String> {
        self.config.region().map(ToString::to_string)
    }
    pub fn lifecycle_hooks(&self) -> Arc<LifecycleHookManager> {
        Arc::new(LifecycleHookManager::new(Arc::new(
            aws_sdk_autoscaling::Client::new(&self.config),
        )))
    }
    pub fn maps(&self) -> Arc<MapManager> {
        Arc::new(MapManager::new(
            Arc::new(aws_sdk_location::Client::new(&self.config)),
            self.tag_policy.clone(),
        ))
    }
}

/// Keeps the service error code and message; falls back to the full error
/// chain when the service did not send a message (dispatch or timeout errors).
pub(crate) fn api_error<E>(err: E) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    ApiError {
        code: err.code().map(str::to_string),
        message: err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
    }
}
