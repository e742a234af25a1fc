#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rscloud_lifecycle::prelude::*;

pub const PUBLISH_ERROR: &str =
    "Unable to publish test message to notification target arn:aws:sns:us-east-2:123456789012:drain";

pub fn ctx() -> OperationContext {
    OperationContext {
        retry: RetryPolicy {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(1),
        },
        ..Default::default()
    }
}

pub fn hook_input() -> LifecycleHookInput {
    LifecycleHookInput {
        name: "hook-1".to_string(),
        autoscaling_group_name: "asg-1".to_string(),
        lifecycle_transition: "autoscaling:EC2_INSTANCE_TERMINATING".to_string(),
        ..Default::default()
    }
}

pub fn map_input() -> MapInput {
    MapInput {
        map_name: "basemap".to_string(),
        configuration: MapConfigurationInput {
            style: "VectorEsriStreets".to_string(),
        },
        ..Default::default()
    }
}

pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Default)]
pub struct HookState {
    pub hooks: BTreeMap<(String, String), LifecycleHookOutput>,
    pub puts: Vec<PutLifecycleHookRequest>,
    pub put_attempts: u32,
    /// Upcoming puts that fail with the notification-target publish error.
    pub transient_puts: u32,
    pub put_error: Option<ApiError>,
    /// Describe answers without a hook list.
    pub describe_empty: bool,
    pub deletes: u32,
}

/// In-memory Auto Scaling that fills in the values AWS computes.
#[derive(Default)]
pub struct FakeHookApi {
    state: Mutex<HookState>,
}

impl FakeHookApi {
    pub fn state(&self) -> MutexGuard<'_, HookState> {
        self.state.lock().unwrap()
    }
}

fn hook_not_found(name: &str) -> ApiError {
    ApiError::new("ValidationError", format!("LifecycleHook not found: {}", name))
}

#[async_trait]
impl LifecycleHookApi for FakeHookApi {
    async fn put_lifecycle_hook(&self, request: PutLifecycleHookRequest) -> Result<(), ApiError> {
        let mut state = self.state();
        state.put_attempts += 1;
        if state.transient_puts > 0 {
            state.transient_puts -= 1;
            return Err(ApiError::new("ValidationError", PUBLISH_ERROR));
        }
        if let Some(err) = state.put_error.clone() {
            return Err(err);
        }
        let heartbeat = request.heartbeat_timeout.unwrap_or(3600);
        let hook = LifecycleHookOutput {
            name: request.lifecycle_hook_name.clone(),
            autoscaling_group_name: request.autoscaling_group_name.clone(),
            lifecycle_transition: request.lifecycle_transition.clone(),
            default_result: Some(
                request
                    .default_result
                    .clone()
                    .unwrap_or_else(|| "ABANDON".to_string()),
            ),
            heartbeat_timeout: Some(heartbeat),
            global_timeout: Some(heartbeat * 100),
            notification_metadata: request.notification_metadata.clone(),
            notification_target_arn: request.notification_target_arn.clone(),
            role_arn: request.role_arn.clone(),
        };
        state.hooks.insert(
            (
                request.autoscaling_group_name.clone(),
                request.lifecycle_hook_name.clone(),
            ),
            hook,
        );
        state.puts.push(request);
        Ok(())
    }

    async fn describe_lifecycle_hooks(
        &self,
        autoscaling_group_name: &str,
        hook_names: Vec<String>,
    ) -> Result<Option<Vec<LifecycleHookOutput>>, ApiError> {
        let state = self.state();
        if state.describe_empty {
            return Ok(None);
        }
        Ok(Some(
            state
                .hooks
                .iter()
                .filter(|((asg, name), _)| {
                    asg == autoscaling_group_name && hook_names.contains(name)
                })
                .map(|(_, hook)| hook.clone())
                .collect(),
        ))
    }

    async fn delete_lifecycle_hook(
        &self,
        autoscaling_group_name: &str,
        hook_name: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        let key = (autoscaling_group_name.to_string(), hook_name.to_string());
        if state.hooks.remove(&key).is_none() {
            return Err(hook_not_found(hook_name));
        }
        state.deletes += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct MapState {
    pub maps: BTreeMap<String, RemoteMap>,
    pub creates: Vec<CreateMapRequest>,
    pub updates: Vec<(String, Option<String>)>,
    pub tagged: Vec<Tags>,
    pub untagged: Vec<Vec<String>>,
    pub deletes: u32,
    /// Create succeeds but the response carries no map name.
    pub omit_created_name: bool,
}

/// In-memory Location Service keyed by map name.
#[derive(Default)]
pub struct FakeMapApi {
    state: Mutex<MapState>,
}

pub fn map_arn(name: &str) -> String {
    format!("arn:aws:geo:us-east-2:123456789012:map/{}", name)
}

impl FakeMapApi {
    pub fn state(&self) -> MutexGuard<'_, MapState> {
        self.state.lock().unwrap()
    }

    /// A map created outside of rscloud.
    pub fn seed(&self, name: &str, style: &str, tags: Tags) {
        let created = Utc.with_ymd_and_hms(2023, 6, 1, 8, 30, 0).unwrap();
        self.state().maps.insert(
            name.to_string(),
            RemoteMap {
                map_name: name.to_string(),
                map_arn: map_arn(name),
                style: Some(style.to_string()),
                description: None,
                create_time: Some(created),
                update_time: Some(created),
                tags,
            },
        );
    }

    fn by_arn<'a>(state: &'a mut MapState, arn: &str) -> Result<&'a mut RemoteMap, ApiError> {
        state
            .maps
            .values_mut()
            .find(|map| map.map_arn == arn)
            .ok_or_else(|| not_found(arn))
    }
}

fn not_found(what: &str) -> ApiError {
    ApiError::new("ResourceNotFoundException", format!("{} not found", what))
}

#[async_trait]
impl MapApi for FakeMapApi {
    async fn create_map(&self, request: CreateMapRequest) -> Result<Option<String>, ApiError> {
        let mut state = self.state();
        if state.maps.contains_key(&request.map_name) {
            return Err(ApiError::new(
                "ConflictException",
                format!("map {} already exists", request.map_name),
            ));
        }
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        state.maps.insert(
            request.map_name.clone(),
            RemoteMap {
                map_name: request.map_name.clone(),
                map_arn: map_arn(&request.map_name),
                style: Some(request.style.clone()),
                description: request.description.clone(),
                create_time: Some(created),
                update_time: Some(created),
                tags: request.tags.clone().unwrap_or_default(),
            },
        );
        let name = request.map_name.clone();
        state.creates.push(request);
        Ok(Some(name).filter(|_| !state.omit_created_name))
    }

    async fn describe_map(&self, map_name: &str) -> Result<Option<RemoteMap>, ApiError> {
        // DescribeMap always carries a description string, empty when none was set.
        self.state()
            .maps
            .get(map_name)
            .cloned()
            .map(|map| {
                Some(RemoteMap {
                    description: Some(map.description.unwrap_or_default()),
                    ..map
                })
            })
            .ok_or_else(|| not_found(map_name))
    }

    async fn update_map(
        &self,
        map_name: &str,
        description: Option<String>,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        let map = state.maps.get_mut(map_name).ok_or_else(|| not_found(map_name))?;
        if description.is_some() {
            map.description = description.clone();
        }
        map.update_time = Some(Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap());
        state.updates.push((map_name.to_string(), description));
        Ok(())
    }

    async fn delete_map(&self, map_name: &str) -> Result<(), ApiError> {
        let mut state = self.state();
        if state.maps.remove(map_name).is_none() {
            return Err(not_found(map_name));
        }
        state.deletes += 1;
        Ok(())
    }

    async fn tag_resource(&self, resource_arn: &str, tags: Tags) -> Result<(), ApiError> {
        let mut state = self.state();
        Self::by_arn(&mut state, resource_arn)?
            .tags
            .extend(tags.clone());
        state.tagged.push(tags);
        Ok(())
    }

    async fn untag_resource(
        &self,
        resource_arn: &str,
        keys: Vec<String>,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        let map = Self::by_arn(&mut state, resource_arn)?;
        for key in &keys {
            map.tags.remove(key);
        }
        state.untagged.push(keys);
        Ok(())
    }
}

pub fn hook_manager(api: &Arc<FakeHookApi>) -> Arc<LifecycleHookManager> {
    Arc::new(LifecycleHookManager::new(api.clone()))
}

pub fn map_manager(api: &Arc<FakeMapApi>, policy: TagPolicy) -> Arc<MapManager> {
    Arc::new(MapManager::new(api.clone(), policy))
}
