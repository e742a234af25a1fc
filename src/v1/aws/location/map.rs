use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_location::{primitives::DateTime, types::MapConfiguration, Client};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::ERR_CODE_RESOURCE_NOT_FOUND;
use crate::v1::{
    aws::api_error,
    identity::{Identity, ImportFormat},
    manager::{ApiError, ChangedFields, ManagerError, ResourceManager},
    resource::Resource,
    tags::{self, TagPolicy, Tags},
};

pub type MapResource = Resource<MapInput, MapOutput>;

pub const MAP_IMPORT_FORMAT: ImportFormat = ImportFormat::Flat {
    pattern: "<map-name>",
};

const MAX_NAME_LEN: usize = 100;
const MAX_STYLE_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 1000;

/// Reported when the merged tag set no longer matches the remote one.
const TAGS_ALL_FIELD: &str = "tags_all";

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MapConfigurationInput {
    pub style: String,
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MapInput {
    pub map_name: String,
    pub configuration: MapConfigurationInput,
    pub description: Option<String>,
    pub tags: Option<Tags>,
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MapOutput {
    pub map_name: String,
    pub map_arn: String,
    pub configuration: Option<MapConfigurationInput>,
    pub description: Option<String>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    pub tags: Tags,
    pub tags_all: Tags,
}

/// Body of a `CreateMap` call, tags already merged with the provider defaults.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct CreateMapRequest {
    pub map_name: String,
    pub style: String,
    pub description: Option<String>,
    pub tags: Option<Tags>,
}

/// `DescribeMap` response before the tag policy is applied.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RemoteMap {
    pub map_name: String,
    pub map_arn: String,
    pub style: Option<String>,
    pub description: Option<String>,
    pub create_time: Option<chrono::DateTime<Utc>>,
    pub update_time: Option<chrono::DateTime<Utc>>,
    pub tags: Tags,
}

fn rfc3339(time: &chrono::DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn to_chrono(time: &DateTime) -> Option<chrono::DateTime<Utc>> {
    time.to_chrono_utc().ok()
}

impl MapOutput {
    fn from_remote(remote: RemoteMap, policy: &TagPolicy) -> Self {
        let views = policy.partition(&remote.tags);
        Self {
            map_name: remote.map_name,
            map_arn: remote.map_arn,
            configuration: remote.style.map(|style| MapConfigurationInput { style }),
            description: remote.description,
            create_time: remote.create_time.as_ref().map(rfc3339),
            update_time: remote.update_time.as_ref().map(rfc3339),
            tags: views.tags,
            tags_all: views.tags_all,
        }
    }
}

/// Location Service calls used by the map manager.
#[async_trait]
pub trait MapApi: Send + Sync {
    /// Returns the name the provider registered the map under.
    async fn create_map(&self, request: CreateMapRequest) -> Result<Option<String>, ApiError>;
    async fn describe_map(&self, map_name: &str) -> Result<Option<RemoteMap>, ApiError>;
    async fn update_map(&self, map_name: &str, description: Option<String>)
        -> Result<(), ApiError>;
    async fn delete_map(&self, map_name: &str) -> Result<(), ApiError>;
    async fn tag_resource(&self, resource_arn: &str, tags: Tags) -> Result<(), ApiError>;
    async fn untag_resource(&self, resource_arn: &str, keys: Vec<String>)
        -> Result<(), ApiError>;
}

#[async_trait]
impl MapApi for Client {
    async fn create_map(&self, request: CreateMapRequest) -> Result<Option<String>, ApiError> {
        let configuration = MapConfiguration::builder()
            .style(request.style)
            .build()
            .map_err(|e| ApiError {
                code: None,
                message: e.to_string(),
            })?;
        Client::create_map(self)
            .map_name(request.map_name)
            .configuration(configuration)
            .set_description(request.description)
            .set_tags(request.tags.map(|tags| tags.into_iter().collect()))
            .send()
            .await
            .map(|output| Some(output.map_name().to_string()).filter(|name| !name.is_empty()))
            .map_err(api_error)
    }
    async fn describe_map(&self, map_name: &str) -> Result<Option<RemoteMap>, ApiError> {
        Client::describe_map(self)
            .map_name(map_name)
            .send()
            .await
            .map(|output| {
                Some(RemoteMap {
                    map_name: output.map_name().to_string(),
                    map_arn: output.map_arn().to_string(),
                    style: output.configuration().map(|c| c.style().to_string()),
                    description: Some(output.description().to_string()),
                    create_time: to_chrono(output.create_time()),
                    update_time: to_chrono(output.update_time()),
                    tags: output
                        .tags()
                        .map(|tags| {
                            tags.iter()
                                .map(|(k, v)| (k.clone(), v.clone()))
                                .collect()
                        })
                        .unwrap_or_default(),
                })
            })
            .map_err(api_error)
    }
    async fn update_map(
        &self,
        map_name: &str,
        description: Option<String>,
    ) -> Result<(), ApiError> {
        Client::update_map(self)
            .map_name(map_name)
            .set_description(description)
            .send()
            .await
            .map(|_| ())
            .map_err(api_error)
    }
    async fn delete_map(&self, map_name: &str) -> Result<(), ApiError> {
        Client::delete_map(self)
            .map_name(map_name)
            .send()
            .await
            .map(|_| ())
            .map_err(api_error)
    }
    async fn tag_resource(&self, resource_arn: &str, tags: Tags) -> Result<(), ApiError> {
        Client::tag_resource(self)
            .resource_arn(resource_arn)
            .set_tags(Some(tags.into_iter().collect()))
            .send()
            .await
            .map(|_| ())
            .map_err(api_error)
    }
    async fn untag_resource(
        &self,
        resource_arn: &str,
        keys: Vec<String>,
    ) -> Result<(), ApiError> {
        Client::untag_resource(self)
            .resource_arn(resource_arn)
            .set_tag_keys(Some(keys))
            .send()
            .await
            .map(|_| ())
            .map_err(api_error)
    }
}

pub struct MapManager {
    api: Arc<dyn MapApi>,
    tag_policy: TagPolicy,
}

impl MapManager {
    pub fn new(api: Arc<dyn MapApi>, tag_policy: TagPolicy) -> Self {
        Self { api, tag_policy }
    }

    async fn update_tags(&self, latest: &MapOutput, input: &MapInput) -> Result<(), ManagerError> {
        let wanted = self.tag_policy.merge(input.tags.as_ref());
        let diff = tags::diff(&latest.tags_all, &wanted);
        if diff.is_empty() {
            return Ok(());
        }
        info!(map = %latest.map_name, ?diff, "updating map tags");
        if !diff.remove.is_empty() {
            self.api
                .untag_resource(&latest.map_arn, diff.remove)
                .await
                .map_err(ManagerError::Remote)?;
        }
        if !diff.upsert.is_empty() {
            self.api
                .tag_resource(&latest.map_arn, diff.upsert)
                .await
                .map_err(ManagerError::Remote)?;
        }
        Ok(())
    }
}

fn map_error(identity: &Identity, err: ApiError) -> ManagerError {
    if err.has_code(ERR_CODE_RESOURCE_NOT_FOUND) {
        ManagerError::NotFound(format!("map {}: {}", identity, err))
    } else {
        ManagerError::Remote(err)
    }
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), ManagerError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ManagerError::Validation(format!(
            "{} must be between {} and {} characters, got {}",
            field, min, max, len
        )));
    }
    Ok(())
}

#[async_trait]
impl ResourceManager<MapInput, MapOutput> for MapManager {
    fn import_format(&self) -> ImportFormat {
        MAP_IMPORT_FORMAT
    }
    fn force_new_fields(&self) -> &'static [&'static str] {
        &["map_name", "configuration"]
    }
    /// `UpdateMap` cannot clear a description by omitting it; an empty string does.
    fn computed_fields(&self) -> &'static [&'static str] {
        &["description"]
    }
    fn derived_changes(&self, desired: &MapInput, latest: &MapOutput) -> ChangedFields {
        let wanted = self
            .tag_policy
            .partition(&self.tag_policy.merge(desired.tags.as_ref()))
            .tags_all;
        if wanted == latest.tags_all {
            ChangedFields::new()
        } else {
            [TAGS_ALL_FIELD.to_string()].into_iter().collect()
        }
    }
    fn validate(&self, input: &MapInput) -> Result<(), ManagerError> {
        check_len("map_name", &input.map_name, 1, MAX_NAME_LEN)?;
        check_len("configuration.style", &input.configuration.style, 1, MAX_STYLE_LEN)?;
        if let Some(description) = &input.description {
            check_len("description", description, 0, MAX_DESCRIPTION_LEN)?;
        }
        Ok(())
    }
    fn input_from_output(&self, output: &MapOutput) -> MapInput {
        MapInput {
            map_name: output.map_name.clone(),
            configuration: output.configuration.clone().unwrap_or_default(),
            description: output.description.clone(),
            tags: Some(output.tags.clone()).filter(|tags| !tags.is_empty()),
        }
    }
    async fn create(&self, input: &MapInput) -> Result<Identity, ManagerError> {
        let tags = self.tag_policy.merge(input.tags.as_ref());
        info!(map = %input.map_name, "creating location map");
        self.api
            .create_map(CreateMapRequest {
                map_name: input.map_name.clone(),
                style: input.configuration.style.clone(),
                description: input.description.clone(),
                tags: Some(tags).filter(|tags| !tags.is_empty()),
            })
            .await
            .map_err(ManagerError::Remote)?
            .map(Identity::flat)
            .ok_or_else(|| ManagerError::EmptyResult(format!("creating map {}", input.map_name)))
    }
    async fn update(
        &self,
        identity: &Identity,
        latest: &MapOutput,
        input: &MapInput,
        changes: &ChangedFields,
    ) -> Result<(), ManagerError> {
        if changes.contains("description") {
            info!(%identity, "updating location map description");
            self.api
                .update_map(identity.name(), input.description.clone())
                .await
                .map_err(|err| map_error(identity, err))?;
        }
        // Default tags can change without the resource's own tags changing.
        self.update_tags(latest, input).await
    }
    async fn lookup(&self, identity: &Identity) -> Result<MapOutput, ManagerError> {
        self.api
            .describe_map(identity.name())
            .await
            .map_err(|err| map_error(identity, err))?
            .map(|remote| MapOutput::from_remote(remote, &self.tag_policy))
            .ok_or_else(|| ManagerError::EmptyResult(format!("describing map {}", identity)))
    }
    async fn delete(&self, identity: &Identity) -> Result<(), ManagerError> {
        info!(%identity, "deleting location map");
        self.api
            .delete_map(identity.name())
            .await
            .map_err(|err| map_error(identity, err))
    }
}
