use std::{collections::HashSet, fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::{
    aws::{
        autoscaling::lifecycle_hook::LifecycleHookInput, location::map::MapInput, AwsType,
    },
    retry::{RetryPolicy, DEFAULT_RETRY_INTERVAL, DEFAULT_RETRY_TIMEOUT},
    tags::{IgnoreTags, TagPolicy, Tags},
};

/// Environment variable that takes precedence over the configured region.
pub const REGION_ENV: &str = "AWS_REGION";

/// State file used when the config names none.
pub const DEFAULT_STORE_PATH: &str = "rscloud.store";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_store")]
    pub store: PathBuf,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub default_tags: Tags,
    #[serde(default)]
    pub ignore_tags: IgnoreTags,
    #[serde(default)]
    pub resources: Vec<Declaration>,
}

fn default_store() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_RETRY_TIMEOUT.as_secs()
}
fn default_interval_secs() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_secs()
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            interval: Duration::from_secs(self.interval_secs),
        }
    }
}

/// A resource as written in the file: its type, a local name and the raw input.
#[derive(Debug, Clone, Deserialize)]
pub struct Declaration {
    #[serde(rename = "type")]
    pub resource_type: AwsType,
    pub name: String,
    pub input: Value,
}

impl Declaration {
    pub fn address(&self) -> String {
        address(self.resource_type, &self.name)
    }
}

/// A declaration whose input has been decoded into the resource's own type.
#[derive(Debug, Clone, PartialEq)]
pub enum Declared {
    LifecycleHook {
        address: String,
        input: LifecycleHookInput,
    },
    Map {
        address: String,
        input: MapInput,
    },
}

impl Declared {
    pub fn address(&self) -> &str {
        match self {
            Declared::LifecycleHook { address, .. } | Declared::Map { address, .. } => address,
        }
    }
    pub fn resource_type(&self) -> AwsType {
        match self {
            Declared::LifecycleHook { .. } => AwsType::LifecycleHook,
            Declared::Map { .. } => AwsType::Map,
        }
    }
}

/// `<type>.<name>`, the key a resource is stored under.
pub fn address(resource_type: AwsType, name: &str) -> String {
    format!("{}.{}", resource_type, name)
}

/// Splits an address back into its type and local name.
pub fn parse_address(address: &str) -> Result<(AwsType, &str), ConfigError> {
    let invalid = || ConfigError::InvalidAddress(address.to_string());
    let (resource_type, name) = address.split_once('.').ok_or_else(invalid)?;
    if name.is_empty() {
        return Err(invalid());
    }
    let resource_type = resource_type.parse::<AwsType>().map_err(|_| invalid())?;
    Ok((resource_type, name))
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// `env_region` (normally `AWS_REGION`) wins over the file.
    pub fn region(&self, env_region: Option<String>) -> Result<String, ConfigError> {
        env_region
            .filter(|region| !region.is_empty())
            .or_else(|| self.region.clone())
            .ok_or(ConfigError::MissingRegion)
    }

    pub fn tag_policy(&self) -> TagPolicy {
        TagPolicy {
            default_tags: self.default_tags.clone(),
            ignore: self.ignore_tags.clone(),
        }
    }

    pub fn declarations(&self) -> Result<Vec<Declared>, ConfigError> {
        let mut seen = HashSet::new();
        self.resources
            .iter()
            .map(|declaration| {
                let address = declaration.address();
                if !seen.insert(address.clone()) {
                    return Err(ConfigError::DuplicateAddress(address));
                }
                let input = declaration.input.clone();
                let invalid = |source| ConfigError::Input {
                    address: address.clone(),
                    source,
                };
                Ok(match declaration.resource_type {
                    AwsType::LifecycleHook => Declared::LifecycleHook {
                        input: serde_json::from_value(input).map_err(invalid)?,
                        address,
                    },
                    AwsType::Map => Declared::Map {
                        input: serde_json::from_value(input).map_err(invalid)?,
                        address,
                    },
                })
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid input for {address}: {source}")]
    Input {
        address: String,
        source: serde_json::Error,
    },
    #[error("{0} is declared more than once")]
    DuplicateAddress(String),
    #[error("invalid address {0:?}, expected <type>.<name>")]
    InvalidAddress(String),
    #[error("no region configured; set `region` or {}", REGION_ENV)]
    MissingRegion,
}
