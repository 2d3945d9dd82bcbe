//! Resource records and collection requests

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identity used when no named profile is given
pub const DEFAULT_IDENTITY: &str = "default";

/// Supported resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "EC2")]
    Ec2,
    #[serde(rename = "RDS")]
    Rds,
    #[serde(rename = "S3")]
    S3,
    #[serde(rename = "Lambda")]
    Lambda,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Ec2,
        ResourceKind::Rds,
        ResourceKind::S3,
        ResourceKind::Lambda,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Ec2 => "EC2",
            ResourceKind::Rds => "RDS",
            ResourceKind::S3 => "S3",
            ResourceKind::Lambda => "Lambda",
        }
    }

    /// Lowercase form used for file names
    pub fn slug(&self) -> &'static str {
        match self {
            ResourceKind::Ec2 => "ec2",
            ResourceKind::Rds => "rds",
            ResourceKind::S3 => "s3",
            ResourceKind::Lambda => "lambda",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ResourceKind::Ec2 => "Virtual servers",
            ResourceKind::Rds => "Managed relational databases",
            ResourceKind::S3 => "Object storage buckets",
            ResourceKind::Lambda => "Serverless functions",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CloudError::InvalidRequest(format!("Unsupported resource kind: {}", s)))
    }
}

/// A single collected resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,

    /// Provider-assigned identifier
    pub id: String,

    /// Display name (the `Name` tag, or the id when untagged)
    pub name: String,

    /// Kind-specific attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    pub created_at: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            kind,
            name: id.clone(),
            id,
            attributes: BTreeMap::new(),
            tags: BTreeMap::new(),
            created_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = (String, String)>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Get an attribute value
    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// What to collect, for whom, and how
///
/// Immutable once built. Kinds keep their first-seen order with duplicates
/// removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    identity: String,
    region: String,
    kinds: Vec<ResourceKind>,
    bypass_cache: bool,
    force: bool,
    clear_cache: bool,
}

impl CollectionRequest {
    pub fn new(
        identity: impl Into<String>,
        region: impl Into<String>,
        kinds: impl IntoIterator<Item = ResourceKind>,
    ) -> Result<Self> {
        let identity = identity.into();
        let region = region.into();

        if identity.trim().is_empty() {
            return Err(CloudError::InvalidRequest("identity must not be empty".into()));
        }
        if region.trim().is_empty() {
            return Err(CloudError::InvalidRequest("region must not be empty".into()));
        }

        let mut unique = Vec::new();
        for kind in kinds {
            if !unique.contains(&kind) {
                unique.push(kind);
            }
        }
        if unique.is_empty() {
            return Err(CloudError::InvalidRequest(
                "at least one resource kind is required".into(),
            ));
        }

        Ok(Self {
            identity,
            region,
            kinds: unique,
            bypass_cache: false,
            force: false,
            clear_cache: false,
        })
    }

    /// Skip cache lookups. Fresh results are still written through.
    pub fn with_bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// Take over the run lock even if its holder is alive
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Drop cached entries for this identity/region before fetching
    pub fn with_clear_cache(mut self, clear: bool) -> Self {
        self.clear_cache = clear;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn kinds(&self) -> &[ResourceKind] {
        &self.kinds
    }

    pub fn bypass_cache(&self) -> bool {
        self.bypass_cache
    }

    pub fn force(&self) -> bool {
        self.force
    }

    pub fn clear_cache(&self) -> bool {
        self.clear_cache
    }
}

/// Resolve the cache/lock identity for an optional profile name
pub fn identity_for_profile(profile: Option<&str>) -> String {
    match profile.map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => DEFAULT_IDENTITY.to_string(),
    }
}
