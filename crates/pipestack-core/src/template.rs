//! Synthesized structural templates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::LogicalId;
use crate::{Error, Result};

pub const FORMAT_VERSION: &str = "2010-09-09";

/// Metadata key recording the construct path a resource came from.
pub const PATH_METADATA_KEY: &str = "pipestack:path";

/// What the provider does with a resource when the stack is deleted or the
/// resource is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceEntry {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LogicalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ResourceEntry {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
            metadata: None,
        }
    }

    pub fn add_depends_on(&mut self, ids: impl IntoIterator<Item = LogicalId>) {
        for id in ids {
            if !self.depends_on.contains(&id) {
                self.depends_on.push(id);
            }
        }
        self.depends_on.sort();
    }

    /// Apply the same policy to deletion and replacement.
    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    /// The construct path recorded at declaration, if any.
    pub fn construct_path(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(PATH_METADATA_KEY))
            .and_then(Value::as_str)
    }
}

/// A stack's synthesized template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(
        rename = "Description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<LogicalId, ResourceEntry>,
}

impl Template {
    pub fn new(description: Option<String>, resources: BTreeMap<LogicalId, ResourceEntry>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description,
            resources,
        }
    }

    pub fn resource(&self, id: &LogicalId) -> Option<&ResourceEntry> {
        self.resources.get(id)
    }

    /// All resources of a given type, ordered by logical id.
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<(&LogicalId, &ResourceEntry)> {
        self.resources
            .iter()
            .filter(|(_, entry)| entry.resource_type == resource_type)
            .collect()
    }

    pub fn resource_count(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).len()
    }

    /// The single resource of a type; errors when there are none or several.
    pub fn only_resource_of_type(&self, resource_type: &str) -> Result<(&LogicalId, &ResourceEntry)> {
        match self.resources_of_type(resource_type).as_slice() {
            [single] => Ok(*single),
            [] => Err(Error::NotFound(format!("no resource of type {}", resource_type))),
            many => Err(Error::InvalidInput(format!(
                "expected one resource of type {}, found {}",
                resource_type,
                many.len()
            ))),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
