//! Synthesized template model
//!
//! The template is the hand-off format to the provisioning engine. Its shape
//! follows CloudFormation: a `Resources` map keyed by logical id and an
//! ordered `Outputs` section.

use crate::error::Result;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Tag on a bucket whose objects must be emptied before it is deleted
///
/// The template declares no custom resource for this. Engines read the tag
/// through [`Template::purge_before_teardown`] and empty those buckets first.
pub const AUTO_DELETE_OBJECTS_TAG: &str = "aws-cdk:auto-delete-objects";

/// What happens to a resource when its stack is torn down
///
/// Has no `Default`; every declaration states its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    /// Delete the resource on teardown
    #[serde(rename = "Delete")]
    Destroy,
    /// Keep the resource after the stack is gone
    #[serde(rename = "Retain")]
    Retain,
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalPolicy::Destroy => write!(f, "destroy"),
            RemovalPolicy::Retain => write!(f, "retain"),
        }
    }
}

/// A single resource entry of the template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    /// Resource type (e.g., "AWS::S3::Bucket")
    #[serde(rename = "Type")]
    pub resource_type: String,

    /// Resource-specific properties, with deferred values already rendered
    pub properties: Value,

    /// Logical ids that must be materialized first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    pub deletion_policy: RemovalPolicy,

    pub update_replace_policy: RemovalPolicy,
}

impl TemplateResource {
    pub fn new(resource_type: impl Into<String>, properties: Value, policy: RemovalPolicy) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: policy,
            update_replace_policy: policy,
        }
    }

    pub fn with_depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Whether `Tags` carries `key` with the value `"true"`
    pub fn tag_enabled(&self, key: &str) -> bool {
        self.properties["Tags"]
            .as_array()
            .is_some_and(|tags| tags.iter().any(|t| t["Key"] == key && t["Value"] == "true"))
    }
}

/// A named output published after materialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    #[serde(skip)]
    pub name: String,

    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A synthesized stack template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub description: Option<String>,

    /// Resources indexed by logical id
    pub resources: BTreeMap<String, TemplateResource>,

    /// Outputs in declaration order
    pub outputs: Vec<TemplateOutput>,
}

impl Template {
    pub fn new() -> Self {
        Self {
            description: None,
            resources: BTreeMap::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a resource; returns `false` if the logical id is already taken
    pub fn add_resource(
        &mut self,
        logical_id: impl Into<String>,
        resource: TemplateResource,
    ) -> bool {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return false;
        }
        self.resources.insert(logical_id, resource);
        true
    }

    pub fn add_output(&mut self, output: TemplateOutput) {
        self.outputs.push(output);
    }

    pub fn resource(&self, logical_id: &str) -> Option<&TemplateResource> {
        self.resources.get(logical_id)
    }

    /// Logical ids of buckets the engine empties before tearing the stack down
    pub fn purge_before_teardown(&self) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|(_, r)| r.tag_enabled(AUTO_DELETE_OBJECTS_TAG))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Render as pretty-printed JSON, keeping output order
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the template to `path`
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        tracing::debug!("Wrote template to {}", path.display());
        Ok(())
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

struct OrderedOutputs<'a>(&'a [TemplateOutput]);

impl Serialize for OrderedOutputs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for output in self.0 {
            map.serialize_entry(&output.name, output)?;
        }
        map.end()
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut len = 2;
        if self.description.is_some() {
            len += 1;
        }
        if !self.outputs.is_empty() {
            len += 1;
        }

        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("AWSTemplateFormatVersion", TEMPLATE_FORMAT_VERSION)?;
        if let Some(description) = &self.description {
            map.serialize_entry("Description", description)?;
        }
        map.serialize_entry("Resources", &self.resources)?;
        if !self.outputs.is_empty() {
            map.serialize_entry("Outputs", &OrderedOutputs(&self.outputs))?;
        }
        map.end()
    }
}
