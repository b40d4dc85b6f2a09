//! Provisioning engine trait definition

use crate::error::{CloudError, Result};
use crate::state::{ProviderState, ResourceState};
use crate::template::Template;
use async_trait::async_trait;

/// External provisioning engine abstraction
///
/// The engine owns plan/apply/rollback for a whole template. A Vandelay
/// stack only hands it a self-consistent template and reads back what it
/// materialized.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Returns the engine name (e.g., "cloudformation")
    fn name(&self) -> &str;

    /// Converge the live environment to the template
    ///
    /// Either every declared resource is materialized or the whole run fails.
    async fn materialize(&self, stack_name: &str, template: &Template) -> Result<MaterializedStack>;

    /// Tear down every resource of the stack according to its removal policy
    ///
    /// Buckets listed by [`Template::purge_before_teardown`] are emptied
    /// before deletion.
    async fn teardown(&self, stack_name: &str, template: &Template) -> Result<()>;
}

/// Resources materialized by one engine run, indexed by logical id
#[derive(Debug, Clone, Default)]
pub struct MaterializedStack {
    pub stack_name: String,
    pub resources: ProviderState,
}

impl MaterializedStack {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            resources: ProviderState::new(),
        }
    }

    pub fn with_resource(mut self, logical_id: impl Into<String>, state: ResourceState) -> Self {
        self.resources.add(logical_id.into(), state);
        self
    }

    /// Check that every resource of the template was materialized
    pub fn ensure_complete(&self, template: &Template) -> Result<()> {
        let missing: Vec<&str> = template
            .resources
            .keys()
            .filter(|id| self.resources.get(id).is_none())
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(CloudError::ProvisioningFailure(format!(
                "stack {} is missing materialized resources: {}",
                self.stack_name,
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{RemovalPolicy, TemplateResource};
    use serde_json::json;

    #[test]
    fn test_ensure_complete_reports_missing() {
        let mut template = Template::new();
        template.add_resource(
            "Bucket",
            TemplateResource::new("AWS::S3::Bucket", json!({}), RemovalPolicy::Destroy),
        );
        template.add_resource(
            "Domain",
            TemplateResource::new(
                "AWS::OpenSearchService::Domain",
                json!({}),
                RemovalPolicy::Destroy,
            ),
        );

        let partial = MaterializedStack::new("Stack")
            .with_resource("Bucket", ResourceState::new("bucket", "AWS::S3::Bucket"));
        let err = partial.ensure_complete(&template).unwrap_err();
        assert!(err.to_string().contains("Domain"));

        let full = partial.with_resource(
            "Domain",
            ResourceState::new("domain", "AWS::OpenSearchService::Domain"),
        );
        assert!(full.ensure_complete(&template).is_ok());
    }
}
