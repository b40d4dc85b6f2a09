use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vandelay_cloud::{
    Deferred, MaterializedStack, ProvisioningEngine, ResourceState, ResourceStatus, Template,
};
use vandelay_core::credential::resolve_secret_field;
use vandelay_core::{FieldValue, InMemoryCredentialStore, StackSettings, Variant};

pub const ENDPOINT: &str = "search-art-vandelay-abc123.us-east-1.es.amazonaws.com";

pub fn settings(variant: Variant, root: &Path) -> StackSettings {
    named_settings("TestStack", variant, root)
}

pub fn named_settings(stack_name: &str, variant: Variant, root: &Path) -> StackSettings {
    StackSettings {
        stack_name: stack_name.to_string(),
        variant,
        out_dir: root.join("cdk.out"),
        state_dir: root.join(".vandelay"),
        ..Default::default()
    }
}

/// テンプレートをそのまま実体化したことにするエンジン
#[derive(Default)]
pub struct FakeEngine {
    store: Option<Arc<InMemoryCredentialStore>>,
    skip: Option<String>,
    materialize_calls: AtomicUsize,
    teardown_calls: AtomicUsize,
    master_user: Mutex<Option<String>>,
    purged: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// マスターユーザーを解決できるエンジン
    pub fn with_store(store: Arc<InMemoryCredentialStore>) -> Self {
        Self {
            store: Some(store),
            ..Default::default()
        }
    }

    /// 指定した論理IDを実体化しないエンジン
    pub fn skipping(logical_id: &str) -> Self {
        Self {
            skip: Some(logical_id.to_string()),
            ..Default::default()
        }
    }

    pub fn materialize_calls(&self) -> usize {
        self.materialize_calls.load(Ordering::SeqCst)
    }

    pub fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::SeqCst)
    }

    pub fn master_user(&self) -> Option<String> {
        self.master_user.lock().unwrap().clone()
    }

    /// 破棄前に中身を空にしたバケットの論理ID
    pub fn purged(&self) -> Vec<String> {
        self.purged.lock().unwrap().clone()
    }

    fn resolve_dynamic_reference(&self, reference: &str) -> Option<String> {
        let store = self.store.as_ref()?;
        let inner = reference
            .strip_prefix("{{resolve:secretsmanager:")?
            .strip_suffix("::}}")?;
        let parts: Vec<&str> = inner.split(':').collect();
        let [name, "SecretString", field] = parts.as_slice() else {
            return None;
        };
        match resolve_secret_field(store.as_ref(), &Deferred::secret_field(*name, *field)).ok()? {
            FieldValue::Resolved(value) => Some(value.to_string()),
            FieldValue::Deferred(_) => None,
        }
    }
}

#[async_trait]
impl ProvisioningEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn materialize(
        &self,
        stack_name: &str,
        template: &Template,
    ) -> vandelay_cloud::Result<MaterializedStack> {
        self.materialize_calls.fetch_add(1, Ordering::SeqCst);

        let mut materialized = MaterializedStack::new(stack_name);
        for (logical_id, resource) in &template.resources {
            if self.skip.as_deref() == Some(logical_id.as_str()) {
                continue;
            }

            let state = match resource.resource_type.as_str() {
                "AWS::OpenSearchService::Domain" => {
                    let user = resource.properties["AdvancedSecurityOptions"]["MasterUserOptions"]
                        ["MasterUserName"]
                        .as_str()
                        .and_then(|r| self.resolve_dynamic_reference(r));
                    if user.is_some() {
                        *self.master_user.lock().unwrap() = user;
                    }
                    ResourceState::new(
                        format!("{}-search", stack_name.to_lowercase()),
                        &resource.resource_type,
                    )
                    .with_attribute("DomainEndpoint", serde_json::json!(ENDPOINT))
                }
                "AWS::S3::Bucket" => ResourceState::new(
                    resource.properties["BucketName"].as_str().unwrap_or_default(),
                    &resource.resource_type,
                ),
                _ => ResourceState::new(
                    format!(
                        "arn:aws:secretsmanager:us-east-1:000000000000:secret:{}",
                        logical_id
                    ),
                    &resource.resource_type,
                ),
            };
            materialized = materialized
                .with_resource(logical_id.clone(), state.with_status(ResourceStatus::Running));
        }
        Ok(materialized)
    }

    async fn teardown(
        &self,
        _stack_name: &str,
        template: &Template,
    ) -> vandelay_cloud::Result<()> {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        *self.purged.lock().unwrap() = template
            .purge_before_teardown()
            .into_iter()
            .map(String::from)
            .collect();
        Ok(())
    }
}
