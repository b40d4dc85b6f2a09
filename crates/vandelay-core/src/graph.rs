//! リソースグラフ
//!
//! 宣言済みリソースの集合。実体化前の状態で、クロスリファレンスは
//! 遅延値として保持されます。

use crate::error::{Result, StackError};
use crate::model::{CredentialSecret, Resource, SearchCluster, StorageBucket};
use crate::outputs::OutputBinding;
use tracing::debug;
use vandelay_cloud::{Template, TemplateOutput};
use vandelay_config::Variant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGraph {
    variant: Variant,

    /// 宣言順に保持
    resources: Vec<Resource>,
}

impl ResourceGraph {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            resources: Vec::new(),
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// リソースを宣言
    ///
    /// 論理IDか、同じ種類の固定名が重複している場合はエラー。
    pub fn declare(&mut self, resource: Resource) -> Result<()> {
        if self.get(resource.logical_id()).is_some() {
            return Err(StackError::DuplicateResource(resource.logical_id().to_string()));
        }
        if let Some(name) = resource.physical_name() {
            let taken = self.resources.iter().any(|r| {
                r.resource_type() == resource.resource_type() && r.physical_name() == Some(name)
            });
            if taken {
                return Err(StackError::DuplicateResource(format!(
                    "{} ({})",
                    name,
                    resource.resource_type()
                )));
            }
        }

        debug!(
            logical_id = %resource.logical_id(),
            resource_type = %resource.resource_type(),
            "Declared resource"
        );
        self.resources.push(resource);
        Ok(())
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.logical_id() == logical_id)
    }

    pub fn secrets(&self) -> Vec<&CredentialSecret> {
        self.resources
            .iter()
            .filter_map(|r| match r {
                Resource::Secret(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn search_clusters(&self) -> Vec<&SearchCluster> {
        self.resources
            .iter()
            .filter_map(|r| match r {
                Resource::SearchCluster(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    pub fn buckets(&self) -> Vec<&StorageBucket> {
        self.resources
            .iter()
            .filter_map(|r| match r {
                Resource::Bucket(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// 依存先・シークレット参照・出力が全て宣言済みか検証
    pub fn validate(&self, outputs: &[OutputBinding]) -> Result<()> {
        for resource in &self.resources {
            for dep in resource.depends_on() {
                if self.get(dep).is_none() {
                    return Err(StackError::DanglingReference {
                        from: resource.logical_id().to_string(),
                        to: dep.to_string(),
                    });
                }
            }
        }

        for cluster in self.search_clusters() {
            let fgac = &cluster.fine_grained_access_control;
            for value in [&fgac.master_user_name, &fgac.master_user_password] {
                if let vandelay_cloud::Deferred::SecretField { secret_name, .. } = value {
                    if !self.secrets().iter().any(|s| &s.name == secret_name) {
                        return Err(StackError::DanglingReference {
                            from: cluster.logical_id.clone(),
                            to: secret_name.clone(),
                        });
                    }
                }
            }
        }

        for output in outputs {
            if output.value.is_sensitive() {
                return Err(StackError::InvalidDeclaration {
                    resource: output.name.clone(),
                    message: "シークレットの値は出力できません".to_string(),
                });
            }
            if let Some(id) = output.value.logical_id() {
                if self.get(id).is_none() {
                    return Err(StackError::DanglingReference {
                        from: output.name.clone(),
                        to: id.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// テンプレートを合成
    pub fn synthesize(&self, outputs: &[OutputBinding]) -> Result<Template> {
        self.validate(outputs)?;

        let mut template = Template::new();
        for resource in &self.resources {
            let rendered = resource.to_template_resource()?;
            if !template.add_resource(resource.logical_id(), rendered) {
                return Err(StackError::DuplicateResource(resource.logical_id().to_string()));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for output in outputs {
            if !seen.insert(output.name.as_str()) {
                return Err(StackError::DuplicateResource(output.name.clone()));
            }
            template.add_output(TemplateOutput {
                name: output.name.clone(),
                value: output.value.to_template(),
                description: output.description.clone(),
            });
        }

        Ok(template)
    }
}
