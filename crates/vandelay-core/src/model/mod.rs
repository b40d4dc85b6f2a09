//! データモデル
//!
//! スタックが宣言するリソース（シークレット、検索クラスタ、バケット）の定義

pub mod bucket;
pub mod policy;
pub mod search;
pub mod secret;

pub use bucket::StorageBucket;
pub use policy::{Effect, PolicyStatement, Principal};
pub use search::{
    Capacity, EbsOptions, EngineVersion, FineGrainedAccessControl, SearchCluster, VolumeType,
};
pub use secret::{CredentialSecret, GeneratorSpec, SecretTemplate};

use crate::error::Result;
use vandelay_cloud::{RemovalPolicy, TemplateResource};

/// 宣言されたリソース
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Secret(CredentialSecret),
    SearchCluster(SearchCluster),
    Bucket(StorageBucket),
}

impl Resource {
    pub fn logical_id(&self) -> &str {
        match self {
            Resource::Secret(s) => &s.logical_id,
            Resource::SearchCluster(c) => &c.logical_id,
            Resource::Bucket(b) => &b.logical_id,
        }
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            Resource::Secret(_) => secret::SECRET_RESOURCE_TYPE,
            Resource::SearchCluster(_) => search::DOMAIN_RESOURCE_TYPE,
            Resource::Bucket(_) => bucket::BUCKET_RESOURCE_TYPE,
        }
    }

    /// 環境内でグローバルに一意な固定名（あれば）
    pub fn physical_name(&self) -> Option<&str> {
        match self {
            Resource::Secret(s) => Some(&s.name),
            Resource::SearchCluster(_) => None,
            Resource::Bucket(b) => Some(&b.bucket_name),
        }
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        match self {
            Resource::Secret(s) => s.removal_policy,
            Resource::SearchCluster(c) => c.removal_policy,
            Resource::Bucket(b) => b.removal_policy,
        }
    }

    pub fn depends_on(&self) -> Vec<&str> {
        match self {
            Resource::SearchCluster(c) => c.depends_on(),
            Resource::Secret(_) | Resource::Bucket(_) => Vec::new(),
        }
    }

    pub fn to_template_resource(&self) -> Result<TemplateResource> {
        match self {
            Resource::Secret(s) => s.to_template_resource(),
            Resource::SearchCluster(c) => c.to_template_resource(),
            Resource::Bucket(b) => b.to_template_resource(),
        }
    }
}
