//! 検索クラスタ（OpenSearch Service ドメイン）の宣言

use crate::credential::CredentialReference;
use crate::error::{Result, StackError};
use crate::model::policy::{PolicyStatement, policy_document};
use serde_json::json;
use vandelay_cloud::{Deferred, RemovalPolicy, TemplateResource};

pub const DOMAIN_RESOURCE_TYPE: &str = "AWS::OpenSearchService::Domain";

/// エンドポイントの実行時属性名
pub const ENDPOINT_ATTRIBUTE: &str = "DomainEndpoint";

const TLS_SECURITY_POLICY: &str = "Policy-Min-TLS-1-0-2019-07";

/// エンジンバージョン
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineVersion(String);

impl EngineVersion {
    pub fn opensearch(version: &str) -> Self {
        Self(format!("OpenSearch_{}", version))
    }

    pub fn opensearch_1_1() -> Self {
        Self::opensearch("1.1")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeType {
    /// General Purpose SSD
    Gp2,
}

impl VolumeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeType::Gp2 => "gp2",
        }
    }
}

/// データノード構成
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capacity {
    pub data_nodes: u32,
    pub data_node_instance_type: String,
}

/// EBSボリューム構成
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbsOptions {
    pub volume_size_gib: u32,
    pub volume_type: VolumeType,
}

/// 内部ユーザーデータベースによるきめ細かなアクセス制御
///
/// ユーザー名とパスワードは遅延値として保持し、平文は持たない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FineGrainedAccessControl {
    pub master_user_name: Deferred,
    pub master_user_password: Deferred,

    /// 参照元シークレットの論理ID
    pub secret_logical_id: String,
}

impl FineGrainedAccessControl {
    pub fn from_credential(credential: &CredentialReference) -> Self {
        Self {
            master_user_name: credential.username_value(),
            master_user_password: credential.password_value(),
            secret_logical_id: credential.secret_logical_id().to_string(),
        }
    }
}

/// 検索クラスタの宣言
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCluster {
    pub logical_id: String,
    pub engine_version: EngineVersion,
    pub removal_policy: RemovalPolicy,
    pub capacity: Capacity,
    pub ebs: EbsOptions,
    pub node_to_node_encryption: bool,
    pub encryption_at_rest: bool,
    pub enforce_https: bool,
    pub fine_grained_access_control: FineGrainedAccessControl,
    pub access_policies: Vec<PolicyStatement>,
    pub zone_awareness: bool,
}

impl SearchCluster {
    /// ドメインエンドポイント（デプロイ後に確定）
    pub fn endpoint(&self) -> Deferred {
        Deferred::attribute(&self.logical_id, ENDPOINT_ATTRIBUTE)
    }

    /// 先に実体化される必要がある論理ID
    pub fn depends_on(&self) -> Vec<&str> {
        vec![self.fine_grained_access_control.secret_logical_id.as_str()]
    }

    pub fn has_wide_open_policy(&self) -> bool {
        self.access_policies.iter().any(PolicyStatement::is_wide_open)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| StackError::InvalidDeclaration {
            resource: self.logical_id.clone(),
            message: message.to_string(),
        };

        if self.capacity.data_nodes == 0 {
            return Err(invalid("データノード数は1以上が必要です"));
        }
        if self.ebs.volume_size_gib == 0 {
            return Err(invalid("ボリュームサイズは1GiB以上が必要です"));
        }
        // きめ細かなアクセス制御の前提条件
        if !(self.enforce_https && self.node_to_node_encryption && self.encryption_at_rest) {
            return Err(invalid(
                "きめ細かなアクセス制御には HTTPS 強制・ノード間暗号化・保管時暗号化が必要です",
            ));
        }
        if self.zone_awareness && self.capacity.data_nodes % 2 != 0 {
            return Err(invalid("ゾーン認識を有効にするにはデータノード数を偶数にしてください"));
        }
        if !self.fine_grained_access_control.master_user_password.is_sensitive() {
            return Err(invalid("マスターユーザーのパスワードはシークレット参照で指定してください"));
        }
        Ok(())
    }

    pub fn to_template_resource(&self) -> Result<TemplateResource> {
        self.validate()?;

        let fgac = &self.fine_grained_access_control;
        let mut properties = json!({
            "EngineVersion": self.engine_version.as_str(),
            "ClusterConfig": {
                "InstanceType": self.capacity.data_node_instance_type,
                "InstanceCount": self.capacity.data_nodes,
                "DedicatedMasterEnabled": false,
                "ZoneAwarenessEnabled": self.zone_awareness,
            },
            "EBSOptions": {
                "EBSEnabled": true,
                "VolumeSize": self.ebs.volume_size_gib,
                "VolumeType": self.ebs.volume_type.as_str(),
            },
            "EncryptionAtRestOptions": { "Enabled": self.encryption_at_rest },
            "NodeToNodeEncryptionOptions": { "Enabled": self.node_to_node_encryption },
            "DomainEndpointOptions": {
                "EnforceHTTPS": self.enforce_https,
                "TLSSecurityPolicy": TLS_SECURITY_POLICY,
            },
            "AdvancedSecurityOptions": {
                "Enabled": true,
                "InternalUserDatabaseEnabled": true,
                "MasterUserOptions": {
                    "MasterUserName": fgac.master_user_name.to_template(),
                    "MasterUserPassword": fgac.master_user_password.to_template(),
                },
            },
        });

        if !self.access_policies.is_empty() {
            properties["AccessPolicies"] = policy_document(&self.access_policies);
        }

        let mut resource =
            TemplateResource::new(DOMAIN_RESOURCE_TYPE, properties, self.removal_policy);
        for id in self.depends_on() {
            resource = resource.with_depends_on(id);
        }
        Ok(resource)
    }
}
