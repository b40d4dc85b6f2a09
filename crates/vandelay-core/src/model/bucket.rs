//! ストレージバケットの宣言

use crate::error::{Result, StackError};
use serde_json::json;
pub use vandelay_cloud::AUTO_DELETE_OBJECTS_TAG;
use vandelay_cloud::{Deferred, RemovalPolicy, TemplateResource};

pub const BUCKET_RESOURCE_TYPE: &str = "AWS::S3::Bucket";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageBucket {
    pub logical_id: String,
    pub bucket_name: String,
    pub removal_policy: RemovalPolicy,
    pub auto_delete_objects: bool,
}

impl StorageBucket {
    pub fn new(logical_id: impl Into<String>, bucket_name: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            bucket_name: bucket_name.into(),
            removal_policy: RemovalPolicy::Destroy,
            auto_delete_objects: false,
        }
    }

    pub fn with_auto_delete_objects(mut self) -> Self {
        self.auto_delete_objects = true;
        self
    }

    /// デプロイ後に確定するバケット名（`Ref`）
    pub fn name(&self) -> Deferred {
        Deferred::reference(&self.logical_id)
    }

    pub fn validate(&self) -> Result<()> {
        let name = &self.bucket_name;
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
        let valid_edges = name.chars().next().zip(name.chars().last()).is_some_and(
            |(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric(),
        );

        if !(3..=63).contains(&name.len()) || !valid_chars || !valid_edges {
            return Err(StackError::InvalidDeclaration {
                resource: self.logical_id.clone(),
                message: format!("バケット名 {} は命名規則を満たしていません", name),
            });
        }
        // 自動削除は削除ポリシーと組み合わせる必要がある
        if self.auto_delete_objects && self.removal_policy != RemovalPolicy::Destroy {
            return Err(StackError::InvalidDeclaration {
                resource: self.logical_id.clone(),
                message: "オブジェクトの自動削除には削除ポリシー destroy が必要です".to_string(),
            });
        }
        Ok(())
    }

    /// テンプレート上のリソース
    ///
    /// 自動削除はタグとしてのみ表現し、カスタムリソースは宣言しません。
    /// 中身を空にする処理はプロビジョニングエンジンが破棄時に行います。
    pub fn to_template_resource(&self) -> Result<TemplateResource> {
        self.validate()?;

        let mut properties = json!({ "BucketName": self.bucket_name });
        if self.auto_delete_objects {
            properties["Tags"] = json!([{ "Key": AUTO_DELETE_OBJECTS_TAG, "Value": "true" }]);
        }
        Ok(TemplateResource::new(
            BUCKET_RESOURCE_TYPE,
            properties,
            self.removal_policy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_delete_tag() {
        let resource = StorageBucket::new("Bucket", "art-vandelay")
            .with_auto_delete_objects()
            .to_template_resource()
            .unwrap();
        assert_eq!(resource.properties["BucketName"], "art-vandelay");
        assert_eq!(resource.properties["Tags"][0]["Key"], AUTO_DELETE_OBJECTS_TAG);
        assert!(resource.tag_enabled(AUTO_DELETE_OBJECTS_TAG));
        assert_eq!(resource.deletion_policy, RemovalPolicy::Destroy);

        let plain = StorageBucket::new("Bucket", "art-vandelay")
            .to_template_resource()
            .unwrap();
        assert!(plain.properties.get("Tags").is_none());
    }

    #[test]
    fn test_name_is_ref() {
        let bucket = StorageBucket::new("Bucket", "art-vandelay");
        assert_eq!(bucket.name(), Deferred::reference("Bucket"));
    }

    #[test]
    fn test_invalid_bucket_names() {
        for name in ["ab", "Art-Vandelay", "-art", "art_vandelay"] {
            assert!(
                StorageBucket::new("Bucket", name).validate().is_err(),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_auto_delete_requires_destroy() {
        let mut bucket = StorageBucket::new("Bucket", "art-vandelay").with_auto_delete_objects();
        bucket.removal_policy = RemovalPolicy::Retain;
        assert!(bucket.validate().is_err());
    }
}
