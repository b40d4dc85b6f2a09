//! 管理者クレデンシャル用シークレットの宣言

use crate::error::{Result, StackError};
use serde_json::json;
use std::collections::BTreeMap;
use vandelay_cloud::{RemovalPolicy, TemplateResource};

pub const SECRET_RESOURCE_TYPE: &str = "AWS::SecretsManager::Secret";

/// CloudFormation の既定と同じ長さ
pub const DEFAULT_PASSWORD_LENGTH: usize = 32;

const PUNCTUATION: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// 生成するフィールドとその文字種ポリシー
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratorSpec {
    /// 生成値を格納するキー
    pub generate_key: String,

    /// 記号を除外するか
    pub exclude_punctuation: bool,

    /// 生成する文字数
    pub length: usize,
}

impl GeneratorSpec {
    pub fn new(generate_key: impl Into<String>) -> Self {
        Self {
            generate_key: generate_key.into(),
            exclude_punctuation: false,
            length: DEFAULT_PASSWORD_LENGTH,
        }
    }

    pub fn excluding_punctuation(mut self) -> Self {
        self.exclude_punctuation = true;
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// 生成に使う文字集合
    pub fn charset(&self) -> Vec<u8> {
        let mut charset = ALPHANUMERIC.to_vec();
        if !self.exclude_punctuation {
            charset.extend_from_slice(PUNCTUATION);
        }
        charset
    }

    /// 値がこのポリシーを満たすか
    pub fn permits(&self, value: &str) -> bool {
        let charset = self.charset();
        value.len() == self.length && value.bytes().all(|b| charset.contains(&b))
    }
}

/// 生成値とマージされる固定フィールド
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SecretTemplate {
    fields: BTreeMap<String, String>,
}

impl SecretTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields.iter()
    }

    /// `SecretStringTemplate` 用のJSON文字列
    pub fn to_json_string(&self) -> String {
        json!(self.fields).to_string()
    }
}

/// シークレットの宣言
///
/// 生成されたパスワードはここには保持しない。値はクレデンシャルストアだけが持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSecret {
    pub logical_id: String,
    pub name: String,
    pub template: SecretTemplate,
    pub generator: GeneratorSpec,
    pub removal_policy: RemovalPolicy,
}

impl CredentialSecret {
    pub fn new(
        logical_id: impl Into<String>,
        name: impl Into<String>,
        template: SecretTemplate,
        generator: GeneratorSpec,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            name: name.into(),
            template,
            generator,
            removal_policy: RemovalPolicy::Destroy,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| StackError::InvalidDeclaration {
            resource: self.logical_id.clone(),
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("シークレット名が空です"));
        }
        if self.template.contains(&self.generator.generate_key) {
            return Err(invalid("生成キーがテンプレートのフィールドと重複しています"));
        }
        if self.generator.length == 0 {
            return Err(invalid("生成する文字数が0です"));
        }
        Ok(())
    }

    pub fn to_template_resource(&self) -> Result<TemplateResource> {
        self.validate()?;
        Ok(TemplateResource::new(
            SECRET_RESOURCE_TYPE,
            json!({
                "Name": self.name,
                "GenerateSecretString": {
                    "SecretStringTemplate": self.template.to_json_string(),
                    "GenerateStringKey": self.generator.generate_key,
                    "ExcludePunctuation": self.generator.exclude_punctuation,
                    "PasswordLength": self.generator.length,
                },
            }),
            self.removal_policy,
        ))
    }
}
