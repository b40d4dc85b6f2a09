//! アクセスポリシー
//!
//! 検索クラスタに付与するリソースベースのポリシーステートメント。

use serde_json::{Map, Value, json};

const POLICY_VERSION: &str = "2012-10-17";

/// 許可 / 拒否
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// ステートメントの対象プリンシパル
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// 任意のプリンシパル (`*`)
    Any,
    /// IAM ARN またはアカウント
    Aws(String),
    /// サービスプリンシパル (`es.amazonaws.com` など)
    Service(String),
}

impl Principal {
    fn key(&self) -> &'static str {
        match self {
            Principal::Any | Principal::Aws(_) => "AWS",
            Principal::Service(_) => "Service",
        }
    }

    fn value(&self) -> &str {
        match self {
            Principal::Any => "*",
            Principal::Aws(arn) => arn,
            Principal::Service(service) => service,
        }
    }
}

/// ポリシーステートメント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub principals: Vec<Principal>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn new(effect: Effect) -> Self {
        Self {
            effect,
            actions: Vec::new(),
            principals: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principals.push(principal);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    /// 全プリンシパルに全アクションを許可するステートメント
    ///
    /// 開発用の既定値。本番環境では使用しないこと。
    pub fn allow_everything() -> Self {
        Self::new(Effect::Allow)
            .with_action("es:*")
            .with_principal(Principal::Any)
            .with_resource("*")
    }

    /// 誰に対しても全アクションを許可しているか
    pub fn is_wide_open(&self) -> bool {
        self.effect == Effect::Allow
            && self.actions.iter().any(|a| a == "es:*" || a == "*")
            && self.principals.contains(&Principal::Any)
            && self.resources.iter().any(|r| r == "*")
    }

    pub fn to_json(&self) -> Value {
        let mut principal: Map<String, Value> = Map::new();
        for p in &self.principals {
            let entry = principal
                .entry(p.key().to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(values) = entry {
                values.push(Value::String(p.value().to_string()));
            }
        }
        let principal: Map<String, Value> = principal
            .into_iter()
            .map(|(k, v)| (k, collapse(v)))
            .collect();

        let mut statement = json!({
            "Effect": self.effect.as_str(),
            "Action": collapse_strings(&self.actions),
            "Resource": collapse_strings(&self.resources),
        });
        if !principal.is_empty() {
            statement["Principal"] = Value::Object(principal);
        }
        statement
    }
}

/// ステートメントを束ねたポリシードキュメント
pub fn policy_document(statements: &[PolicyStatement]) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
    })
}

// 要素が1つなら配列ではなく単一値で出力
fn collapse(value: Value) -> Value {
    match value {
        Value::Array(mut values) if values.len() == 1 => values.remove(0),
        other => other,
    }
}

fn collapse_strings(values: &[String]) -> Value {
    collapse(Value::Array(
        values.iter().cloned().map(Value::String).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_everything_renders_any_principal() {
        let statement = PolicyStatement::allow_everything();
        assert!(statement.is_wide_open());
        assert_eq!(
            statement.to_json(),
            json!({
                "Effect": "Allow",
                "Action": "es:*",
                "Principal": { "AWS": "*" },
                "Resource": "*",
            })
        );
    }

    #[test]
    fn test_multiple_principals_grouped_by_kind() {
        let statement = PolicyStatement::new(Effect::Deny)
            .with_action("es:ESHttpDelete")
            .with_action("es:ESHttpPut")
            .with_principal(Principal::Aws("arn:aws:iam::1:root".to_string()))
            .with_principal(Principal::Aws("arn:aws:iam::2:root".to_string()))
            .with_principal(Principal::Service("es.amazonaws.com".to_string()))
            .with_resource("arn:aws:es:us-east-1:1:domain/x/*");

        assert!(!statement.is_wide_open());
        let value = statement.to_json();
        assert_eq!(value["Effect"], "Deny");
        assert_eq!(value["Action"], json!(["es:ESHttpDelete", "es:ESHttpPut"]));
        assert_eq!(
            value["Principal"]["AWS"],
            json!(["arn:aws:iam::1:root", "arn:aws:iam::2:root"])
        );
        assert_eq!(value["Principal"]["Service"], "es.amazonaws.com");
    }

    #[test]
    fn test_policy_document_version() {
        let doc = policy_document(&[PolicyStatement::allow_everything()]);
        assert_eq!(doc["Version"], "2012-10-17");
        assert_eq!(doc["Statement"].as_array().unwrap().len(), 1);
    }
}
