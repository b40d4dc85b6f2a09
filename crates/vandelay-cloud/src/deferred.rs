//! Late-bound values
//!
//! A [`Deferred`] names a value that only exists once the provisioning
//! engine has materialized the stack: a physical resource id, a runtime
//! attribute such as a domain endpoint, or a field of a stored secret.
//!
//! `Deferred` deliberately has no `Serialize` or `Display` implementation.
//! It can only be rendered into template intrinsics ([`Deferred::to_template`])
//! or resolved against materialized state ([`Deferred::resolve`]), so an
//! unresolved placeholder can never leak into output as if it were a value.

use crate::error::{CloudError, Result};
use crate::state::ProviderState;
use serde_json::{Value, json};

/// Attribute name used when a `Ref` is resolved from state
pub const REF_ATTRIBUTE: &str = "Ref";

/// A value known only after materialization
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Deferred {
    /// The physical id of a logical resource (`Ref`)
    Ref { logical_id: String },

    /// A runtime attribute of a logical resource (`Fn::GetAtt`)
    Attribute {
        logical_id: String,
        attribute: String,
    },

    /// A JSON field of a stored secret, resolved by the credential store
    SecretField { secret_name: String, field: String },
}

impl Deferred {
    pub fn reference(logical_id: impl Into<String>) -> Self {
        Deferred::Ref {
            logical_id: logical_id.into(),
        }
    }

    pub fn attribute(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Deferred::Attribute {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    pub fn secret_field(secret_name: impl Into<String>, field: impl Into<String>) -> Self {
        Deferred::SecretField {
            secret_name: secret_name.into(),
            field: field.into(),
        }
    }

    /// Logical resource this value depends on, if it is resource-bound
    pub fn logical_id(&self) -> Option<&str> {
        match self {
            Deferred::Ref { logical_id } | Deferred::Attribute { logical_id, .. } => {
                Some(logical_id)
            }
            Deferred::SecretField { .. } => None,
        }
    }

    /// Whether the resolved value must be treated as a secret
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Deferred::SecretField { .. })
    }

    /// Render as a template intrinsic
    ///
    /// Secret fields become secrets-manager dynamic references, which the
    /// engine resolves at apply time without the value entering the template.
    pub fn to_template(&self) -> Value {
        match self {
            Deferred::Ref { logical_id } => json!({ "Ref": logical_id }),
            Deferred::Attribute {
                logical_id,
                attribute,
            } => json!({ "Fn::GetAtt": [logical_id, attribute] }),
            Deferred::SecretField { secret_name, field } => Value::String(format!(
                "{{{{resolve:secretsmanager:{}:SecretString:{}::}}}}",
                secret_name, field
            )),
        }
    }

    /// Resolve a resource-bound value against materialized state
    pub fn resolve(&self, state: &ProviderState) -> Result<String> {
        let (logical_id, attribute) = match self {
            Deferred::Ref { logical_id } => (logical_id, REF_ATTRIBUTE),
            Deferred::Attribute {
                logical_id,
                attribute,
            } => (logical_id, attribute.as_str()),
            Deferred::SecretField { secret_name, .. } => {
                return Err(CloudError::InvalidConfig(format!(
                    "secret field of {} must be resolved through the credential store",
                    secret_name
                )));
            }
        };

        let resource = state
            .get(logical_id)
            .ok_or_else(|| CloudError::ResourceNotFound(logical_id.clone()))?;

        let unresolved = || CloudError::UnresolvedAttribute {
            logical_id: logical_id.clone(),
            attribute: attribute.to_string(),
        };

        if attribute == REF_ATTRIBUTE {
            if resource.id.is_empty() {
                return Err(unresolved());
            }
            return Ok(resource.id.clone());
        }

        match resource.attributes.get(attribute) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => Err(unresolved()),
            Some(other) => Ok(other.to_string()),
        }
    }
}
