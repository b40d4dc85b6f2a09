//! 管理者クレデンシャルのプロビジョニング
//!
//! クレデンシャルストアにユーザー名・パスワードの組を生成させ、
//! 呼び出し側には不透明な [`CredentialReference`] だけを返します。
//!
//! ## セキュリティ
//!
//! - パスワードの平文はテンプレート・ログ・`Debug` 出力に現れません
//! - 参照のアクセサは常に遅延値 ([`Deferred`]) を返します
//! - 解決済みの値は [`Zeroizing`] バッファで保持されます

use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use crate::model::{CredentialSecret, GeneratorSpec, Resource, SecretTemplate};
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info};
use vandelay_cloud::Deferred;
use zeroize::Zeroizing;

pub const USERNAME_FIELD: &str = "username";
pub const PASSWORD_FIELD: &str = "password";
pub const ADMIN_USERNAME: &str = "admin";

/// 管理者シークレットの論理ID
pub const ADMIN_SECRET_LOGICAL_ID: &str = "OpenSearchMainUserSecret";

/// ストアが保持するシークレットへのハンドル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretHandle {
    pub name: String,

    /// 既存のシークレットを再利用したか
    pub reused: bool,
}

impl SecretHandle {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reused: false,
        }
    }
}

/// フィールドの読み出し結果
pub enum FieldValue {
    /// 既に確定している値
    Resolved(Zeroizing<String>),
    /// プロビジョニング時に解決される値
    Deferred(Deferred),
}

impl FieldValue {
    pub fn is_resolved(&self) -> bool {
        matches!(self, FieldValue::Resolved(_))
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Resolved(value) => {
                write!(f, "Resolved([REDACTED {} bytes])", value.len())
            }
            FieldValue::Deferred(deferred) => f.debug_tuple("Deferred").field(deferred).finish(),
        }
    }
}

/// クレデンシャルストア
///
/// 同名のシークレットを同じポリシーで再作成した場合は既存の値を返し、
/// パスワードを再生成してはならない。異なるポリシーでの再作成は
/// [`StackError::DeclarationConflict`] となる。
pub trait CredentialStore: Send + Sync {
    /// ストア名（ログ用）
    fn name(&self) -> &str;

    fn create_secret(
        &self,
        name: &str,
        template: &SecretTemplate,
        generator: &GeneratorSpec,
    ) -> Result<SecretHandle>;

    fn read_field(&self, handle: &SecretHandle, field: &str) -> Result<FieldValue>;
}

fn conflict(name: &str) -> StackError {
    StackError::DeclarationConflict {
        name: name.to_string(),
        reason: "同名のシークレットが異なるテンプレートまたは生成ポリシーで存在します".to_string(),
    }
}

fn poisoned() -> StackError {
    StackError::GenerationFailure("クレデンシャルストアのロックが破損しています".to_string())
}

/// 生成をプロビジョニングエンジンに委ねるストア
///
/// 宣言だけを記録し、フィールドは常に遅延値として返します。
#[derive(Default)]
pub struct DeferredCredentialStore {
    declared: Mutex<HashMap<String, (SecretTemplate, GeneratorSpec)>>,
}

impl DeferredCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for DeferredCredentialStore {
    fn name(&self) -> &str {
        "deferred"
    }

    fn create_secret(
        &self,
        name: &str,
        template: &SecretTemplate,
        generator: &GeneratorSpec,
    ) -> Result<SecretHandle> {
        ensure_satisfiable(generator)?;
        let mut declared = self.declared.lock().map_err(|_| poisoned())?;
        match declared.get(name) {
            Some((t, g)) if t == template && g == generator => Ok(SecretHandle {
                name: name.to_string(),
                reused: true,
            }),
            Some(_) => Err(conflict(name)),
            None => {
                declared.insert(name.to_string(), (template.clone(), generator.clone()));
                Ok(SecretHandle::named(name))
            }
        }
    }

    fn read_field(&self, handle: &SecretHandle, field: &str) -> Result<FieldValue> {
        let declared = self.declared.lock().map_err(|_| poisoned())?;
        let (template, generator) = declared
            .get(&handle.name)
            .ok_or_else(|| StackError::MissingResource(handle.name.clone()))?;
        if !template.contains(field) && generator.generate_key != field {
            return Err(StackError::UnknownSecretField {
                secret: handle.name.clone(),
                field: field.to_string(),
            });
        }
        Ok(FieldValue::Deferred(Deferred::secret_field(&handle.name, field)))
    }
}

struct StoredSecret {
    template: SecretTemplate,
    generator: GeneratorSpec,
    fields: BTreeMap<String, Zeroizing<String>>,
}

/// プロセス内で値を生成・保持するストア（開発・テスト用）
#[derive(Default)]
pub struct InMemoryCredentialStore {
    secrets: Mutex<HashMap<String, StoredSecret>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.secrets.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn create_secret(
        &self,
        name: &str,
        template: &SecretTemplate,
        generator: &GeneratorSpec,
    ) -> Result<SecretHandle> {
        let mut secrets = self.secrets.lock().map_err(|_| poisoned())?;

        if let Some(existing) = secrets.get(name) {
            if &existing.template == template && &existing.generator == generator {
                debug!(secret = %name, "Reusing existing secret");
                return Ok(SecretHandle {
                    name: name.to_string(),
                    reused: true,
                });
            }
            return Err(conflict(name));
        }

        let mut fields: BTreeMap<String, Zeroizing<String>> = template
            .fields()
            .map(|(k, v)| (k.clone(), Zeroizing::new(v.clone())))
            .collect();
        fields.insert(generator.generate_key.clone(), generate_value(generator)?);

        secrets.insert(
            name.to_string(),
            StoredSecret {
                template: template.clone(),
                generator: generator.clone(),
                fields,
            },
        );
        debug!(secret = %name, field = %generator.generate_key, "Generated secret value");
        Ok(SecretHandle::named(name))
    }

    fn read_field(&self, handle: &SecretHandle, field: &str) -> Result<FieldValue> {
        let secrets = self.secrets.lock().map_err(|_| poisoned())?;
        let secret = secrets
            .get(&handle.name)
            .ok_or_else(|| StackError::MissingResource(handle.name.clone()))?;
        let value = secret
            .fields
            .get(field)
            .ok_or_else(|| StackError::UnknownSecretField {
                secret: handle.name.clone(),
                field: field.to_string(),
            })?;
        Ok(FieldValue::Resolved(value.clone()))
    }
}

/// 生成できる最大文字数（Secrets Manager の上限）
pub const MAX_GENERATED_LENGTH: usize = 4096;

/// ポリシーを満たす値が生成可能か検査
pub fn ensure_satisfiable(spec: &GeneratorSpec) -> Result<()> {
    if spec.length == 0 || spec.length > MAX_GENERATED_LENGTH || spec.charset().is_empty() {
        return Err(StackError::GenerationFailure(format!(
            "{} の生成ポリシーを満たす値を作れません（{}文字）",
            spec.generate_key, spec.length
        )));
    }
    Ok(())
}

/// ポリシーに従ってランダムな値を生成
pub fn generate_value(spec: &GeneratorSpec) -> Result<Zeroizing<String>> {
    ensure_satisfiable(spec)?;
    let charset = spec.charset();

    let mut rng = rand::thread_rng();
    let value: String = (0..spec.length)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect();
    Ok(Zeroizing::new(value))
}

/// 管理者クレデンシャルへの不透明な参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialReference {
    secret_logical_id: String,
    handle: SecretHandle,
}

impl CredentialReference {
    pub fn secret_logical_id(&self) -> &str {
        &self.secret_logical_id
    }

    pub fn secret_name(&self) -> &str {
        &self.handle.name
    }

    pub fn handle(&self) -> &SecretHandle {
        &self.handle
    }

    pub fn field_value(&self, field: &str) -> Deferred {
        Deferred::secret_field(&self.handle.name, field)
    }

    pub fn username_value(&self) -> Deferred {
        self.field_value(USERNAME_FIELD)
    }

    pub fn password_value(&self) -> Deferred {
        self.field_value(PASSWORD_FIELD)
    }
}

/// シークレット参照の遅延値をストアで解決
pub fn resolve_secret_field(store: &dyn CredentialStore, value: &Deferred) -> Result<FieldValue> {
    match value {
        Deferred::SecretField { secret_name, field } => {
            store.read_field(&SecretHandle::named(secret_name), field)
        }
        other => Err(StackError::InvalidDeclaration {
            resource: other.logical_id().unwrap_or_default().to_string(),
            message: "シークレット参照ではありません".to_string(),
        }),
    }
}

/// 管理者クレデンシャルを作成し、グラフにシークレットを宣言する
///
/// `seed` には少なくとも `username` が必要です。`password` はストアが生成します。
pub fn create_admin_credential(
    store: &dyn CredentialStore,
    graph: &mut ResourceGraph,
    secret_name: &str,
    seed: SecretTemplate,
) -> Result<CredentialReference> {
    if !seed.contains(USERNAME_FIELD) {
        return Err(StackError::InvalidDeclaration {
            resource: ADMIN_SECRET_LOGICAL_ID.to_string(),
            message: "シードに username が必要です".to_string(),
        });
    }

    let generator = GeneratorSpec::new(PASSWORD_FIELD).excluding_punctuation();
    let secret = CredentialSecret::new(ADMIN_SECRET_LOGICAL_ID, secret_name, seed, generator);
    secret.validate()?;

    let handle = store.create_secret(&secret.name, &secret.template, &secret.generator)?;
    info!(
        secret = %secret.name,
        store = %store.name(),
        reused = handle.reused,
        "Provisioned admin credential"
    );

    graph.declare(Resource::Secret(secret))?;

    Ok(CredentialReference {
        secret_logical_id: ADMIN_SECRET_LOGICAL_ID.to_string(),
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vandelay_config::Variant;

    fn seed() -> SecretTemplate {
        SecretTemplate::new().with_field(USERNAME_FIELD, ADMIN_USERNAME)
    }

    #[test]
    fn test_generator_bounds() {
        let spec = GeneratorSpec::new(PASSWORD_FIELD).excluding_punctuation();
        let short = spec.clone().with_length(1);
        assert!(short.permits(&generate_value(&short).unwrap()));
        for length in [0, MAX_GENERATED_LENGTH + 1] {
            assert!(matches!(
                generate_value(&spec.clone().with_length(length)),
                Err(StackError::GenerationFailure(_))
            ));
        }
    }

    fn password(store: &dyn CredentialStore, name: &str) -> String {
        match store
            .read_field(&SecretHandle::named(name), PASSWORD_FIELD)
            .unwrap()
        {
            FieldValue::Resolved(value) => value.to_string(),
            FieldValue::Deferred(_) => panic!("expected resolved value"),
        }
    }

    #[test]
    fn test_generated_password_excludes_punctuation() {
        let store = InMemoryCredentialStore::new();
        let mut graph = ResourceGraph::new(Variant::SearchOnly);
        create_admin_credential(&store, &mut graph, "main-user", seed()).unwrap();

        let value = password(&store, "main-user");
        assert_eq!(value.len(), 32);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_existing_secret_is_not_regenerated() {
        let store = InMemoryCredentialStore::new();

        let mut first = ResourceGraph::new(Variant::SearchOnly);
        let r1 = create_admin_credential(&store, &mut first, "main-user", seed()).unwrap();
        let before = password(&store, "main-user");

        let mut second = ResourceGraph::new(Variant::SearchOnly);
        let r2 = create_admin_credential(&store, &mut second, "main-user", seed()).unwrap();

        assert!(!r1.handle().reused);
        assert!(r2.handle().reused);
        assert_eq!(before, password(&store, "main-user"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_incompatible_redeclaration_conflicts() {
        let store = InMemoryCredentialStore::new();
        store
            .create_secret("main-user", &seed(), &GeneratorSpec::new(PASSWORD_FIELD))
            .unwrap();

        let mut graph = ResourceGraph::new(Variant::SearchOnly);
        let err = create_admin_credential(&store, &mut graph, "main-user", seed()).unwrap_err();
        assert!(matches!(err, StackError::DeclarationConflict { .. }));
        assert!(graph.resources().is_empty());
    }

    #[test]
    fn test_deferred_store_never_resolves() {
        let store = DeferredCredentialStore::new();
        let mut graph = ResourceGraph::new(Variant::SearchOnly);
        let reference = create_admin_credential(&store, &mut graph, "main-user", seed()).unwrap();

        let value = resolve_secret_field(&store, &reference.password_value()).unwrap();
        assert!(!value.is_resolved());

        let err = store
            .read_field(reference.handle(), "token")
            .unwrap_err();
        assert!(matches!(err, StackError::UnknownSecretField { .. }));
    }

    #[test]
    fn test_reference_accessors_are_deferred() {
        let store = InMemoryCredentialStore::new();
        let mut graph = ResourceGraph::new(Variant::SearchOnly);
        let reference = create_admin_credential(&store, &mut graph, "main-user", seed()).unwrap();

        assert_eq!(
            reference.username_value(),
            Deferred::secret_field("main-user", "username")
        );
        assert!(reference.password_value().is_sensitive());

        let resolved = resolve_secret_field(&store, &reference.username_value()).unwrap();
        match resolved {
            FieldValue::Resolved(v) => assert_eq!(v.as_str(), "admin"),
            FieldValue::Deferred(_) => panic!("expected resolved username"),
        }
    }

    #[test]
    fn test_debug_redacts_resolved_values() {
        let store = InMemoryCredentialStore::new();
        let mut graph = ResourceGraph::new(Variant::SearchOnly);
        create_admin_credential(&store, &mut graph, "main-user", seed()).unwrap();

        let secret = password(&store, "main-user");
        let value = store
            .read_field(&SecretHandle::named("main-user"), PASSWORD_FIELD)
            .unwrap();
        let debug = format!("{:?}", value);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(&secret));
    }

    #[test]
    fn test_seed_requires_username() {
        let store = InMemoryCredentialStore::new();
        let mut graph = ResourceGraph::new(Variant::SearchOnly);
        let err =
            create_admin_credential(&store, &mut graph, "main-user", SecretTemplate::new())
                .unwrap_err();
        assert!(matches!(err, StackError::InvalidDeclaration { .. }));
        assert!(store.is_empty());
    }
}
