//! スタック設定
//!
//! `vandelay.kdl` の `stack` ノードをパースして [`StackSettings`] を生成します。
//!
//! ```kdl
//! stack "ArtVandelayDbStack" {
//!     variant "search-plus-storage"
//!     account "123456789012"
//!     region "us-east-1"
//!     out-dir "cdk.out"
//!     state-dir ".vandelay"
//! }
//! ```
//!
//! 設定はリソース名（シークレット名・バケット名）には影響しません。

use crate::error::{ConfigError, Result};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

pub const DEFAULT_STACK_NAME: &str = "ArtVandelayDbStack";
pub const DEFAULT_OUT_DIR: &str = "cdk.out";
pub const DEFAULT_STATE_DIR: &str = ".vandelay";
pub const MAX_STACK_NAME_LEN: usize = 128;

/// アカウント・リージョンのフォールバックに使う環境変数
pub const ACCOUNT_ENV: &str = "CDK_DEFAULT_ACCOUNT";
pub const REGION_ENV: &str = "CDK_DEFAULT_REGION";

/// 構成バリアント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// 検索クラスタのみ
    SearchOnly,
    /// 検索クラスタ + ストレージバケット
    #[default]
    SearchPlusStorage,
}

impl Variant {
    pub fn includes_storage(&self) -> bool {
        matches!(self, Variant::SearchPlusStorage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::SearchOnly => "search-only",
            Variant::SearchPlusStorage => "search-plus-storage",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "search-only" | "search" => Ok(Variant::SearchOnly),
            "search-plus-storage" | "search-storage" => Ok(Variant::SearchPlusStorage),
            other => Err(ConfigError::UnknownVariant(other.to_string())),
        }
    }
}

/// 1回の実行で使うスタック設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSettings {
    /// スタック名
    pub stack_name: String,

    /// 構成バリアント
    pub variant: Variant,

    /// デプロイ先アカウント
    pub account: Option<String>,

    /// デプロイ先リージョン
    pub region: Option<String>,

    /// テンプレート出力先
    pub out_dir: PathBuf,

    /// 状態ファイルのディレクトリ
    pub state_dir: PathBuf,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            variant: Variant::default(),
            account: None,
            region: None,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

impl StackSettings {
    /// 合成したテンプレートのファイル名
    pub fn template_file_name(&self) -> String {
        format!("{}.template.json", self.stack_name)
    }

    /// 合成したテンプレートの出力パス
    pub fn template_path(&self) -> PathBuf {
        self.out_dir.join(self.template_file_name())
    }

    /// 未指定のアカウント・リージョンを環境変数で補完
    pub fn with_env_defaults(mut self) -> Self {
        if self.account.is_none() {
            self.account = std::env::var(ACCOUNT_ENV).ok().filter(|v| !v.is_empty());
        }
        if self.region.is_none() {
            self.region = std::env::var(REGION_ENV).ok().filter(|v| !v.is_empty());
        }
        self
    }
}

/// 設定ファイルを読み込んでパース
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<StackSettings> {
    let content = std::fs::read_to_string(path.as_ref())?;
    debug!(path = %path.as_ref().display(), "Loading stack settings");
    parse_settings(&content)
}

/// KDL文字列をパース
pub fn parse_settings(content: &str) -> Result<StackSettings> {
    let doc: KdlDocument = content.parse()?;

    let mut settings = StackSettings::default();
    let mut seen_stack = false;

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                if seen_stack {
                    return Err(ConfigError::InvalidConfig(
                        "stack ノードは1つだけ指定できます".to_string(),
                    ));
                }
                seen_stack = true;
                parse_stack(node, &mut settings)?;
            }
            other => {
                warn!(node = %other, "Ignoring unknown top-level node");
            }
        }
    }

    Ok(settings)
}

/// スタック名の検証
///
/// CloudFormation と同じく `[A-Za-z][-A-Za-z0-9]*`（128文字以内）に限ります。
/// 状態ファイルのキー `<stack>:<logical id>` の区切りと衝突しないことが前提です。
pub fn validate_stack_name(name: &str) -> Result<()> {
    let invalid =
        |reason: &str| ConfigError::InvalidConfig(format!("スタック名 {:?} {}", name, reason));

    let Some(first) = name.chars().next() else {
        return Err(invalid("が空です"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(invalid("は英字で始める必要があります"));
    }
    if name.len() > MAX_STACK_NAME_LEN {
        return Err(invalid("が長すぎます"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid("には英数字とハイフンのみ使用できます"));
    }
    Ok(())
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

fn required_string(node: &KdlNode) -> Result<String> {
    first_string(node).map(|s| s.to_string()).ok_or_else(|| {
        ConfigError::InvalidConfig(format!("{} には文字列の値が必要です", node.name().value()))
    })
}

fn parse_stack(node: &KdlNode, settings: &mut StackSettings) -> Result<()> {
    if let Some(name) = first_string(node) {
        validate_stack_name(name)?;
        settings.stack_name = name.to_string();
    }

    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "variant" => {
                settings.variant = required_string(child)?.parse()?;
            }
            "account" => {
                settings.account = Some(required_string(child)?);
            }
            "region" => {
                settings.region = Some(required_string(child)?);
            }
            "out-dir" | "out_dir" => {
                settings.out_dir = PathBuf::from(required_string(child)?);
            }
            "state-dir" | "state_dir" => {
                settings.state_dir = PathBuf::from(required_string(child)?);
            }
            other => {
                warn!(setting = %other, "Ignoring unknown stack setting");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_without_stack_node() {
        let settings = parse_settings("// empty").unwrap();
        assert_eq!(settings, StackSettings::default());
        assert_eq!(settings.stack_name, "ArtVandelayDbStack");
        assert_eq!(settings.variant, Variant::SearchPlusStorage);
        assert_eq!(
            settings.template_path(),
            PathBuf::from("cdk.out/ArtVandelayDbStack.template.json")
        );
    }

    #[test]
    fn test_parse_full_stack() {
        let kdl = r#"
            stack "DevSearch" {
                variant "search-only"
                account "123456789012"
                region "ap-northeast-1"
                out-dir "build/out"
                state-dir "build/state"
            }
        "#;

        let settings = parse_settings(kdl).unwrap();
        assert_eq!(settings.stack_name, "DevSearch");
        assert_eq!(settings.variant, Variant::SearchOnly);
        assert_eq!(settings.account.as_deref(), Some("123456789012"));
        assert_eq!(settings.region.as_deref(), Some("ap-northeast-1"));
        assert_eq!(settings.out_dir, PathBuf::from("build/out"));
        assert_eq!(settings.state_dir, PathBuf::from("build/state"));
    }

    #[test]
    fn test_unknown_variant_rejected() {
        let kdl = r#"stack "S" { variant "everything" }"#;
        let err = parse_settings(kdl).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownVariant(v) if v == "everything"));
    }

    #[test]
    fn test_stack_name_must_be_cloudformation_safe() {
        for name in ["Art:Dev", "1Stack", "", "Art_Dev", "Art Dev"] {
            let kdl = format!("stack {:?}", name);
            assert!(
                matches!(parse_settings(&kdl), Err(ConfigError::InvalidConfig(_))),
                "{}",
                name
            );
        }
        assert!(validate_stack_name(&"A".repeat(MAX_STACK_NAME_LEN + 1)).is_err());

        let settings = parse_settings(r#"stack "Art-Dev2""#).unwrap();
        assert_eq!(settings.stack_name, "Art-Dev2");
    }

    #[test]
    fn test_duplicate_stack_rejected() {
        let kdl = r#"
            stack "A"
            stack "B"
        "#;
        assert!(matches!(
            parse_settings(kdl),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_variant_from_str_aliases() {
        assert_eq!("search_only".parse::<Variant>().unwrap(), Variant::SearchOnly);
        assert_eq!(
            "Search-Plus-Storage".parse::<Variant>().unwrap(),
            Variant::SearchPlusStorage
        );
        assert!(Variant::SearchPlusStorage.includes_storage());
        assert!(!Variant::SearchOnly.includes_storage());
    }

    #[test]
    #[serial]
    fn test_env_defaults_fill_missing_only() {
        temp_env::with_vars(
            [
                (ACCOUNT_ENV, Some("111111111111")),
                (REGION_ENV, Some("eu-west-1")),
            ],
            || {
                let settings = parse_settings(r#"stack "S" { region "us-east-1" }"#)
                    .unwrap()
                    .with_env_defaults();
                assert_eq!(settings.account.as_deref(), Some("111111111111"));
                assert_eq!(settings.region.as_deref(), Some("us-east-1"));
            },
        );
    }
}
