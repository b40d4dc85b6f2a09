use thiserror::Error;
use vandelay_cloud::CloudError;
use vandelay_config::ConfigError;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("宣言が競合しています: {name}\n理由: {reason}")]
    DeclarationConflict { name: String, reason: String },

    #[error("シークレット値の生成に失敗しました: {0}")]
    GenerationFailure(String),

    #[error("無効な宣言: {resource}\n理由: {message}")]
    InvalidDeclaration { resource: String, message: String },

    #[error("リソースが重複しています: {0}")]
    DuplicateResource(String),

    #[error("未宣言のリソースを参照しています: {from} -> {to}")]
    DanglingReference { from: String, to: String },

    #[error("リソースが見つかりません: {0}")]
    MissingResource(String),

    #[error("シークレット {secret} にフィールド {field} がありません")]
    UnknownSecretField { secret: String, field: String },

    #[error("クラウドエラー: {0}")]
    Cloud(#[from] CloudError),

    #[error("設定エラー: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, StackError>;
