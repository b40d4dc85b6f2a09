//! Vandelay Core
//!
//! 検索クラスタ（OpenSearch Service）と任意のストレージバケットからなる
//! スタックを合成します。
//!
//! 処理の流れ:
//!
//! 1. [`credential`] が管理者クレデンシャルを作成し、不透明な参照を返す
//! 2. [`composer`] が参照をクラスタのアクセス制御に配線してグラフを組み立てる
//! 3. [`outputs`] が公開する出力を遅延値として宣言する
//!
//! 実体化は外部のプロビジョニングエンジンが行います（[`stack::Stack::deploy`]）。

pub mod composer;
pub mod credential;
pub mod error;
pub mod graph;
pub mod model;
pub mod outputs;
pub mod stack;

pub use composer::compose_infrastructure;
pub use credential::{
    CredentialReference, CredentialStore, DeferredCredentialStore, FieldValue,
    InMemoryCredentialStore, SecretHandle, create_admin_credential,
};
pub use error::{Result, StackError};
pub use graph::ResourceGraph;
pub use model::Resource;
pub use outputs::{OutputBinding, ResolvedOutput, emit_outputs, resolve_outputs};
pub use stack::{Stack, SynthesizedStack};
pub use vandelay_config::{StackSettings, Variant};
