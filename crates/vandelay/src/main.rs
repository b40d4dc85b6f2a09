//! Art Vandelay スタックのエントリポイント
//!
//! 引数なしで実行し、設定に従ってテンプレートを合成して書き出します。
//! 実体化は外部のプロビジョニングエンジンが担当します。

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vandelay_cloud::StateManager;
use vandelay_core::{DeferredCredentialStore, Stack};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = vandelay_config::load().context("スタック設定の読み込みに失敗しました")?;
    let project_root = std::env::current_dir()?;
    let state_manager = StateManager::with_state_dir(&project_root, &settings.state_dir);

    let stack = Stack::new(settings, Arc::new(DeferredCredentialStore::new()));
    let synthesized = stack.synth().context("スタックの合成に失敗しました")?;

    // 記録済みの状態と固定名の衝突を検査
    let state = state_manager
        .load()
        .await
        .context("状態ファイルの読み込みに失敗しました")?;
    stack.check_conflicts(&synthesized.graph, &state)?;

    let path = stack
        .write_template(&synthesized)
        .context("テンプレートの書き出しに失敗しました")?;

    println!("{}", path.display());
    for name in synthesized.output_names() {
        println!("  output: {}", name);
    }

    Ok(())
}
