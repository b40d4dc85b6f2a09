//! スタック
//!
//! 1回の実行ごとに設定とクレデンシャルストアから生成される合成オブジェクト。
//! プロセス全体で共有される状態は持ちません。

use crate::composer::compose_infrastructure;
use crate::credential::CredentialStore;
use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use crate::outputs::{OutputBinding, ResolvedOutput, emit_outputs, resolve_outputs};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use vandelay_cloud::{
    GlobalState, PHYSICAL_NAME_ATTRIBUTE, ProvisioningEngine, StateManager, Template,
};
use vandelay_config::StackSettings;

/// 合成済みのスタック
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    pub graph: ResourceGraph,
    pub outputs: Vec<OutputBinding>,
    pub template: Template,
}

impl SynthesizedStack {
    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.name.as_str()).collect()
    }
}

pub struct Stack {
    settings: StackSettings,
    store: Arc<dyn CredentialStore>,
}

impl Stack {
    pub fn new(settings: StackSettings, store: Arc<dyn CredentialStore>) -> Self {
        Self { settings, store }
    }

    pub fn name(&self) -> &str {
        &self.settings.stack_name
    }

    pub fn settings(&self) -> &StackSettings {
        &self.settings
    }

    /// リソースグラフを合成
    pub fn compose(&self) -> Result<ResourceGraph> {
        compose_infrastructure(self.settings.variant, self.store.as_ref())
    }

    /// グラフ・出力・テンプレートをまとめて合成
    pub fn synth(&self) -> Result<SynthesizedStack> {
        vandelay_config::validate_stack_name(self.name())?;
        let graph = self.compose()?;
        let outputs = emit_outputs(&graph)?;
        let mut template = graph.synthesize(&outputs)?;
        template.description = Some(format!(
            "{} ({})",
            self.settings.stack_name, self.settings.variant
        ));

        info!(
            stack = %self.name(),
            resources = template.resources.len(),
            outputs = template.outputs.len(),
            "Synthesized stack"
        );
        Ok(SynthesizedStack {
            graph,
            outputs,
            template,
        })
    }

    /// 合成したテンプレートを出力先に書き出す
    pub fn write_template(&self, synthesized: &SynthesizedStack) -> Result<PathBuf> {
        let path = self.settings.template_path();
        synthesized.template.write(&path)?;
        info!(path = %path.display(), "Wrote stack template");
        Ok(path)
    }

    /// 固定名が他のスタックのリソースと衝突していないか検証
    pub fn check_conflicts(&self, graph: &ResourceGraph, state: &GlobalState) -> Result<()> {
        for resource in graph.resources() {
            let Some(name) = resource.physical_name() else {
                continue;
            };
            let owners = state.find_by_physical_name(resource.resource_type(), name);
            if let Some((key, _)) = owners
                .iter()
                .find(|(k, _)| GlobalState::owner(k) != Some(self.name()))
            {
                return Err(StackError::DeclarationConflict {
                    name: name.to_string(),
                    reason: format!("{} が既に使用しています", key),
                });
            }
        }
        Ok(())
    }

    /// エンジンでスタックを実体化し、解決済みの出力を返す
    pub async fn deploy(
        &self,
        engine: &dyn ProvisioningEngine,
        state_manager: &StateManager,
    ) -> Result<Vec<ResolvedOutput>> {
        let lock = state_manager.acquire_lock().await?;
        let mut state = state_manager.load().await?;

        let synthesized = self.synth()?;
        self.check_conflicts(&synthesized.graph, &state)?;

        info!(stack = %self.name(), engine = %engine.name(), "Materializing stack");
        let mut materialized = engine
            .materialize(self.name(), &synthesized.template)
            .await?;
        materialized.ensure_complete(&synthesized.template)?;

        for resource in synthesized.graph.resources() {
            if let (Some(name), Some(entry)) = (
                resource.physical_name(),
                materialized.resources.resources.get_mut(resource.logical_id()),
            ) {
                entry.set_attribute(PHYSICAL_NAME_ATTRIBUTE, serde_json::json!(name));
            }
        }

        let outputs = resolve_outputs(&synthesized.outputs, &materialized.resources)?;

        state.record_stack(self.name(), &materialized.resources);
        state_manager.save(&state).await?;
        lock.release().await?;

        for output in &outputs {
            debug!(name = %output.name, value = %output.value, "Resolved output");
        }
        Ok(outputs)
    }

    /// スタックを破棄し、状態から取り除いたリソース数を返す
    pub async fn destroy(
        &self,
        engine: &dyn ProvisioningEngine,
        state_manager: &StateManager,
    ) -> Result<usize> {
        let lock = state_manager.acquire_lock().await?;
        let mut state = state_manager.load().await?;

        let synthesized = self.synth()?;
        info!(stack = %self.name(), engine = %engine.name(), "Tearing down stack");
        engine.teardown(self.name(), &synthesized.template).await?;

        let removed = state.remove_stack(self.name());
        state_manager.save(&state).await?;
        lock.release().await?;

        Ok(removed)
    }

    /// 記録済みの状態から出力を解決
    pub async fn outputs(&self, state_manager: &StateManager) -> Result<Vec<ResolvedOutput>> {
        let state = state_manager.load().await?;
        let graph = self.compose()?;
        let outputs = emit_outputs(&graph)?;
        resolve_outputs(&outputs, &state.stack_state(self.name()))
    }
}
