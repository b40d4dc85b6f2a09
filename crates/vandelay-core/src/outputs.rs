//! スタック出力
//!
//! 出力は「何を公開するか」の宣言で、値はエンジンの実体化後に
//! [`resolve_outputs`] で確定します。

use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use serde::Serialize;
use vandelay_cloud::{Deferred, ProviderState};

pub const DOMAIN_ENDPOINT_OUTPUT: &str = "OpenSearchDomainEndpoint";
pub const BUCKET_NAME_OUTPUT: &str = "ArtVandelayBucketName";

/// 名前付きの遅延出力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBinding {
    pub name: String,
    pub value: Deferred,
    pub description: Option<String>,
}

impl OutputBinding {
    pub fn new(name: impl Into<String>, value: Deferred) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 解決済みの出力
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOutput {
    pub name: String,
    pub value: String,
}

/// グラフから公開する出力を順序付きで宣言
pub fn emit_outputs(graph: &ResourceGraph) -> Result<Vec<OutputBinding>> {
    let cluster = graph
        .search_clusters()
        .into_iter()
        .next()
        .ok_or_else(|| StackError::MissingResource("search cluster".to_string()))?;

    let mut outputs = vec![
        OutputBinding::new(DOMAIN_ENDPOINT_OUTPUT, cluster.endpoint())
            .with_description("OpenSearch domain endpoint"),
    ];

    if graph.variant().includes_storage() {
        let bucket = graph
            .buckets()
            .into_iter()
            .next()
            .ok_or_else(|| StackError::MissingResource("storage bucket".to_string()))?;
        outputs.push(
            OutputBinding::new(BUCKET_NAME_OUTPUT, bucket.name())
                .with_description("Art Vandelay bucket name"),
        );
    }

    Ok(outputs)
}

/// 実体化されたリソースの状態から出力値を解決
pub fn resolve_outputs(
    outputs: &[OutputBinding],
    state: &ProviderState,
) -> Result<Vec<ResolvedOutput>> {
    outputs
        .iter()
        .map(|output| {
            Ok(ResolvedOutput {
                name: output.name.clone(),
                value: output.value.resolve(state)?,
            })
        })
        .collect()
}
