//! リソースコンポーザー
//!
//! 2つの構成バリアントを1つのパラメータ化された合成処理で宣言します。
//!
//! クラスタに付与されるアクセスポリシーは「任意のプリンシパルに `es:*` を
//! 全リソースで許可」です。これは開発用の既定値で、本番環境では安全ではありません。

use crate::credential::{ADMIN_USERNAME, CredentialStore, USERNAME_FIELD, create_admin_credential};
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::model::{
    Capacity, EbsOptions, EngineVersion, FineGrainedAccessControl, PolicyStatement, Resource,
    SearchCluster, SecretTemplate, StorageBucket, VolumeType,
};
use tracing::{info, warn};
use vandelay_cloud::RemovalPolicy;
use vandelay_config::Variant;

pub const SECRET_NAME: &str = "art-vandelay-opensearch-main-user";
pub const DOMAIN_LOGICAL_ID: &str = "ArtVandelayOpenSearch";
pub const BUCKET_NAME: &str = "art-vandelay";
pub const BUCKET_LOGICAL_ID: &str = "ArtVandelayBucket";

pub const DATA_NODE_INSTANCE_TYPE: &str = "t3.small.search";
pub const DATA_NODES: u32 = 1;
pub const VOLUME_SIZE_GIB: u32 = 10;

/// バリアントに応じたリソースグラフを合成
///
/// どの宣言ステップが失敗しても合成全体がエラーになります。
pub fn compose_infrastructure(
    variant: Variant,
    store: &dyn CredentialStore,
) -> Result<ResourceGraph> {
    let mut graph = ResourceGraph::new(variant);

    // 1. 管理者クレデンシャル
    let credential = create_admin_credential(
        store,
        &mut graph,
        SECRET_NAME,
        SecretTemplate::new().with_field(USERNAME_FIELD, ADMIN_USERNAME),
    )?;

    // 2. ストレージバケット
    if variant.includes_storage() {
        graph.declare(Resource::Bucket(
            StorageBucket::new(BUCKET_LOGICAL_ID, BUCKET_NAME).with_auto_delete_objects(),
        ))?;
    }

    // 3-4. 検索クラスタ（単一ゾーン）
    let cluster = SearchCluster {
        logical_id: DOMAIN_LOGICAL_ID.to_string(),
        engine_version: EngineVersion::opensearch_1_1(),
        removal_policy: RemovalPolicy::Destroy,
        capacity: Capacity {
            data_nodes: DATA_NODES,
            data_node_instance_type: DATA_NODE_INSTANCE_TYPE.to_string(),
        },
        ebs: EbsOptions {
            volume_size_gib: VOLUME_SIZE_GIB,
            volume_type: VolumeType::Gp2,
        },
        node_to_node_encryption: true,
        encryption_at_rest: true,
        enforce_https: true,
        fine_grained_access_control: FineGrainedAccessControl::from_credential(&credential),
        access_policies: vec![PolicyStatement::allow_everything()],
        zone_awareness: false,
    };
    cluster.validate()?;

    if cluster.has_wide_open_policy() {
        warn!(
            domain = %cluster.logical_id,
            "Access policy allows es:* to any principal; use only for development"
        );
    }
    graph.declare(Resource::SearchCluster(cluster))?;

    info!(
        variant = %variant,
        resources = graph.resources().len(),
        "Composed infrastructure"
    );
    Ok(graph)
}
