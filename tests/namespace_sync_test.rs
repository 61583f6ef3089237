//! 跨命名空间同步与跟踪集成测试
//!
//! 用进程内 Mock 总线串起两个（以及一个迟到加入的第三个）服务实例，
//! 验证快照收敛、回声抑制、跟踪所有权广告与请求转发。

use std::sync::Arc;
use std::time::Duration;

use ant::config::{AppConfig, AppSection, SyncSection};
use ant::external::mock::{
    MockActionEngine, MockComponentCatalog, MockPipeCatalog, MockRegistrar, MockSyncHub,
};
use ant::external::{service_ids, TrackObjectResponse};
use ant::repository::{Item, ItemPayload, MapPayload, ObjectPayload};
use ant::sync::SyncAction;
use ant::tracking::{ParamKey, PipeDescriptor, PipeSegment};
use ant::{Collaborators, ContextService};

struct Namespace {
    service: ContextService,
    registrar: Arc<MockRegistrar>,
    pipes: Arc<MockPipeCatalog>,
}

async fn start_namespace(
    name: &str,
    repo_hub: &Arc<MockSyncHub>,
    tracked_hub: &Arc<MockSyncHub>,
) -> Namespace {
    let repo_inbound = repo_hub.subscribe().await;
    let tracked_inbound = tracked_hub.subscribe().await;

    let registrar = Arc::new(MockRegistrar::new());
    let pipes = Arc::new(MockPipeCatalog::new());
    let cfg = AppConfig {
        app: AppSection {
            namespace: name.to_string(),
        },
        // 周期重发拉长到测试窗口之外，只保留启动时的 RequestConfig
        sync: SyncSection {
            request_interval_secs: 60,
        },
        ..Default::default()
    };
    let collaborators = Collaborators {
        registrar: registrar.clone(),
        engine: Arc::new(MockActionEngine::new()),
        components: Arc::new(MockComponentCatalog::new()),
        pipes: pipes.clone(),
        repo_channel: repo_hub.clone(),
        tracked_channel: tracked_hub.clone(),
    };

    Namespace {
        service: ContextService::start(&cfg, collaborators, repo_inbound, tracked_inbound),
        registrar,
        pipes,
    }
}

fn camera_pipe() -> PipeDescriptor {
    PipeDescriptor {
        category: "camera".to_string(),
        segments: vec![PipeSegment {
            segment_type: "camera".to_string(),
            required_parameters: vec![ParamKey::TfPrefix],
        }],
    }
}

fn demo_scene() -> Vec<Item> {
    vec![
        Item::new(
            "floor1",
            "",
            ItemPayload::Map(MapPayload {
                topic: "/floor1/map".to_string(),
                ..Default::default()
            }),
        )
        .with_maintainer("ns1"),
        Item::new(
            "table",
            "floor1",
            ItemPayload::Object(ObjectPayload {
                detection_methods: vec!["camera".to_string()],
                ..Default::default()
            }),
        )
        .with_maintainer("ns1"),
    ]
}

#[tokio::test]
async fn test_local_update_converges_without_echo() {
    let repo_hub = MockSyncHub::new();
    let tracked_hub = MockSyncHub::new();
    let ns1 = start_namespace("ns1", &repo_hub, &tracked_hub).await;
    let ns2 = start_namespace("ns2", &repo_hub, &tracked_hub).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let failed = ns1.service.update_repository(demo_scene()).await;
    assert!(failed.is_empty());
    tokio::time::sleep(Duration::from_millis(200)).await;

    // ns2 收敛到 ns1 的快照
    let table = ns2.service.get_item("table").await.unwrap();
    assert_eq!(table.parent, "floor1");
    assert_eq!(table.maintainer, "ns1");

    // 合并不触发再广告：仓库通道上所有 AdvertiseConfig 都来自 ns1
    for envelope in repo_hub.log().await {
        if envelope.action == SyncAction::AdvertiseConfig {
            assert_eq!(envelope.namespace, "ns1");
        }
    }

    ns1.service.shutdown();
    ns2.service.shutdown();
}

#[tokio::test]
async fn test_late_joiner_converges_via_request_config() {
    let repo_hub = MockSyncHub::new();
    let tracked_hub = MockSyncHub::new();
    let ns1 = start_namespace("ns1", &repo_hub, &tracked_hub).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    ns1.service.update_repository(demo_scene()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // ns3 迟到加入：启动时的 RequestConfig 让 ns1 重新广告
    let ns3 = start_namespace("ns3", &repo_hub, &tracked_hub).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(ns3.service.get_item("floor1").await.is_ok());
    assert!(ns3.service.get_item("table").await.is_ok());

    ns1.service.shutdown();
    ns3.service.shutdown();
}

#[tokio::test]
async fn test_tracking_ownership_is_advertised_and_forwarded() {
    let repo_hub = MockSyncHub::new();
    let tracked_hub = MockSyncHub::new();
    let ns1 = start_namespace("ns1", &repo_hub, &tracked_hub).await;
    let ns2 = start_namespace("ns2", &repo_hub, &tracked_hub).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    ns1.service.update_repository(demo_scene()).await;
    ns1.pipes.insert(camera_pipe()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // ns1 开始跟踪，ns2 通过跟踪对象通道得知所有权
    let response = ns1.service.track_object("table").await.unwrap();
    assert_eq!(response.object_topic, "ns1/object_tracker/table");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        ns2.service.coordinator().remote_owner("table").await.unwrap(),
        "ns1"
    );

    // ns2 的跟踪请求被原样转发给 ns1
    let forwarded = TrackObjectResponse {
        resource_id: response.resource_id.clone(),
        object_topic: response.object_topic.clone(),
    };
    ns2.registrar
        .push_response(
            service_ids::TRACK_OBJECT,
            Ok(serde_json::to_value(&forwarded).unwrap()),
        )
        .await;
    let remote_response = ns2.service.track_object("table").await.unwrap();
    assert_eq!(remote_response.object_topic, "ns1/object_tracker/table");
    assert!(ns2.service.coordinator().session_for_item("table").await.is_none());

    // 停止跟踪后 RemoveConfig 清除远程所有权记录
    ns1.service.untrack_object("table").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(ns2.service.coordinator().remote_owner("table").await.is_none());

    ns1.service.shutdown();
    ns2.service.shutdown();
}
