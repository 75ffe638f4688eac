//! End-to-end ingestion runs through the service facade.

use std::sync::Arc;

use serde_json::json;

use unibox_connectors::mock::MockConnector;
use unibox_connectors::types::RawItem;
use unibox_core::config::SyncConfig;
use unibox_core::coordination::{InProcessRateCounter, InProcessSyncLock, SyncLockStore};
use unibox_core::domain::interaction::{Channel, TenantId};
use unibox_core::linking::LinkingConfig;
use unibox_db::repositories::{
    InMemoryEventRepository, InMemoryInteractionRepository, InMemorySlaOverrideRepository,
    InteractionRepository,
};
use unibox_sync::classify::Classifier;
use unibox_sync::external::fixed::{EmptyProductContext, FixedCredentialStore};
use unibox_sync::pipeline::PipelineDeps;
use unibox_sync::{SyncError, SyncService};

struct Fixture {
    service: SyncService,
    interactions: Arc<InMemoryInteractionRepository>,
    sync_lock: Arc<InProcessSyncLock>,
}

fn fixture() -> Fixture {
    let interactions = Arc::new(InMemoryInteractionRepository::default());
    let sync_lock = Arc::new(InProcessSyncLock::new());
    let deps = PipelineDeps {
        interactions: interactions.clone(),
        events: Arc::new(InMemoryEventRepository::default()),
        sla_overrides: Arc::new(InMemorySlaOverrideRepository::default()),
        rate_counter: Arc::new(InProcessRateCounter::new()),
        sync_lock: sync_lock.clone(),
        credentials: Arc::new(FixedCredentialStore::single("t-1", "tok")),
        products: Arc::new(EmptyProductContext),
        classifier: Arc::new(Classifier::rule_only()),
    };
    let config = SyncConfig {
        requests_per_minute: 1000,
        rate_limit_wait_secs: 2,
        lock_ttl_secs: 60,
        pending_response_window_minutes: 180,
        page_size: 100,
    };
    let service = SyncService::new(deps, &config, LinkingConfig::default());
    Fixture { service, interactions, sync_lock }
}

fn tenant() -> TenantId {
    TenantId("t-1".to_string())
}

fn review_item(id: &str) -> RawItem {
    RawItem::new(json!({
        "id": id,
        "comment": format!("feedback for {id}: where can I find the manual?"),
        "created_at": "2026-08-20T09:00:00Z",
    }))
}

#[tokio::test]
async fn paged_run_upserts_by_identity_without_duplicates() {
    let mut fixture = fixture();
    let connector = Arc::new(MockConnector::new("testmart", Channel::Review));

    // 150 records over two pages; the second page re-serves 30 of the
    // first page's external ids, as marketplace cursors routinely do.
    let page_one: Vec<RawItem> = (0..100).map(|i| review_item(&format!("R-{i}"))).collect();
    let page_two: Vec<RawItem> = (0..30)
        .map(|i| review_item(&format!("R-{i}")))
        .chain((100..120).map(|i| review_item(&format!("R-{i}"))))
        .collect();
    connector.push_items(page_one, Some("2"));
    connector.push_items(page_two, None);
    fixture.service.register_connector(connector);

    let metrics = fixture.service.sync(&tenant(), Channel::Review).await.expect("sync");
    assert_eq!(metrics.fetched, 150);
    assert_eq!(metrics.created, 120);
    assert_eq!(metrics.updated, 30);
    assert_eq!(metrics.skipped, 0);
    assert_eq!(metrics.errors, 0);

    // One row per external id.
    let all = fixture
        .interactions
        .list_recent(&tenant(), chrono::Utc::now() - chrono::Duration::days(365))
        .await
        .expect("list");
    assert_eq!(all.len(), 120);
}

#[tokio::test]
async fn every_completed_run_gets_exactly_one_health_entry() {
    let mut fixture = fixture();
    let connector = Arc::new(MockConnector::new("testmart", Channel::Review));
    connector.push_items(vec![review_item("R-1")], None);
    connector.push_items(vec![review_item("R-1")], None);
    fixture.service.register_connector(connector);

    fixture.service.sync(&tenant(), Channel::Review).await.expect("first run");
    fixture.service.sync(&tenant(), Channel::Review).await.expect("second run");

    let report = fixture.service.health_report();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].runs, 2);
}

#[tokio::test]
async fn sync_is_refused_while_another_holder_owns_the_tenant_lock() {
    let mut fixture = fixture();
    let connector = Arc::new(MockConnector::new("testmart", Channel::Review));
    connector.push_items(vec![review_item("R-1")], None);
    fixture.service.register_connector(connector);

    assert!(fixture
        .sync_lock
        .try_acquire(&tenant(), "other-process", chrono::Duration::seconds(60))
        .await
        .unwrap());

    let result = fixture.service.sync(&tenant(), Channel::Review).await;
    assert!(matches!(result, Err(SyncError::AlreadyRunning(_))));

    // The refused run left no trace in the health window.
    assert!(fixture.service.health_report().is_empty());
}
