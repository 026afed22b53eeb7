//! Channel administration tests: default-tag uniqueness, channel testing,
//! duplicate names, registry resolution.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use notification_service::database::memory::InMemoryChannelStore;
use notification_service::database::store::ChannelStore;
use notification_service::models::channel::{
    ChannelConfig, ChannelStats, ChannelStatus, ChannelType,
};
use notification_service::models::notification::ChannelKind;
use notification_service::services::channels::EmailAdapter;
use notification_service::services::registry::ChannelRegistry;

fn email_channel(name: &str, config: serde_json::Value) -> ChannelConfig {
    let now = Utc::now();
    ChannelConfig {
        id: Uuid::new_v4(),
        name: name.to_string(),
        display_name: name.to_string(),
        channel_type: ChannelType::Email,
        provider: "smtp".to_string(),
        config,
        status: ChannelStatus::Active,
        error_message: None,
        tags: vec![],
        stats: ChannelStats::default(),
        last_tested_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn smtp_config() -> serde_json::Value {
    json!({
        "smtp_host": "localhost",
        "smtp_port": 1025,
        "from_name": "FarmLink",
        "from_address": "noreply@farmlink.example",
    })
}

#[tokio::test]
async fn only_one_default_per_type() {
    let store = Arc::new(InMemoryChannelStore::new());
    store
        .insert(&email_channel("email-a", smtp_config()))
        .await
        .unwrap();
    store
        .insert(&email_channel("email-b", smtp_config()))
        .await
        .unwrap();

    let a = store.set_default(ChannelType::Email, "email-a").await.unwrap();
    assert!(a.is_default());

    let b = store.set_default(ChannelType::Email, "email-b").await.unwrap();
    assert!(b.is_default());

    // the first channel lost its tag when the second gained it
    let a = store.find_by_name("email-a").await.unwrap().unwrap();
    assert!(!a.is_default());

    let defaults = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.is_default())
        .count();
    assert_eq!(defaults, 1);
}

#[tokio::test]
async fn duplicate_channel_name_conflicts() {
    let store = Arc::new(InMemoryChannelStore::new());
    store
        .insert(&email_channel("primary", smtp_config()))
        .await
        .unwrap();
    let err = store
        .insert(&email_channel("primary", smtp_config()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn registry_resolves_default_over_first_active() {
    let store = Arc::new(InMemoryChannelStore::new());
    store
        .insert(&email_channel("aaa-first", smtp_config()))
        .await
        .unwrap();
    store
        .insert(&email_channel("zzz-default", smtp_config()))
        .await
        .unwrap();
    store
        .set_default(ChannelType::Email, "zzz-default")
        .await
        .unwrap();

    let registry = ChannelRegistry::new(store.clone() as Arc<dyn ChannelStore>)
        .with_adapter(Arc::new(EmailAdapter::new()));

    let resolved = registry
        .resolve_channel(ChannelKind::Email, None)
        .await
        .unwrap();
    assert_eq!(resolved.name, "zzz-default");

    // an explicit name still wins
    let resolved = registry
        .resolve_channel(ChannelKind::Email, Some("aaa-first"))
        .await
        .unwrap();
    assert_eq!(resolved.name, "aaa-first");
}

#[tokio::test]
async fn registry_falls_back_to_first_active_without_default() {
    let store = Arc::new(InMemoryChannelStore::new());
    store
        .insert(&email_channel("aaa-first", smtp_config()))
        .await
        .unwrap();
    store
        .insert(&email_channel("bbb-second", smtp_config()))
        .await
        .unwrap();

    let registry = ChannelRegistry::new(store.clone() as Arc<dyn ChannelStore>)
        .with_adapter(Arc::new(EmailAdapter::new()));
    let resolved = registry
        .resolve_channel(ChannelKind::Email, None)
        .await
        .unwrap();
    assert_eq!(resolved.name, "aaa-first");
}

#[tokio::test]
async fn test_channel_promotes_working_configuration() {
    let store = Arc::new(InMemoryChannelStore::new());
    let mut channel = email_channel("primary", smtp_config());
    channel.status = ChannelStatus::Testing;
    store.insert(&channel).await.unwrap();

    let registry = ChannelRegistry::new(store.clone() as Arc<dyn ChannelStore>)
        .with_adapter(Arc::new(EmailAdapter::new()));

    let tested = registry.test_channel("primary").await.unwrap();
    assert_eq!(tested.status, ChannelStatus::Active);
    assert!(tested.error_message.is_none());
    assert!(tested.last_tested_at.is_some());
}

#[tokio::test]
async fn test_channel_records_initialization_failure() {
    let store = Arc::new(InMemoryChannelStore::new());
    // smtp provider without a host cannot build a transport
    let channel = email_channel("broken", json!({
        "from_name": "FarmLink",
        "from_address": "noreply@farmlink.example",
    }));
    store.insert(&channel).await.unwrap();

    let registry = ChannelRegistry::new(store.clone() as Arc<dyn ChannelStore>)
        .with_adapter(Arc::new(EmailAdapter::new()));

    let tested = registry.test_channel("broken").await.unwrap();
    assert_eq!(tested.status, ChannelStatus::Error);
    assert!(tested
        .error_message
        .unwrap()
        .contains("smtp_host is not configured"));

    let err = registry.test_channel("ghost").await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}
