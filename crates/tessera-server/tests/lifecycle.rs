//! Lifecycle scenarios driven through request batches

use std::sync::Arc;

use tempfile::TempDir;
use tessera_core::{Credential, FixedClock, ObjectType, PrimitiveType, PrimitiveValue, ResultReason};
use tessera_crypto::SoftwareKeyProvider;
use tessera_server::{
    LifecycleService, Operation, Request, RequestItem, ResponseItem, ServerConfig,
    StorageBackend, keys,
};
use tessera_storage::{InMemoryObjectStore, InMemoryPermissionStore};

const NOW: i64 = 1_700_000_000;

fn service_at(clock: Arc<FixedClock>) -> LifecycleService {
    LifecycleService::new(
        Arc::new(InMemoryObjectStore::new()),
        Arc::new(InMemoryPermissionStore::new()),
        Arc::new(SoftwareKeyProvider::new()),
        clock,
    )
}

fn service() -> LifecycleService {
    service_at(Arc::new(FixedClock::new(NOW)))
}

fn aes_key(name: &str) -> RequestItem {
    RequestItem::new(Operation::Create)
        .with("Object Type", "Symmetric Key")
        .with("Cryptographic Algorithm", "AES")
        .with("Cryptographic Length", "256")
        .with("Name Value", name)
}

fn date(item: &ResponseItem, key: &str) -> i64 {
    let text = item
        .get(key)
        .unwrap_or_else(|| panic!("response has no '{key}': {item:?}"));
    PrimitiveValue::parse_text(text, PrimitiveType::DateTime)
        .unwrap()
        .as_date_time()
        .unwrap()
}

fn id_of(item: &ResponseItem) -> String {
    item.get(keys::UNIQUE_IDENTIFIER).unwrap().to_string()
}

#[test]
fn test_usage_allocation_scenario() {
    let service = service();
    let response = service.process(Request::new(vec![
        aes_key("metered")
            .with("Usage Limits Unit", "Byte")
            .with("Usage Limits Count", "100")
            .with("Usage Limits Total", "100"),
        RequestItem::new(Operation::GetUsageAllocation).with("Usage Limits Count", "30"),
        RequestItem::new(Operation::GetUsageAllocation).with("Usage Limits Count", "80"),
        RequestItem::new(Operation::GetAttributes).with("Attribute Names", "Usage Limits"),
    ]));

    let items = &response.items;
    assert!(items[0].is_success());
    assert_eq!(items[1].get(keys::USAGE_LIMITS_COUNT), Some("70"));
    assert_eq!(items[2].reason(), Some(ResultReason::PermissionDenied));
    assert_eq!(items[3].get("Usage Limits Count"), Some("70"));
    assert_eq!(items[3].get("Usage Limits Total"), Some("100"));
    assert_eq!(items[3].get("Usage Limits Unit"), Some("Byte"));
}

#[test]
fn test_activate_twice() {
    let service = service();
    let response = service.process(Request::new(vec![
        aes_key("once"),
        RequestItem::new(Operation::Activate),
        RequestItem::new(Operation::GetAttributes),
        RequestItem::new(Operation::Activate),
        RequestItem::new(Operation::GetAttributes),
    ]));

    let items = &response.items;
    assert!(items[1].is_success());
    assert_eq!(items[2].get("State"), Some("Active"));
    assert_eq!(date(&items[2], "Activation Date"), NOW);
    assert_eq!(items[3].reason(), Some(ResultReason::IllegalOperation));
    assert_eq!(items[4].get("State"), Some("Active"));
    assert_eq!(date(&items[4], "Activation Date"), NOW);
}

#[test]
fn test_rekey_shifts_schedule() {
    let clock = Arc::new(FixedClock::new(NOW));
    let service = service_at(Arc::clone(&clock));
    let created = service.process(Request::new(vec![
        aes_key("scheduled")
            .with("Activation Date", NOW.to_string())
            .with("Protect Stop Date", (NOW + 1_000).to_string())
            .with("Lease Time", "3600"),
    ]));
    let source = id_of(&created.items[0]);

    clock.advance(100);
    let later = NOW + 100;
    let response = service.process(Request::new(vec![
        RequestItem::new(Operation::ReKey)
            .with(keys::UNIQUE_IDENTIFIER, source.as_str())
            .with("Offset", "500"),
        RequestItem::new(Operation::GetAttributes),
        RequestItem::new(Operation::GetAttributes).with(keys::UNIQUE_IDENTIFIER, source.as_str()),
    ]));

    let items = &response.items;
    let replacement = id_of(&items[0]);
    assert_ne!(replacement, source);

    let new = &items[1];
    assert_eq!(id_of(new), replacement);
    assert_eq!(date(new, "Activation Date"), later + 500);
    assert_eq!(date(new, "Protect Stop Date"), later + 500 + 1_000);
    assert_eq!(new.get("State"), Some("Pre-Active"));
    assert_eq!(new.get("Lease Time"), Some("0"));
    assert_eq!(new.get("Name Value"), Some("scheduled"));
    assert_eq!(new.get("Link Type"), Some("Replaced Object Link"));
    assert_eq!(new.get("Linked Object Identifier"), Some(source.as_str()));

    let old = &items[2];
    assert_eq!(old.get("State"), Some("Active"));
    assert_eq!(old.get("Name Value"), None);
    assert_eq!(old.get("Link Type"), Some("Replacement Object Link"));
    assert_eq!(old.get("Linked Object Identifier"), Some(replacement.as_str()));
    assert_eq!(date(old, "Last Change Date"), later);
}

#[test]
fn test_archive_gate() {
    let service = service();
    let response = service.process(Request::new(vec![
        aes_key("cold"),
        RequestItem::new(Operation::Archive),
        RequestItem::new(Operation::Get),
        RequestItem::new(Operation::GetAttributes),
        RequestItem::new(Operation::Recover),
        RequestItem::new(Operation::Get),
    ]));

    let items = &response.items;
    assert_eq!(items[2].reason(), Some(ResultReason::ObjectArchived));
    assert!(items[3].get("Archive Date").is_some());
    assert!(items[4].is_success());
    assert!(items[5].get(keys::KEY_MATERIAL).is_some());
    assert!(items[5].get("Archive Date").is_none());
}

#[test]
fn test_placeholder_chains_within_batch_only() {
    let service = service();
    let first = service.process(Request::new(vec![
        aes_key("chained"),
        RequestItem::new(Operation::ReKey),
        RequestItem::new(Operation::Activate),
    ]));
    let source = id_of(&first.items[0]);
    let replacement = id_of(&first.items[1]);
    assert_eq!(id_of(&first.items[2]), replacement);

    let second = service.process(Request::new(vec![
        RequestItem::new(Operation::Activate),
        RequestItem::new(Operation::GetAttributes).with(keys::UNIQUE_IDENTIFIER, source.as_str()),
    ]));
    assert_eq!(second.items[0].reason(), Some(ResultReason::MissingData));
    assert_eq!(second.items[1].get("State"), Some("Pre-Active"));
}

#[test]
fn test_locate_feeds_placeholder() {
    let service = service();
    service.process(Request::new(vec![aes_key("findable")]));

    let response = service.process(Request::new(vec![
        RequestItem::new(Operation::Locate).with("Name Value", "findable"),
        RequestItem::new(Operation::Activate),
        RequestItem::new(Operation::ObtainLease),
    ]));
    assert!(response.items.iter().all(ResponseItem::is_success));
    assert_eq!(response.items[2].get(keys::LEASE_TIME), Some("0"));
}

#[test]
fn test_credentials_bind_objects() {
    let service = service();
    let alice = Credential::username_password("alice", "wonderland");
    let bob = Credential::username_password("bob", "builder");

    let created = service.process(
        Request::new(vec![aes_key("private")]).with_credential(alice.clone()),
    );
    let id = id_of(&created.items[0]);
    let get = || RequestItem::new(Operation::Get).with(keys::UNIQUE_IDENTIFIER, id.as_str());

    let as_bob = service.process(Request::new(vec![get()]).with_credential(bob.clone()));
    assert_eq!(as_bob.items[0].reason(), Some(ResultReason::PermissionDenied));

    let anonymous = service.process(Request::new(vec![get()]));
    assert_eq!(anonymous.items[0].reason(), Some(ResultReason::PermissionDenied));

    let as_alice = service.process(Request::new(vec![get()]).with_credential(alice));
    assert!(as_alice.items[0].is_success());

    let located = service.process(
        Request::new(vec![RequestItem::new(Operation::Locate).with("Name Value", "private")])
            .with_credential(bob),
    );
    assert_eq!(located.items[0].reason(), Some(ResultReason::ItemNotFound));
}

#[test]
fn test_destroy() {
    let service = service();
    let response = service.process(Request::new(vec![
        RequestItem::new(Operation::Register)
            .with("Object Type", "Template")
            .with("Name Value", "preset")
            .with("Cryptographic Algorithm", "AES"),
        RequestItem::new(Operation::Destroy),
        RequestItem::new(Operation::GetAttributes),
        aes_key("doomed"),
        RequestItem::new(Operation::Destroy),
        RequestItem::new(Operation::Get),
        RequestItem::new(Operation::Revoke).with("Revocation Reason Code", "Key Compromise"),
        RequestItem::new(Operation::Revoke).with("Revocation Reason Code", "Superseded"),
        RequestItem::new(Operation::ReKey),
        RequestItem::new(Operation::Destroy),
    ]));

    let items = &response.items;
    assert!(items[1].is_success());
    assert_eq!(items[2].reason(), Some(ResultReason::ItemNotFound));

    assert!(items[4].is_success());
    assert_eq!(items[5].get("State"), Some("Destroyed"));
    assert!(items[5].get(keys::KEY_MATERIAL).is_none());
    assert!(items[5].get("Digest Value").is_none());
    assert!(items[6].is_success());
    assert_eq!(items[7].reason(), Some(ResultReason::IllegalOperation));
    assert_eq!(items[8].reason(), Some(ResultReason::IllegalOperation));
    assert_eq!(items[9].reason(), Some(ResultReason::IllegalOperation));

    let counts = service.object_counts().unwrap();
    assert_eq!(counts.get(&ObjectType::Template), None);
    assert_eq!(counts.get(&ObjectType::SymmetricKey), Some(&1));
}

#[test]
fn test_template_lifecycle_is_illegal() {
    let service = service();
    let response = service.process(Request::new(vec![
        RequestItem::new(Operation::Register)
            .with("Object Type", "Template")
            .with("Name Value", "static"),
        RequestItem::new(Operation::Activate),
        RequestItem::new(Operation::ObtainLease),
        RequestItem::new(Operation::Check).with("Lease Time", "10"),
        RequestItem::new(Operation::GetUsageAllocation).with("Usage Limits Count", "1"),
        RequestItem::new(Operation::ReKey),
        RequestItem::new(Operation::Revoke).with("Revocation Reason Code", "Unspecified"),
    ]));
    for item in &response.items[1..] {
        assert_eq!(item.reason(), Some(ResultReason::IllegalOperation), "{item:?}");
    }
}

#[test]
fn test_rekey_far_future_schedule_fails_item() {
    let service = service();
    let response = service.process(Request::new(vec![
        aes_key("edge")
            .with("Activation Date", "1000")
            .with("Protect Stop Date", "9223372036854775000"),
        RequestItem::new(Operation::ReKey),
        RequestItem::new(Operation::GetAttributes).with("Attribute Names", "Name, Link"),
    ]));
    assert!(response.items[0].is_success());
    assert_eq!(response.items[1].reason(), Some(ResultReason::InvalidField));
    assert_eq!(response.items[2].get("Name Value"), Some("edge"));
    assert!(response.items[2].get("Link Type").is_none());
    assert_eq!(
        service.object_counts().unwrap().get(&ObjectType::SymmetricKey),
        Some(&1)
    );
}

#[test]
fn test_key_pair_counts() {
    let service = service();
    let response = service.process(Request::new(vec![
        RequestItem::new(Operation::CreateKeyPair)
            .with("Cryptographic Algorithm", "ECDH")
            .with("Cryptographic Length", "256"),
        RequestItem::new(Operation::Activate),
        RequestItem::new(Operation::CreateKeyPair)
            .with("Cryptographic Algorithm", "RSA")
            .with("Cryptographic Length", "2048"),
    ]));
    assert!(response.items[0].is_success());
    assert!(response.items[1].is_success());
    assert_eq!(
        response.items[2].reason(),
        Some(ResultReason::CryptographicFailure)
    );

    let public_id = response.items[0]
        .get(keys::PUBLIC_KEY_UNIQUE_IDENTIFIER)
        .unwrap()
        .to_string();
    let rekeyed = service.process(Request::new(vec![
        RequestItem::new(Operation::ReKey).with(keys::UNIQUE_IDENTIFIER, id_of(&response.items[0])),
        RequestItem::new(Operation::ReKey).with(keys::UNIQUE_IDENTIFIER, public_id),
    ]));
    for item in &rekeyed.items {
        assert_eq!(item.reason(), Some(ResultReason::IllegalOperation), "{item:?}");
    }

    let counts = service.object_counts().unwrap();
    assert_eq!(counts.get(&ObjectType::PrivateKey), Some(&1));
    assert_eq!(counts.get(&ObjectType::PublicKey), Some(&1));
}

#[test]
fn test_redb_backend_survives_restart() {
    let temp = TempDir::new().unwrap();
    let config = ServerConfig::default()
        .with_storage(StorageBackend::redb(temp.path().join("kms.redb")))
        .with_default_lease_time(120);

    let id = {
        let service = LifecycleService::from_config(&config).unwrap();
        let response = service.process(Request::new(vec![aes_key("durable")]));
        id_of(&response.items[0])
    };

    let service = LifecycleService::from_config(&config).unwrap();
    let response = service.process(Request::new(vec![
        RequestItem::new(Operation::Locate).with("Name Value", "durable"),
        RequestItem::new(Operation::Activate),
        RequestItem::new(Operation::ObtainLease),
    ]));
    assert_eq!(id_of(&response.items[0]), id);
    assert!(response.items[1].is_success());
    assert_eq!(response.items[2].get(keys::LEASE_TIME), Some("120"));
}
