use serde_json::json;
use snowconf_core::db::open_db_in_memory;
use snowconf_core::id::EPOCH_MILLIS;
use snowconf_core::{
    parse_id, Clock, ConfigRepository, ConfigService, DataType, IdError, IdGenerator, ServiceError,
    SetConfigRequest, SqliteConfigRepository,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
struct ManualClock(Arc<AtomicU64>);

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn request(env: &str, key: &str, value: &str) -> SetConfigRequest {
    let mut request = SetConfigRequest::new("billing", env, key, value);
    request.operator = Some("alice".to_string());
    request
}

#[test]
fn set_config_inserts_then_updates_with_version_bump() {
    let conn = open_db_in_memory().unwrap();
    let ids = IdGenerator::new(77).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    let created = service
        .set_config(&request("prod", "timeout", "30"))
        .unwrap();
    assert_eq!(created.version, 1);
    assert_eq!(created.created_by.as_deref(), Some("alice"));
    assert_eq!(parse_id(created.id).machine_id, 77);

    let mut change = request("prod", "timeout", "45");
    change.operator = Some("bob".to_string());
    let updated = service.set_config(&change).unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.version, 2);
    assert_eq!(updated.config_value, "45");
    assert_eq!(updated.created_by.as_deref(), Some("alice"));
    assert_eq!(updated.updated_by.as_deref(), Some("bob"));
}

#[test]
fn create_config_rejects_existing_key() {
    let conn = open_db_in_memory().unwrap();
    let ids = IdGenerator::new(1).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    service
        .create_config(&request("prod", "retries", "3"))
        .unwrap();
    let err = service
        .create_config(&request("prod", "retries", "4"))
        .unwrap_err();
    match err {
        ServiceError::AlreadyExists(scope) => assert_eq!(scope, "billing/prod/retries"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn invalid_request_fails_before_minting_an_id() {
    let conn = open_db_in_memory().unwrap();
    let clock = ManualClock(Arc::new(AtomicU64::new(EPOCH_MILLIS + 10)));
    let ids = IdGenerator::with_clock(1, clock).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    let err = service
        .set_config(&request("prod", "has space", "1"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    // The generator was not touched: the next id is the first of its millisecond.
    assert_eq!(parse_id(ids.next_id().unwrap()).sequence, 0);
}

#[test]
fn update_config_by_id_checks_existence_and_key_collisions() {
    let conn = open_db_in_memory().unwrap();
    let ids = IdGenerator::new(1).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    let a = service.create_config(&request("prod", "a", "1")).unwrap();
    service.create_config(&request("prod", "b", "2")).unwrap();

    let renamed = service
        .update_config(a.id, &request("prod", "a2", "10"))
        .unwrap();
    assert_eq!(renamed.config_key, "a2");
    assert_eq!(renamed.version, 2);

    let collision = service
        .update_config(a.id, &request("prod", "b", "10"))
        .unwrap_err();
    assert!(matches!(collision, ServiceError::AlreadyExists(_)));

    let missing = service
        .update_config(42, &request("prod", "z", "0"))
        .unwrap_err();
    assert!(matches!(missing, ServiceError::NotFound(_)));
}

#[test]
fn lookups_hide_inactive_items() {
    let conn = open_db_in_memory().unwrap();
    let ids = IdGenerator::new(1).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    service.set_config(&request("prod", "live", "on")).unwrap();
    let mut hidden = request("prod", "hidden", "off");
    hidden.is_active = false;
    let hidden = service.set_config(&hidden).unwrap();

    assert_eq!(
        service.get_config_value("billing", "prod", "live").unwrap(),
        "on"
    );
    assert!(service
        .get_config_by_key("billing", "prod", "hidden")
        .unwrap()
        .is_none());
    assert!(matches!(
        service
            .get_config_value("billing", "prod", "hidden")
            .unwrap_err(),
        ServiceError::NotFound(_)
    ));
    assert!(matches!(
        service
            .get_config_value("billing", "prod", "absent")
            .unwrap_err(),
        ServiceError::NotFound(_)
    ));

    // Direct id lookup still sees inactive items.
    assert!(!service.get_config(hidden.id).unwrap().is_active);

    let active: Vec<String> = service
        .app_configs("billing", "prod")
        .unwrap()
        .into_iter()
        .map(|item| item.config_key)
        .collect();
    assert_eq!(active, vec!["live"]);
}

#[test]
fn delete_by_key_and_id() {
    let conn = open_db_in_memory().unwrap();
    let ids = IdGenerator::new(1).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    service.set_config(&request("prod", "a", "1")).unwrap();
    let b = service.set_config(&request("prod", "b", "2")).unwrap();

    service.delete_config("billing", "prod", "a").unwrap();
    assert!(matches!(
        service.delete_config("billing", "prod", "a").unwrap_err(),
        ServiceError::NotFound(_)
    ));

    service.delete_config_by_id(b.id).unwrap();
    assert!(matches!(
        service.get_config(b.id).unwrap_err(),
        ServiceError::NotFound(_)
    ));
}

#[test]
fn typed_map_converts_by_data_type_and_falls_back_to_string() {
    let conn = open_db_in_memory().unwrap();
    let ids = IdGenerator::new(1).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    for (key, value, data_type) in [
        ("pool", "16", DataType::Int),
        ("ratio", "0.25", DataType::Double),
        ("beta", "true", DataType::Boolean),
        ("limits", r#"{"rps": 100}"#, DataType::Json),
        ("name", "billing-api", DataType::String),
        ("broken", "sixteen", DataType::Int),
    ] {
        let mut request = request("prod", key, value);
        request.data_type = data_type;
        service.set_config(&request).unwrap();
    }

    let map = service.app_configs_as_map("billing", "prod").unwrap();
    assert_eq!(map["pool"], json!(16));
    assert_eq!(map["ratio"], json!(0.25));
    assert_eq!(map["beta"], json!(true));
    assert_eq!(map["limits"], json!({"rps": 100}));
    assert_eq!(map["name"], json!("billing-api"));
    assert_eq!(map["broken"], json!("sixteen"));
}

#[test]
fn batch_set_updates_existing_and_creates_missing() {
    let conn = open_db_in_memory().unwrap();
    let ids = IdGenerator::new(1).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    let mut typed = request("prod", "pool", "8");
    typed.data_type = DataType::Int;
    let existing = service.set_config(&typed).unwrap();

    let entries: BTreeMap<&str, &str> = [("pool", "32"), ("region", "eu")].into_iter().collect();
    let results = service
        .batch_set("billing", "prod", entries, Some("ops"))
        .unwrap();
    assert_eq!(results.len(), 2);

    let pool = results
        .iter()
        .find(|item| item.config_key == "pool")
        .unwrap();
    assert_eq!(pool.id, existing.id);
    assert_eq!(pool.version, 2);
    assert_eq!(pool.data_type, DataType::Int);
    assert_eq!(pool.config_value, "32");

    let region = results
        .iter()
        .find(|item| item.config_key == "region")
        .unwrap();
    assert_eq!(region.version, 1);
    assert_eq!(region.data_type, DataType::String);
    assert_eq!(region.created_by.as_deref(), Some("ops"));
}

#[test]
fn copy_environment_skips_existing_keys_and_mints_new_ids() {
    let conn = open_db_in_memory().unwrap();
    let ids = IdGenerator::new(1).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    let a = service.set_config(&request("dev", "a", "1")).unwrap();
    service.set_config(&request("dev", "b", "2")).unwrap();
    service
        .set_config(&request("staging", "b", "keep"))
        .unwrap();

    let created = service
        .copy_environment("billing", "dev", "staging", Some("ops"))
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].config_key, "a");
    assert_eq!(created[0].environment, "staging");
    assert_eq!(created[0].version, 1);
    assert_ne!(created[0].id, a.id);

    assert_eq!(
        service.get_config_value("billing", "staging", "b").unwrap(),
        "keep"
    );

    assert!(matches!(
        service
            .copy_environment("billing", "qa", "staging", None)
            .unwrap_err(),
        ServiceError::NotFound(_)
    ));
}

#[test]
fn configs_page_reports_totals_and_clamps_arguments() {
    let conn = open_db_in_memory().unwrap();
    let ids = IdGenerator::new(1).unwrap();
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    for index in 0..7 {
        service
            .set_config(&request("prod", &format!("key{index}"), "v"))
            .unwrap();
    }

    let page = service.configs_page("billing", "prod", 2, 3).unwrap();
    assert_eq!(page.total, 7);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.page, 2);
    let keys: Vec<&str> = page
        .items
        .iter()
        .map(|item| item.config_key.as_str())
        .collect();
    assert_eq!(keys, vec!["key3", "key4", "key5"]);

    let first = service.configs_page("billing", "prod", 0, 0).unwrap();
    assert_eq!(first.page, 1);
    assert_eq!(first.size, 1);
    assert_eq!(first.total_pages, 7);

    let empty = service.configs_page("billing", "qa", 1, 10).unwrap();
    assert_eq!(empty.total, 0);
    assert_eq!(empty.total_pages, 0);
    assert!(empty.items.is_empty());
}

#[test]
fn clock_rollback_fails_the_write_and_stores_nothing() {
    let conn = open_db_in_memory().unwrap();
    let millis = Arc::new(AtomicU64::new(EPOCH_MILLIS + 60_000));
    let ids = IdGenerator::with_clock(5, ManualClock(Arc::clone(&millis))).unwrap();
    let repo = SqliteConfigRepository::new(&conn);
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), &ids);

    service.set_config(&request("prod", "first", "1")).unwrap();

    millis.store(EPOCH_MILLIS + 59_000, Ordering::SeqCst);
    let err = service
        .set_config(&request("prod", "second", "2"))
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::IdGeneration(IdError::ClockRollback { .. })
    ));
    assert!(repo
        .find_by_key("billing", "prod", "second")
        .unwrap()
        .is_none());

    // Updates do not mint ids and keep working.
    service.set_config(&request("prod", "first", "11")).unwrap();

    millis.store(EPOCH_MILLIS + 61_000, Ordering::SeqCst);
    service.set_config(&request("prod", "second", "2")).unwrap();
    assert_eq!(repo.count("billing", "prod").unwrap(), 2);
}

#[test]
fn service_accepts_shared_generator_handles() {
    let conn = open_db_in_memory().unwrap();
    let ids = Arc::new(IdGenerator::new(9).unwrap());
    let service = ConfigService::new(SqliteConfigRepository::new(&conn), Arc::clone(&ids));

    let item = service.set_config(&request("prod", "k", "v")).unwrap();
    assert_eq!(parse_id(item.id).machine_id, ids.machine_id());
}

#[test]
fn service_with_global_ids_mints_from_process_generator() {
    let conn = open_db_in_memory().unwrap();
    let service = ConfigService::with_global_ids(SqliteConfigRepository::new(&conn));

    let item = service.set_config(&request("prod", "k", "v")).unwrap();
    assert_eq!(
        parse_id(item.id).machine_id,
        snowconf_core::global_generator().machine_id()
    );
}
