#![cfg(not(feature = "pg"))]
use cloud_domain::Shadow;
use cloud_persistence::{new_sqlite_for_test, Database, DbConn, DieselLocker, DieselShadowRepository, TxContext};
use diesel::prelude::*;
use serde_json::{json, Map, Value};
use shadow::{ShadowError, ShadowRepository, ShadowService, ShadowServiceConfig};
use std::sync::Arc;
use uuid::Uuid;

// Use a temporary file-backed SQLite DB per test so pools do not share state.
fn temp_db() -> Database {
  let tmp_path = std::env::temp_dir().join(format!("cloud_shadow_test_{}.db", Uuid::new_v4()));
  new_sqlite_for_test(tmp_path.to_str().unwrap()).expect("failed to create store")
}

fn obj(v: Value) -> Map<String, Value> {
  v.as_object().cloned().expect("object")
}

fn raw_insert(conn: &mut DbConn, sql: &str) -> shadow::Result<()> {
  diesel::sql_query(sql).execute(conn).map_err(|e| ShadowError::Storage(e.to_string()))?;
  Ok(())
}

#[test]
fn create_then_get_round_trips_documents() {
  let repo = DieselShadowRepository::new(temp_db());
  let desire = json!({"applications": [{"name": "app01", "version": "1"}], "systemApplications": []});
  let created = repo.create(&Shadow::new("default", "node01").with_desire(obj(desire.clone()))).unwrap();
  assert!(!created.desire_version.is_empty());

  let got = repo.get("default", "node01").unwrap();
  assert_eq!(Value::Object(got.desire.clone()), desire);
  assert_eq!(Value::Object(got.report.clone()), json!({"applications": [], "systemApplications": []}));
  assert_eq!(got.desire_version, created.desire_version);
  assert_eq!(got.creation_timestamp, created.creation_timestamp);
  assert!(got.time.is_none());
}

#[test]
fn duplicate_create_is_duplicate_key() {
  let repo = DieselShadowRepository::new(temp_db());
  repo.create(&Shadow::new("default", "node01")).unwrap();
  match repo.create(&Shadow::new("default", "node01")) {
    Err(ShadowError::DuplicateKey(k)) => assert_eq!(k, "default/node01"),
    other => panic!("expected DuplicateKey, got {:?}", other),
  }
  // otro namespace es otra clave
  repo.create(&Shadow::new("edge", "node01")).unwrap();
}

#[test]
fn update_report_leaves_desire_untouched() {
  let repo = DieselShadowRepository::new(temp_db());
  let desire = json!({"applications": [{"name": "app01", "version": "1"}], "systemApplications": []});
  let created = repo.create(&Shadow::new("default", "node01").with_desire(obj(desire.clone()))).unwrap();

  let report = json!({"applications": [{"name": "app01", "version": "1"}], "systemApplications": []});
  let mut next = created.clone();
  next.report = obj(report.clone());
  next.desire = obj(json!({"applications": []}));
  let updated = repo.update_report(&next).unwrap();

  assert_eq!(Value::Object(updated.report), report);
  assert_eq!(Value::Object(updated.desire), desire);
  assert_eq!(updated.desire_version, created.desire_version);
  assert!(updated.update_timestamp >= created.update_timestamp);
}

#[test]
fn update_desire_mints_new_desire_version() {
  let repo = DieselShadowRepository::new(temp_db());
  let created = repo.create(&Shadow::new("default", "node01")).unwrap();
  let mut next = created.clone();
  next.desire = obj(json!({"applications": [{"name": "a", "version": "2"}], "systemApplications": []}));
  next.report = obj(json!({"ignored": true}));
  let updated = repo.update_desire(&next).unwrap();
  assert_ne!(updated.desire_version, created.desire_version);
  assert_eq!(updated.desire["applications"][0]["version"], json!("2"));
  assert!(updated.report.get("ignored").is_none());
}

#[test]
fn meta_updates_only_touch_their_column() {
  let repo = DieselShadowRepository::new(temp_db());
  let mut s = repo.create(&Shadow::new("default", "node01")).unwrap();
  s.report_meta = obj(json!({"apps": "2024-03-01T10:00:00.000Z"}));
  s.desire_meta = obj(json!({"apps": "ignored"}));
  let updated = repo.update_report_meta(&s).unwrap();
  assert_eq!(updated.report_meta["apps"], json!("2024-03-01T10:00:00.000Z"));
  assert!(updated.desire_meta.is_empty());

  let mut s = updated;
  s.desire_meta = obj(json!({"apps": "2024-03-02T10:00:00.000Z"}));
  let updated = repo.update_desire_meta(&s).unwrap();
  assert_eq!(updated.desire_meta["apps"], json!("2024-03-02T10:00:00.000Z"));
  assert_eq!(updated.report_meta["apps"], json!("2024-03-01T10:00:00.000Z"));
}

#[test]
fn updates_on_missing_shadow_are_not_found() {
  let repo = DieselShadowRepository::new(temp_db());
  let ghost = Shadow::new("default", "ghost");
  assert!(matches!(repo.update_report(&ghost), Err(ShadowError::NotFound(_))));
  assert!(matches!(repo.update_desire(&ghost), Err(ShadowError::NotFound(_))));
  assert!(matches!(repo.update_report_meta(&ghost), Err(ShadowError::NotFound(_))));
  assert!(matches!(repo.get("default", "ghost"), Err(ShadowError::NotFound(_))));
}

#[test]
fn delete_is_idempotent() {
  let repo = DieselShadowRepository::new(temp_db());
  repo.create(&Shadow::new("default", "node01")).unwrap();
  repo.delete("default", "node01").unwrap();
  repo.delete("default", "node01").unwrap();
  assert!(matches!(repo.get("default", "node01"), Err(ShadowError::NotFound(_))));
}

#[test]
fn list_by_node_names_spans_several_batches() {
  let repo = DieselShadowRepository::new(temp_db());
  let names: Vec<String> = (0..450).map(|i| format!("node{:03}", i)).collect();
  repo.transact(|conn| {
        for n in names.iter().step_by(2) {
          repo.create_tx(TxContext::Active(conn), &Shadow::new("default", n.as_str()))?;
        }
        Ok(())
      })
      .unwrap();
  repo.create(&Shadow::new("other", "node000")).unwrap();

  let mut query = names.clone();
  query.push("node000".into());
  let got = repo.list_by_node_names("default", &query).unwrap();
  assert_eq!(got.len(), 225);
  assert!(got.iter().all(|s| s.namespace == "default"));
  let mut seen: Vec<&str> = got.iter().map(|s| s.name.as_str()).collect();
  seen.sort();
  seen.dedup();
  assert_eq!(seen.len(), 225);

  assert_eq!(repo.list("default").unwrap().len(), 225);
  assert!(repo.list_by_node_names("default", &[]).unwrap().is_empty());
}

#[test]
fn failed_transaction_rolls_back_every_write() {
  let repo = DieselShadowRepository::new(temp_db());
  let res: shadow::Result<()> = repo.transact(|conn| {
                                      repo.create_tx(TxContext::Active(conn), &Shadow::new("default", "a"))?;
                                      repo.create_tx(TxContext::Active(conn), &Shadow::new("default", "a"))?;
                                      Ok(())
                                    });
  assert!(matches!(res, Err(ShadowError::DuplicateKey(_))));
  assert!(matches!(repo.get("default", "a"), Err(ShadowError::NotFound(_))));
}

#[test]
fn legacy_empty_columns_read_as_skeleton() {
  let repo = DieselShadowRepository::new(temp_db());
  repo.transact(|conn| {
        raw_insert(conn,
                   "INSERT INTO shadows (namespace, name, create_time, update_time) VALUES ('default', 'old', 0, 0)")
      })
      .unwrap();
  let s = repo.get("default", "old").unwrap();
  assert_eq!(Value::Object(s.report), json!({"applications": [], "systemApplications": []}));
  assert_eq!(Value::Object(s.desire), json!({"applications": [], "systemApplications": []}));
  assert!(s.report_meta.is_empty());
  assert!(s.desire_version.is_empty());
}

#[test]
fn corrupt_report_is_serialization_error() {
  let repo = DieselShadowRepository::new(temp_db());
  repo.create(&Shadow::new("default", "ok")).unwrap();
  repo.transact(|conn| {
        raw_insert(conn,
                   "INSERT INTO shadows (namespace, name, report, create_time, update_time) VALUES ('default', \
                    'bad', '{broken', 0, 0)")
      })
      .unwrap();
  assert!(matches!(repo.get("default", "bad"), Err(ShadowError::Serialization(_))));
  assert!(matches!(repo.list("default"), Err(ShadowError::Serialization(_))));
  assert!(repo.get("default", "ok").is_ok());
}

#[test]
fn report_times_skip_missing_and_tolerate_bad_times() {
  let repo = DieselShadowRepository::new(temp_db());
  for (name, report) in [("n1", json!({"time": "2024-03-01T10:00:00Z"})), ("n2", json!({"time": 42})), ("n3", json!({}))] {
    let mut s = repo.create(&Shadow::new("default", name)).unwrap();
    s.report = obj(report);
    repo.update_report(&s).unwrap();
  }
  let names: Vec<String> = ["n1", "n2", "n3", "missing"].iter().map(|s| s.to_string()).collect();
  let mut times = repo.list_report_times("default", &names).unwrap();
  times.sort_by(|a, b| a.name.cmp(&b.name));
  assert_eq!(times.len(), 3);
  assert_eq!(times[0].time.map(|t| t.to_rfc3339()), Some("2024-03-01T10:00:00+00:00".to_string()));
  assert!(times[1].time.is_none());
  assert!(times[2].time.is_none());
}

#[test]
fn service_over_sqlite_merges_and_skips_no_ops() {
  let db = temp_db();
  let svc = ShadowService::new(Arc::new(DieselShadowRepository::new(db.clone())),
                               Arc::new(DieselLocker::new(db)),
                               ShadowServiceConfig::default());
  let first = svc.desire("default", "node01", &obj(json!({"applications": [{"name": "a", "version": "1"}]})))
                 .unwrap();
  let again = svc.desire("default", "node01", &obj(json!({"applications": [{"name": "a", "version": "1"}]})))
                 .unwrap();
  assert_eq!(again.desire_version, first.desire_version);

  let reported = svc.report("default", "node01", &obj(json!({"cpu": "40%"}))).unwrap();
  assert_eq!(reported.report["cpu"], json!("40%"));
  assert_eq!(reported.desire["applications"][0]["name"], json!("a"));
  assert!(reported.report_meta.contains_key("cpu"));
  assert_eq!(reported.desire_version, first.desire_version);

  svc.delete("default", "node01").unwrap();
  assert!(matches!(svc.get("default", "node01"), Err(ShadowError::NotFound(_))));
}

#[test]
fn combined_writes_store_document_and_meta() {
  let repo = DieselShadowRepository::new(temp_db());
  let created = repo.create(&Shadow::new("default", "node01")).unwrap();

  let mut s = created.clone();
  s.report.insert("cpu".into(), json!("40%"));
  s.report_meta.insert("cpu".into(), json!("2021-04-01T10:00:00Z"));
  repo.update_report_with_meta(&s).unwrap();

  s.desire.insert("labels".into(), json!({"a": "b"}));
  s.desire_meta.insert("labels".into(), json!("2021-04-01T10:00:00Z"));
  let after = repo.update_desire_with_meta(&s).unwrap();
  assert_ne!(after.desire_version, created.desire_version);

  let got = repo.get("default", "node01").unwrap();
  assert_eq!(got.report["cpu"], json!("40%"));
  assert_eq!(got.report_meta["cpu"], json!("2021-04-01T10:00:00Z"));
  assert_eq!(got.desire["labels"], json!({"a": "b"}));
  assert_eq!(got.desire_meta["labels"], json!("2021-04-01T10:00:00Z"));
  assert_eq!(got.desire_version, after.desire_version);

  assert!(matches!(repo.update_report_with_meta(&Shadow::new("default", "ghost")),
                   Err(ShadowError::NotFound(_))));
}
