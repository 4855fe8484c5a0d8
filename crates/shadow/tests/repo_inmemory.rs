use cloud_domain::{Shadow, StoredShadow};
use serde_json::json;
use shadow::{InMemoryShadowRepository, ShadowError, ShadowRepository};

#[test]
fn concrete_node01_scenario() {
  let repo = InMemoryShadowRepository::new();
  let desire = json!({"applications": [{"name": "app01", "version": "1"}], "systemApplications": []});
  let s = Shadow::new("default", "node01").with_desire(desire.as_object().cloned().unwrap());
  let created = repo.create(&s).unwrap();

  let report = json!({"applications": [{"name": "app01", "version": "1"}], "systemApplications": []});
  let mut next = created.clone();
  next.report = report.as_object().cloned().unwrap();
  // el deseo del parámetro difiere del guardado y debe ignorarse
  next.desire = json!({"applications": []}).as_object().cloned().unwrap();
  repo.update_report(&next).unwrap();

  let got = repo.get("default", "node01").unwrap();
  assert_eq!(serde_json::Value::Object(got.report), report);
  assert_eq!(serde_json::Value::Object(got.desire), desire);
}

#[test]
fn batched_listing_crosses_batch_boundary() {
  let repo = InMemoryShadowRepository::new();
  let names: Vec<String> = (0..450).map(|i| format!("node{:03}", i)).collect();
  for n in names.iter().step_by(2) {
    repo.create(&Shadow::new("default", n.as_str())).unwrap();
  }
  let mut query = names.clone();
  query.push("node000".into());
  let got = repo.list_by_node_names("default", &query).unwrap();
  assert_eq!(got.len(), 225);
  let mut seen: Vec<&str> = got.iter().map(|s| s.name.as_str()).collect();
  seen.sort();
  seen.dedup();
  assert_eq!(seen.len(), 225);
}

#[test]
fn corrupt_row_fails_whole_list() {
  let repo = InMemoryShadowRepository::new();
  repo.create(&Shadow::new("default", "ok")).unwrap();
  repo.put_raw(StoredShadow { namespace: "default".into(),
                              name: "bad".into(),
                              report: "{broken".into(),
                              ..Default::default() })
      .unwrap();
  assert!(matches!(repo.list("default"), Err(ShadowError::Serialization(_))));
  assert!(matches!(repo.get("default", "bad"), Err(ShadowError::Serialization(_))));
  assert!(repo.get("default", "ok").is_ok());
}

#[test]
fn legacy_empty_columns_read_as_skeleton() {
  let repo = InMemoryShadowRepository::new();
  repo.put_raw(StoredShadow { namespace: "default".into(), name: "old".into(), ..Default::default() })
      .unwrap();
  let s = repo.get("default", "old").unwrap();
  assert_eq!(s.report, Shadow::new("x", "y").report);
  assert_eq!(s.desire, Shadow::new("x", "y").desire);
}
