// secret.rs
use crate::equality::SpecEq;
use crate::resource::{ObjectMeta, Resource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Secreto: los valores son bytes y viajan en base64 dentro del JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
  #[serde(flatten)]
  pub meta: ObjectMeta,
  #[serde(default)]
  pub system: bool,
  #[serde(default, with = "base64_map")]
  pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self { meta: ObjectMeta::new(namespace, name), system: false, data: BTreeMap::new() }
  }

  pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
    self.data.insert(key.into(), value.into());
    self
  }
}

impl SpecEq for Secret {
  fn spec_eq(&self, other: &Self) -> bool {
    self.meta.spec_eq(&other.meta) && self.system == other.system && self.data == other.data
  }
}

impl Resource for Secret {
  const KIND: &'static str = "secret";

  fn meta(&self) -> &ObjectMeta {
    &self.meta
  }

  fn meta_mut(&mut self) -> &mut ObjectMeta {
    &mut self.meta
  }
}

mod base64_map {
  use base64::engine::general_purpose::STANDARD;
  use base64::Engine;
  use serde::de::Error;
  use serde::{Deserialize, Deserializer, Serialize, Serializer};
  use std::collections::BTreeMap;

  pub fn serialize<S: Serializer>(data: &BTreeMap<String, Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    let encoded: BTreeMap<&str, String> = data.iter().map(|(k, v)| (k.as_str(), STANDARD.encode(v))).collect();
    encoded.serialize(s)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
    let encoded = BTreeMap::<String, String>::deserialize(d)?;
    encoded.into_iter()
           .map(|(k, v)| STANDARD.decode(v.as_bytes()).map(|b| (k, b)).map_err(D::Error::custom))
           .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn data_is_base64_in_json() {
    let s = Secret::new("default", "registry").with_entry("password", b"hunter2".to_vec());
    let v = serde_json::to_value(&s).expect("encode");
    assert_eq!(v["data"]["password"], json!("aHVudGVyMg=="));
    let back: Secret = serde_json::from_value(v).expect("decode");
    assert!(back.spec_eq(&s));
  }

  #[test]
  fn invalid_base64_is_rejected() {
    let v = json!({"namespace": "default", "name": "s", "data": {"k": "not base64!"}});
    assert!(serde_json::from_value::<Secret>(v).is_err());
  }
}
