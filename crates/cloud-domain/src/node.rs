// node.rs
use crate::equality::{json_map_eq, SpecEq};
use crate::resource::{ObjectMeta, Resource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Nodo de borde gestionado por la nube. Su sombra (`Shadow`) comparte
/// `namespace` y `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
  #[serde(flatten)]
  pub meta: ObjectMeta,
  #[serde(default)]
  pub accelerator: String,
  #[serde(default)]
  pub node_mode: String,
  #[serde(default)]
  pub cluster: bool,
  #[serde(default)]
  pub sys_apps: Vec<String>,
  #[serde(default)]
  pub attributes: Map<String, Value>,
}

impl Node {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self { meta: ObjectMeta::new(namespace, name),
           accelerator: String::new(),
           node_mode: "kube".to_string(),
           cluster: false,
           sys_apps: Vec::new(),
           attributes: Map::new() }
  }
}

impl SpecEq for Node {
  fn spec_eq(&self, other: &Self) -> bool {
    self.meta.spec_eq(&other.meta)
    && self.accelerator == other.accelerator
    && self.node_mode == other.node_mode
    && self.cluster == other.cluster
    && self.sys_apps == other.sys_apps
    && json_map_eq(&self.attributes, &other.attributes)
  }
}

impl Resource for Node {
  const KIND: &'static str = "node";

  fn meta(&self) -> &ObjectMeta {
    &self.meta
  }

  fn meta_mut(&mut self) -> &mut ObjectMeta {
    &mut self.meta
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn server_fields_do_not_affect_equality() {
    let a = Node::new("default", "node01");
    let mut b = a.clone();
    b.meta.version = "1700000000abcdef".into();
    b.meta.update_timestamp = chrono::Utc::now();
    assert!(a.spec_eq(&b));
  }

  #[test]
  fn null_attribute_equals_missing_attribute() {
    let a = Node::new("default", "node01");
    let mut b = a.clone();
    b.attributes.insert("gpu".into(), json!(null));
    assert!(a.spec_eq(&b));
    b.attributes.insert("gpu".into(), json!("nvidia"));
    assert!(!a.spec_eq(&b));
  }

  #[test]
  fn missing_json_collections_decode_as_empty() {
    let n: Node = serde_json::from_value(json!({"namespace": "default", "name": "node01"})).expect("decode");
    assert!(n.sys_apps.is_empty());
    assert!(n.meta.labels.is_empty());
    let mut explicit = n.clone();
    explicit.sys_apps = Vec::new();
    assert!(n.spec_eq(&explicit));
  }
}
