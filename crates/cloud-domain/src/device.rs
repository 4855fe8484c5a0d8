// device.rs
use crate::equality::{json_map_eq, SpecEq};
use crate::resource::{ObjectMeta, Resource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dispositivo de campo conectado a un nodo mediante un driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
  #[serde(flatten)]
  pub meta: ObjectMeta,
  pub device_model: String,
  #[serde(default)]
  pub node_name: String,
  #[serde(default)]
  pub protocol: String,
  #[serde(default)]
  pub alias: String,
  #[serde(default)]
  pub attributes: Map<String, Value>,
}

impl Device {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>, device_model: impl Into<String>) -> Self {
    Self { meta: ObjectMeta::new(namespace, name),
           device_model: device_model.into(),
           node_name: String::new(),
           protocol: String::new(),
           alias: String::new(),
           attributes: Map::new() }
  }
}

impl SpecEq for Device {
  fn spec_eq(&self, other: &Self) -> bool {
    self.meta.spec_eq(&other.meta)
    && self.device_model == other.device_model
    && self.node_name == other.node_name
    && self.protocol == other.protocol
    && self.alias == other.alias
    && json_map_eq(&self.attributes, &other.attributes)
  }
}

impl Resource for Device {
  const KIND: &'static str = "device";

  fn meta(&self) -> &ObjectMeta {
    &self.meta
  }

  fn meta_mut(&mut self) -> &mut ObjectMeta {
    &mut self.meta
  }
}
