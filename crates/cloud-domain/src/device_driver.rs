// device_driver.rs
use crate::equality::{json_eq, SpecEq};
use crate::resource::{ObjectMeta, Resource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Driver de protocolo desplegable en nodos. La configuración por defecto es
/// opaca para la nube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDriver {
  #[serde(flatten)]
  pub meta: ObjectMeta,
  pub protocol: String,
  #[serde(default)]
  pub arch: String,
  #[serde(default)]
  pub driver_type: i32,
  #[serde(default)]
  pub default_config: Value,
}

impl DeviceDriver {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>, protocol: impl Into<String>) -> Self {
    Self { meta: ObjectMeta::new(namespace, name),
           protocol: protocol.into(),
           arch: String::new(),
           driver_type: 0,
           default_config: Value::Null }
  }
}

impl SpecEq for DeviceDriver {
  fn spec_eq(&self, other: &Self) -> bool {
    self.meta.spec_eq(&other.meta)
    && self.protocol == other.protocol
    && self.arch == other.arch
    && self.driver_type == other.driver_type
    && json_eq(&self.default_config, &other.default_config)
  }
}

impl Resource for DeviceDriver {
  const KIND: &'static str = "device-driver";

  fn meta(&self) -> &ObjectMeta {
    &self.meta
  }

  fn meta_mut(&mut self) -> &mut ObjectMeta {
    &mut self.meta
  }
}
