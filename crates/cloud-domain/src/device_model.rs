// device_model.rs
use crate::equality::SpecEq;
use crate::resource::{ObjectMeta, Resource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceModelProperty {
  pub name: String,
  pub id: String,
  #[serde(rename = "type")]
  pub property_type: String,
  #[serde(default)]
  pub mode: String,
  #[serde(default)]
  pub unit: String,
}

/// Plantilla de dispositivo: protocolo y propiedades que expone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceModel {
  #[serde(flatten)]
  pub meta: ObjectMeta,
  pub protocol: String,
  #[serde(default)]
  pub properties: Vec<DeviceModelProperty>,
}

impl DeviceModel {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>, protocol: impl Into<String>) -> Self {
    Self { meta: ObjectMeta::new(namespace, name), protocol: protocol.into(), properties: Vec::new() }
  }
}

impl SpecEq for DeviceModel {
  fn spec_eq(&self, other: &Self) -> bool {
    self.meta.spec_eq(&other.meta) && self.protocol == other.protocol && self.properties == other.properties
  }
}

impl Resource for DeviceModel {
  const KIND: &'static str = "device-model";

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

  fn prop(name: &str) -> DeviceModelProperty {
    DeviceModelProperty { name: name.into(),
                          id: name.into(),
                          property_type: "float32".into(),
                          mode: "ro".into(),
                          unit: "C".into() }
  }

  #[test]
  fn property_order_matters() {
    let mut a = DeviceModel::new("default", "thermo", "modbus");
    a.properties = vec![prop("t1"), prop("t2")];
    let mut b = a.clone();
    assert!(a.spec_eq(&b));
    b.properties.reverse();
    assert!(!a.spec_eq(&b));
  }
}
