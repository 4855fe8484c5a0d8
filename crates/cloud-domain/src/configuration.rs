// configuration.rs
use crate::equality::SpecEq;
use crate::resource::{ObjectMeta, Resource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
  #[serde(flatten)]
  pub meta: ObjectMeta,
  #[serde(default)]
  pub system: bool,
  #[serde(default)]
  pub data: BTreeMap<String, String>,
}

impl Configuration {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self { meta: ObjectMeta::new(namespace, name), system: false, data: BTreeMap::new() }
  }

  pub fn with_data<I, K, V>(mut self, data: I) -> Self
    where I: IntoIterator<Item = (K, V)>,
          K: Into<String>,
          V: Into<String>
  {
    self.data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
    self
  }
}

impl SpecEq for Configuration {
  fn spec_eq(&self, other: &Self) -> bool {
    self.meta.spec_eq(&other.meta) && self.system == other.system && self.data == other.data
  }
}

impl Resource for Configuration {
  const KIND: &'static str = "configuration";

  fn meta(&self) -> &ObjectMeta {
    &self.meta
  }

  fn meta_mut(&mut self) -> &mut ObjectMeta {
    &mut self.meta
  }
}
