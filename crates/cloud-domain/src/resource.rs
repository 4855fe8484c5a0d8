// resource.rs
use crate::equality::SpecEq;
use crate::version::gen_resource_version;
use crate::DomainError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadatos comunes de todos los recursos mutables.
///
/// `version`, `creation_timestamp` y `update_timestamp` los asigna el
/// servidor; el resto lo controla el cliente.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
  pub namespace: String,
  pub name: String,
  #[serde(default)]
  pub labels: BTreeMap<String, String>,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub version: String,
  #[serde(default)]
  pub creation_timestamp: DateTime<Utc>,
  #[serde(default)]
  pub update_timestamp: DateTime<Utc>,
}

impl ObjectMeta {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self { namespace: namespace.into(), name: name.into(), ..Default::default() }
  }

  pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where I: IntoIterator<Item = (K, V)>,
          K: Into<String>,
          V: Into<String>
  {
    self.labels = labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
    self
  }

  pub fn key(&self) -> String {
    format!("{}/{}", self.namespace, self.name)
  }
}

impl SpecEq for ObjectMeta {
  fn spec_eq(&self, other: &Self) -> bool {
    self.namespace == other.namespace
    && self.name == other.name
    && self.labels == other.labels
    && self.description == other.description
  }
}

/// Recurso mutable y versionado (Node, Configuration, Secret, ...).
pub trait Resource: SpecEq + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
  /// Nombre estable del tipo, usado como discriminador en almacenamiento.
  const KIND: &'static str;

  fn meta(&self) -> &ObjectMeta;
  fn meta_mut(&mut self) -> &mut ObjectMeta;

  fn validate(&self) -> Result<(), DomainError> {
    let meta = self.meta();
    if meta.namespace.trim().is_empty() {
      return Err(DomainError::ValidationError(format!("{}: namespace vacío", Self::KIND)));
    }
    if meta.name.trim().is_empty() {
      return Err(DomainError::ValidationError(format!("{}: nombre vacío", Self::KIND)));
    }
    Ok(())
  }
}

/// Decisión de escritura para una actualización.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePlan<T> {
  /// El payload es igual al guardado: no se escribe y se conserva la versión.
  Unchanged(T),
  /// Valor a persistir, con versión nueva y `update_timestamp` actualizado.
  Write(T),
}

impl<T> UpdatePlan<T> {
  pub fn into_inner(self) -> T {
    match self {
      UpdatePlan::Unchanged(t) | UpdatePlan::Write(t) => t,
    }
  }

  pub fn is_write(&self) -> bool {
    matches!(self, UpdatePlan::Write(_))
  }
}

/// Prepara un recurso nuevo: versión y marcas de tiempo del servidor.
pub fn prepare_create<T: Resource>(mut incoming: T, now: DateTime<Utc>) -> Result<T, DomainError> {
  incoming.validate()?;
  let meta = incoming.meta_mut();
  meta.version = gen_resource_version();
  meta.creation_timestamp = now;
  meta.update_timestamp = now;
  Ok(incoming)
}

/// Aplica la convención de igualdad-antes-de-escribir.
///
/// Si `incoming` es `spec_eq` a `stored` devuelve el valor guardado intacto;
/// si no, devuelve `incoming` con los campos de servidor heredados de
/// `stored` y una versión recién generada.
pub fn plan_update<T: Resource>(stored: T, mut incoming: T, now: DateTime<Utc>) -> Result<UpdatePlan<T>, DomainError> {
  incoming.validate()?;
  if stored.meta().key() != incoming.meta().key() {
    return Err(DomainError::ValidationError(format!("{}: no se puede renombrar {} a {}",
                                                    T::KIND,
                                                    stored.meta().key(),
                                                    incoming.meta().key())));
  }
  if stored.spec_eq(&incoming) {
    return Ok(UpdatePlan::Unchanged(stored));
  }
  let meta = incoming.meta_mut();
  meta.version = gen_resource_version();
  meta.creation_timestamp = stored.meta().creation_timestamp;
  meta.update_timestamp = now;
  Ok(UpdatePlan::Write(incoming))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Configuration;
  use chrono::Duration;

  fn config(data: &[(&str, &str)]) -> Configuration {
    Configuration::new("default", "cfg01").with_data(data.iter().copied())
  }

  #[test]
  fn equal_payload_keeps_version_and_timestamps() -> Result<(), DomainError> {
    let t0 = Utc::now();
    let stored = prepare_create(config(&[("k", "v")]), t0)?;
    let mut incoming = config(&[("k", "v")]);
    incoming.meta.version = "client-sent".into();
    let plan = plan_update(stored.clone(), incoming, t0 + Duration::seconds(5))?;
    assert!(!plan.is_write());
    let kept = plan.into_inner();
    assert_eq!(kept.meta.version, stored.meta.version);
    assert_eq!(kept.meta.update_timestamp, t0);
    Ok(())
  }

  #[test]
  fn changed_payload_mints_version_and_keeps_creation() -> Result<(), DomainError> {
    let t0 = Utc::now();
    let t1 = t0 + Duration::seconds(5);
    let stored = prepare_create(config(&[("k", "v")]), t0)?;
    let plan = plan_update(stored.clone(), config(&[("k", "v2")]), t1)?;
    assert!(plan.is_write());
    let next = plan.into_inner();
    assert_ne!(next.meta.version, stored.meta.version);
    assert_eq!(next.meta.creation_timestamp, t0);
    assert_eq!(next.meta.update_timestamp, t1);
    Ok(())
  }

  #[test]
  fn rename_and_blank_name_are_rejected() -> Result<(), DomainError> {
    let stored = prepare_create(config(&[]), Utc::now())?;
    let renamed = Configuration::new("default", "other");
    assert!(matches!(plan_update(stored, renamed, Utc::now()), Err(DomainError::ValidationError(_))));
    assert!(matches!(prepare_create(Configuration::new("default", " "), Utc::now()),
                     Err(DomainError::ValidationError(_))));
    Ok(())
  }
}
