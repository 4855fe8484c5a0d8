// merge.rs
use crate::shadow::{ensure_apps_skeleton, Meta};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Fusiona `patch` en `base` con semántica de JSON merge patch (RFC 7386):
/// los objetos se fusionan recursivamente, `null` borra la clave y cualquier
/// otro valor (listas incluidas) reemplaza al anterior.
pub fn merge_document(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
  for (key, value) in patch {
    match value {
      Value::Null => {
        base.remove(key);
      }
      Value::Object(sub) => {
        let slot = base.entry(key.clone()).or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
          *slot = Value::Object(Map::new());
        }
        if let Value::Object(target) = slot {
          merge_document(target, sub);
        }
      }
      other => {
        base.insert(key.clone(), other.clone());
      }
    }
  }
}

/// Resultado de reconciliar un documento con un parche parcial.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
  pub document: Map<String, Value>,
  pub changed: bool,
}

/// Aplica el parche sobre una copia de `current` y decide si hace falta
/// escribir. El esqueleto de aplicaciones se restablece siempre.
///
/// La comparación es exacta: el documento se guarda tal cual, así que un
/// `{}` o `[]` nuevo cuenta como cambio.
pub fn reconcile(current: &Map<String, Value>, patch: &Map<String, Value>) -> Reconciled {
  let mut document = current.clone();
  merge_document(&mut document, patch);
  ensure_apps_skeleton(&mut document);
  let changed = current != &document;
  Reconciled { document, changed }
}

/// Marca en `meta` la hora de actualización de cada clave de primer nivel
/// presente en el parche.
pub fn touch_meta(meta: &mut Meta, patch: &Map<String, Value>, now: DateTime<Utc>) {
  let stamp = Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true));
  for key in patch.keys() {
    meta.insert(key.clone(), stamp.clone());
  }
}
