// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un almacén de sombras en memoria (`InMemoryShadowRepository`) y un
// locker en memoria (`InMemoryLocker`). No son durables y sólo sirven dentro
// de un proceso.
use crate::errors::{Result, ShadowError};
use crate::repository::{unique_names, LockToken, Locker, ReportTime, ShadowRepository};
use chrono::Utc;
use cloud_domain::shadow::{report_time_from_str, shadow_key};
use cloud_domain::{gen_resource_version, Shadow, StoredShadow};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Almacén de sombras en memoria.
///
/// Guarda la forma serializada (`StoredShadow`) para que lecturas y
/// escrituras pasen por el mismo códec que la implementación SQL.
pub struct InMemoryShadowRepository {
    rows: Mutex<BTreeMap<(String, String), StoredShadow>>,
}

impl InMemoryShadowRepository {
    pub fn new() -> Self {
        Self { rows: Mutex::new(BTreeMap::new()) }
    }

    fn rows(&self) -> Result<MutexGuard<'_, BTreeMap<(String, String), StoredShadow>>> {
        self.rows.lock().map_err(|e| ShadowError::Storage(format!("Mutex 'shadows' poisoned: {}", e)))
    }

    /// Reemplaza el texto crudo de una columna. Sólo para pruebas de filas
    /// corruptas o heredadas.
    pub fn put_raw(&self, row: StoredShadow) -> Result<()> {
        self.rows()?.insert((row.namespace.clone(), row.name.clone()), row);
        Ok(())
    }

    fn update_with<F>(&self, shadow: &Shadow, apply: F) -> Result<Shadow>
        where F: FnOnce(&mut StoredShadow)
    {
        let mut rows = self.rows()?;
        let key = (shadow.namespace.clone(), shadow.name.clone());
        let row = rows.get_mut(&key).ok_or_else(|| ShadowError::NotFound(shadow.key()))?;
        apply(row);
        row.update_time = Utc::now().timestamp_millis();
        Ok(Shadow::from_stored(row.clone())?)
    }
}

impl Default for InMemoryShadowRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowRepository for InMemoryShadowRepository {
    fn get(&self, namespace: &str, name: &str) -> Result<Shadow> {
        let rows = self.rows()?;
        let row = rows.get(&(namespace.to_string(), name.to_string()))
                      .cloned()
                      .ok_or_else(|| ShadowError::NotFound(shadow_key(namespace, name)))?;
        Ok(Shadow::from_stored(row)?)
    }

    fn create(&self, shadow: &Shadow) -> Result<Shadow> {
        shadow.validate()?;
        let mut row = shadow.to_stored()?;
        let now = Utc::now().timestamp_millis();
        row.create_time = now;
        row.update_time = now;
        if row.desire_version.is_empty() {
            row.desire_version = gen_resource_version();
        }
        let mut rows = self.rows()?;
        let key = (row.namespace.clone(), row.name.clone());
        if rows.contains_key(&key) {
            return Err(ShadowError::DuplicateKey(shadow.key()));
        }
        rows.insert(key, row.clone());
        Ok(Shadow::from_stored(row)?)
    }

    fn update_report(&self, shadow: &Shadow) -> Result<Shadow> {
        let report = shadow.encode_report()?;
        self.update_with(shadow, |row| row.report = report)
    }

    fn update_desire(&self, shadow: &Shadow) -> Result<Shadow> {
        let desire = shadow.encode_desire()?;
        self.update_with(shadow, |row| {
                row.desire = desire;
                row.desire_version = gen_resource_version();
            })
    }

    fn update_report_meta(&self, shadow: &Shadow) -> Result<Shadow> {
        let meta = shadow.encode_report_meta()?;
        self.update_with(shadow, |row| row.report_meta = meta)
    }

    fn update_desire_meta(&self, shadow: &Shadow) -> Result<Shadow> {
        let meta = shadow.encode_desire_meta()?;
        self.update_with(shadow, |row| row.desire_meta = meta)
    }

    fn update_report_with_meta(&self, shadow: &Shadow) -> Result<Shadow> {
        let report = shadow.encode_report()?;
        let meta = shadow.encode_report_meta()?;
        self.update_with(shadow, |row| {
                row.report = report;
                row.report_meta = meta;
            })
    }

    fn update_desire_with_meta(&self, shadow: &Shadow) -> Result<Shadow> {
        let desire = shadow.encode_desire()?;
        let meta = shadow.encode_desire_meta()?;
        self.update_with(shadow, |row| {
                row.desire = desire;
                row.desire_meta = meta;
                row.desire_version = gen_resource_version();
            })
    }

    fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.rows()?.remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    fn list(&self, namespace: &str) -> Result<Vec<Shadow>> {
        let rows = self.rows()?;
        rows.values()
            .filter(|r| r.namespace == namespace)
            .map(|r| Shadow::from_stored(r.clone()).map_err(ShadowError::from))
            .collect()
    }

    fn list_by_node_names(&self, namespace: &str, names: &[String]) -> Result<Vec<Shadow>> {
        let rows = self.rows()?;
        let mut out = Vec::new();
        for name in unique_names(names) {
            if let Some(row) = rows.get(&(namespace.to_string(), name)) {
                out.push(Shadow::from_stored(row.clone())?);
            }
        }
        Ok(out)
    }

    fn list_report_times(&self, namespace: &str, names: &[String]) -> Result<Vec<ReportTime>> {
        let rows = self.rows()?;
        let mut out = Vec::new();
        for name in unique_names(names) {
            if let Some(row) = rows.get(&(namespace.to_string(), name.clone())) {
                let time = report_time_from_str(&row.report).unwrap_or_else(|e| {
                                                                 log::warn!("report time of {}/{} ignored: {}",
                                                                            namespace, name, e);
                                                                 None
                                                             });
                out.push(ReportTime { name, time });
            }
        }
        Ok(out)
    }
}

/// Locker en memoria. Útil para un único proceso y para pruebas.
#[derive(Debug, Default)]
pub struct InMemoryLocker {
    held: Mutex<HashMap<String, (LockToken, Instant)>>,
}

impl InMemoryLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indica si hay un lock vigente con ese nombre.
    pub fn is_held(&self, name: &str) -> bool {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.get(name).map(|(_, exp)| *exp > Instant::now()).unwrap_or(false)
    }
}

impl Locker for InMemoryLocker {
    fn acquire(&self, name: &str, ttl: Duration) -> Result<LockToken> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if let Some((_, expires)) = held.get(name) {
            if *expires > now {
                return Err(ShadowError::LockHeld(name.to_string()));
            }
        }
        let token = LockToken::generate();
        held.insert(name.to_string(), (token.clone(), now + ttl));
        Ok(token)
    }

    fn release(&self, name: &str, token: &LockToken) -> Result<()> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if held.get(name).map(|(t, _)| t == token).unwrap_or(false) {
            held.remove(name);
        }
        Ok(())
    }
}
