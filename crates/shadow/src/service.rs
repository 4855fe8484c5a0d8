// Archivo: service.rs
// Propósito: implementar `ShadowService`, la capa que aplica reportes y
// deseos parciales sobre la sombra de un nodo: toma el lock de la sombra,
// carga la fila, fusiona el parche, omite la escritura si no cambia nada y
// persiste. Debe ser invocada desde la capa de sincronización o desde
// handlers HTTP.
use crate::errors::{Result, ShadowError};
use crate::repository::{shadow_lock_name, LockToken, Locker, ReportTime, ShadowRepository};
use chrono::Utc;
use cloud_domain::merge::{reconcile, touch_meta};
use cloud_domain::{Desire, Report, Shadow};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Configuración del servicio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowServiceConfig {
    /// TTL del lock de una sombra; acota cuánto queda bloqueada si el dueño muere.
    pub lock_ttl: Duration,
    /// Tiempo máximo esperando un lock ocupado.
    pub lock_wait: Duration,
    /// Pausa entre intentos de adquisición.
    pub lock_retry_interval: Duration,
}

impl Default for ShadowServiceConfig {
    fn default() -> Self {
        Self { lock_ttl: Duration::from_secs(30),
               lock_wait: Duration::from_millis(3000),
               lock_retry_interval: Duration::from_millis(50) }
    }
}

impl ShadowServiceConfig {
    /// Lee `CLOUD_LOCK_TTL_SECS`, `CLOUD_LOCK_WAIT_MS` y `CLOUD_LOCK_RETRY_MS`
    /// (con `.env` si existe). Las variables ausentes toman el valor por
    /// defecto; las ilegibles son un error.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let d = Self::default();
        Ok(Self { lock_ttl: Duration::from_secs(env_u64("CLOUD_LOCK_TTL_SECS", d.lock_ttl.as_secs())?),
                  lock_wait: Duration::from_millis(env_u64("CLOUD_LOCK_WAIT_MS", d.lock_wait.as_millis() as u64)?),
                  lock_retry_interval: Duration::from_millis(env_u64("CLOUD_LOCK_RETRY_MS",
                                                                     d.lock_retry_interval.as_millis() as u64)?) })
    }
}

fn env_u64(var: &str, default: u64) -> Result<u64> {
    match std::env::var(var) {
        Ok(v) => v.trim().parse().map_err(|_| ShadowError::Invalid(format!("{}='{}' no es un entero", var, v))),
        Err(_) => Ok(default),
    }
}

/// Lock adquirido; se libera al salir de ámbito.
struct LockGuard<'a, L: Locker> {
    locker: &'a L,
    name: String,
    token: LockToken,
}

impl<L: Locker> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if let Err(e) = self.locker.release(&self.name, &self.token) {
            log::warn!("failed to release lock {}: {}", self.name, e);
        }
    }
}

/// Servicio de alto nivel sobre sombras.
///
/// El repositorio y el locker se inyectan; no hay estado global. Los reportes
/// y deseos de una misma sombra se serializan con el locker, de modo que dos
/// parches concurrentes no se pisan.
pub struct ShadowService<R, L>
    where R: ShadowRepository,
          L: Locker
{
    repo: Arc<R>,
    locker: Arc<L>,
    config: ShadowServiceConfig,
}

impl<R, L> ShadowService<R, L>
    where R: ShadowRepository,
          L: Locker
{
    pub fn new(repo: Arc<R>, locker: Arc<L>, config: ShadowServiceConfig) -> Self {
        Self { repo, locker, config }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn get(&self, namespace: &str, name: &str) -> Result<Shadow> {
        self.repo.get(namespace, name)
    }

    /// Devuelve la sombra, creándola vacía si no existe. Si otro proceso la
    /// crea en paralelo se relee la suya.
    pub fn ensure(&self, namespace: &str, name: &str) -> Result<Shadow> {
        match self.repo.get(namespace, name) {
            Ok(s) => Ok(s),
            Err(ShadowError::NotFound(_)) => match self.repo.create(&Shadow::new(namespace, name)) {
                Ok(s) => {
                    log::info!("created shadow {}/{}", namespace, name);
                    Ok(s)
                }
                Err(ShadowError::DuplicateKey(_)) => self.repo.get(namespace, name),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Aplica un reporte parcial del nodo.
    pub fn report(&self, namespace: &str, name: &str, patch: &Report) -> Result<Shadow> {
        let _guard = self.lock(namespace, name)?;
        let mut shadow = self.ensure(namespace, name)?;
        let merged = reconcile(&shadow.report, patch);
        if !merged.changed {
            log::debug!("report for {}/{} is a no-op, skipping write", namespace, name);
            return Ok(shadow);
        }
        shadow.report = merged.document;
        touch_meta(&mut shadow.report_meta, patch, Utc::now());
        self.repo.update_report_with_meta(&shadow)
    }

    /// Aplica un deseo parcial del plano de control. Cada escritura real
    /// estampa un `desire_version` nuevo.
    pub fn desire(&self, namespace: &str, name: &str, patch: &Desire) -> Result<Shadow> {
        let _guard = self.lock(namespace, name)?;
        let mut shadow = self.ensure(namespace, name)?;
        let merged = reconcile(&shadow.desire, patch);
        if !merged.changed {
            log::debug!("desire for {}/{} is a no-op, skipping write", namespace, name);
            return Ok(shadow);
        }
        shadow.desire = merged.document;
        touch_meta(&mut shadow.desire_meta, patch, Utc::now());
        self.repo.update_desire_with_meta(&shadow)
    }

    /// Borra la sombra. El borrado en cascada junto al nodo es responsabilidad
    /// de quien llama.
    pub fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let _guard = self.lock(namespace, name)?;
        self.repo.delete(namespace, name)?;
        log::info!("deleted shadow {}/{}", namespace, name);
        Ok(())
    }

    pub fn list(&self, namespace: &str) -> Result<Vec<Shadow>> {
        self.repo.list(namespace)
    }

    pub fn list_by_node_names(&self, namespace: &str, names: &[String]) -> Result<Vec<Shadow>> {
        self.repo.list_by_node_names(namespace, names)
    }

    pub fn list_report_times(&self, namespace: &str, names: &[String]) -> Result<Vec<ReportTime>> {
        self.repo.list_report_times(namespace, names)
    }

    fn lock(&self, namespace: &str, name: &str) -> Result<LockGuard<'_, L>> {
        let lock_name = shadow_lock_name(namespace, name);
        let deadline = Instant::now() + self.config.lock_wait;
        loop {
            match self.locker.acquire(&lock_name, self.config.lock_ttl) {
                Ok(token) => return Ok(LockGuard { locker: self.locker.as_ref(), name: lock_name, token }),
                Err(ShadowError::LockHeld(_)) if Instant::now() < deadline => {
                    thread::sleep(self.config.lock_retry_interval);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
