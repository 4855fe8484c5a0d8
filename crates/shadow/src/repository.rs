// Archivo: repository.rs
// Propósito: definir el trait `ShadowRepository` y el colaborador de
// exclusión mutua `Locker`. Describe el contrato que deben implementar las
// persistencias (SQLite/Postgres vía Diesel, in-memory, etc.).
use crate::errors::Result;
use chrono::{DateTime, Utc};
use cloud_domain::Shadow;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tamaño de lote por defecto para `list_by_node_names`.
pub const DEFAULT_LIST_BATCH_SIZE: usize = 200;

/// Hora del último reporte de un nodo, tal como la devuelve la lectura ligera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTime {
    pub name: String,
    /// `None` si el reporte no tiene `time` o no se pudo interpretar.
    pub time: Option<DateTime<Utc>>,
}

/// Contrato del almacén de sombras.
///
/// Cada operación es un leer-modificar-escribir atómico dentro de su propia
/// transacción: quien llama ve la sombra completamente actualizada o un
/// error, nunca un estado intermedio. El almacén NO serializa operaciones
/// concurrentes sobre la misma clave (gana la última transacción en
/// confirmar); para eso está `Locker`. Tampoco cachea nada: cada llamada va
/// al almacén.
pub trait ShadowRepository: Send + Sync {
    /// Lee una sombra. `ShadowError::NotFound` si la fila no existe.
    fn get(&self, namespace: &str, name: &str) -> Result<Shadow>;

    /// Inserta la sombra y devuelve la forma canónica releída del almacén.
    /// Si `desire_version` viene vacío se genera uno.
    fn create(&self, shadow: &Shadow) -> Result<Shadow>;

    /// Escribe sólo la columna `report` de la sombra indicada.
    fn update_report(&self, shadow: &Shadow) -> Result<Shadow>;

    /// Escribe sólo `desire` y estampa un `desire_version` nuevo.
    fn update_desire(&self, shadow: &Shadow) -> Result<Shadow>;

    /// Escribe sólo `report_meta`.
    fn update_report_meta(&self, shadow: &Shadow) -> Result<Shadow>;

    /// Escribe sólo `desire_meta`.
    fn update_desire_meta(&self, shadow: &Shadow) -> Result<Shadow>;

    /// Escribe `report` y `report_meta` en una sola transacción: o quedan
    /// ambos o ninguno.
    fn update_report_with_meta(&self, shadow: &Shadow) -> Result<Shadow>;

    /// Escribe `desire` y `desire_meta` juntos y estampa un `desire_version`
    /// nuevo, todo en una sola transacción.
    fn update_desire_with_meta(&self, shadow: &Shadow) -> Result<Shadow>;

    /// Borrado físico. Borrar una sombra inexistente no es un error.
    fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// Todas las sombras de un namespace.
    fn list(&self, namespace: &str) -> Result<Vec<Shadow>>;

    /// Sombras de los nodos indicados. Los nombres se consultan por lotes;
    /// el orden del resultado no está garantizado y los nombres sin fila se
    /// omiten.
    fn list_by_node_names(&self, namespace: &str, names: &[String]) -> Result<Vec<Shadow>>;

    /// Lectura ligera de la hora del último reporte. Un reporte sin hora o
    /// con hora ilegible produce `time: None`, no un error.
    fn list_report_times(&self, namespace: &str, names: &[String]) -> Result<Vec<ReportTime>>;
}

/// Token opaco que identifica al dueño de un lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(pub String);

impl LockToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Exclusión mutua con nombre y TTL.
///
/// `acquire` no bloquea: devuelve `ShadowError::LockHeld` si otro dueño tiene
/// un lock vigente. Un lock vencido puede tomarse. `release` sólo libera si
/// el token sigue siendo el dueño.
pub trait Locker: Send + Sync {
    fn acquire(&self, name: &str, ttl: Duration) -> Result<LockToken>;
    fn release(&self, name: &str, token: &LockToken) -> Result<()>;
}

/// Nombre del lock que protege la sombra `(namespace, name)`.
pub fn shadow_lock_name(namespace: &str, name: &str) -> String {
    format!("shadow/{}/{}", namespace, name)
}

/// Nombres ordenados y sin repetir.
pub fn unique_names(names: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = names.to_vec();
    unique.sort();
    unique.dedup();
    unique
}

/// Deduplica los nombres y los parte en lotes de a lo sumo `batch_size`.
pub fn name_batches(names: &[String], batch_size: usize) -> Vec<Vec<String>> {
    unique_names(names).chunks(batch_size.max(1)).map(|c| c.to_vec()).collect()
}
