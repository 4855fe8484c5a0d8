// Pool de conexiones, configuración y contexto transaccional compartidos por
// los repositorios Diesel (sombras, recursos y locks).
use cloud_domain::DomainError;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PoolError, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use shadow::{ShadowError, DEFAULT_LIST_BATCH_SIZE};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

#[cfg(feature = "pg")]
pub type DbConn = PgConnection;
#[cfg(not(feature = "pg"))]
pub type DbConn = SqliteConnection;
type DbPool = Pool<ConnectionManager<DbConn>>;

#[cfg(not(feature = "pg"))]
const DEFAULT_SQLITE_URL: &str = "cloud-shadow.db";

/// Parámetros del almacén. `from_env` lee las variables `CLOUD_DB_*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
  pub database_url: String,
  pub pool_size: u32,
  /// Espera máxima por un lock de SQLite o, en Postgres, `statement_timeout`.
  pub busy_timeout: Duration,
  /// Espera máxima para obtener una conexión del pool.
  pub connection_timeout: Duration,
  /// Nombres por consulta `IN (...)` en los listados por nodo.
  pub list_batch_size: usize,
}

impl StoreConfig {
  pub fn new(database_url: impl Into<String>) -> Self {
    Self { database_url: database_url.into(),
           pool_size: 4,
           busy_timeout: Duration::from_millis(5000),
           connection_timeout: Duration::from_secs(30),
           list_batch_size: DEFAULT_LIST_BATCH_SIZE }
  }

  pub fn from_env() -> Result<Self, DomainError> {
    dotenvy::dotenv().ok();
    let url = std::env::var("CLOUD_DB_URL").or_else(|_| std::env::var("DATABASE_URL"));
    #[cfg(feature = "pg")]
    let url = {
      let url = url.map_err(|_| DomainError::ExternalError("CLOUD_DB_URL / DATABASE_URL not set".into()))?;
      let l = url.to_lowercase();
      if !(l.starts_with("postgres://") || l.starts_with("postgresql://") || url.contains('@')) {
        return Err(DomainError::ExternalError("CLOUD_DB_URL / DATABASE_URL does not look like Postgres URL".into()));
      }
      url
    };
    #[cfg(not(feature = "pg"))]
    let url = {
      let url = url.unwrap_or_else(|_| DEFAULT_SQLITE_URL.into());
      let l = url.to_lowercase();
      if l.starts_with("postgres://") || l.starts_with("postgresql://") {
        return Err(DomainError::ExternalError("cloud-persistence was compiled without 'pg' feature; enable the \
                                               'pg' feature to use Postgres"
                                                                            .into()));
      }
      url
    };
    let mut cfg = Self::new(url);
    cfg.pool_size = env_parse("CLOUD_DB_POOL_SIZE", cfg.pool_size)?;
    cfg.busy_timeout = Duration::from_millis(env_parse("CLOUD_DB_BUSY_TIMEOUT_MS", 5000u64)?);
    cfg.list_batch_size = env_parse("CLOUD_SHADOW_LIST_BATCH", cfg.list_batch_size)?.max(1);
    Ok(cfg)
  }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, DomainError> {
  match std::env::var(key) {
    Ok(raw) => raw.trim()
                  .parse()
                  .map_err(|_| DomainError::ValidationError(format!("{}: valor inválido '{}'", key, raw))),
    Err(_) => Ok(default),
  }
}

/// Ajustes aplicados a cada conexión nueva del pool.
#[derive(Debug)]
struct ConnectionSetup {
  busy_timeout: Duration,
}

impl CustomizeConnection<DbConn, diesel::r2d2::Error> for ConnectionSetup {
  fn on_acquire(&self, conn: &mut DbConn) -> Result<(), diesel::r2d2::Error> {
    #[cfg(not(feature = "pg"))]
    let setup = format!("PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL;",
                        self.busy_timeout.as_millis());
    #[cfg(feature = "pg")]
    let setup = format!("SET statement_timeout = {};", self.busy_timeout.as_millis());
    conn.batch_execute(&setup).map_err(diesel::r2d2::Error::QueryError)
  }
}

/// Transacción en curso que el llamador quiere compartir.
///
/// `None` abre una transacción propia con una conexión del pool;
/// `Active(conn)` se une a la del llamador mediante un savepoint, de modo
/// que varias operaciones se confirman o revierten juntas.
pub enum TxContext<'a> {
  None,
  Active(&'a mut DbConn),
}

/// Error interno de una transacción. Diesel exige `From<DieselError>` en el
/// tipo de error del cierre; se traduce al error público al salir.
#[derive(Debug, Error)]
pub(crate) enum TxError {
  #[error("db: {0}")]
  Db(#[from] DieselError),
  #[error("pool: {0}")]
  Pool(#[from] PoolError),
  #[error(transparent)]
  Domain(#[from] DomainError),
  #[error(transparent)]
  Shadow(#[from] ShadowError),
}

impl TxError {
  pub(crate) fn into_shadow(self, op: &str, key: &str) -> ShadowError {
    match self {
      TxError::Db(DieselError::NotFound) => ShadowError::NotFound(key.to_string()),
      TxError::Db(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
        ShadowError::DuplicateKey(key.to_string())
      }
      TxError::Db(DieselError::DeserializationError(e)) => {
        ShadowError::Serialization(format!("{} {}: {}", op, key, e))
      }
      TxError::Db(e) => ShadowError::Storage(format!("{} {}: db: {}", op, key, e)),
      TxError::Pool(e) => ShadowError::Storage(format!("{} {}: pool: {}", op, key, e)),
      TxError::Domain(e) => ShadowError::from(e),
      TxError::Shadow(e) => e,
    }
  }

  pub(crate) fn into_domain(self, op: &str, key: &str) -> DomainError {
    match self {
      TxError::Db(DieselError::NotFound) => DomainError::NotFound(key.to_string()),
      TxError::Db(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
        DomainError::DuplicateKey(key.to_string())
      }
      TxError::Db(e) => DomainError::ExternalError(format!("{} {}: db: {}", op, key, e)),
      TxError::Pool(e) => DomainError::ExternalError(format!("{} {}: pool: {}", op, key, e)),
      TxError::Domain(e) => e,
      TxError::Shadow(e) => DomainError::ExternalError(format!("{} {}: {}", op, key, e)),
    }
  }
}

/// Pool compartido más su configuración. Clonar es barato.
#[derive(Clone)]
pub struct Database {
  pool: Arc<DbPool>,
  config: StoreConfig,
}

impl Database {
  /// Crea el pool y aplica las migraciones pendientes.
  pub fn connect(config: StoreConfig) -> Result<Self, DomainError> {
    let manager = ConnectionManager::<DbConn>::new(config.database_url.as_str());
    let pool = Pool::builder().max_size(config.pool_size.max(1))
                              .connection_timeout(config.connection_timeout)
                              .connection_customizer(Box::new(ConnectionSetup { busy_timeout: config.busy_timeout }))
                              .build(manager)
                              .map_err(|e| DomainError::ExternalError(format!("pool: {}", e)))?;
    let db = Database { pool: Arc::new(pool), config };
    let mut conn = db.conn().map_err(|e| e.into_domain("migrations", &db.config.database_url))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| DomainError::ExternalError(format!("migrations: {}", e)))?;
    log::info!("cloud-persistence: store ready ({} connections max)", db.config.pool_size.max(1));
    Ok(db)
  }

  pub fn config(&self) -> &StoreConfig {
    &self.config
  }

  pub(crate) fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>, TxError> {
    Ok(self.pool.get()?)
  }

  /// Ejecuta `f` dentro de una transacción: la propia si `tx` es `None`, o
  /// un savepoint sobre la del llamador.
  pub(crate) fn run<T, F>(&self, tx: TxContext<'_>, f: F) -> Result<T, TxError>
    where F: FnOnce(&mut DbConn) -> Result<T, TxError>
  {
    match tx {
      TxContext::Active(conn) => conn.transaction(f),
      TxContext::None => {
        let mut conn = self.conn()?;
        begin(&mut conn, f)
      }
    }
  }
}

// SQLite: BEGIN IMMEDIATE toma el lock de escritura al empezar y evita el
// fallo inmediato al promover una lectura a escritura entre conexiones.
#[cfg(not(feature = "pg"))]
fn begin<T, F>(conn: &mut DbConn, f: F) -> Result<T, TxError>
  where F: FnOnce(&mut DbConn) -> Result<T, TxError>
{
  conn.immediate_transaction(f)
}

#[cfg(feature = "pg")]
fn begin<T, F>(conn: &mut DbConn, f: F) -> Result<T, TxError>
  where F: FnOnce(&mut DbConn) -> Result<T, TxError>
{
  conn.transaction(f)
}

/// Conecta usando `CLOUD_DB_URL` / `DATABASE_URL` y el resto de variables
/// `CLOUD_DB_*`.
pub fn new_from_env() -> Result<Database, DomainError> {
  Database::connect(StoreConfig::from_env()?)
}

/// Base SQLite en un fichero concreto, sin leer el entorno.
#[cfg(not(feature = "pg"))]
pub fn new_sqlite_for_test(path: &str) -> Result<Database, DomainError> {
  Database::connect(StoreConfig::new(path))
}
