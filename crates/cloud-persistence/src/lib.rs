//! Persistencia Diesel del subsistema de sombras y de los recursos
//! versionados.
//!
//! SQLite es el backend por defecto; con la feature `pg` se compila contra
//! Postgres. `database.rs` reúne el pool, la configuración por entorno y el
//! contexto transaccional (`TxContext`); el resto de módulos implementan los
//! traits `ShadowRepository`, `ResourceRepository` y `Locker`.

mod database;
mod lock_persistence;
mod resource_persistence;
mod shadow_persistence;
pub mod schema;

#[cfg(not(feature = "pg"))]
pub use database::new_sqlite_for_test;
pub use database::{new_from_env, Database, DbConn, StoreConfig, TxContext, MIGRATIONS};
pub use lock_persistence::DieselLocker;
pub use resource_persistence::DieselResourceRepository;
pub use shadow_persistence::DieselShadowRepository;
