// Repositorio Diesel genérico para recursos versionados (tabla `resources`).
// El payload se guarda como JSON; `kind` separa los tipos en la misma tabla.
use crate::database::{Database, DbConn, TxContext, TxError};
use crate::schema;
use crate::schema::resources::dsl as rs;
use chrono::Utc;
use cloud_domain::resource::{plan_update, prepare_create};
use cloud_domain::{DomainError, Resource, ResourceRepository, UpdatePlan};
use diesel::prelude::*;
use std::marker::PhantomData;

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::resources)]
struct ResourceRow {
  pub kind: String,
  pub namespace: String,
  pub name: String,
  pub version: String,
  pub payload: String,
  pub create_time: i64,
  pub update_time: i64,
}

fn to_row<T: Resource>(item: &T) -> Result<ResourceRow, DomainError> {
  let meta = item.meta();
  Ok(ResourceRow { kind: T::KIND.to_string(),
                   namespace: meta.namespace.clone(),
                   name: meta.name.clone(),
                   version: meta.version.clone(),
                   payload: serde_json::to_string(item)?,
                   create_time: meta.creation_timestamp.timestamp_millis(),
                   update_time: meta.update_timestamp.timestamp_millis() })
}

fn from_row<T: Resource>(row: ResourceRow) -> Result<T, DomainError> {
  serde_json::from_str(&row.payload).map_err(|e| {
                                      DomainError::SerializationError(format!("{} {}/{}: {}",
                                                                              row.kind, row.namespace, row.name, e))
                                    })
}

fn load<T: Resource>(conn: &mut DbConn, namespace: &str, name: &str) -> Result<Option<T>, TxError> {
  let row = rs::resources.filter(rs::kind.eq(T::KIND).and(rs::namespace.eq(namespace)).and(rs::name.eq(name)))
                         .select(ResourceRow::as_select())
                         .first::<ResourceRow>(conn)
                         .optional()?;
  match row {
    Some(r) => Ok(Some(from_row(r)?)),
    None => Ok(None),
  }
}

/// Repositorio Diesel que implementa `ResourceRepository<T>` para cualquier
/// `Resource`, aplicando igualdad-antes-de-escribir en `update`.
pub struct DieselResourceRepository<T> {
  db: Database,
  _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for DieselResourceRepository<T> {
  fn clone(&self) -> Self {
    Self { db: self.db.clone(), _kind: PhantomData }
  }
}

impl<T: Resource> DieselResourceRepository<T> {
  pub fn new(db: Database) -> Self {
    Self { db, _kind: PhantomData }
  }

  fn key(namespace: &str, name: &str) -> String {
    format!("{} {}/{}", T::KIND, namespace, name)
  }

  pub fn get_tx(&self, tx: TxContext<'_>, namespace: &str, name: &str) -> Result<T, DomainError> {
    let key = Self::key(namespace, name);
    self.db
        .run(tx, |conn| load::<T>(conn, namespace, name)?.ok_or_else(|| DomainError::NotFound(key.clone()).into()))
        .map_err(|e| e.into_domain("get", &key))
  }

  pub fn create_tx(&self, tx: TxContext<'_>, item: T) -> Result<T, DomainError> {
    let item = prepare_create(item, Utc::now())?;
    let row = to_row(&item)?;
    let key = Self::key(&row.namespace, &row.name);
    self.db
        .run(tx, |conn| {
          diesel::insert_into(rs::resources).values(&row).execute(conn)?;
          Ok(())
        })
        .map_err(|e| e.into_domain("create", &key))?;
    Ok(item)
  }

  /// Actualiza sólo si el contenido cambió. Con contenido igual devuelve el
  /// valor guardado, con su versión intacta, sin escribir.
  pub fn update_tx(&self, tx: TxContext<'_>, item: T) -> Result<T, DomainError> {
    let key = Self::key(&item.meta().namespace, &item.meta().name);
    self.db
        .run(tx, |conn| {
          let stored = load::<T>(conn, &item.meta().namespace, &item.meta().name)?
            .ok_or_else(|| DomainError::NotFound(key.clone()))?;
          match plan_update(stored, item, Utc::now())? {
            UpdatePlan::Unchanged(stored) => {
              log::debug!("update {}: unchanged, version {} kept", key, stored.meta().version);
              Ok(stored)
            }
            UpdatePlan::Write(next) => {
              let row = to_row(&next)?;
              diesel::update(rs::resources.filter(rs::kind.eq(T::KIND)
                                                            .and(rs::namespace.eq(&row.namespace))
                                                            .and(rs::name.eq(&row.name))))
                .set((rs::version.eq(&row.version), rs::payload.eq(&row.payload), rs::update_time.eq(row.update_time)))
                .execute(conn)?;
              Ok(next)
            }
          }
        })
        .map_err(|e| e.into_domain("update", &key))
  }

  pub fn delete_tx(&self, tx: TxContext<'_>, namespace: &str, name: &str) -> Result<(), DomainError> {
    let key = Self::key(namespace, name);
    self.db
        .run(tx, |conn| {
          let n = diesel::delete(rs::resources.filter(rs::kind.eq(T::KIND)
                                                              .and(rs::namespace.eq(namespace))
                                                              .and(rs::name.eq(name)))).execute(conn)?;
          if n == 0 {
            log::debug!("delete {}: no row", key);
          }
          Ok(())
        })
        .map_err(|e| e.into_domain("delete", &key))
  }

  pub fn list_tx(&self, tx: TxContext<'_>, namespace: &str) -> Result<Vec<T>, DomainError> {
    self.db
        .run(tx, |conn| {
          let rows = rs::resources.filter(rs::kind.eq(T::KIND).and(rs::namespace.eq(namespace)))
                                  .order(rs::name.asc())
                                  .select(ResourceRow::as_select())
                                  .load::<ResourceRow>(conn)?;
          rows.into_iter().map(|r| from_row::<T>(r).map_err(TxError::from)).collect()
        })
        .map_err(|e| e.into_domain("list", &format!("{} {}", T::KIND, namespace)))
  }
}

impl<T: Resource> ResourceRepository<T> for DieselResourceRepository<T> {
  fn get(&self, namespace: &str, name: &str) -> Result<T, DomainError> {
    self.get_tx(TxContext::None, namespace, name)
  }

  fn create(&self, item: T) -> Result<T, DomainError> {
    self.create_tx(TxContext::None, item)
  }

  fn update(&self, item: T) -> Result<T, DomainError> {
    self.update_tx(TxContext::None, item)
  }

  fn delete(&self, namespace: &str, name: &str) -> Result<(), DomainError> {
    self.delete_tx(TxContext::None, namespace, name)
  }

  fn list(&self, namespace: &str) -> Result<Vec<T>, DomainError> {
    self.list_tx(TxContext::None, namespace)
  }
}
