// Repositorio Diesel de sombras de nodo (tabla `shadows`).
use crate::database::{Database, DbConn, TxContext, TxError};
use crate::schema;
use crate::schema::shadows::dsl as sh;
use chrono::Utc;
use cloud_domain::shadow::{report_time_from_str, shadow_key};
use cloud_domain::{gen_resource_version, Shadow, StoredShadow};
use diesel::prelude::*;
use shadow::{name_batches, ReportTime, Result, ShadowError, ShadowRepository};

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::shadows)]
struct ShadowRow {
  pub namespace: String,
  pub name: String,
  pub report: String,
  pub desire: String,
  pub report_meta: String,
  pub desire_meta: String,
  pub desire_version: String,
  pub create_time: i64,
  pub update_time: i64,
}

impl From<ShadowRow> for StoredShadow {
  fn from(r: ShadowRow) -> Self {
    StoredShadow { namespace: r.namespace,
                   name: r.name,
                   report: r.report,
                   desire: r.desire,
                   report_meta: r.report_meta,
                   desire_meta: r.desire_meta,
                   desire_version: r.desire_version,
                   create_time: r.create_time,
                   update_time: r.update_time }
  }
}

impl From<StoredShadow> for ShadowRow {
  fn from(s: StoredShadow) -> Self {
    ShadowRow { namespace: s.namespace,
                name: s.name,
                report: s.report,
                desire: s.desire,
                report_meta: s.report_meta,
                desire_meta: s.desire_meta,
                desire_version: s.desire_version,
                create_time: s.create_time,
                update_time: s.update_time }
  }
}

fn decode(row: ShadowRow) -> std::result::Result<Shadow, TxError> {
  Ok(Shadow::from_stored(row.into())?)
}

fn load(conn: &mut DbConn, namespace: &str, name: &str) -> std::result::Result<Shadow, TxError> {
  let row = sh::shadows.filter(sh::namespace.eq(namespace).and(sh::name.eq(name)))
                       .select(ShadowRow::as_select())
                       .first::<ShadowRow>(conn)
                       .optional()?
                       .ok_or_else(|| ShadowError::NotFound(shadow_key(namespace, name)))?;
  decode(row)
}

/// Comprueba que un UPDATE tocó la fila; si no, la sombra no existe.
fn expect_row(affected: usize, shadow: &Shadow) -> std::result::Result<(), TxError> {
  if affected == 0 {
    return Err(ShadowError::NotFound(shadow.key()).into());
  }
  Ok(())
}

/// Repositorio Diesel que implementa `ShadowRepository`.
///
/// Cada método del trait abre su propia transacción. Las variantes `*_tx`
/// aceptan un `TxContext` para componer varias escrituras en una sola.
#[derive(Clone)]
pub struct DieselShadowRepository {
  db: Database,
}

impl DieselShadowRepository {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  pub fn database(&self) -> &Database {
    &self.db
  }

  /// Abre una transacción y entrega la conexión para usarla con
  /// `TxContext::Active`. Si `f` falla, se revierte todo lo escrito.
  pub fn transact<T, F>(&self, f: F) -> Result<T>
    where F: FnOnce(&mut DbConn) -> Result<T>
  {
    self.db
        .run(TxContext::None, |conn| f(conn).map_err(TxError::from))
        .map_err(|e| e.into_shadow("transaction", "shadows"))
  }

  pub fn get_tx(&self, tx: TxContext<'_>, namespace: &str, name: &str) -> Result<Shadow> {
    self.db
        .run(tx, |conn| load(conn, namespace, name))
        .map_err(|e| e.into_shadow("get", &shadow_key(namespace, name)))
  }

  pub fn create_tx(&self, tx: TxContext<'_>, shadow: &Shadow) -> Result<Shadow> {
    shadow.validate()?;
    let mut stored = shadow.to_stored()?;
    let now = Utc::now().timestamp_millis();
    stored.create_time = now;
    stored.update_time = now;
    if stored.desire_version.is_empty() {
      stored.desire_version = gen_resource_version();
    }
    let row = ShadowRow::from(stored);
    self.db
        .run(tx, |conn| {
          diesel::insert_into(sh::shadows).values(&row).execute(conn)?;
          load(conn, &shadow.namespace, &shadow.name)
        })
        .map_err(|e| e.into_shadow("create", &shadow.key()))
  }

  pub fn update_report_tx(&self, tx: TxContext<'_>, shadow: &Shadow) -> Result<Shadow> {
    let report = shadow.encode_report()?;
    self.db
        .run(tx, |conn| {
          let now = Utc::now().timestamp_millis();
          let n = diesel::update(sh::shadows.filter(sh::namespace.eq(&shadow.namespace)
                                                               .and(sh::name.eq(&shadow.name))))
                    .set((sh::report.eq(&report), sh::update_time.eq(now)))
                    .execute(conn)?;
          expect_row(n, shadow)?;
          load(conn, &shadow.namespace, &shadow.name)
        })
        .map_err(|e| e.into_shadow("update report", &shadow.key()))
  }

  pub fn update_desire_tx(&self, tx: TxContext<'_>, shadow: &Shadow) -> Result<Shadow> {
    let desire = shadow.encode_desire()?;
    let version = gen_resource_version();
    self.db
        .run(tx, |conn| {
          let now = Utc::now().timestamp_millis();
          let n = diesel::update(sh::shadows.filter(sh::namespace.eq(&shadow.namespace)
                                                               .and(sh::name.eq(&shadow.name))))
                    .set((sh::desire.eq(&desire), sh::desire_version.eq(&version), sh::update_time.eq(now)))
                    .execute(conn)?;
          expect_row(n, shadow)?;
          load(conn, &shadow.namespace, &shadow.name)
        })
        .map_err(|e| e.into_shadow("update desire", &shadow.key()))
  }

  pub fn update_report_meta_tx(&self, tx: TxContext<'_>, shadow: &Shadow) -> Result<Shadow> {
    let meta = shadow.encode_report_meta()?;
    self.db
        .run(tx, |conn| {
          let now = Utc::now().timestamp_millis();
          let n = diesel::update(sh::shadows.filter(sh::namespace.eq(&shadow.namespace)
                                                               .and(sh::name.eq(&shadow.name))))
                    .set((sh::report_meta.eq(&meta), sh::update_time.eq(now)))
                    .execute(conn)?;
          expect_row(n, shadow)?;
          load(conn, &shadow.namespace, &shadow.name)
        })
        .map_err(|e| e.into_shadow("update report meta", &shadow.key()))
  }

  pub fn update_desire_meta_tx(&self, tx: TxContext<'_>, shadow: &Shadow) -> Result<Shadow> {
    let meta = shadow.encode_desire_meta()?;
    self.db
        .run(tx, |conn| {
          let now = Utc::now().timestamp_millis();
          let n = diesel::update(sh::shadows.filter(sh::namespace.eq(&shadow.namespace)
                                                               .and(sh::name.eq(&shadow.name))))
                    .set((sh::desire_meta.eq(&meta), sh::update_time.eq(now)))
                    .execute(conn)?;
          expect_row(n, shadow)?;
          load(conn, &shadow.namespace, &shadow.name)
        })
        .map_err(|e| e.into_shadow("update desire meta", &shadow.key()))
  }

  /// Un único UPDATE de `report` y `report_meta`.
  pub fn update_report_with_meta_tx(&self, tx: TxContext<'_>, shadow: &Shadow) -> Result<Shadow> {
    let report = shadow.encode_report()?;
    let meta = shadow.encode_report_meta()?;
    self.db
        .run(tx, |conn| {
          let now = Utc::now().timestamp_millis();
          let n = diesel::update(sh::shadows.filter(sh::namespace.eq(&shadow.namespace)
                                                               .and(sh::name.eq(&shadow.name))))
                    .set((sh::report.eq(&report), sh::report_meta.eq(&meta), sh::update_time.eq(now)))
                    .execute(conn)?;
          expect_row(n, shadow)?;
          load(conn, &shadow.namespace, &shadow.name)
        })
        .map_err(|e| e.into_shadow("update report", &shadow.key()))
  }

  /// Un único UPDATE de `desire`, `desire_meta` y `desire_version`.
  pub fn update_desire_with_meta_tx(&self, tx: TxContext<'_>, shadow: &Shadow) -> Result<Shadow> {
    let desire = shadow.encode_desire()?;
    let meta = shadow.encode_desire_meta()?;
    let version = gen_resource_version();
    self.db
        .run(tx, |conn| {
          let now = Utc::now().timestamp_millis();
          let n = diesel::update(sh::shadows.filter(sh::namespace.eq(&shadow.namespace)
                                                               .and(sh::name.eq(&shadow.name))))
                    .set((sh::desire.eq(&desire),
                          sh::desire_meta.eq(&meta),
                          sh::desire_version.eq(&version),
                          sh::update_time.eq(now)))
                    .execute(conn)?;
          expect_row(n, shadow)?;
          load(conn, &shadow.namespace, &shadow.name)
        })
        .map_err(|e| e.into_shadow("update desire", &shadow.key()))
  }

  pub fn delete_tx(&self, tx: TxContext<'_>, namespace: &str, name: &str) -> Result<()> {
    self.db
        .run(tx, |conn| {
          let n = diesel::delete(sh::shadows.filter(sh::namespace.eq(namespace).and(sh::name.eq(name)))).execute(conn)?;
          if n == 0 {
            log::debug!("delete {}: no row", shadow_key(namespace, name));
          }
          Ok(())
        })
        .map_err(|e| e.into_shadow("delete", &shadow_key(namespace, name)))
  }

  pub fn list_tx(&self, tx: TxContext<'_>, namespace: &str) -> Result<Vec<Shadow>> {
    self.db
        .run(tx, |conn| {
          let rows = sh::shadows.filter(sh::namespace.eq(namespace))
                                .order(sh::name.asc())
                                .select(ShadowRow::as_select())
                                .load::<ShadowRow>(conn)?;
          rows.into_iter().map(decode).collect()
        })
        .map_err(|e| e.into_shadow("list", namespace))
  }

  pub fn list_by_node_names_tx(&self,
                               tx: TxContext<'_>,
                               namespace: &str,
                               names: &[String])
                               -> Result<Vec<Shadow>> {
    let batches = name_batches(names, self.db.config().list_batch_size);
    self.db
        .run(tx, |conn| {
          let mut out = Vec::new();
          for batch in &batches {
            log::debug!("list shadows {}: batch of {} names", namespace, batch.len());
            let rows = sh::shadows.filter(sh::namespace.eq(namespace).and(sh::name.eq_any(batch)))
                                  .select(ShadowRow::as_select())
                                  .load::<ShadowRow>(conn)?;
            for row in rows {
              out.push(decode(row)?);
            }
          }
          Ok(out)
        })
        .map_err(|e| e.into_shadow("list by node names", namespace))
  }

  pub fn list_report_times_tx(&self,
                              tx: TxContext<'_>,
                              namespace: &str,
                              names: &[String])
                              -> Result<Vec<ReportTime>> {
    let batches = name_batches(names, self.db.config().list_batch_size);
    self.db
        .run(tx, |conn| {
          let mut out = Vec::new();
          for batch in &batches {
            let rows = sh::shadows.filter(sh::namespace.eq(namespace).and(sh::name.eq_any(batch)))
                                  .select((sh::name, sh::report))
                                  .load::<(String, String)>(conn)?;
            for (name, report) in rows {
              let time = report_time_from_str(&report).unwrap_or_else(|e| {
                                                          log::warn!("report time of {}/{} ignored: {}",
                                                                     namespace, name, e);
                                                          None
                                                        });
              out.push(ReportTime { name, time });
            }
          }
          Ok(out)
        })
        .map_err(|e| e.into_shadow("list report times", namespace))
  }
}

impl ShadowRepository for DieselShadowRepository {
  fn get(&self, namespace: &str, name: &str) -> Result<Shadow> {
    self.get_tx(TxContext::None, namespace, name)
  }

  fn create(&self, shadow: &Shadow) -> Result<Shadow> {
    self.create_tx(TxContext::None, shadow)
  }

  fn update_report(&self, shadow: &Shadow) -> Result<Shadow> {
    self.update_report_tx(TxContext::None, shadow)
  }

  fn update_desire(&self, shadow: &Shadow) -> Result<Shadow> {
    self.update_desire_tx(TxContext::None, shadow)
  }

  fn update_report_meta(&self, shadow: &Shadow) -> Result<Shadow> {
    self.update_report_meta_tx(TxContext::None, shadow)
  }

  fn update_desire_meta(&self, shadow: &Shadow) -> Result<Shadow> {
    self.update_desire_meta_tx(TxContext::None, shadow)
  }

  fn update_report_with_meta(&self, shadow: &Shadow) -> Result<Shadow> {
    self.update_report_with_meta_tx(TxContext::None, shadow)
  }

  fn update_desire_with_meta(&self, shadow: &Shadow) -> Result<Shadow> {
    self.update_desire_with_meta_tx(TxContext::None, shadow)
  }

  fn delete(&self, namespace: &str, name: &str) -> Result<()> {
    self.delete_tx(TxContext::None, namespace, name)
  }

  fn list(&self, namespace: &str) -> Result<Vec<Shadow>> {
    self.list_tx(TxContext::None, namespace)
  }

  fn list_by_node_names(&self, namespace: &str, names: &[String]) -> Result<Vec<Shadow>> {
    self.list_by_node_names_tx(TxContext::None, namespace, names)
  }

  fn list_report_times(&self, namespace: &str, names: &[String]) -> Result<Vec<ReportTime>> {
    self.list_report_times_tx(TxContext::None, namespace, names)
  }
}
