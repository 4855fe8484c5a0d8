// Locker respaldado por la tabla `locks`: sirve entre procesos que comparten
// la misma base de datos.
use crate::database::{Database, DbConn, TxContext, TxError};
use crate::schema;
use crate::schema::locks::dsl as lk;
use chrono::Utc;
use diesel::prelude::*;
use shadow::{LockToken, Locker, Result, ShadowError};
use std::time::Duration;

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::locks)]
struct LockRow {
  pub name: String,
  pub version: String,
  pub expire_time: i64,
}

/// Reasigna un lock vencido a `token`. El filtro repite la condición de
/// vencimiento: si otro dueño lo renovó después de nuestra lectura, no toca
/// la fila y devuelve `false`.
fn take_over_expired(conn: &mut DbConn,
                     name: &str,
                     token: &LockToken,
                     now: i64,
                     expire: i64)
                     -> std::result::Result<bool, TxError> {
  let n = diesel::update(lk::locks.filter(lk::name.eq(name).and(lk::expire_time.le(now))))
            .set((lk::version.eq(token.as_str()), lk::expire_time.eq(expire)))
            .execute(conn)?;
  Ok(n > 0)
}

/// Lock con nombre y TTL. `version` guarda el token del dueño actual;
/// `expire_time` está en milisegundos Unix.
#[derive(Clone)]
pub struct DieselLocker {
  db: Database,
}

impl DieselLocker {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

impl Locker for DieselLocker {
  fn acquire(&self, name: &str, ttl: Duration) -> Result<LockToken> {
    let token = LockToken::generate();
    let now = Utc::now().timestamp_millis();
    let expire = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
    self.db
        .run(TxContext::None, |conn| {
          let held = lk::locks.filter(lk::name.eq(name))
                              .select(LockRow::as_select())
                              .first::<LockRow>(conn)
                              .optional()?;
          match held {
            Some(row) if row.expire_time > now => Err(TxError::from(ShadowError::LockHeld(name.to_string()))),
            Some(_) => {
              if !take_over_expired(conn, name, &token, now, expire)? {
                return Err(ShadowError::LockHeld(name.to_string()).into());
              }
              Ok(())
            }
            None => {
              let row = LockRow { name: name.to_string(), version: token.0.clone(), expire_time: expire };
              diesel::insert_into(lk::locks).values(&row).execute(conn)?;
              Ok(())
            }
          }
        })
        .map_err(|e| match e.into_shadow("acquire lock", name) {
          // otro proceso insertó la fila entre la lectura y la escritura
          ShadowError::DuplicateKey(_) => ShadowError::LockHeld(name.to_string()),
          other => other,
        })?;
    Ok(token)
  }

  fn release(&self, name: &str, token: &LockToken) -> Result<()> {
    self.db
        .run(TxContext::None, |conn| {
          let n = diesel::delete(lk::locks.filter(lk::name.eq(name).and(lk::version.eq(token.as_str()))))
                    .execute(conn)?;
          if n == 0 {
            log::debug!("release {}: not held by this token", name);
          }
          Ok(())
        })
        .map_err(|e| e.into_shadow("release lock", name))
  }
}

#[cfg(all(test, not(feature = "pg")))]
mod tests {
  use super::*;
  use crate::database::new_sqlite_for_test;

  fn temp_db() -> Database {
    let tmp_path = std::env::temp_dir().join(format!("cloud_lock_unit_{}.db", uuid::Uuid::new_v4()));
    new_sqlite_for_test(tmp_path.to_str().unwrap()).expect("failed to create store")
  }

  #[test]
  fn stale_read_does_not_steal_a_renewed_lock() {
    let db = temp_db();
    let locker = DieselLocker::new(db.clone());
    let owner = locker.acquire("l", Duration::from_secs(30)).unwrap();
    // un segundo acquire que leyó la fila cuando aún estaba vencida
    let stale_now = Utc::now().timestamp_millis();
    let intruder = LockToken::generate();
    let taken = db.run(TxContext::None, |conn| take_over_expired(conn, "l", &intruder, stale_now, stale_now + 30_000))
                  .unwrap();
    assert!(!taken);
    let row = db.run(TxContext::None, |conn| {
                  Ok(lk::locks.filter(lk::name.eq("l")).select(LockRow::as_select()).first::<LockRow>(conn)?)
                })
                .unwrap();
    assert_eq!(row.version, owner.0);
  }

  #[test]
  fn expired_row_is_taken_over() {
    let db = temp_db();
    let locker = DieselLocker::new(db.clone());
    let _old = locker.acquire("l", Duration::from_millis(1)).unwrap();
    let later = Utc::now().timestamp_millis() + 1_000;
    let fresh = LockToken::generate();
    let taken = db.run(TxContext::None, |conn| take_over_expired(conn, "l", &fresh, later, later + 30_000))
                  .unwrap();
    assert!(taken);
  }
}
