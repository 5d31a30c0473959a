//! Backend Postgres (Diesel) del `ObjectStore` del colector.
//!
//! - Una fila por clave en `evidence_objects`; `put` es un upsert
//!   (`ON CONFLICT (object_key) DO UPDATE`), así que reescribir la misma clave
//!   converge al mismo valor aunque dos invocaciones lo hagan a la vez.
//! - `list` es una consulta `LIKE 'prefijo%'` con los comodines del prefijo
//!   escapados.
//! - Errores transitorios (pool, serialización, desconexión) se reintentan con
//!   backoff corto.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::{debug, warn};

use evidence_core::{ObjectStore, StoreError};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::evidence_objects;

/// Pool r2d2 de conexiones Postgres. Al construirlo se corren las
/// migraciones pendientes.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (pool real en producción, sustituible en
/// tests).
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = evidence_objects)]
pub struct NewObjectRow<'a> {
    pub object_key: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
}

/// Fila leída de `evidence_objects`.
#[derive(Queryable, Debug, Clone)]
pub struct ObjectRow {
    pub object_key: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Hasta 3 reintentos con backoff 15ms, 30ms, 45ms.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Patrón `LIKE` que sólo acepta claves que empiezan por `prefix` literal.
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub struct PgObjectStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgObjectStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Fila completa de `key` (cuerpo, content type y última escritura).
    pub fn fetch(&self, key: &str) -> Result<Option<ObjectRow>, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            evidence_objects::table.filter(evidence_objects::object_key.eq(key))
                                   .first::<ObjectRow>(&mut conn)
                                   .optional()
                                   .map_err(PersistenceError::from)
        })
    }
}

impl<P: ConnectionProvider> ObjectStore for PgObjectStore<P> {
    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError> {
        debug!("put:start key={key} bytes={}", body.len());
        let row = NewObjectRow { object_key: key,
                                 content_type,
                                 body };
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(evidence_objects::table).values(&row)
                                                        .on_conflict(evidence_objects::object_key)
                                                        .do_update()
                                                        .set((evidence_objects::content_type.eq(content_type),
                                                              evidence_objects::body.eq(body),
                                                              evidence_objects::updated_at.eq(diesel::dsl::now)))
                                                        .execute(&mut conn)
                                                        .map_err(PersistenceError::from)
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.fetch(key)?.map(|row| row.body))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = like_prefix(prefix);
        let keys = with_retry(|| {
            let mut conn = self.provider.connection()?;
            evidence_objects::table.filter(evidence_objects::object_key.like(pattern.as_str()))
                                   .select(evidence_objects::object_key)
                                   .load::<String>(&mut conn)
                                   .map_err(PersistenceError::from)
        })?;
        debug!("list:done prefix={prefix} count={}", keys.len());
        Ok(keys)
    }
}

/// Construye un pool r2d2 y corre las migraciones pendientes.
///
/// Si `min_size > max_size` se usa `min_size = max_size`; tamaños 0 se
/// elevan a 1.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DATABASE_URL` y tamaños, y construye un pool migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
