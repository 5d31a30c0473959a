//! Almacenamiento de evidencias.
//!
//! Dos niveles:
//! - `ObjectStore`: almacenamiento clave → bytes, sin semántica. Lo
//!   implementan el backend en memoria (aquí) y los backends durables de
//!   `evidence-persistence` (filesystem, Postgres).
//! - `EvidenceStore`: aplica el layout de claves y la serialización JSON sobre
//!   cualquier `ObjectStore`.
//!
//! Invariantes:
//! - Append-mostly: no existe API de borrado.
//! - Escribir dos veces la misma clave es una sobrescritura idempotente; dos
//!   invocaciones concurrentes convergen al mismo valor.
//! - `list` no garantiza orden; el agregador ordena por `ts`.
use std::sync::Arc;

use log::{debug, warn};

pub mod keys;
mod memory;

pub use memory::{InMemoryObjectStore, StoredObject};

use crate::errors::StoreError;
use crate::model::{EvidenceEnvelope, Summary};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Almacenamiento clave/valor de objetos.
pub trait ObjectStore: Send + Sync {
    /// Escribe (o sobrescribe) `key`.
    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError>;
    /// Lee `key`; `None` si no existe.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Claves que empiezan por `prefix`, sin orden garantizado.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError> {
        (**self).put(key, body, content_type)
    }
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list(prefix)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStore for Box<T> {
    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError> {
        (**self).put(key, body, content_type)
    }
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list(prefix)
    }
}

/// Persistencia de envelopes y summaries sobre un `ObjectStore`.
pub struct EvidenceStore<S: ObjectStore> {
    objects: S,
}

impl<S: ObjectStore> EvidenceStore<S> {
    pub fn new(objects: S) -> Self {
        Self { objects }
    }

    pub fn objects(&self) -> &S {
        &self.objects
    }

    /// Persiste un envelope bajo `(batch_id, step, event_id)` y devuelve la clave.
    pub fn put(&self,
               batch_id: &str,
               step: &str,
               event_id: &str,
               envelope: &EvidenceEnvelope)
               -> Result<String, StoreError> {
        let key = keys::per_step_key(batch_id, step, event_id);
        self.put_json(&key, envelope)?;
        Ok(key)
    }

    /// Todas las evidencias persistidas del batch. Objetos ilegibles se
    /// registran y se omiten, igual que los de otro `batch_id` que comparte
    /// prefijo tras sanear la clave.
    pub fn list(&self, batch_id: &str) -> Result<Vec<EvidenceEnvelope>, StoreError> {
        let prefix = keys::per_step_prefix(batch_id);
        debug!("list:start batch_id={batch_id} prefix={prefix}");
        let mut envelopes = Vec::new();
        for key in self.objects.list(&prefix)? {
            let Some(body) = self.objects.get(&key)? else {
                continue;
            };
            match serde_json::from_slice::<EvidenceEnvelope>(&body) {
                Ok(env) if env.batch_id == batch_id => envelopes.push(env),
                Ok(env) => debug!("list: skip foreign evidence key={key} batch_id={}", env.batch_id),
                Err(e) => warn!("list: skip unreadable evidence key={key} err={e}"),
            }
        }
        debug!("list:done batch_id={batch_id} count={}", envelopes.len());
        Ok(envelopes)
    }

    pub fn put_summary(&self, summary: &Summary) -> Result<String, StoreError> {
        let key = keys::summary_key(&summary.batch_id);
        self.put_json(&key, summary)?;
        Ok(key)
    }

    pub fn get_summary(&self, batch_id: &str) -> Result<Option<Summary>, StoreError> {
        let key = keys::summary_key(batch_id);
        match self.objects.get(&key)? {
            None => Ok(None),
            Some(body) => serde_json::from_slice(&body).map(Some)
                                                       .map_err(|source| StoreError::Serialization { key, source }),
        }
    }

    pub fn put_report(&self, batch_id: &str, body: &[u8], content_type: &str) -> Result<String, StoreError> {
        let key = keys::report_key(batch_id);
        self.objects.put(&key, body, content_type)?;
        Ok(key)
    }

    /// Archiva el payload decodificado tal cual llegó.
    pub fn put_raw(&self, unix_seconds: i64, log_group: &str, raw: &[u8]) -> Result<String, StoreError> {
        let key = keys::raw_logs_key(unix_seconds, log_group);
        self.objects.put(&key, raw, JSON_CONTENT_TYPE)?;
        Ok(key)
    }

    fn put_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialization { key: key.to_string(),
                                                                                                  source })?;
        self.objects.put(key, &body, JSON_CONTENT_TYPE)?;
        debug!("put:done key={key} bytes={}", body.len());
        Ok(())
    }
}
