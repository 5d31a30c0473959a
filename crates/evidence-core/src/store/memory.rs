use std::collections::BTreeMap;

use dashmap::DashMap;

use super::ObjectStore;
use crate::errors::StoreError;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Backend en memoria. Seguro para invocaciones concurrentes; la última
/// escritura sobre una clave gana.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    inner: DashMap<String, StoredObject>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(|o| o.content_type.clone())
    }

    /// Copia ordenada por clave de todos los cuerpos almacenados.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.inner.iter().map(|e| (e.key().clone(), e.value().body.clone())).collect()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError> {
        self.inner.insert(key.to_string(),
                          StoredObject { body: body.to_vec(),
                                         content_type: content_type.to_string() });
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.get(key).map(|o| o.body.clone()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.inner
               .iter()
               .filter(|e| e.key().starts_with(prefix))
               .map(|e| e.key().clone())
               .collect())
    }
}
