//! Resolución dinámica del flujo (`flow`) a partir del identificador de
//! ejecución del workflow.
//!
//! El mapeo es un recurso externo de sólo lectura: patrones (subcadenas del
//! identificador de ejecución) → etiqueta de flujo. Se inyecta como trait para
//! poder sustituirlo en tests. Cualquier fallo se degrada a `UNKNOWN_FLOW`.
use indexmap::IndexMap;
use log::warn;
use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::constants::UNKNOWN_FLOW;
use crate::errors::LookupError;
use crate::store::ObjectStore;

pub trait FlowMapping: Send + Sync {
    /// Flujo cuyo patrón aparece en `execution_id`; `Ok(None)` si ninguno coincide.
    fn resolve(&self, execution_id: &str) -> Result<Option<String>, LookupError>;
}

/// Resuelve el flujo o devuelve el centinela; nunca falla.
pub fn resolve_flow(mapping: &dyn FlowMapping, execution_id: Option<&str>) -> String {
    let Some(execution_id) = execution_id.filter(|id| !id.is_empty()) else {
        return UNKNOWN_FLOW.to_string();
    };
    match mapping.resolve(execution_id) {
        Ok(Some(flow)) => flow,
        Ok(None) => UNKNOWN_FLOW.to_string(),
        Err(e) => {
            warn!("flow lookup degraded to '{UNKNOWN_FLOW}' execution_id={execution_id} err={e}");
            UNKNOWN_FLOW.to_string()
        }
    }
}

/// Documento `{"flow_patterns": {"<patrón>": "<flujo>"}}`.
#[derive(Debug, Deserialize)]
struct FlowMappingDocument {
    flow_patterns: IndexMap<String, String>,
}

/// Tabla de patrones en memoria. Gana el primer patrón en orden de documento.
#[derive(Debug, Clone, Default)]
pub struct StaticFlowMapping {
    patterns: IndexMap<String, String>,
}

impl StaticFlowMapping {
    pub fn new<I, K, V>(patterns: I) -> Self
        where I: IntoIterator<Item = (K, V)>,
              K: Into<String>,
              V: Into<String>
    {
        Self { patterns: patterns.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn from_document(body: &[u8]) -> Result<Self, LookupError> {
        let doc: FlowMappingDocument =
            serde_json::from_slice(body).map_err(|e| LookupError::Malformed(e.to_string()))?;
        Ok(Self { patterns: doc.flow_patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl FlowMapping for StaticFlowMapping {
    fn resolve(&self, execution_id: &str) -> Result<Option<String>, LookupError> {
        Ok(self.patterns
               .iter()
               .find(|(pattern, _)| execution_id.contains(pattern.as_str()))
               .map(|(_, flow)| flow.clone()))
    }
}

/// Mapeo leído de un documento dentro de un `ObjectStore`. Sólo se cachea
/// una carga correcta; tras un fallo la siguiente consulta vuelve a leer.
pub struct StoredFlowMapping<S: ObjectStore> {
    store: S,
    key: String,
    loaded: OnceCell<StaticFlowMapping>,
}

impl<S: ObjectStore> StoredFlowMapping<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self { store,
               key: key.into(),
               loaded: OnceCell::new() }
    }

    fn load(&self) -> Result<StaticFlowMapping, LookupError> {
        let body = self.store
                       .get(&self.key)
                       .map_err(|e| LookupError::Unavailable(e.to_string()))?
                       .ok_or_else(|| LookupError::Unavailable(format!("no document at {}", self.key)))?;
        StaticFlowMapping::from_document(&body)
    }
}

impl<S: ObjectStore> FlowMapping for StoredFlowMapping<S> {
    fn resolve(&self, execution_id: &str) -> Result<Option<String>, LookupError> {
        self.loaded.get_or_try_init(|| self.load())?.resolve(execution_id)
    }
}
