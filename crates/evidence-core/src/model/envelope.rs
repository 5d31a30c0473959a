//! `EvidenceEnvelope`: el auto-reporte de un step del pipeline.
//!
//! Rol en el flujo:
//! - Los productores emiten el envelope como JSON dentro de una línea de log.
//! - Los extractores lo parsean, lo completan (`event_id`, `ts`, `flow`, ...)
//!   y el `EvidenceStore` lo persiste una sola vez bajo
//!   `(batch_id, step, event_id)`.
//! - Tras persistirse no se muta; el agregador sólo lo lee.
//!
//! El colector no valida el esquema de `input` / `output` / `load` más allá de
//! que sean objetos JSON. Los campos desconocidos se conservan en `extra`.
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Métricas libres de un step (`rows`, `s3`, `inserted_rows`, ...).
pub type Metrics = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEnvelope {
    #[serde(default, deserialize_with = "nullable")]
    pub batch_id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub step: String,
    #[serde(default, deserialize_with = "nullable")]
    pub flow: String,
    /// Ausente o `null` cuenta como éxito.
    #[serde(default = "default_ok", deserialize_with = "ok_or_true")]
    pub ok: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub input: Metrics,
    #[serde(default, deserialize_with = "nullable")]
    pub output: Metrics,
    #[serde(default, deserialize_with = "nullable")]
    pub load: Metrics,
    #[serde(default, deserialize_with = "nullable")]
    pub ts: String,
    #[serde(default, deserialize_with = "nullable")]
    pub note: String,
    #[serde(default, deserialize_with = "nullable")]
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Marca explícita de fin de batch emitida por el propio productor.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_false")]
    pub is_terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EvidenceEnvelope {
    /// Envelope mínimo; útil para productores sintéticos y tests.
    pub fn new(batch_id: impl Into<String>, step: impl Into<String>, ok: bool) -> Self {
        Self { batch_id: batch_id.into(),
               step: step.into(),
               flow: String::new(),
               ok,
               input: Metrics::new(),
               output: Metrics::new(),
               load: Metrics::new(),
               ts: String::new(),
               note: String::new(),
               event_id: String::new(),
               error: None,
               is_terminal: false,
               event_type: None,
               execution_arn: None,
               state_name: None,
               extra: Map::new() }
    }

    /// Parsea un payload de evidencia. Sólo se aceptan objetos JSON.
    pub fn from_value(value: Value) -> Result<Self, crate::errors::ExtractError> {
        use crate::errors::ExtractError;
        if !value.is_object() {
            return Err(ExtractError::NotAnObject(json_kind(&value)));
        }
        serde_json::from_value(value).map_err(ExtractError::InvalidShape)
    }

    /// `ts` interpretado como instante UTC. Acepta RFC 3339 y fechas sin zona
    /// (se asumen UTC); `None` si no es parseable.
    pub fn parsed_ts(&self) -> Option<DateTime<Utc>> {
        parse_ts(&self.ts)
    }

    /// Texto del error reportado por el step, si existe.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Lee una métrica numérica; ausencia o tipo no numérico cuenta como 0.
pub fn metric_u64(metrics: &Metrics, key: &str) -> u64 {
    match metrics.get(key) {
        Some(Value::Number(n)) => n.as_u64()
                                   .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
                                   .unwrap_or(0),
        _ => 0,
    }
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
                                                             .map(|naive| naive.and_utc())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn default_ok() -> bool {
    true
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn nullable<'de, D, T>(d: D) -> Result<T, D::Error>
    where D: Deserializer<'de>,
          T: Deserialize<'de> + Default
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn ok_or_true<'de, D>(d: D) -> Result<bool, D::Error>
    where D: Deserializer<'de>
{
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(true))
}
