//! Batch Decoder: desempaqueta una notificación de entrega.
//!
//! Formato de transporte:
//! - La notificación es `{"awslogs": {"data": "<base64>"}}`.
//! - `data` es un JSON comprimido con gzip que contiene el grupo/stream de
//!   origen y la lista ordenada de eventos de log.
//!
//! Cualquier fallo aquí es corrupción de transporte y aborta la invocación
//! completa antes de persistir nada.
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::constants::CONTROL_MESSAGE;
use crate::errors::DecodeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryNotification {
    #[serde(rename = "awslogs")]
    pub payload: EncodedPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedPayload {
    pub data: String,
}

/// Contenido decodificado de una notificación.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub log_group: String,
    #[serde(default)]
    pub log_stream: String,
    #[serde(default)]
    pub subscription_filters: Vec<String>,
    #[serde(default)]
    pub log_events: Vec<LogEvent>,
}

impl LogBatch {
    pub fn is_control_message(&self) -> bool {
        self.message_type == CONTROL_MESSAGE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(default)]
    pub id: String,
    /// Epoch en milisegundos asignado por el transporte.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub message: String,
}

impl LogEvent {
    pub fn new(id: impl Into<String>, timestamp: Option<i64>, message: impl Into<String>) -> Self {
        Self { id: id.into(),
               timestamp,
               message: message.into() }
    }

    /// Instante de llegada del evento, si el transporte lo informa.
    pub fn arrival(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

/// Resultado del decoder: el batch parseado y el JSON descomprimido tal cual
/// llegó (para el archivo de auditoría).
#[derive(Debug, Clone)]
pub struct DecodedBatch {
    pub batch: LogBatch,
    pub raw: Vec<u8>,
}

pub fn decode_notification(notification: &DeliveryNotification) -> Result<DecodedBatch, DecodeError> {
    let compressed = BASE64.decode(notification.payload.data.trim())?;
    let mut raw = Vec::new();
    GzDecoder::new(compressed.as_slice()).read_to_end(&mut raw)?;
    let batch: LogBatch = serde_json::from_slice(&raw)?;
    Ok(DecodedBatch { batch, raw })
}

impl DeliveryNotification {
    /// Operación inversa del decoder: serializa, comprime y codifica un batch.
    pub fn from_batch(batch: &LogBatch) -> Result<Self, DecodeError> {
        let json = serde_json::to_vec(batch)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;
        Ok(Self { payload: EncodedPayload { data: BASE64.encode(compressed) } })
    }
}
