//! Errores del core del colector.
//!
//! Cada etapa tiene su propio enum; sólo `DecodeError` escala a fallo de la
//! invocación completa. El resto se registra y se aísla por línea o por batch.

use thiserror::Error;

/// Corrupción de transporte: el payload no se pudo decodificar.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("base64 decode: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("gzip decompress: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("payload json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error de forma/parseo de una línea concreta.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("line is not valid json: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("evidence payload must be a json object, found {0}")]
    NotAnObject(&'static str),
    #[error("invalid evidence shape: {0}")]
    InvalidShape(#[source] serde_json::Error),
}

/// Fallo de la consulta de mapeo de flujos (se degrada a `unknown`).
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("flow mapping unavailable: {0}")]
    Unavailable(String),
    #[error("flow mapping malformed: {0}")]
    Malformed(String),
}

/// Errores de almacenamiento (backends in-memory, fs, postgres).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error on {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render failed: {0}")]
    Failed(String),
}

/// Error terminal de una invocación.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("transport corruption: {0}")]
    Transport(#[from] DecodeError),
}
