use evidence_core::{CollectorError, DecodeError};
use evidence_persistence::PersistenceError;
use thiserror::Error;

/// Errores de la aplicación (CLI y ensamblado del colector).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Notificación inválida: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Error de codificación: {0}")]
    Encode(#[from] DecodeError),
    #[error("Invocación fallida: {0}")]
    Collector(#[from] CollectorError),
    #[error("Uso: {0}")]
    Usage(String),
}
