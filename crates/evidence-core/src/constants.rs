//! Constantes del colector.
//!
//! Agrupa los valores fijos del contrato con los productores (marcador de
//! línea, grupos de logs) y con el almacenamiento (prefijos de claves).

/// Prefijo de las líneas de evidencia emitidas por jobs genéricos.
pub const EVIDENCE_MARKER: &str = "EVIDENCE ";

/// Subcadena que identifica un grupo de logs del motor de workflows.
pub const WORKFLOW_LOG_GROUP_MARKER: &str = "/aws/states/";

/// Flujo centinela cuando la consulta de mapeo no resuelve.
pub const UNKNOWN_FLOW: &str = "unknown";

/// Step por defecto cuando la evidencia no declara uno.
pub const UNKNOWN_STEP: &str = "unknown";

/// Error por defecto de una evidencia fallida sin campo `error`.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Prefijo raíz de las claves de evidencia.
pub const EVIDENCE_PREFIX: &str = "evidence";

/// Prefijo de los payloads crudos archivados para auditoría.
pub const RAW_LOGS_PREFIX: &str = "raw-logs";

/// Clave por defecto del documento de mapeo de flujos.
pub const DEFAULT_FLOW_MAPPING_KEY: &str = "config/flow_mapping.json";

/// Tipo de mensaje de control (sin eventos) del transporte.
pub const CONTROL_MESSAGE: &str = "CONTROL_MESSAGE";
