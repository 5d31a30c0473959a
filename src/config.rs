//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) y expone una estructura inmutable (`CONFIG`).
//!
//! Variables:
//! - `ENABLED` (por defecto `true`): cualquier valor distinto de `true`
//!   (sin distinguir mayúsculas) desactiva el colector.
//! - `SAVE_RAW_LOGS` (por defecto `false`).
//! - `EVIDENCE_DESTINATION`: `memory` (por defecto), `postgres://...`,
//!   `file:///ruta` o una ruta.
//! - `FLOW_MAPPING_KEY` (por defecto `config/flow_mapping.json`).
use std::env;
use std::path::PathBuf;

use evidence_core::constants::DEFAULT_FLOW_MAPPING_KEY;
use evidence_core::CollectorSettings;
use once_cell::sync::Lazy;
use serde::Serialize;

/// Backend donde se escriben las evidencias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Memory,
    Filesystem(PathBuf),
    Postgres(String),
}

impl Destination {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else if raw.starts_with("postgres://") || raw.starts_with("postgresql://") {
            Self::Postgres(raw.to_string())
        } else {
            Self::Filesystem(PathBuf::from(raw.strip_prefix("file://").unwrap_or(raw)))
        }
    }

    /// Descripción sin credenciales, apta para logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Memory => "memory".into(),
            Self::Filesystem(path) => format!("file://{}", path.display()),
            Self::Postgres(url) => match url.rsplit_once('@') {
                Some((_, host)) => format!("postgres://***@{host}"),
                None => url.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub enabled: bool,
    pub save_raw_logs: bool,
    #[serde(serialize_with = "described")]
    pub destination: Destination,
    pub flow_mapping_key: String,
}

fn described<S: serde::Serializer>(d: &Destination, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&d.describe())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { enabled: true,
               save_raw_logs: false,
               destination: Destination::Memory,
               flow_mapping_key: DEFAULT_FLOW_MAPPING_KEY.to_string() }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignora error si no existe .env
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Construye la configuración a partir de una función de consulta.
    pub fn from_lookup<F>(lookup: F) -> Self
        where F: Fn(&str) -> Option<String>
    {
        let defaults = Self::default();
        Self { enabled: lookup("ENABLED").map_or(defaults.enabled, |v| is_true(&v)),
               save_raw_logs: lookup("SAVE_RAW_LOGS").map_or(defaults.save_raw_logs, |v| is_true(&v)),
               destination: lookup("EVIDENCE_DESTINATION").map_or(defaults.destination, |v| Destination::parse(&v)),
               flow_mapping_key: lookup("FLOW_MAPPING_KEY").filter(|v| !v.trim().is_empty())
                                                           .unwrap_or(defaults.flow_mapping_key) }
    }

    pub fn settings(&self) -> CollectorSettings {
        CollectorSettings { enabled: self.enabled,
                            save_raw_logs: self.save_raw_logs }
    }
}

fn is_true(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

/// Instancia global perezosa de configuración, evaluada una sola vez.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);
