//! Configuración de conexión desde variables de entorno.
//! Convención `DATABASE_URL` más parámetros opcionales de pool.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    /// Lee `DATABASE_URL` (obligatoria) y los tamaños de pool.
    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL not set".into()))?;
        Ok(Self::with_url(url))
    }

    /// URL explícita; los tamaños de pool siguen saliendo del entorno.
    pub fn with_url(url: impl Into<String>) -> Self {
        Lazy::force(&DOTENV_LOADED);
        let min_connections = env_u32("DATABASE_MIN_CONNECTIONS").unwrap_or(1);
        let max_connections = env_u32("DATABASE_MAX_CONNECTIONS").unwrap_or(4);
        Self { url: url.into(),
               min_connections,
               max_connections }
    }
}

fn env_u32(name: &str) -> Option<u32> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Forzar carga temprana de .env desde aplicaciones externas.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
