//! evidence-persistence
//!
//! Backends durables del `ObjectStore` de `evidence-core`.
//!
//! Módulos:
//! - `pg`: objetos en Postgres (Diesel + r2d2), upsert por clave.
//! - `fs`: objetos como ficheros bajo un directorio raíz.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel.

pub mod config;
pub mod error;
pub mod fs;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use fs::FsObjectStore;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgObjectStore, PgPool, PoolProvider};
