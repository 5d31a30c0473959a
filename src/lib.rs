//! evidence-collector
//!
//! Aplicación que ensambla `evidence-core` con un backend de
//! `evidence-persistence` según la configuración de entorno:
//! - `config`: variables de entorno y destino de las evidencias.
//! - `errors`: errores de la aplicación.
//! - `app`: apertura del store, construcción del colector y ejecución en
//!   paralelo de notificaciones.

pub mod app;
pub mod config;
pub mod errors;

pub use app::{build_collector, open_store, pack_lines, run_files, FileOutcome, SharedStore};
pub use config::{AppConfig, Destination, CONFIG};
pub use errors::AppError;
