//! Ensamblado del colector a partir de la configuración y ejecución de
//! varias notificaciones en paralelo sobre el mismo almacenamiento.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use evidence_core::{Collector, CollectorOutcome, DeliveryNotification, InMemoryObjectStore, JsonReportRenderer,
                    LogBatch, LogEvent, ObjectStore, StoredFlowMapping};
use evidence_persistence::{build_pool, DbConfig, FsObjectStore, PgObjectStore, PoolProvider};
use log::info;
use rayon::prelude::*;
use serde_json::{json, Value};

use crate::config::{AppConfig, Destination};
use crate::errors::AppError;

pub type SharedStore = Arc<dyn ObjectStore>;

pub fn open_store(destination: &Destination) -> Result<SharedStore, AppError> {
    info!("opening evidence store at {}", destination.describe());
    let store: SharedStore = match destination {
        Destination::Memory => Arc::new(InMemoryObjectStore::new()),
        Destination::Filesystem(root) => Arc::new(FsObjectStore::new(root)),
        Destination::Postgres(url) => {
            let cfg = DbConfig::with_url(url.as_str());
            let pool = build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)?;
            Arc::new(PgObjectStore::new(PoolProvider { pool }))
        }
    };
    Ok(store)
}

/// Cadena estándar de extractores, mapeo de flujos leído del mismo store y
/// reporte JSON junto a cada summary.
pub fn build_collector(config: &AppConfig, store: SharedStore) -> Collector<SharedStore> {
    let flows = Arc::new(StoredFlowMapping::new(store.clone(), config.flow_mapping_key.clone()));
    Collector::with_default_extractors(config.settings(), store, flows).with_renderer(JsonReportRenderer)
}

pub fn read_notification(path: &Path) -> Result<DeliveryNotification, AppError> {
    let body = fs::read(path)?;
    Ok(serde_json::from_slice(&body)?)
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<CollectorOutcome, AppError>,
}

impl FileOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn to_json(&self) -> Value {
        let result = match &self.result {
            Ok(outcome) => outcome.to_json(),
            Err(e) => json!({"ok": false, "error": e.to_string()}),
        };
        json!({"file": self.path.display().to_string(), "result": result})
    }
}

/// Una invocación por fichero, en paralelo. El orden del resultado sigue al
/// de `paths`.
pub fn run_files<S: ObjectStore>(collector: &Collector<S>, paths: &[PathBuf]) -> Vec<FileOutcome> {
    paths.par_iter()
         .map(|path| {
             let result = read_notification(path).and_then(|n| collector.handle(&n).map_err(AppError::from));
             FileOutcome { path: path.clone(),
                           result }
         })
         .collect()
}

/// Empaqueta líneas de texto (una por evento) como notificación de entrega.
/// Las líneas vacías se ignoran; cada evento recibe `base_millis + i`.
pub fn pack_lines(log_group: &str, text: &str, base_millis: i64) -> Result<DeliveryNotification, AppError> {
    let log_events = text.lines()
                         .filter(|l| !l.trim().is_empty())
                         .enumerate()
                         .map(|(i, line)| {
                             let ts = base_millis + i as i64;
                             LogEvent::new(format!("{ts}-{i:06}"), Some(ts), line)
                         })
                         .collect();
    let batch = LogBatch { message_type: "DATA_MESSAGE".into(),
                           log_group: log_group.to_string(),
                           log_stream: "evidence-collector-pack".into(),
                           log_events,
                           ..Default::default() };
    Ok(DeliveryNotification::from_batch(&batch)?)
}
