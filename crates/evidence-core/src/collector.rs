//! Collector Orchestrator.
//!
//! Una invocación por notificación de entrega:
//!
//! ```text
//! Decoding -> Extracting -> Persisting -> Detecting -> (Idle | Aggregating) -> Done
//! ```
//!
//! Invariantes:
//! - Sólo la corrupción de transporte (`Decoding`) aborta la invocación; los
//!   errores de línea, de escritura o de agregación de un batch se registran
//!   y se aíslan.
//! - Los conjuntos `observed` / `terminal` viven sólo dentro de la invocación.
//!   Todo estado compartido está en el `EvidenceStore`.
//! - Cada batch terminal se agrega una sola vez por invocación. Una reentrega
//!   regenera (sobrescribe) el summary.
//! - No hay locks entre invocaciones: varias pueden correr a la vez sobre el
//!   mismo batch y convergen por idempotencia de las escrituras.
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::aggregate::Aggregator;
use crate::decode::{decode_notification, DecodedBatch, DeliveryNotification};
use crate::errors::{CollectorError, StoreError};
use crate::extract::{ExtractorChain, JobLogExtractor, LineContext, TerminalSignal, WorkflowLogExtractor};
use crate::flow::FlowMapping;
use crate::model::Summary;
use crate::render::Renderer;
use crate::store::{EvidenceStore, ObjectStore};
use crate::terminal::is_terminal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSettings {
    /// Con `false` cada invocación es un no-op exitoso.
    pub enabled: bool,
    /// Archiva el payload decodificado en `raw-logs/`.
    pub save_raw_logs: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self { enabled: true,
               save_raw_logs: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectorPhase {
    Decoding,
    Extracting,
    Persisting,
    Detecting,
    Idle,
    Aggregating,
    Done,
}

/// Resultado estructurado de una invocación procesada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationReport {
    pub ok: bool,
    pub invocation_id: Uuid,
    pub log_group: String,
    pub events_count: usize,
    /// Batches vistos (orden lexicográfico).
    pub processed_batches: Vec<String>,
    /// Batches terminales con summary persistido.
    pub finalized_batches: Vec<String>,
    pub persisted_envelopes: usize,
    pub skipped_lines: usize,
    pub failed_writes: usize,
    /// Batches terminales cuya agregación falló.
    pub failed_batches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectorOutcome {
    Disabled,
    Processed(InvocationReport),
}

impl CollectorOutcome {
    pub fn report(&self) -> Option<&InvocationReport> {
        match self {
            Self::Disabled => None,
            Self::Processed(r) => Some(r),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Disabled => json!({"ok": true, "message": "disabled"}),
            Self::Processed(r) => serde_json::to_value(r).unwrap_or_else(|e| json!({"ok": false, "error": e.to_string()})),
        }
    }
}

pub struct Collector<S: ObjectStore> {
    settings: CollectorSettings,
    store: EvidenceStore<S>,
    extractors: ExtractorChain,
    renderer: Option<Box<dyn Renderer>>,
}

impl<S: ObjectStore> Collector<S> {
    pub fn new(settings: CollectorSettings, store: EvidenceStore<S>, extractors: ExtractorChain) -> Self {
        Self { settings,
               store,
               extractors,
               renderer: None }
    }

    /// Cadena estándar: job-log primero, luego workflow-log.
    pub fn with_default_extractors(settings: CollectorSettings, objects: S, flows: Arc<dyn FlowMapping>) -> Self {
        let extractors = ExtractorChain::new(vec![]).add(JobLogExtractor::default())
                                                    .add(WorkflowLogExtractor::new(flows));
        Self::new(settings, EvidenceStore::new(objects), extractors)
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn store(&self) -> &EvidenceStore<S> {
        &self.store
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Ejecuta una invocación completa.
    pub fn handle(&self, notification: &DeliveryNotification) -> Result<CollectorOutcome, CollectorError> {
        if !self.settings.enabled {
            info!("collector disabled by configuration; skipping notification");
            return Ok(CollectorOutcome::Disabled);
        }
        let invocation_id = Uuid::new_v4();
        enter(invocation_id, CollectorPhase::Decoding);
        let decoded = decode_notification(notification).map_err(|e| {
                                                             error!("invocation={invocation_id} transport corruption: {e}");
                                                             CollectorError::Transport(e)
                                                         })?;
        Ok(CollectorOutcome::Processed(self.process(invocation_id, &decoded, Utc::now())))
    }

    /// Procesa un batch ya decodificado. `now` es el instante de agregación.
    pub fn process(&self, invocation_id: Uuid, decoded: &DecodedBatch, now: DateTime<Utc>) -> InvocationReport {
        let batch = &decoded.batch;
        info!("invocation={invocation_id} processing {} log events from {}",
              batch.log_events.len(),
              batch.log_group);
        if batch.is_control_message() {
            debug!("invocation={invocation_id} control message, nothing to extract");
        }
        if self.settings.save_raw_logs {
            match self.store.put_raw(now.timestamp(), &batch.log_group, &decoded.raw) {
                Ok(key) => debug!("invocation={invocation_id} raw payload archived at {key}"),
                Err(e) => warn!("invocation={invocation_id} raw payload not archived: {e}"),
            }
        }

        let mut report = InvocationReport { ok: true,
                                            invocation_id,
                                            log_group: batch.log_group.clone(),
                                            events_count: batch.log_events.len(),
                                            processed_batches: vec![],
                                            finalized_batches: vec![],
                                            persisted_envelopes: 0,
                                            skipped_lines: 0,
                                            failed_writes: 0,
                                            failed_batches: vec![] };
        let mut observed: BTreeSet<String> = BTreeSet::new();
        let mut terminal: BTreeSet<String> = BTreeSet::new();
        let mut pending: Vec<TerminalSignal> = Vec::new();
        let mut by_execution: HashMap<String, BTreeSet<String>> = HashMap::new();

        enter(invocation_id, CollectorPhase::Extracting);
        for event in &batch.log_events {
            let line = LineContext { message: &event.message,
                                     event_id: &event.id,
                                     log_group: &batch.log_group,
                                     arrival: event.arrival() };
            let outcome = self.extractors.process(&line);
            if outcome.envelope.is_none() && outcome.errors > 0 {
                report.skipped_lines += 1;
            }

            if let Some(env) = &outcome.envelope {
                trace!("invocation={invocation_id} event_id={} phase={:?}", event.id, CollectorPhase::Persisting);
                observed.insert(env.batch_id.clone());
                if let Some(arn) = &env.execution_arn {
                    by_execution.entry(arn.clone()).or_default().insert(env.batch_id.clone());
                }
                match self.store.put(&env.batch_id, &env.step, &env.event_id, env) {
                    Ok(_) => report.persisted_envelopes += 1,
                    Err(e) => {
                        report.failed_writes += 1;
                        error!("invocation={invocation_id} evidence write failed batch_id={} step={} event_id={}: {e}",
                               env.batch_id,
                               env.step,
                               env.event_id);
                    }
                }
            }

            trace!("invocation={invocation_id} event_id={} phase={:?}", event.id, CollectorPhase::Detecting);
            let state = outcome.signal.as_ref().map(|s| s.state);
            if is_terminal(state, outcome.envelope.as_ref()) {
                match (outcome.envelope, outcome.signal) {
                    (Some(env), _) => {
                        terminal.insert(env.batch_id);
                    }
                    (None, Some(signal)) => pending.push(signal),
                    (None, None) => {}
                }
            }
        }

        for signal in pending {
            let targets = attribute_signal(&signal, &observed, &by_execution);
            if targets.is_empty() {
                warn!("invocation={invocation_id} terminal signal {:?} execution={:?} has no batch to attribute",
                      signal.state,
                      signal.execution_id);
            }
            for batch_id in targets {
                observed.insert(batch_id.clone());
                terminal.insert(batch_id);
            }
        }

        if terminal.is_empty() {
            enter(invocation_id, CollectorPhase::Idle);
        } else {
            enter(invocation_id, CollectorPhase::Aggregating);
            for batch_id in &terminal {
                match self.finalize(batch_id, now) {
                    Ok(summary) => {
                        info!("invocation={invocation_id} finalized batch_id={batch_id} status={:?}", summary.status);
                        report.finalized_batches.push(batch_id.clone());
                    }
                    Err(e) => {
                        error!("invocation={invocation_id} aggregation failed batch_id={batch_id}: {e}");
                        report.failed_batches.push(batch_id.clone());
                    }
                }
            }
        }

        report.processed_batches = observed.into_iter().collect();
        enter(invocation_id, CollectorPhase::Done);
        report
    }

    /// Agrega, persiste el summary y lo entrega al renderer.
    pub fn finalize(&self, batch_id: &str, now: DateTime<Utc>) -> Result<Summary, StoreError> {
        let summary = Aggregator::new(&self.store).aggregate(batch_id, now)?;
        self.store.put_summary(&summary)?;
        if let Some(renderer) = &self.renderer {
            match renderer.render(batch_id, &summary, None) {
                Ok(doc) => {
                    if let Err(e) = self.store.put_report(batch_id, &doc.body, &doc.content_type) {
                        warn!("report not stored batch_id={batch_id}: {e}");
                    }
                }
                Err(e) => warn!("report not rendered batch_id={batch_id}: {e}"),
            }
        }
        Ok(summary)
    }
}

/// Batches a los que pertenece una señal de fin sin evidencia: el `batch_id`
/// del propio evento, los batches vistos con el mismo execution id, o el único
/// batch visto en la invocación.
fn attribute_signal(signal: &TerminalSignal,
                    observed: &BTreeSet<String>,
                    by_execution: &HashMap<String, BTreeSet<String>>)
                    -> BTreeSet<String> {
    if let Some(hint) = &signal.batch_hint {
        return BTreeSet::from([hint.clone()]);
    }
    if let Some(batches) = signal.execution_id.as_ref().and_then(|id| by_execution.get(id)) {
        return batches.clone();
    }
    if observed.len() == 1 {
        return observed.clone();
    }
    BTreeSet::new()
}

fn enter(invocation_id: Uuid, phase: CollectorPhase) {
    debug!("invocation={invocation_id} phase={phase:?}");
}
