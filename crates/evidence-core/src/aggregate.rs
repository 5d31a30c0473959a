//! Aggregator: reduce las evidencias persistidas de un batch a un `Summary`.
//!
//! La reducción es determinista: el orden se reconstruye a partir del `ts` de
//! cada envelope (luego `step`, `event_id`), nunca del orden de llegada ni del
//! orden de `list`. Recalcular sobre el mismo conjunto produce el mismo
//! `Summary` salvo `generated_at`.
use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::constants::{UNKNOWN_ERROR, UNKNOWN_FLOW};
use crate::errors::StoreError;
use crate::hashing::{hash_value, to_canonical_json};
use crate::model::{metric_u64, Counts, EvidenceEnvelope, Failure, Summary, SummaryStatus};
use crate::store::{EvidenceStore, ObjectStore};

/// Ordena por `ts` (los no parseables al final), `step`, `event_id`.
pub fn sort_envelopes(envelopes: &mut [EvidenceEnvelope]) {
    envelopes.sort_by(|a, b| {
                 let (ta, tb) = (a.parsed_ts(), b.parsed_ts());
                 ta.is_none()
                   .cmp(&tb.is_none())
                   .then(ta.cmp(&tb))
                   .then_with(|| a.step.cmp(&b.step))
                   .then_with(|| a.event_id.cmp(&b.event_id))
                   .then_with(|| canonical(a).cmp(&canonical(b)))
             });
}

fn canonical(env: &EvidenceEnvelope) -> String {
    serde_json::to_value(env).map(|v| to_canonical_json(&v))
                             .unwrap_or_default()
}

/// Reducción pura. `now` se usa como `generated_at` y como ventana de un
/// batch sin evidencias.
pub fn summarize(batch_id: &str, mut envelopes: Vec<EvidenceEnvelope>, now: DateTime<Utc>) -> Summary {
    sort_envelopes(&mut envelopes);

    let mut counts = Counts::default();
    let mut failures = Vec::new();
    for env in &envelopes {
        let input_rows = metric_u64(&env.input, "rows");
        if input_rows > 0 {
            counts.input_rows = counts.input_rows.saturating_add(input_rows);
            counts.input_files = counts.input_files.saturating_add(1);
        }
        let output_rows = metric_u64(&env.output, "rows");
        if output_rows > 0 {
            counts.output_rows = counts.output_rows.saturating_add(output_rows);
            counts.output_files = counts.output_files.saturating_add(1);
        }
        counts.loaded_rows = counts.loaded_rows.saturating_add(metric_u64(&env.load, "inserted_rows"));
        if !env.ok {
            failures.push(Failure { step: env.step.clone(),
                                    error: env.error_message().unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
                                    details: env.clone() });
        }
    }

    let window: Vec<DateTime<Utc>> = envelopes.iter().filter_map(EvidenceEnvelope::parsed_ts).collect();
    let started = window.iter().min().copied().unwrap_or(now);
    let ended = window.iter().max().copied().unwrap_or(now);

    let evidence_fingerprint = serde_json::to_value(&envelopes).map(|v| hash_value(&v))
                                                               .unwrap_or_default();

    Summary { batch_id: batch_id.to_string(),
              flow: batch_flow(&envelopes),
              status: if failures.is_empty() { SummaryStatus::Ok } else { SummaryStatus::Error },
              started,
              ended,
              counts,
              steps: envelopes,
              failures,
              evidence_fingerprint,
              generated_at: now }
}

/// Primer flujo resuelto en orden temporal; si sólo hay centinelas, el centinela.
fn batch_flow(envelopes: &[EvidenceEnvelope]) -> String {
    envelopes.iter()
             .map(|e| e.flow.as_str())
             .filter(|f| !f.is_empty())
             .min_by(|a, b| match (*a == UNKNOWN_FLOW, *b == UNKNOWN_FLOW) {
                 (true, false) => Ordering::Greater,
                 (false, true) => Ordering::Less,
                 _ => Ordering::Equal,
             })
             .unwrap_or(UNKNOWN_FLOW)
             .to_string()
}

/// Lee del store y reduce.
pub struct Aggregator<'a, S: ObjectStore> {
    store: &'a EvidenceStore<S>,
}

impl<'a, S: ObjectStore> Aggregator<'a, S> {
    pub fn new(store: &'a EvidenceStore<S>) -> Self {
        Self { store }
    }

    pub fn aggregate(&self, batch_id: &str, now: DateTime<Utc>) -> Result<Summary, StoreError> {
        let envelopes = self.store.list(batch_id)?;
        if envelopes.is_empty() {
            warn!("aggregate: batch_id={batch_id} is terminal without any persisted evidence");
        }
        let summary = summarize(batch_id, envelopes, now);
        debug!("aggregate:done batch_id={batch_id} status={:?} steps={} failures={}",
               summary.status,
               summary.steps.len(),
               summary.failures.len());
        Ok(summary)
    }
}
