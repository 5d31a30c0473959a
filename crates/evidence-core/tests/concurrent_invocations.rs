use std::sync::Arc;

use chrono::{DateTime, Utc};
use evidence_core::{Collector, CollectorSettings, DeliveryNotification, InMemoryObjectStore, LogBatch, LogEvent,
                    StaticFlowMapping};
use rayon::prelude::*;
use serde_json::json;

const JOB_GROUP: &str = "/aws-glue/jobs/output";
const T0: i64 = 1_735_725_600_000;

fn job_notification(i: i64) -> DeliveryNotification {
    let line = format!("EVIDENCE {}",
                       json!({"batch_id": "B1", "step": format!("part_{i:02}"), "input": {"rows": 10}}));
    let batch = LogBatch { message_type: "DATA_MESSAGE".into(),
                           log_group: JOB_GROUP.into(),
                           log_events: vec![LogEvent::new(format!("ev-{i}"), Some(T0 + i * 1_000), line)],
                           ..Default::default() };
    DeliveryNotification::from_batch(&batch).unwrap()
}

#[test]
fn parallel_invocations_converge_on_shared_store() {
    let store = Arc::new(InMemoryObjectStore::new());
    let c = Collector::with_default_extractors(CollectorSettings::default(),
                                               store.clone(),
                                               Arc::new(StaticFlowMapping::default()));

    // cada notificación llega dos veces
    let deliveries: Vec<DeliveryNotification> = (0..8).chain(0..8).map(job_notification).collect();
    let reports: Vec<_> = deliveries.par_iter()
                                    .map(|n| c.handle(n).unwrap().report().cloned().unwrap())
                                    .collect();
    assert!(reports.iter().all(|r| r.persisted_envelopes == 1 && r.failed_writes == 0));
    assert_eq!(store.len(), 8);
    assert_eq!(c.store().list("B1").unwrap().len(), 8);

    let now = DateTime::<Utc>::from_timestamp_millis(T0 + 60_000).unwrap();
    let summaries: Vec<_> = (0..4).into_par_iter().map(|_| c.finalize("B1", now).unwrap()).collect();
    assert!(summaries.windows(2).all(|w| w[0] == w[1]));

    let stored = c.store().get_summary("B1").unwrap().unwrap();
    assert_eq!(stored, summaries[0]);
    assert_eq!(stored.counts.input_rows, 80);
    assert_eq!(stored.counts.input_files, 8);
    assert_eq!(stored.steps.first().map(|s| s.step.as_str()), Some("part_00"));
    assert_eq!(stored.steps.last().map(|s| s.step.as_str()), Some("part_07"));
}
