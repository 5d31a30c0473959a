use std::sync::Arc;

use chrono::{DateTime, Utc};
use evidence_core::constants::DEFAULT_FLOW_MAPPING_KEY;
use evidence_core::store::keys;
use evidence_core::{decode_notification, Aggregator, Collector, CollectorError, CollectorOutcome, CollectorSettings,
                    Counts, DeliveryNotification, InMemoryObjectStore, InvocationReport, JsonReportRenderer, LogBatch,
                    LogEvent, ObjectStore, StaticFlowMapping, StoreError, StoredFlowMapping, SummaryStatus};
use serde_json::{json, Value};
use uuid::Uuid;

const JOB_GROUP: &str = "/aws-glue/jobs/output";
const WORKFLOW_GROUP: &str = "/aws/states/etl-observer-dev-central";
const ARN: &str = "arn:aws:states:ap-northeast-1:123456789012:execution:csv-to-parquet-sm:run-1";
// 2025-01-01T10:00:00Z
const T0: i64 = 1_735_725_600_000;

type MemStore = Arc<InMemoryObjectStore>;

fn notification(log_group: &str, events: Vec<LogEvent>) -> DeliveryNotification {
    let batch = LogBatch { message_type: "DATA_MESSAGE".into(),
                           log_group: log_group.into(),
                           log_stream: "stream-1".into(),
                           log_events: events,
                           ..Default::default() };
    DeliveryNotification::from_batch(&batch).unwrap()
}

fn collector(settings: CollectorSettings) -> (MemStore, Collector<MemStore>) {
    let store = Arc::new(InMemoryObjectStore::new());
    let flows = Arc::new(StaticFlowMapping::new([("csv-to-parquet", "csv-to-parquet-pipeline")]));
    let c = Collector::with_default_extractors(settings, store.clone(), flows);
    (store, c)
}

fn run(c: &Collector<MemStore>, n: &DeliveryNotification) -> InvocationReport {
    c.handle(n).unwrap().report().cloned().unwrap()
}

fn job_line(evidence: Value) -> String {
    format!("EVIDENCE {evidence}")
}

fn task_exited(state: &str, arn: Option<&str>, evidence: Value) -> String {
    let mut event = json!({
        "type": "TaskStateExited",
        "details": {"name": state, "output": json!({"statusCode": 200, "evidence": evidence}).to_string()}
    });
    if let Some(arn) = arn {
        event["executionArn"] = json!(arn);
    }
    event.to_string()
}

fn at_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
}

#[test]
fn execution_succeeded_finalizes_prevalidate_and_load() {
    let (store, c) = collector(CollectorSettings::default());
    let n = notification(WORKFLOW_GROUP,
                         vec![LogEvent::new("e1",
                                            Some(T0),
                                            task_exited("Prevalidate",
                                                        Some(ARN),
                                                        json!({"batch_id": "B1", "step": "prevalidate", "ok": true,
                                                               "input": {"rows": 100}}))),
                              LogEvent::new("e2",
                                            Some(T0 + 60_000),
                                            task_exited("Load",
                                                        Some(ARN),
                                                        json!({"batch_id": "B1", "step": "load", "ok": true,
                                                               "load": {"inserted_rows": 98}}))),
                              LogEvent::new("e3",
                                            Some(T0 + 120_000),
                                            json!({"type": "ExecutionSucceeded", "executionArn": ARN,
                                                   "output": "{\"batch_id\": \"B1\"}"}).to_string())]);

    let report = run(&c, &n);
    assert!(report.ok);
    assert_eq!(report.events_count, 3);
    assert_eq!(report.persisted_envelopes, 2);
    assert_eq!(report.skipped_lines, 0);
    assert_eq!(report.processed_batches, vec!["B1"]);
    assert_eq!(report.finalized_batches, vec!["B1"]);

    assert!(store.get(&keys::per_step_key("B1", "prevalidate", "e1")).unwrap().is_some());
    assert!(store.get(&keys::per_step_key("B1", "load", "e2")).unwrap().is_some());

    let summary = c.store().get_summary("B1").unwrap().expect("summary persisted");
    assert_eq!(summary.status, SummaryStatus::Ok);
    assert_eq!(summary.flow, "csv-to-parquet-pipeline");
    assert_eq!(summary.counts,
               Counts { input_files: 1, input_rows: 100, output_files: 0, output_rows: 0, loaded_rows: 98 });
    let steps: Vec<&str> = summary.steps.iter().map(|s| s.step.as_str()).collect();
    assert_eq!(steps, vec!["prevalidate", "load"]);
    assert_eq!(summary.started, at_millis(T0));
    assert_eq!(summary.ended, at_millis(T0 + 60_000));
    assert!(summary.failures.is_empty());
}

#[test]
fn succeeded_without_evidence_after_failing_load() {
    let (_, c) = collector(CollectorSettings::default());
    run(&c,
        &notification(JOB_GROUP,
                      vec![LogEvent::new("j1",
                                         Some(T0),
                                         job_line(json!({"batch_id": "B20", "step": "prevalidate", "ok": true,
                                                         "input": {"rows": 50}}))),
                           LogEvent::new("j2",
                                         Some(T0 + 30_000),
                                         job_line(json!({"batch_id": "B20", "step": "load", "ok": false,
                                                         "load": {"inserted_rows": 0}})))]));
    let report = run(&c,
                     &notification(WORKFLOW_GROUP,
                                   vec![LogEvent::new("w1",
                                                      Some(T0 + 60_000),
                                                      json!({"type": "ExecutionSucceeded", "executionArn": ARN,
                                                             "input": "{\"batch_id\": \"B20\"}"}).to_string())]));
    assert_eq!(report.finalized_batches, vec!["B20"]);
    let summary = c.store().get_summary("B20").unwrap().unwrap();
    assert_eq!(summary.status, SummaryStatus::Error);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].step, "load");
    assert_eq!(summary.failures[0].error, "Unknown error");
    assert_eq!(summary.counts.input_rows, 50);
    assert_eq!(summary.counts.loaded_rows, 0);
}

#[test]
fn failed_step_yields_error_summary() {
    let (_, c) = collector(CollectorSettings::default());
    let n = notification(WORKFLOW_GROUP,
                         vec![LogEvent::new("e1",
                                            Some(T0),
                                            task_exited("Convert",
                                                        Some(ARN),
                                                        json!({"batch_id": "B2", "step": "glue_convert", "ok": false,
                                                               "error": "schema mismatch"}))),
                              LogEvent::new("e2", Some(T0 + 1_000), json!({"type": "ExecutionFailed", "executionArn": ARN}).to_string())]);
    let report = run(&c, &n);
    assert_eq!(report.finalized_batches, vec!["B2"], "attributed through the execution id");
    let summary = c.store().get_summary("B2").unwrap().unwrap();
    assert_eq!(summary.status, SummaryStatus::Error);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].step, "glue_convert");
    assert_eq!(summary.failures[0].error, "schema mismatch");
}

#[test]
fn evidence_without_terminal_is_not_aggregated() {
    let (store, c) = collector(CollectorSettings::default());
    let n = notification(JOB_GROUP,
                         vec![LogEvent::new("e1", Some(T0), job_line(json!({"batch_id": "B3", "step": "prevalidate"}))),
                              LogEvent::new("e2", Some(T0), "INFO converting 12 files")]);
    let report = run(&c, &n);
    assert_eq!(report.persisted_envelopes, 1);
    assert_eq!(report.processed_batches, vec!["B3"]);
    assert!(report.finalized_batches.is_empty());
    assert!(store.get(&keys::summary_key("B3")).unwrap().is_none());
}

#[test]
fn terminal_in_later_invocation_sees_earlier_evidence() {
    let (_, c) = collector(CollectorSettings::default());
    run(&c,
        &notification(JOB_GROUP,
                      vec![LogEvent::new("e1",
                                         Some(T0),
                                         job_line(json!({"batch_id": "B4", "step": "glue_convert",
                                                         "input": {"rows": 10}, "output": {"rows": 9}})))]));
    let report = run(&c,
                     &notification(WORKFLOW_GROUP,
                                   vec![LogEvent::new("e9",
                                                      Some(T0 + 5_000),
                                                      json!({"type": "ExecutionSucceeded",
                                                             "output": {"batch_id": "B4"}}).to_string())]));
    assert_eq!(report.persisted_envelopes, 0);
    assert_eq!(report.finalized_batches, vec!["B4"]);
    let summary = c.store().get_summary("B4").unwrap().unwrap();
    assert_eq!(summary.counts.output_rows, 9);
    assert_eq!(summary.steps.len(), 1);
}

#[test]
fn terminal_flag_on_envelope_finalizes() {
    let (_, c) = collector(CollectorSettings::default());
    let n = notification(JOB_GROUP,
                         vec![LogEvent::new("e1",
                                            Some(T0),
                                            job_line(json!({"batch_id": "B5", "step": "finalize", "is_terminal": true})))]);
    assert_eq!(run(&c, &n).finalized_batches, vec!["B5"]);
}

#[test]
fn single_observed_batch_absorbs_anonymous_terminal() {
    let (_, c) = collector(CollectorSettings::default());
    let n = notification(WORKFLOW_GROUP,
                         vec![LogEvent::new("e1",
                                            Some(T0),
                                            task_exited("Load", None, json!({"batch_id": "B6", "step": "load"}))),
                              LogEvent::new("e2", Some(T0), json!({"type": "ExecutionAborted"}).to_string())]);
    assert_eq!(run(&c, &n).finalized_batches, vec!["B6"]);
}

#[test]
fn ambiguous_terminal_is_dropped() {
    let (store, c) = collector(CollectorSettings::default());
    let n = notification(WORKFLOW_GROUP,
                         vec![LogEvent::new("e1", Some(T0), task_exited("A", None, json!({"batch_id": "B7", "step": "a"}))),
                              LogEvent::new("e2", Some(T0), task_exited("B", None, json!({"batch_id": "B8", "step": "b"}))),
                              LogEvent::new("e3", Some(T0), json!({"type": "ExecutionTimedOut"}).to_string())]);
    let report = run(&c, &n);
    assert_eq!(report.processed_batches, vec!["B7", "B8"]);
    assert!(report.finalized_batches.is_empty());
    assert!(store.get(&keys::summary_key("B7")).unwrap().is_none());
    assert!(store.get(&keys::summary_key("B8")).unwrap().is_none());
}

#[test]
fn terminal_for_batch_without_evidence_yields_empty_ok_summary() {
    let (_, c) = collector(CollectorSettings::default());
    let n = notification(WORKFLOW_GROUP,
                         vec![LogEvent::new("e1",
                                            Some(T0),
                                            json!({"type": "ExecutionSucceeded",
                                                   "input": {"batch_id": "B-empty"}}).to_string())]);
    let decoded = decode_notification(&n).unwrap();
    let now = at_millis(T0 + 3_600_000);
    let report = c.process(Uuid::new_v4(), &decoded, now);
    assert_eq!(report.finalized_batches, vec!["B-empty"]);
    let summary = c.store().get_summary("B-empty").unwrap().unwrap();
    assert_eq!(summary.status, SummaryStatus::Ok);
    assert_eq!(summary.counts, Counts::default());
    assert!(summary.steps.is_empty());
    assert_eq!(summary.started, now);
    assert_eq!(summary.ended, now);
    assert_eq!(summary.generated_at, now);
}

#[test]
fn malformed_lines_do_not_affect_siblings() {
    let (_, c) = collector(CollectorSettings::default());
    let n = notification(JOB_GROUP,
                         vec![LogEvent::new("e1", Some(T0), job_line(json!({"batch_id": "B9", "step": "prevalidate"}))),
                              LogEvent::new("e2", Some(T0), "EVIDENCE {\"batch_id\": \"B9\", \"step\": "),
                              LogEvent::new("e3", Some(T0), "EVIDENCE [1, 2, 3]"),
                              LogEvent::new("e4", Some(T0), job_line(json!({"batch_id": "B9", "step": "load"})))]);
    let report = run(&c, &n);
    assert_eq!(report.persisted_envelopes, 2);
    assert_eq!(report.skipped_lines, 2);
    assert_eq!(c.store().list("B9").unwrap().len(), 2);
}

#[test]
fn duplicate_delivery_leaves_store_unchanged() {
    let (store, c) = collector(CollectorSettings::default());
    let n = notification(WORKFLOW_GROUP,
                         vec![LogEvent::new("e1",
                                            Some(T0),
                                            task_exited("Prevalidate",
                                                        Some(ARN),
                                                        json!({"batch_id": "B10", "step": "prevalidate",
                                                               "input": {"rows": 3}}))),
                              LogEvent::new("e2", Some(T0 + 1), json!({"type": "ExecutionSucceeded", "executionArn": ARN}).to_string())]);
    let decoded = decode_notification(&n).unwrap();
    let now = at_millis(T0 + 10_000);

    c.process(Uuid::new_v4(), &decoded, now);
    let first = store.snapshot();
    c.process(Uuid::new_v4(), &decoded, now);
    assert_eq!(store.snapshot(), first);
    assert_eq!(first.keys().filter(|k| k.contains("/per-step/")).count(), 1);
}

#[test]
fn re_aggregation_differs_only_in_generated_at() {
    let (_, c) = collector(CollectorSettings::default());
    run(&c,
        &notification(JOB_GROUP,
                      vec![LogEvent::new("e1", Some(T0), job_line(json!({"batch_id": "B11", "step": "a", "input": {"rows": 1}}))),
                           LogEvent::new("e2", Some(T0 + 5), job_line(json!({"batch_id": "B11", "step": "b", "ok": false})))]));
    let agg = Aggregator::new(c.store());
    let s1 = agg.aggregate("B11", at_millis(T0 + 100)).unwrap();
    let mut s2 = agg.aggregate("B11", at_millis(T0 + 200)).unwrap();
    assert_ne!(s1.generated_at, s2.generated_at);
    s2.generated_at = s1.generated_at;
    assert_eq!(s1, s2);
}

#[test]
fn transport_corruption_aborts_without_writes() {
    let (store, c) = collector(CollectorSettings::default());
    let mut n = notification(JOB_GROUP, vec![]);
    n.payload.data = "this is !!! not base64".into();
    assert!(matches!(c.handle(&n), Err(CollectorError::Transport(_))));

    n.payload.data = "aGVsbG8gd29ybGQ=".into();
    assert!(matches!(c.handle(&n), Err(CollectorError::Transport(_))), "valid base64 but not gzip");
    assert!(store.is_empty());
}

#[test]
fn disabled_collector_is_a_successful_noop() {
    let (store, c) = collector(CollectorSettings { enabled: false,
                                                   save_raw_logs: true });
    let mut n = notification(JOB_GROUP, vec![LogEvent::new("e1", Some(T0), job_line(json!({"batch_id": "B12"})))]);
    assert_eq!(c.handle(&n).unwrap(), CollectorOutcome::Disabled);
    n.payload.data = "garbage".into();
    assert_eq!(c.handle(&n).unwrap(), CollectorOutcome::Disabled);
    assert!(store.is_empty());
}

#[test]
fn control_message_writes_nothing() {
    let (store, c) = collector(CollectorSettings::default());
    let batch = LogBatch { message_type: "CONTROL_MESSAGE".into(),
                           log_group: WORKFLOW_GROUP.into(),
                           ..Default::default() };
    let report = run(&c, &DeliveryNotification::from_batch(&batch).unwrap());
    assert_eq!(report.events_count, 0);
    assert!(report.processed_batches.is_empty());
    assert!(store.is_empty());
}

#[test]
fn raw_payload_is_archived_when_enabled() {
    let (store, c) = collector(CollectorSettings { enabled: true,
                                                   save_raw_logs: true });
    let n = notification(WORKFLOW_GROUP, vec![LogEvent::new("e1", Some(T0), "{}")]);
    let decoded = decode_notification(&n).unwrap();
    c.process(Uuid::new_v4(), &decoded, at_millis(T0));
    let key = keys::raw_logs_key(T0 / 1000, WORKFLOW_GROUP);
    assert!(key.starts_with("raw-logs/1735725600_"));
    assert_eq!(store.get(&key).unwrap().unwrap(), decoded.raw);
}

#[test]
fn renderer_output_is_stored_next_to_summary() {
    let (store, c) = collector(CollectorSettings::default());
    let c = c.with_renderer(JsonReportRenderer);
    run(&c,
        &notification(JOB_GROUP,
                      vec![LogEvent::new("e1", Some(T0), job_line(json!({"batch_id": "B13", "step": "load", "is_terminal": true})))]));
    let body = store.get(&keys::report_key("B13")).unwrap().expect("report stored");
    let report: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report["batch_id"], "B13");
    assert_eq!(report["summary"]["status"], "OK");
}

#[test]
fn flow_mapping_document_is_read_from_the_store() {
    let store = Arc::new(InMemoryObjectStore::new());
    store.put(DEFAULT_FLOW_MAPPING_KEY,
              br#"{"flow_patterns": {"csv-to-parquet": "csv-to-parquet-pipeline"}}"#,
              "application/json")
         .unwrap();
    let flows = Arc::new(StoredFlowMapping::new(store.clone(), DEFAULT_FLOW_MAPPING_KEY));
    let c = Collector::with_default_extractors(CollectorSettings::default(), store.clone(), flows);
    run(&c,
        &notification(WORKFLOW_GROUP,
                      vec![LogEvent::new("e1", Some(T0), task_exited("Load", Some(ARN), json!({"batch_id": "B14", "step": "load"})))]));
    let envs = c.store().list("B14").unwrap();
    assert_eq!(envs[0].flow, "csv-to-parquet-pipeline");
    assert_eq!(envs[0].execution_arn.as_deref(), Some(ARN));
}

/// Rechaza la escritura de una clave concreta y el listado de un prefijo.
struct FaultyStore {
    inner: InMemoryObjectStore,
    reject_put: String,
    reject_list: String,
}

impl ObjectStore for FaultyStore {
    fn put(&self, key: &str, body: &[u8], content_type: &str) -> Result<(), StoreError> {
        if key == self.reject_put {
            return Err(StoreError::Backend(format!("write rejected: {key}")));
        }
        self.inner.put(key, body, content_type)
    }
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if prefix == self.reject_list {
            return Err(StoreError::Backend(format!("list rejected: {prefix}")));
        }
        self.inner.list(prefix)
    }
}

#[test]
fn store_failures_are_isolated_per_line_and_per_batch() {
    let store = Arc::new(FaultyStore { inner: InMemoryObjectStore::new(),
                                       reject_put: keys::per_step_key("B30", "load", "j2"),
                                       reject_list: keys::per_step_prefix("B31") });
    let c = Collector::with_default_extractors(CollectorSettings::default(),
                                               store.clone(),
                                               Arc::new(StaticFlowMapping::default()));
    let n = notification(JOB_GROUP,
                         vec![LogEvent::new("j1", Some(T0), job_line(json!({"batch_id": "B30", "step": "prevalidate",
                                                                             "input": {"rows": 7}}))),
                              LogEvent::new("j2", Some(T0 + 1_000), job_line(json!({"batch_id": "B30", "step": "load"}))),
                              LogEvent::new("j3",
                                            Some(T0 + 2_000),
                                            job_line(json!({"batch_id": "B30", "step": "finalize", "is_terminal": true}))),
                              LogEvent::new("j4",
                                            Some(T0 + 3_000),
                                            job_line(json!({"batch_id": "B31", "step": "load", "is_terminal": true}))),
                              LogEvent::new("j5",
                                            Some(T0 + 4_000),
                                            job_line(json!({"batch_id": "B32", "step": "load", "is_terminal": true})))]);

    let report = c.handle(&n).unwrap().report().cloned().unwrap();
    assert_eq!(report.persisted_envelopes, 4);
    assert_eq!(report.failed_writes, 1);
    assert_eq!(report.processed_batches, vec!["B30", "B31", "B32"]);
    assert_eq!(report.finalized_batches, vec!["B30", "B32"]);
    assert_eq!(report.failed_batches, vec!["B31"]);

    assert!(store.get(&keys::per_step_key("B30", "load", "j2")).unwrap().is_none());
    assert!(store.get(&keys::per_step_key("B30", "finalize", "j3")).unwrap().is_some());
    assert!(store.get(&keys::per_step_key("B31", "load", "j4")).unwrap().is_some());

    let b30 = c.store().get_summary("B30").unwrap().expect("summary without the rejected line");
    let steps: Vec<&str> = b30.steps.iter().map(|e| e.step.as_str()).collect();
    assert_eq!(steps, vec!["prevalidate", "finalize"]);
    assert_eq!(b30.counts.input_rows, 7);
    assert!(c.store().get_summary("B31").unwrap().is_none());
    assert!(c.store().get_summary("B32").unwrap().is_some());
}
