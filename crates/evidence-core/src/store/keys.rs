//! Layout de claves del almacenamiento de evidencias.
//!
//! ```text
//! evidence/{batch_id}/per-step/{step}_{event_id}
//! evidence/{batch_id}/summary
//! evidence/{batch_id}/report
//! raw-logs/{unix_seconds}_{log_group}.json
//! ```
//! Cada segmento pasa por `safe_segment`, por lo que nunca contiene `/`.
use crate::constants::{EVIDENCE_PREFIX, RAW_LOGS_PREFIX};

/// Reemplaza cada racha de caracteres fuera de `[0-9A-Za-z._-]` por `_`.
pub fn safe_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    match out.as_str() {
        "" => "unknown".to_string(),
        "." | ".." => "_".to_string(),
        _ => out,
    }
}

pub fn batch_prefix(batch_id: &str) -> String {
    format!("{EVIDENCE_PREFIX}/{}/", safe_segment(batch_id))
}

pub fn per_step_prefix(batch_id: &str) -> String {
    format!("{}per-step/", batch_prefix(batch_id))
}

pub fn per_step_key(batch_id: &str, step: &str, event_id: &str) -> String {
    format!("{}{}_{}", per_step_prefix(batch_id), safe_segment(step), safe_segment(event_id))
}

pub fn summary_key(batch_id: &str) -> String {
    format!("{}summary", batch_prefix(batch_id))
}

pub fn report_key(batch_id: &str) -> String {
    format!("{}report", batch_prefix(batch_id))
}

pub fn raw_logs_key(unix_seconds: i64, log_group: &str) -> String {
    format!("{RAW_LOGS_PREFIX}/{unix_seconds}_{}.json", safe_segment(log_group))
}
