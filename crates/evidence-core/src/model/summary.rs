//! `Summary`: agregado de todas las evidencias de un batch terminal.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EvidenceEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// Contadores sumados sobre las evidencias que reportan la métrica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub input_files: u64,
    pub input_rows: u64,
    pub output_files: u64,
    pub output_rows: u64,
    pub loaded_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub step: String,
    pub error: String,
    pub details: EvidenceEnvelope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub batch_id: String,
    pub flow: String,
    pub status: SummaryStatus,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub counts: Counts,
    /// Evidencias ordenadas por `ts` (luego `step`, `event_id`).
    pub steps: Vec<EvidenceEnvelope>,
    pub failures: Vec<Failure>,
    /// Hash del JSON canónico de `steps`.
    pub evidence_fingerprint: String,
    pub generated_at: DateTime<Utc>,
}

impl Summary {
    pub fn is_ok(&self) -> bool {
        self.status == SummaryStatus::Ok
    }
}
