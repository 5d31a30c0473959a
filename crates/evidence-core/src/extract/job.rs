use serde_json::Value;

use super::{LineContext, LineExtractor};
use crate::constants::EVIDENCE_MARKER;
use crate::errors::ExtractError;
use crate::model::EvidenceEnvelope;

/// Líneas de jobs genéricos: `EVIDENCE {json}`, donde el JSON es el envelope
/// o un objeto que lo anida bajo `evidence`.
#[derive(Debug, Clone)]
pub struct JobLogExtractor {
    marker: String,
}

impl JobLogExtractor {
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self { marker: marker.into() }
    }
}

impl Default for JobLogExtractor {
    fn default() -> Self {
        Self::with_marker(EVIDENCE_MARKER)
    }
}

impl LineExtractor for JobLogExtractor {
    fn name(&self) -> &'static str {
        "job-log"
    }

    fn applies_to(&self, line: &LineContext<'_>) -> bool {
        line.message.trim_start().starts_with(&self.marker)
    }

    fn extract(&self, line: &LineContext<'_>) -> Result<Option<EvidenceEnvelope>, ExtractError> {
        let Some(payload) = line.message.trim_start().strip_prefix(&self.marker) else {
            return Ok(None);
        };
        let mut value: Value = serde_json::from_str(payload.trim()).map_err(ExtractError::InvalidJson)?;
        if let Some(nested) = value.get_mut("evidence").map(Value::take) {
            value = nested;
        }
        let mut envelope = EvidenceEnvelope::from_value(value)?;
        envelope.event_id = line.event_id.to_string();
        envelope.ts = line.stamp();
        Ok(Some(envelope))
    }
}
