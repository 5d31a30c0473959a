use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{LineContext, LineExtractor, TerminalSignal};
use crate::constants::{UNKNOWN_FLOW, WORKFLOW_LOG_GROUP_MARKER};
use crate::errors::ExtractError;
use crate::flow::{resolve_flow, FlowMapping};
use crate::model::EvidenceEnvelope;
use crate::terminal::TerminalState;

/// Evento del log de estado del workflow. `input`/`output` pueden llegar como
/// objeto o como JSON serializado en string, en la raíz o bajo `details`.
#[derive(Debug, Default, Deserialize)]
struct WorkflowLogEvent {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(alias = "executionArn", default)]
    execution_arn: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    evidence: Option<Value>,
    #[serde(default)]
    details: Option<WorkflowDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowDetails {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    output: Option<Value>,
}

impl WorkflowLogEvent {
    fn parse(message: &str) -> Result<Self, ExtractError> {
        serde_json::from_str(message).map_err(ExtractError::InvalidJson)
    }

    /// Payloads candidatos en orden de búsqueda: input, output, details.input,
    /// details.output. Sólo objetos (los strings se parsean).
    fn payloads(&self) -> Vec<Value> {
        let details = self.details.as_ref();
        [self.input.as_ref(),
         self.output.as_ref(),
         details.and_then(|d| d.input.as_ref()),
         details.and_then(|d| d.output.as_ref())].into_iter()
                                                 .flatten()
                                                 .filter_map(as_object)
                                                 .collect()
    }

    fn evidence(&self) -> Option<Value> {
        self.payloads()
            .into_iter()
            .find_map(|mut p| p.get_mut("evidence").map(Value::take).filter(|e| !e.is_null()))
            .or_else(|| self.evidence.clone().filter(|e| !e.is_null()))
    }

    fn batch_hint(&self) -> Option<String> {
        self.payloads().iter().find_map(|p| {
                                  string_at(p, "batch_id").or_else(|| p.get("evidence").and_then(|e| string_at(e, "batch_id")))
                              })
    }

    fn state_name(&self) -> Option<String> {
        self.state.clone()
            .or_else(|| self.details.as_ref().and_then(|d| d.name.clone()))
    }
}

fn as_object(v: &Value) -> Option<Value> {
    match v {
        Value::Object(_) => Some(v.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_object),
        _ => None,
    }
}

fn string_at(v: &Value, key: &str) -> Option<String> {
    v.get(key)
     .and_then(Value::as_str)
     .filter(|s| !s.is_empty())
     .map(str::to_string)
}

/// Líneas del log de estado del workflow (sólo grupos de workflow).
pub struct WorkflowLogExtractor {
    flows: Arc<dyn FlowMapping>,
    group_marker: String,
}

impl WorkflowLogExtractor {
    pub fn new(flows: Arc<dyn FlowMapping>) -> Self {
        Self { flows,
               group_marker: WORKFLOW_LOG_GROUP_MARKER.to_string() }
    }

    pub fn with_group_marker(mut self, marker: impl Into<String>) -> Self {
        self.group_marker = marker.into();
        self
    }
}

impl LineExtractor for WorkflowLogExtractor {
    fn name(&self) -> &'static str {
        "workflow-log"
    }

    fn applies_to(&self, line: &LineContext<'_>) -> bool {
        line.log_group.contains(&self.group_marker)
    }

    fn extract(&self, line: &LineContext<'_>) -> Result<Option<EvidenceEnvelope>, ExtractError> {
        let event = WorkflowLogEvent::parse(line.message)?;
        let Some(evidence) = event.evidence() else {
            return Ok(None);
        };
        let mut envelope = EvidenceEnvelope::from_value(evidence)?;
        let resolved = resolve_flow(self.flows.as_ref(), event.execution_arn.as_deref());
        if resolved != UNKNOWN_FLOW || envelope.flow.is_empty() {
            envelope.flow = resolved;
        }
        envelope.state_name = event.state_name();
        envelope.event_type = event.event_type;
        envelope.execution_arn = event.execution_arn;
        envelope.event_id = line.event_id.to_string();
        envelope.ts = line.stamp();
        Ok(Some(envelope))
    }

    fn terminal_signal(&self, line: &LineContext<'_>) -> Option<TerminalSignal> {
        let event = WorkflowLogEvent::parse(line.message).ok()?;
        let state = TerminalState::from_event_type(event.event_type.as_deref()?)?;
        Some(TerminalSignal { state,
                              batch_hint: event.batch_hint(),
                              execution_id: event.execution_arn })
    }
}
