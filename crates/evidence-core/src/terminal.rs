//! Terminal Detector.
//!
//! Función pura sobre las señales de una línea procesada: el tipo de evento del
//! workflow y el envelope extraído (si lo hay). No consulta almacenamiento ni
//! garantiza que las evidencias del batch estén completas en ese momento.
use serde::{Deserialize, Serialize};

use crate::model::EvidenceEnvelope;

/// Estados finales de una ejecución del workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminalState {
    Succeeded,
    Failed,
    Aborted,
    TimedOut,
}

impl TerminalState {
    /// Mapea el `type` de un evento del workflow (`ExecutionSucceeded`, ...).
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "ExecutionSucceeded" => Some(Self::Succeeded),
            "ExecutionFailed" => Some(Self::Failed),
            "ExecutionAborted" => Some(Self::Aborted),
            "ExecutionTimedOut" => Some(Self::TimedOut),
            _ => None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Succeeded => "ExecutionSucceeded",
            Self::Failed => "ExecutionFailed",
            Self::Aborted => "ExecutionAborted",
            Self::TimedOut => "ExecutionTimedOut",
        }
    }
}

/// `true` si la línea señala el fin del batch.
pub fn is_terminal(workflow_state: Option<TerminalState>, envelope: Option<&EvidenceEnvelope>) -> bool {
    workflow_state.is_some() || envelope.is_some_and(|e| e.is_terminal)
}
