//! Line Extractors.
//!
//! Cada línea de log cruda pasa por una cadena de estrategias intercambiables
//! (`LineExtractor`). Cada estrategia decide si aplica a la línea y, si aplica,
//! devuelve cero o un `EvidenceEnvelope`. Añadir un productor nuevo es añadir
//! una estrategia; el modelo común no cambia.
//!
//! Reglas de la cadena:
//! - Se prueban en orden; el primer envelope gana.
//! - La señal de fin de workflow se calcula aparte, aunque otra estrategia ya
//!   haya producido el envelope.
//! - Un error de parseo se registra y se descarta: nunca aborta las líneas
//!   hermanas.
use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;

mod job;
mod workflow;

pub use job::JobLogExtractor;
pub use workflow::WorkflowLogExtractor;

use crate::constants::UNKNOWN_STEP;
use crate::errors::ExtractError;
use crate::model::EvidenceEnvelope;
use crate::terminal::TerminalState;

/// Una línea cruda junto a su contexto de entrega.
#[derive(Debug, Clone, Copy)]
pub struct LineContext<'a> {
    pub message: &'a str,
    pub event_id: &'a str,
    pub log_group: &'a str,
    /// Instante de llegada informado por el transporte.
    pub arrival: Option<DateTime<Utc>>,
}

impl LineContext<'_> {
    /// Marca temporal con la que se sellan las evidencias de esta línea. Se
    /// deriva de la llegada para que una reentrega produzca el mismo contenido.
    pub fn stamp(&self) -> String {
        self.arrival
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Señal de fin emitida por una línea del workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSignal {
    pub state: TerminalState,
    pub execution_id: Option<String>,
    /// `batch_id` encontrado en el input/output del evento, si lo hay.
    pub batch_hint: Option<String>,
}

pub trait LineExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, line: &LineContext<'_>) -> bool;

    fn extract(&self, line: &LineContext<'_>) -> Result<Option<EvidenceEnvelope>, ExtractError>;

    /// Sólo las estrategias de workflow emiten señal de fin.
    fn terminal_signal(&self, _line: &LineContext<'_>) -> Option<TerminalSignal> {
        None
    }
}

/// Resultado de procesar una línea.
#[derive(Debug, Default)]
pub struct LineOutcome {
    pub envelope: Option<EvidenceEnvelope>,
    pub signal: Option<TerminalSignal>,
    pub errors: usize,
}

pub struct ExtractorChain {
    extractors: Vec<Box<dyn LineExtractor>>,
}

impl ExtractorChain {
    pub fn new(extractors: Vec<Box<dyn LineExtractor>>) -> Self {
        Self { extractors }
    }

    pub fn add(mut self, extractor: impl LineExtractor + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn process(&self, line: &LineContext<'_>) -> LineOutcome {
        let mut outcome = LineOutcome::default();
        for extractor in self.extractors.iter().filter(|x| x.applies_to(line)) {
            if outcome.envelope.is_none() {
                match extractor.extract(line) {
                    Ok(Some(env)) => outcome.envelope = Some(normalize(env, line)),
                    Ok(None) => {}
                    Err(e) => {
                        outcome.errors += 1;
                        warn!("extract: skip line event_id={} extractor={} err={e}",
                              line.event_id,
                              extractor.name());
                    }
                }
            }
            if outcome.signal.is_none() {
                outcome.signal = extractor.terminal_signal(line);
            }
        }
        outcome
    }
}

/// Completa los campos que el colector garantiza no vacíos.
fn normalize(mut env: EvidenceEnvelope, line: &LineContext<'_>) -> EvidenceEnvelope {
    if env.batch_id.is_empty() {
        env.batch_id = synthesize_batch_id(line.arrival);
        warn!("extract: evidence without batch_id event_id={} -> {}", line.event_id, env.batch_id);
    }
    if env.step.is_empty() {
        env.step = UNKNOWN_STEP.to_string();
    }
    env
}

/// `batch_id` de respaldo derivado del instante de llegada (no autoritativo).
pub fn synthesize_batch_id(arrival: Option<DateTime<Utc>>) -> String {
    format!("B{}", arrival.unwrap_or_else(Utc::now).timestamp())
}
