//! Frontera de renderizado: `render(batch_id, summary, historial) -> documento`.
//!
//! El colector trata el renderer como caja negra. Aquí sólo vive el contrato y
//! un renderer JSON mínimo; los reportes HTML/visuales se implementan fuera.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::RenderError;
use crate::model::Summary;

/// Una ejecución del workflow en el historial opcional del reporte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub status: String,
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current: bool,
}

/// Documento renderizado listo para persistir.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub content_type: String,
    pub body: Vec<u8>,
}

pub trait Renderer: Send + Sync {
    fn render(&self,
              batch_id: &str,
              summary: &Summary,
              history: Option<&[ExecutionRecord]>)
              -> Result<RenderedDocument, RenderError>;
}

/// Reporte JSON: el summary más el historial, indentado.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportRenderer;

impl Renderer for JsonReportRenderer {
    fn render(&self,
              batch_id: &str,
              summary: &Summary,
              history: Option<&[ExecutionRecord]>)
              -> Result<RenderedDocument, RenderError> {
        let doc = json!({
            "batch_id": batch_id,
            "summary": summary,
            "executions": history.unwrap_or_default(),
        });
        let body = serde_json::to_vec_pretty(&doc).map_err(|e| RenderError::Failed(e.to_string()))?;
        Ok(RenderedDocument { content_type: "application/json".into(),
                              body })
    }
}
