//! evidence-core: colector de evidencias de pipelines por lotes.
//!
//! Decodifica notificaciones de log, extrae las evidencias que cada step
//! emite, las persiste por `(batch_id, step, event_id)` y, al detectar el fin
//! del batch, las reduce a un `Summary` determinista.
pub mod aggregate;
pub mod collector;
pub mod constants;
pub mod decode;
pub mod errors;
pub mod extract;
pub mod flow;
pub mod hashing;
pub mod model;
pub mod render;
pub mod store;
pub mod terminal;

pub use aggregate::{summarize, Aggregator};
pub use collector::{Collector, CollectorOutcome, CollectorPhase, CollectorSettings, InvocationReport};
pub use decode::{decode_notification, DecodedBatch, DeliveryNotification, LogBatch, LogEvent};
pub use errors::{CollectorError, DecodeError, ExtractError, LookupError, RenderError, StoreError};
pub use extract::{ExtractorChain, JobLogExtractor, LineContext, LineExtractor, WorkflowLogExtractor};
pub use flow::{FlowMapping, StaticFlowMapping, StoredFlowMapping};
pub use model::{Counts, EvidenceEnvelope, Failure, Summary, SummaryStatus};
pub use render::{ExecutionRecord, JsonReportRenderer, RenderedDocument, Renderer};
pub use store::{EvidenceStore, InMemoryObjectStore, ObjectStore};
pub use terminal::{is_terminal, TerminalState};
