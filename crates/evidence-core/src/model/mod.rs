//! Modelos del colector (EvidenceEnvelope, Summary, ...)

pub mod envelope;
pub mod summary;

pub use envelope::{metric_u64, parse_ts, EvidenceEnvelope, Metrics};
pub use summary::{Counts, Failure, Summary, SummaryStatus};
