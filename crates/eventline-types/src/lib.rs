//! Shared types for the Eventline ingestion and metrics services.
//!
//! This crate holds the request-scoped values that cross crate boundaries:
//! the write-side [`Event`] and its free-form [`Metadata`], and the
//! read-side [`MetricsQuery`], [`MetricRow`] and [`Metric`]. Closed
//! vocabularies ([`Channel`], [`GroupBy`]) are enums so that an unsupported
//! value is rejected when it is parsed rather than somewhere deeper in the
//! pipeline.
//!
//! Nothing here performs I/O. The ingest and metrics crates build on these
//! types; the server crate maps HTTP payloads onto them.

mod error;
mod event;
mod metrics;

pub use error::ValidationError;
pub use event::{Channel, Event, MetaValue, Metadata};
pub use metrics::{GroupBy, GroupMetric, Metric, MetricRow, MetricsQuery};
