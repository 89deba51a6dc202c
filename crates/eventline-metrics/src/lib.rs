//! Aggregate metrics over ingested events.
//!
//! A [`MetricsQuery`](eventline_types::MetricsQuery) is translated by
//! [`MetricsQueryBuilder`] into a [`ParameterizedQuery`]: fixed SQL text
//! plus a list of typed, named parameters. Only the closed
//! [`GroupBy`](eventline_types::GroupBy) tag selects SQL fragments; every
//! request-supplied value travels as a bound parameter.
//!
//! A [`MetricsRepository`] runs the query and streams raw
//! [`MetricRow`](eventline_types::MetricRow)s back, and
//! [`MetricsAggregationService`] shapes them into a
//! [`Metric`](eventline_types::Metric).
//!
//! # Grouping
//!
//! | `group_by` | `group_key` expression |
//! |------------|------------------------|
//! | `none` | (no grouping, exactly one row) |
//! | `channel` | `channel` |
//! | `hour` | `toString(toStartOfHour(timestamp))` |
//! | `day` | `toString(toStartOfDay(timestamp))` |

mod error;
mod memory;
mod query;
mod repository;
mod service;

pub use error::{MetricsError, QueryStage, RepositoryError};
pub use memory::MemoryMetricsRepository;
pub use query::{
    MetricsQueryBuilder, ParamValue, ParameterizedQuery, QueryParam, END_TIME_PARAM,
    EVENT_NAME_PARAM, START_TIME_PARAM,
};
pub use repository::{ClickHouseMetricsRepository, MetricsRepository, RowStream};
pub use service::{shape_rows, MetricsAggregationService};
