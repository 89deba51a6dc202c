//! Error types for the metrics read path.

use std::time::Duration;

/// The analytical store could not answer a query.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The ClickHouse client reported a failure.
    #[error("analytical store error: {0}")]
    Store(#[from] clickhouse::error::Error),

    /// The store is not reachable or refused the query.
    #[error("analytical store unavailable: {0}")]
    Unavailable(String),

    /// The query did not finish before its deadline.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

/// Which step of answering a metrics request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    /// Sending the query and waiting for the first response.
    Execute,
    /// Streaming result rows.
    ReadRows,
}

impl std::fmt::Display for QueryStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Execute => f.write_str("executing query"),
            Self::ReadRows => f.write_str("reading rows"),
        }
    }
}

/// Errors returned by [`MetricsAggregationService`](crate::MetricsAggregationService).
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics query failed while {stage}: {source}")]
    QueryExecution {
        stage: QueryStage,
        #[source]
        source: RepositoryError,
    },
}

impl MetricsError {
    /// Whether the failure was a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::QueryExecution {
                source: RepositoryError::Timeout(_),
                ..
            }
        )
    }
}
