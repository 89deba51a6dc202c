//! Query execution against the analytical store.

use async_trait::async_trait;
use clickhouse::query::Query;
use clickhouse::{Client, Row};
use eventline_types::MetricRow;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::RepositoryError;
use crate::query::{ParamValue, ParameterizedQuery};

/// A finite, single-pass sequence of result rows.
pub type RowStream = BoxStream<'static, Result<MetricRow, RepositoryError>>;

/// Runs built metrics queries.
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Starts executing `query`. Rows are pulled lazily from the returned
    /// stream; re-reading requires a fresh call.
    async fn execute(&self, query: &ParameterizedQuery) -> Result<RowStream, RepositoryError>;
}

#[derive(Debug, Row, Deserialize)]
struct GroupedRow {
    group_key: String,
    total_count: u64,
    unique_users: u64,
}

#[derive(Debug, Row, Deserialize)]
struct TotalsRow {
    total_count: u64,
    unique_users: u64,
}

/// Repository backed by a ClickHouse client.
#[derive(Clone)]
pub struct ClickHouseMetricsRepository {
    client: Client,
}

impl ClickHouseMetricsRepository {
    /// Wraps an already configured client. Connection settings and pooling
    /// belong to the client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetricsRepository for ClickHouseMetricsRepository {
    async fn execute(&self, query: &ParameterizedQuery) -> Result<RowStream, RepositoryError> {
        let mut statement = self.client.query(query.sql());
        for param in query.params() {
            statement = match &param.value {
                ParamValue::String(value) => statement.param(param.name, value),
                ParamValue::DateTime(seconds) => statement.param(param.name, seconds),
            };
        }

        if query.group_by().is_grouped() {
            stream_rows(statement, |row: GroupedRow| MetricRow {
                group_key: Some(row.group_key),
                total_count: row.total_count,
                unique_users: row.unique_users,
            })
        } else {
            stream_rows(statement, |row: TotalsRow| MetricRow {
                group_key: None,
                total_count: row.total_count,
                unique_users: row.unique_users,
            })
        }
    }
}

/// Adapts a ClickHouse row cursor into a [`RowStream`].
fn stream_rows<T, F>(statement: Query, convert: F) -> Result<RowStream, RepositoryError>
where
    T: Row + DeserializeOwned + Send + 'static,
    F: Fn(T) -> MetricRow + Send + 'static,
{
    let cursor = statement.fetch::<T>()?;

    let rows = stream::try_unfold((cursor, convert), |(mut cursor, convert)| async move {
        let next = cursor.next().await?;
        Ok::<_, RepositoryError>(next.map(|row| (convert(row), (cursor, convert))))
    });

    Ok(rows.boxed())
}
