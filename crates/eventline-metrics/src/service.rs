//! Build, execute, collect, shape.

use std::sync::Arc;
use std::time::Duration;

use eventline_types::{GroupBy, GroupMetric, Metric, MetricRow, MetricsQuery};
use futures::TryStreamExt;
use tokio::time::{timeout_at, Instant};

use crate::error::{MetricsError, QueryStage, RepositoryError};
use crate::query::MetricsQueryBuilder;
use crate::repository::MetricsRepository;

const DEFAULT_QUERY_DEADLINE: Duration = Duration::from_secs(30);

/// Answers metrics requests from the analytical store.
pub struct MetricsAggregationService {
    builder: MetricsQueryBuilder,
    repository: Arc<dyn MetricsRepository>,
    deadline: Duration,
}

impl MetricsAggregationService {
    pub fn new(repository: Arc<dyn MetricsRepository>) -> Self {
        Self {
            builder: MetricsQueryBuilder::default(),
            repository,
            deadline: DEFAULT_QUERY_DEADLINE,
        }
    }

    pub fn with_builder(mut self, builder: MetricsQueryBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Bounds execution and row reading together.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Runs `query` and shapes the result.
    ///
    /// # Errors
    ///
    /// `MetricsError::QueryExecution` naming the stage that failed. A missed
    /// deadline surfaces as `RepositoryError::Timeout`.
    pub async fn get(&self, query: &MetricsQuery) -> Result<Metric, MetricsError> {
        let built = self.builder.build(query);
        let deadline = Instant::now() + self.deadline;

        let rows = timeout_at(deadline, self.repository.execute(&built))
            .await
            .map_err(|_| RepositoryError::Timeout(self.deadline))
            .and_then(|result| result)
            .map_err(|source| MetricsError::QueryExecution {
                stage: QueryStage::Execute,
                source,
            })?;

        let rows = timeout_at(deadline, rows.try_collect::<Vec<MetricRow>>())
            .await
            .map_err(|_| RepositoryError::Timeout(self.deadline))
            .and_then(|result| result)
            .map_err(|source| MetricsError::QueryExecution {
                stage: QueryStage::ReadRows,
                source,
            })?;

        tracing::debug!(
            event_name = %query.event_name,
            group_by = %query.group_by,
            rows = rows.len(),
            "metrics query answered"
        );

        Ok(shape_rows(query.group_by, rows))
    }
}

/// Converts raw rows into a [`Metric`].
///
/// Ungrouped results take the first row, or zeros when the store returned
/// nothing. Grouped results keep the store's row order.
pub fn shape_rows(group_by: GroupBy, rows: Vec<MetricRow>) -> Metric {
    if !group_by.is_grouped() {
        let (total_events, unique_users) = rows
            .first()
            .map(|row| (row.total_count, row.unique_users))
            .unwrap_or((0, 0));
        return Metric::Summary {
            total_events,
            unique_users,
        };
    }

    Metric::Breakdown(
        rows.into_iter()
            .map(|row| GroupMetric {
                group: row.group_key.unwrap_or_default(),
                total_events: row.total_count,
                unique_users: row.unique_users,
            })
            .collect(),
    )
}
