//! Metrics read handler.

use std::sync::Arc;

use axum::extract::{rejection::QueryRejection, Extension, Json, Query};
use eventline_types::{GroupBy, GroupMetric, Metric, MetricsQuery};
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::AppState;

/// Query string for `GET /metrics`.
#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    #[serde(default)]
    pub event_name: String,
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub group_by: Option<String>,
}

impl MetricsParams {
    /// Non-positive bounds mean "unbounded".
    fn into_query(self) -> Result<MetricsQuery, ApiError> {
        let positive = |value: Option<i64>| value.filter(|v| *v > 0);
        Ok(MetricsQuery::parse(
            &self.event_name,
            positive(self.from),
            positive(self.to),
            self.group_by.as_deref(),
        )?)
    }
}

/// Response body for `GET /metrics`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_events: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_users: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_by: Option<GroupBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<GroupMetric>>,
}

impl MetricsResponse {
    fn new(query: &MetricsQuery, metric: Metric) -> Self {
        let mut response = Self {
            event_name: query.event_name.clone(),
            from: query.from,
            to: query.to,
            total_events: None,
            unique_users: None,
            grouped_by: None,
            data: None,
        };
        match metric {
            Metric::Summary {
                total_events,
                unique_users,
            } => {
                response.total_events = Some(total_events);
                response.unique_users = Some(unique_users);
            }
            Metric::Breakdown(groups) => {
                response.grouped_by = Some(query.group_by);
                response.data = Some(groups);
            }
        }
        response
    }
}

/// Handler for `GET /metrics`.
pub async fn get_metrics_handler(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<MetricsParams>, QueryRejection>,
) -> Result<Json<MetricsResponse>, ApiError> {
    let Query(params) = params?;
    let query = params.into_query()?;

    let metric = state.metrics.get(&query).await?;

    Ok(Json(MetricsResponse::new(&query, metric)))
}
