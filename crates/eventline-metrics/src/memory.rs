//! In-process repository used by tests and local runs.
//!
//! Evaluates a [`ParameterizedQuery`] against a fixed list of events the way
//! the analytical store would: same filters, same UTC bucket strings, and
//! groups ordered ascending by key. Events sharing an identity
//! (`event_name`, `user_id`, `timestamp`) count once, as they do once the
//! store collapses replaced rows.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::DateTime;
use eventline_types::{Event, GroupBy, MetricRow};
use futures::stream::{self, StreamExt};

use crate::error::RepositoryError;
use crate::query::{ParamValue, ParameterizedQuery, END_TIME_PARAM, EVENT_NAME_PARAM, START_TIME_PARAM};
use crate::repository::{MetricsRepository, RowStream};

/// A [`MetricsRepository`] over an in-memory event list.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetricsRepository {
    events: Vec<Event>,
    failure: Option<String>,
}

impl MemoryMetricsRepository {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            failure: None,
        }
    }

    /// A repository whose every query fails with [`RepositoryError::Unavailable`].
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            failure: Some(message.into()),
        }
    }

    fn matches(&self, event: &Event, query: &ParameterizedQuery) -> bool {
        if let Some(ParamValue::String(name)) = query.param(EVENT_NAME_PARAM) {
            if event.event_name != *name {
                return false;
            }
        }
        if let Some(ParamValue::DateTime(from)) = query.param(START_TIME_PARAM) {
            if event.timestamp < *from {
                return false;
            }
        }
        if let Some(ParamValue::DateTime(to)) = query.param(END_TIME_PARAM) {
            if event.timestamp > *to {
                return false;
            }
        }
        true
    }
}

/// Computes the same key the store's grouping expression would produce.
fn group_key(event: &Event, group_by: GroupBy) -> Option<String> {
    match group_by {
        GroupBy::None => None,
        GroupBy::Channel => Some(
            event
                .channel
                .map(|channel| channel.as_str().to_string())
                .unwrap_or_default(),
        ),
        GroupBy::Hour => Some(bucket(event.timestamp, "%Y-%m-%d %H:00:00")),
        GroupBy::Day => Some(bucket(event.timestamp, "%Y-%m-%d 00:00:00")),
    }
}

fn bucket(timestamp: i64, format: &str) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|at| at.format(format).to_string())
        .unwrap_or_default()
}

#[derive(Default)]
struct Tally<'a> {
    total: u64,
    users: HashSet<&'a str>,
}

impl Tally<'_> {
    fn into_row(self, group_key: Option<String>) -> MetricRow {
        MetricRow {
            group_key,
            total_count: self.total,
            unique_users: self.users.len() as u64,
        }
    }
}

#[async_trait]
impl MetricsRepository for MemoryMetricsRepository {
    async fn execute(&self, query: &ParameterizedQuery) -> Result<RowStream, RepositoryError> {
        if let Some(message) = &self.failure {
            return Err(RepositoryError::Unavailable(message.clone()));
        }

        let group_by = query.group_by();
        let mut groups: BTreeMap<Option<String>, Tally<'_>> = BTreeMap::new();

        // An ungrouped aggregate always yields one row, even over nothing.
        if !group_by.is_grouped() {
            groups.insert(None, Tally::default());
        }

        let mut seen = HashSet::new();
        for event in self.events.iter().filter(|e| self.matches(e, query)) {
            if !seen.insert((event.event_name.as_str(), event.user_id.as_str(), event.timestamp)) {
                continue;
            }
            let tally = groups.entry(group_key(event, group_by)).or_default();
            tally.total += 1;
            tally.users.insert(event.user_id.as_str());
        }

        let rows: Vec<Result<MetricRow, RepositoryError>> = groups
            .into_iter()
            .map(|(key, tally)| Ok(tally.into_row(key)))
            .collect();

        Ok(stream::iter(rows).boxed())
    }
}
