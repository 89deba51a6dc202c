//! Read-side query and result types.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How aggregate rows are split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// A single global aggregate.
    #[default]
    None,
    /// One row per delivery channel.
    Channel,
    /// One row per UTC hour.
    Hour,
    /// One row per UTC day.
    Day,
}

impl GroupBy {
    /// Returns the canonical lowercase label for this grouping.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Channel => "channel",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    /// Whether rows are split by a grouping key.
    pub fn is_grouped(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for GroupBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GroupBy {
    type Err = ValidationError;

    /// Parses a grouping label. An empty string means "not requested".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Self::None),
            "channel" => Ok(Self::Channel),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            _ => Err(ValidationError::UnsupportedGroupBy(s.to_string())),
        }
    }
}

/// A validated metrics request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsQuery {
    pub event_name: String,
    /// Inclusive lower bound, seconds since the Unix epoch.
    pub from: Option<i64>,
    /// Inclusive upper bound, seconds since the Unix epoch.
    pub to: Option<i64>,
    pub group_by: GroupBy,
}

impl MetricsQuery {
    /// Creates an ungrouped, unbounded query for `event_name`.
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            from: None,
            to: None,
            group_by: GroupBy::None,
        }
    }

    /// Builds a query from raw request values.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` for a blank `event_name` and
    /// `ValidationError::UnsupportedGroupBy` for any grouping label outside
    /// the closed set.
    pub fn parse(
        event_name: &str,
        from: Option<i64>,
        to: Option<i64>,
        group_by: Option<&str>,
    ) -> Result<Self, ValidationError> {
        if event_name.trim().is_empty() {
            return Err(ValidationError::MissingField("event_name"));
        }
        let group_by = match group_by {
            Some(label) => label.parse()?,
            None => GroupBy::None,
        };
        Ok(Self {
            event_name: event_name.to_string(),
            from,
            to,
            group_by,
        })
    }

    pub fn with_range(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }
}

/// A raw aggregate row as produced by the analytical store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRow {
    /// Present only when grouping was requested.
    pub group_key: Option<String>,
    pub total_count: u64,
    pub unique_users: u64,
}

/// One bucket of a grouped breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetric {
    pub group: String,
    pub total_events: u64,
    pub unique_users: u64,
}

/// A shaped metrics result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metric {
    /// Totals for an ungrouped query.
    Summary { total_events: u64, unique_users: u64 },
    /// Per-group totals, ascending by group key.
    Breakdown(Vec<GroupMetric>),
}
