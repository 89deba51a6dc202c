//! Parameterized aggregate query construction.
//!
//! The SQL text is assembled only from constants and the configured table
//! name. Request values become named server-side parameters
//! (`{name:Type}` placeholders), so they never appear in the query text.

use eventline_types::{GroupBy, MetricsQuery};

/// Placeholder name for the event name filter.
pub const EVENT_NAME_PARAM: &str = "eventName";
/// Placeholder name for the inclusive lower time bound.
pub const START_TIME_PARAM: &str = "startTime";
/// Placeholder name for the inclusive upper time bound.
pub const END_TIME_PARAM: &str = "endTime";

const DEFAULT_TABLE: &str = "events";

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    String(String),
    /// Seconds since the Unix epoch, compared against a `DateTime` column.
    DateTime(i64),
}

impl ParamValue {
    /// The ClickHouse type named in the placeholder.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
        }
    }
}

/// A named parameter bound to a placeholder in the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    pub name: &'static str,
    pub value: ParamValue,
}

impl QueryParam {
    fn placeholder(&self) -> String {
        format!("{{{}:{}}}", self.name, self.value.type_name())
    }
}

/// Query text plus the parameters it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterizedQuery {
    sql: String,
    params: Vec<QueryParam>,
    group_by: GroupBy,
}

impl ParameterizedQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }

    /// Looks up a bound value by placeholder name.
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .map(|param| &param.value)
    }

    /// The grouping the query was built for. Grouped queries project `group_key`.
    pub fn group_by(&self) -> GroupBy {
        self.group_by
    }
}

/// Maps a grouping tag to its fixed SQL expression.
fn grouping_expression(group_by: GroupBy) -> Option<&'static str> {
    match group_by {
        GroupBy::None => None,
        GroupBy::Channel => Some("channel"),
        GroupBy::Hour => Some("toString(toStartOfHour(timestamp))"),
        GroupBy::Day => Some("toString(toStartOfDay(timestamp))"),
    }
}

/// Builds aggregate queries against one events table.
#[derive(Debug, Clone)]
pub struct MetricsQueryBuilder {
    table: String,
}

impl Default for MetricsQueryBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}

impl MetricsQueryBuilder {
    /// Creates a builder for `table`. The name comes from operator
    /// configuration and is written into the query text as-is.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Translates `query` into SQL.
    ///
    /// Ungrouped queries have no `GROUP BY` and yield exactly one row.
    /// Grouped queries project `group_key` and are ordered by it, ascending.
    /// The table is read with `FINAL` so rows sharing an event identity are
    /// collapsed before counting, whatever the merge state of its parts.
    pub fn build(&self, query: &MetricsQuery) -> ParameterizedQuery {
        let mut params = vec![QueryParam {
            name: EVENT_NAME_PARAM,
            value: ParamValue::String(query.event_name.clone()),
        }];
        let mut clauses = vec![format!("event_name = {}", params[0].placeholder())];

        if let Some(from) = query.from {
            let param = QueryParam {
                name: START_TIME_PARAM,
                value: ParamValue::DateTime(from),
            };
            clauses.push(format!("timestamp >= {}", param.placeholder()));
            params.push(param);
        }

        if let Some(to) = query.to {
            let param = QueryParam {
                name: END_TIME_PARAM,
                value: ParamValue::DateTime(to),
            };
            clauses.push(format!("timestamp <= {}", param.placeholder()));
            params.push(param);
        }

        let group_expr = grouping_expression(query.group_by);

        let mut projection = Vec::with_capacity(3);
        if let Some(expr) = group_expr {
            projection.push(format!("{expr} AS group_key"));
        }
        projection.push("count() AS total_count".to_string());
        projection.push("uniq(user_id) AS unique_users".to_string());

        let mut sql = format!(
            "SELECT {}\nFROM {} FINAL\nWHERE {}",
            projection.join(", "),
            self.table,
            clauses.join(" AND ")
        );

        if let Some(expr) = group_expr {
            sql.push_str(&format!("\nGROUP BY {expr}\nORDER BY {expr} ASC"));
        }

        ParameterizedQuery {
            sql,
            params,
            group_by: query.group_by,
        }
    }
}
