//! Embedded schema migrations.
//!
//! Migrations are SQL templates embedded at compile time. They run in order
//! on start-up and are recorded in `_eventline_migrations`; a migration that
//! is already recorded is skipped. ClickHouse has no transactional DDL, so
//! every statement is written to be idempotent (`IF NOT EXISTS`).

use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const TRACKING_TABLE: &str = "_eventline_migrations";

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_events",
        sql: include_str!("migrations/000_events.sql"),
    },
];

/// Names substituted into the migration templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationContext {
    /// Event table name.
    pub table: String,
}

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: clickhouse::error::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(clickhouse::error::Error),
}

#[derive(Debug, Row, Serialize, Deserialize)]
struct AppliedMigration {
    name: String,
}

/// Fills `{{table}}` in a template.
fn render(template: &str, ctx: &MigrationContext) -> String {
    template.replace("{{table}}", &ctx.table)
}

/// Splits a script into statements. The HTTP interface accepts one
/// statement per request.
fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Runs all pending migrations.
///
/// # Errors
///
/// Returns `MigrationError` if a statement fails or the tracking table
/// cannot be read.
pub async fn run_migrations(client: &Client, ctx: &MigrationContext) -> Result<usize, MigrationError> {
    client
        .query(&format!(
            "CREATE TABLE IF NOT EXISTS {TRACKING_TABLE} (
                name String,
                applied_at DateTime('UTC') DEFAULT now()
            ) ENGINE = MergeTree ORDER BY name"
        ))
        .execute()
        .await
        .map_err(|source| MigrationError::ExecutionFailed {
            name: "_eventline_migrations_bootstrap".to_string(),
            source,
        })?;

    let recorded: Vec<String> = client
        .query(&format!("SELECT name FROM {TRACKING_TABLE}"))
        .fetch_all::<AppliedMigration>()
        .await
        .map_err(MigrationError::StateQuery)?
        .into_iter()
        .map(|row| row.name)
        .collect();

    let mut applied = 0;

    for migration in pending(MIGRATIONS, &recorded) {
        tracing::info!(migration = migration.name, "applying migration");

        let sql = render(migration.sql, ctx);
        for statement in split_statements(&sql) {
            client
                .query(statement)
                .execute()
                .await
                .map_err(|source| MigrationError::ExecutionFailed {
                    name: migration.name.to_string(),
                    source,
                })?;
        }

        client
            .query(&format!("INSERT INTO {TRACKING_TABLE} (name) VALUES (?)"))
            .bind(migration.name)
            .execute()
            .await
            .map_err(|source| MigrationError::ExecutionFailed {
                name: migration.name.to_string(),
                source,
            })?;

        applied += 1;
    }

    Ok(applied)
}

fn pending<'a>(
    migrations: &'a [Migration],
    recorded: &'a [String],
) -> impl Iterator<Item = &'a Migration> + 'a {
    migrations.iter().filter(move |migration| {
        let done = recorded.iter().any(|name| name == migration.name);
        if done {
            tracing::debug!(
                migration = migration.name,
                "migration already applied, skipping"
            );
        }
        !done
    })
}
