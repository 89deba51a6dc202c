//! Analytical store plumbing for Eventline.
//!
//! Builds the ClickHouse client from configuration, applies the embedded
//! schema migrations on start-up, and provides the sink the broker consumer
//! writes through. Query construction lives in `eventline-metrics`.
//!
//! # Design decisions
//!
//! - **HTTP client, no pool management**: the `clickhouse` client keeps its
//!   own keep-alive connections; cloning it is cheap and shares them.
//! - **Embedded migrations**: SQL files are compiled in with `include_str!`
//!   and tracked in `_eventline_migrations`, so the schema ships with the
//!   binary that queries it.
//! - **Broker-fed ingestion**: the event table is filled by the durable
//!   JetStream consumer through [`ClickHouseEventSink`], not by the HTTP
//!   service. Redelivered rows share an ordering key and collapse in the
//!   `ReplacingMergeTree`; readers query with `FINAL`.

mod client;
mod migrations;
mod sink;

pub use client::{create_client, ensure_database, ping, StoreSettings};
pub use migrations::{run_migrations, MigrationContext, MigrationError};
pub use sink::{ClickHouseEventSink, EventRow};
