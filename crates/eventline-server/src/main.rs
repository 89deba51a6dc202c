//! Eventline server binary.
//!
//! Connects to NATS and ClickHouse, applies schema migrations, starts the
//! durable consumer that fills the store, and serves the ingestion and
//! metrics API with graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;

use async_nats::jetstream;
use eventline_db::ClickHouseEventSink;
use eventline_ingest::{IngestionService, JetStreamPublisher, StoreConsumer};
use eventline_metrics::{ClickHouseMetricsRepository, MetricsAggregationService, MetricsQueryBuilder};
use eventline_server::config::{self, Config};
use eventline_server::health::{ClickHouseReadiness, NatsReadiness, ReadinessCheck};
use eventline_server::{app, AppState};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("EVENTLINE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration, the server cannot start without valid config");

    init_tracing(&config);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Broker
    let nats = async_nats::connect(config.broker.url.as_str())
        .await
        .expect("failed to connect to NATS, check broker.url in config");

    let mut jetstream = jetstream::new(nats.clone());
    jetstream.set_timeout(config.broker.ack_timeout());

    let stream = jetstream
        .get_or_create_stream(jetstream::stream::Config {
            name: config.broker.stream.clone(),
            subjects: vec![config.broker.subject.clone()],
            duplicate_window: config.broker.duplicate_window(),
            ..Default::default()
        })
        .await
        .expect("failed to create or look up the JetStream stream");

    tracing::info!(
        stream = %config.broker.stream,
        subject = %config.broker.subject,
        ack_mode = ?config.broker.ack_mode,
        "broker ready"
    );

    // Analytical store
    let store_settings = config.clickhouse.store_settings();
    eventline_db::ensure_database(&store_settings)
        .await
        .expect("failed to create the ClickHouse database, check clickhouse settings in config");

    let clickhouse = eventline_db::create_client(&store_settings);
    let applied = eventline_db::run_migrations(&clickhouse, &config.migration_context())
        .await
        .expect("failed to run ClickHouse migrations");
    if applied > 0 {
        tracing::info!(count = applied, "applied database migrations");
    }

    // Stream to store
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_task = if config.consumer.enabled {
        let sink = ClickHouseEventSink::new(clickhouse.clone(), config.clickhouse.table.clone());
        let consumer = StoreConsumer::create(
            &stream,
            &config.broker.subject,
            Arc::new(sink),
            config.consumer.settings(),
        )
        .await
        .expect("failed to create the JetStream store consumer");
        Some(tokio::spawn(consumer.run(shutdown_rx)))
    } else {
        tracing::info!("store consumer disabled, another instance must fill the store");
        None
    };

    // Services
    let publisher = JetStreamPublisher::new(jetstream, config.broker.subject.clone())
        .with_ack_mode(config.broker.ack_mode);
    let ingestion =
        IngestionService::new(Arc::new(publisher)).with_deadline(config.ingest.publish_deadline());

    let repository = ClickHouseMetricsRepository::new(clickhouse.clone());
    let metrics = MetricsAggregationService::new(Arc::new(repository))
        .with_builder(MetricsQueryBuilder::new(config.clickhouse.table.clone()))
        .with_deadline(config.metrics.query_deadline());

    let readiness: Vec<Arc<dyn ReadinessCheck>> = vec![
        Arc::new(ClickHouseReadiness::new(clickhouse)),
        Arc::new(NatsReadiness::new(nats.clone())),
    ];

    let state = AppState {
        ingestion: Arc::new(ingestion),
        metrics: Arc::new(metrics),
        readiness,
        max_batch_size: config.ingest.max_batch_size,
        max_body_bytes: config.server.max_body_bytes,
    };

    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting eventline server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Some(task) = consumer_task {
        if let Err(e) = task.await {
            tracing::warn!("store consumer task failed: {}", e);
        }
    }

    if let Err(e) = nats.drain().await {
        tracing::warn!("failed to drain NATS client: {}", e);
    }

    tracing::info!("eventline server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
