//! Writes consumed broker messages into the event table.

use async_trait::async_trait;
use clickhouse::{Client, Row};
use eventline_ingest::{EventSink, SinkError, WireMessage};
use serde::Serialize;

/// One event table row. `ingested_at` is left to its column default.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize)]
pub struct EventRow {
    pub event_hash: u64,
    pub event_name: String,
    pub channel: String,
    pub campaign_id: String,
    pub user_id: String,
    /// `DateTime` is seconds since the epoch as an unsigned 32-bit value.
    pub timestamp: u32,
    pub tags: Vec<String>,
    pub metadata: String,
}

impl EventRow {
    /// Converts a wire message. Absent channel and campaign become empty
    /// strings. Returns `None` when the timestamp falls outside the range
    /// a `DateTime` column can hold.
    pub fn from_message(message: &WireMessage) -> Option<Self> {
        let timestamp = u32::try_from(message.timestamp).ok()?;

        Some(Self {
            event_hash: message.event_hash,
            event_name: message.event_name.clone(),
            channel: message
                .channel
                .map(|channel| channel.as_str().to_string())
                .unwrap_or_default(),
            campaign_id: message.campaign_id.clone().unwrap_or_default(),
            user_id: message.user_id.clone(),
            timestamp,
            tags: message.tags.clone(),
            metadata: message.metadata.clone(),
        })
    }
}

fn sink_error(error: clickhouse::error::Error) -> SinkError {
    match error {
        clickhouse::error::Error::Network(_) => SinkError::Unavailable(error.to_string()),
        other => SinkError::Rejected(other.to_string()),
    }
}

/// [`EventSink`] that inserts into a ClickHouse table with one `INSERT` per
/// batch.
#[derive(Clone)]
pub struct ClickHouseEventSink {
    client: Client,
    table: String,
}

impl ClickHouseEventSink {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl EventSink for ClickHouseEventSink {
    async fn write(&self, messages: &[WireMessage]) -> Result<(), SinkError> {
        let mut rows = Vec::with_capacity(messages.len());
        for message in messages {
            match EventRow::from_message(message) {
                Some(row) => rows.push(row),
                None => tracing::warn!(
                    event_hash = message.event_hash,
                    timestamp = message.timestamp,
                    "timestamp outside the storable range, dropping event"
                ),
            }
        }

        if rows.is_empty() {
            return Ok(());
        }

        let mut insert = self.client.insert::<EventRow>(&self.table).map_err(sink_error)?;
        for row in &rows {
            insert.write(row).await.map_err(sink_error)?;
        }
        insert.end().await.map_err(sink_error)?;

        tracing::debug!(count = rows.len(), table = %self.table, "inserted events");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventline_types::Channel;

    fn message(timestamp: i64) -> WireMessage {
        WireMessage {
            event_hash: 42,
            event_name: "signup".to_string(),
            channel: None,
            campaign_id: None,
            user_id: "u1".to_string(),
            timestamp,
            tags: vec!["organic".to_string()],
            metadata: "{}".to_string(),
        }
    }

    #[test]
    fn absent_optionals_become_empty_strings() {
        let row = EventRow::from_message(&message(1_700_000_000)).unwrap();
        assert_eq!(row.channel, "");
        assert_eq!(row.campaign_id, "");
        assert_eq!(row.timestamp, 1_700_000_000);
        assert_eq!(row.tags, vec!["organic"]);
        assert_eq!(row.metadata, "{}");
    }

    #[test]
    fn channel_is_stored_by_label() {
        let mut message = message(1);
        message.channel = Some(Channel::Mobile);
        message.campaign_id = Some("spring".to_string());
        let row = EventRow::from_message(&message).unwrap();
        assert_eq!(row.channel, "mobile");
        assert_eq!(row.campaign_id, "spring");
    }

    #[test]
    fn timestamps_outside_datetime_range_are_not_storable() {
        assert!(EventRow::from_message(&message(-5)).is_none());
        assert!(EventRow::from_message(&message(i64::from(u32::MAX) + 1)).is_none());
        assert!(EventRow::from_message(&message(i64::from(u32::MAX))).is_some());
    }

    #[tokio::test]
    async fn batch_of_unstorable_events_needs_no_insert() {
        // The client points nowhere; an insert attempt would fail.
        let sink = ClickHouseEventSink::new(Client::default().with_url("http://127.0.0.1:1"), "events");
        assert!(sink.write(&[message(-1)]).await.is_ok());
    }
}
