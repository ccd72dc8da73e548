//! Event queue for batching usage events.
//!
//! The queue only buffers and drains; deciding *when* to drain (size
//! threshold, idle timer, explicit flush) is the client's job. Records are
//! drained from the front in insertion order, at most `flush_at` at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::core::fields::{translate_value, Direction};
use crate::error::{ErrorCode, LotusError, Result};

/// Property key identifying the SDK that produced an event.
pub const LIBRARY_PROPERTY: &str = "$lib";

/// Value stored under [`LIBRARY_PROPERTY`].
pub const LIBRARY_NAME: &str = "lotus-rust";

/// A usage event as supplied by the caller.
///
/// `idempotency_id` and `time_created` are filled in when the event is
/// queued if the caller leaves them empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackEvent {
    #[serde(default)]
    pub event_name: String,

    #[serde(default)]
    pub customer_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_created: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

impl TrackEvent {
    pub fn new(event_name: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            customer_id: customer_id.into(),
            ..Default::default()
        }
    }

    /// Parses an event from JSON using either camelCase or snake_case keys.
    ///
    /// Missing fields are left empty so that validation, not parsing,
    /// reports which required key is absent.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(translate_value(value, Direction::ToWire)).map_err(|e| {
            LotusError::with_source(
                ErrorCode::ValidationInvalidValue,
                format!("Invalid track event: {}", e),
                e,
            )
        })
    }

    pub fn idempotency_id(mut self, id: impl Into<String>) -> Self {
        self.idempotency_id = Some(id.into());
        self
    }

    pub fn time_created(mut self, at: DateTime<Utc>) -> Self {
        self.time_created = Some(at);
        self
    }

    pub fn properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Add a single property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// A queued event in wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEventRecord {
    pub event_name: String,
    pub customer_id: String,
    pub idempotency_id: String,
    pub time_created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

/// Request body for `POST /api/track/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackBatch {
    pub batch: Vec<TrackEventRecord>,
}

/// FIFO buffer of pending usage records.
pub struct EventQueue {
    records: VecDeque<TrackEventRecord>,
    flush_at: usize,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl EventQueue {
    /// Create a queue using the system clock and UUID v4 ids.
    pub fn new(flush_at: usize) -> Self {
        Self::with_sources(flush_at, Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    pub fn with_sources(flush_at: usize, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            records: VecDeque::new(),
            flush_at: flush_at.max(1),
            clock,
            ids,
        }
    }

    /// Builds the wire record for an event and appends it.
    ///
    /// Missing ids and timestamps are filled from the injected sources and the
    /// library tag is merged into `properties`. Returns the new queue length.
    pub fn enqueue(&mut self, event: TrackEvent) -> usize {
        let record = self.build_record(event);
        self.records.push_back(record);
        self.records.len()
    }

    fn build_record(&self, event: TrackEvent) -> TrackEventRecord {
        let mut properties = event.properties.unwrap_or_default();
        properties.insert(LIBRARY_PROPERTY.to_string(), Value::from(LIBRARY_NAME));

        TrackEventRecord {
            event_name: event.event_name,
            customer_id: event.customer_id,
            idempotency_id: event
                .idempotency_id
                .unwrap_or_else(|| self.ids.next_id()),
            time_created: event.time_created.unwrap_or_else(|| self.clock.now()),
            properties: Some(properties),
        }
    }

    /// Removes up to `flush_at` records from the front.
    ///
    /// Returns `None` when the queue is empty.
    pub fn drain_batch(&mut self) -> Option<TrackBatch> {
        if self.records.is_empty() {
            return None;
        }
        let take = self.flush_at.min(self.records.len());
        let batch: Vec<_> = self.records.drain(..take).collect();
        Some(TrackBatch { batch })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn flush_at(&self) -> usize {
        self.flush_at
    }

    /// Whether the size threshold has been reached.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.flush_at
    }

    /// Copy of the queued records, oldest first.
    pub fn pending(&self) -> Vec<TrackEventRecord> {
        self.records.iter().cloned().collect()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.records.len())
            .field("flush_at", &self.flush_at)
            .finish()
    }
}
