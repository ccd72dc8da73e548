//! Synchronous precondition checks run before anything is queued or sent.

use crate::core::event_queue::TrackEvent;
use crate::error::{ErrorCode, LotusError, Result};

/// Fails with `"<field> is a required key"` when `value` is empty or blank.
pub fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LotusError::missing_field(field));
    }
    Ok(())
}

pub fn validate_track_event(event: &TrackEvent) -> Result<()> {
    require("customer_id", &event.customer_id)?;
    require("event_name", &event.event_name)?;
    if let Some(ref id) = event.idempotency_id {
        if id.trim().is_empty() {
            return Err(LotusError::invalid_value(
                "idempotency_id must not be blank when provided",
            ));
        }
    }
    Ok(())
}

/// Validates every event of a batch; the first failure wins and nothing is accepted.
pub fn validate_track_batch(events: &[TrackEvent]) -> Result<()> {
    if events.is_empty() {
        return Err(LotusError::new(
            ErrorCode::ValidationEmptyBatch,
            "batch must contain at least one event",
        ));
    }
    events.iter().try_for_each(validate_track_event)
}
