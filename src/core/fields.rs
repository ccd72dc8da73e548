//! Field-name mapping between caller-shaped input and the API wire format.
//!
//! Callers coming from JavaScript-flavoured payloads use camelCase keys
//! (`customerId`), the billing API speaks snake_case (`customer_id`). All
//! renames go through [`FIELD_MAP`]; nothing else in the crate hard-codes
//! the alternate spelling.

use serde_json::{Map, Value};

/// One row of the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    /// Caller-side (camelCase) spelling.
    pub sdk: &'static str,
    /// Wire (snake_case) spelling.
    pub wire: &'static str,
}

const fn field(sdk: &'static str, wire: &'static str) -> FieldMapping {
    FieldMapping { sdk, wire }
}

pub const FIELD_MAP: &[FieldMapping] = &[
    field("eventName", "event_name"),
    field("customerId", "customer_id"),
    field("idempotencyId", "idempotency_id"),
    field("timeCreated", "time_created"),
    field("customerName", "customer_name"),
    field("paymentProvider", "payment_provider"),
    field("paymentProviderId", "payment_provider_id"),
    field("behaviorOnExisting", "behavior_on_existing"),
    field("planId", "plan_id"),
    field("subscriptionId", "subscription_id"),
    field("startDate", "start_date"),
    field("endDate", "end_date"),
    field("autoRenew", "auto_renew"),
    field("isNew", "is_new"),
    field("subscriptionFilters", "subscription_filters"),
    field("propertyName", "property_name"),
    field("replacePlanId", "replace_plan_id"),
    field("turnOffAutoRenew", "turn_off_auto_renew"),
    field("billUsage", "bill_usage"),
    field("flatFeeBehavior", "flat_fee_behavior"),
    field("featureId", "feature_id"),
    field("metricId", "metric_id"),
    field("paymentStatus", "payment_status"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToWire,
    ToSdk,
}

/// Wire spelling of a caller-side key, if the table knows it.
pub fn to_wire(sdk: &str) -> Option<&'static str> {
    FIELD_MAP.iter().find(|m| m.sdk == sdk).map(|m| m.wire)
}

/// Caller-side spelling of a wire key, if the table knows it.
pub fn to_sdk(wire: &str) -> Option<&'static str> {
    FIELD_MAP.iter().find(|m| m.wire == wire).map(|m| m.sdk)
}

/// Renames the top-level keys of a JSON object in the given direction.
///
/// Unknown keys pass through unchanged. If both spellings of a key are
/// present, the one already in the target spelling wins. Nested objects such
/// as `properties` are left alone; they belong to the caller.
pub fn translate_keys(object: Map<String, Value>, direction: Direction) -> Map<String, Value> {
    let mut out = Map::with_capacity(object.len());
    let mut renamed = Vec::new();

    for (key, value) in object {
        let target = match direction {
            Direction::ToWire => to_wire(&key),
            Direction::ToSdk => to_sdk(&key),
        };
        match target {
            Some(target) => renamed.push((target.to_string(), value)),
            None => {
                out.insert(key, value);
            }
        }
    }

    for (key, value) in renamed {
        out.entry(key).or_insert(value);
    }
    out
}

/// Applies [`translate_keys`] to an object value; other values are returned as is.
pub fn translate_value(value: Value, direction: Direction) -> Value {
    match value {
        Value::Object(map) => Value::Object(translate_keys(map, direction)),
        other => other,
    }
}
