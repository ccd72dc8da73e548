//! Request parameters and response shapes for the billing API resources.
//!
//! Responses keep the fields the SDK reasons about as typed members and
//! everything else in `extra`, so new server fields never break decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::validation::require;
use crate::error::{LotusError, Result};

// ---------------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateCustomerParams {
    pub customer_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_currency_code: Option<String>,
}

impl CreateCustomerParams {
    pub fn new(customer_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require("customer_id", &self.customer_id)?;
        require("email", &self.email)?;
        if !self.email.contains('@') {
            return Err(LotusError::invalid_value(format!(
                "email is not a valid address: {}",
                self.email
            )));
        }
        Ok(())
    }
}

/// What the server does when a customer in a batch already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorOnExisting {
    #[default]
    Merge,
    Ignore,
    Overwrite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateCustomersBatchParams {
    pub customers: Vec<CreateCustomerParams>,
    pub behavior_on_existing: BehaviorOnExisting,
}

impl CreateCustomersBatchParams {
    pub fn validate(&self) -> Result<()> {
        if self.customers.is_empty() {
            return Err(LotusError::missing_field("customers"));
        }
        self.customers.iter().try_for_each(CreateCustomerParams::validate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub total_amount_due: Option<f64>,
    #[serde(default)]
    pub has_payment_method: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCustomersBatchResponse {
    #[serde(default)]
    pub success: Option<String>,
    #[serde(default)]
    pub failed_customers: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    #[serde(default)]
    pub plan_name: Option<String>,
    #[serde(default)]
    pub plan_duration: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub property_name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionParams {
    pub customer_id: String,
    pub plan_id: String,
    pub start_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_renew: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subscription_filters: Vec<SubscriptionFilter>,
}

impl CreateSubscriptionParams {
    pub fn new(
        customer_id: impl Into<String>,
        plan_id: impl Into<String>,
        start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            plan_id: plan_id.into(),
            start_date,
            ..Default::default()
        }
    }

    pub fn filter(mut self, property_name: impl Into<String>, value: impl Into<String>) -> Self {
        self.subscription_filters.push(SubscriptionFilter {
            property_name: property_name.into(),
            value: value.into(),
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        require("customer_id", &self.customer_id)?;
        require("plan_id", &self.plan_id)?;
        if let Some(end) = self.end_date {
            if end <= self.start_date {
                return Err(LotusError::invalid_value("end_date must be after start_date"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSubscriptionParams {
    #[serde(skip)]
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_off_auto_renew: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

impl UpdateSubscriptionParams {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("subscription_id", &self.subscription_id)?;
        if self.replace_plan_id.is_none()
            && self.turn_off_auto_renew.is_none()
            && self.end_date.is_none()
        {
            return Err(LotusError::invalid_value(
                "update requires replace_plan_id, turn_off_auto_renew or end_date",
            ));
        }
        Ok(())
    }
}

/// How the flat fee of a cancelled subscription is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatFeeBehavior {
    Refund,
    ChargeProrated,
    ChargeFull,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CancelSubscriptionParams {
    #[serde(skip)]
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_usage: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat_fee_behavior: Option<FlatFeeBehavior>,
}

impl CancelSubscriptionParams {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("subscription_id", &self.subscription_id)
    }
}

/// Query filter for listing subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionFilterParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub status: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_renew: Option<bool>,
    #[serde(default)]
    pub is_new: Option<bool>,
    #[serde(default)]
    pub subscription_filters: Vec<SubscriptionFilter>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Access checks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureAccessParams {
    pub customer_id: String,
    pub feature_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subscription_filters: Vec<SubscriptionFilter>,
}

impl FeatureAccessParams {
    pub fn new(customer_id: impl Into<String>, feature_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            feature_id: feature_id.into(),
            subscription_filters: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("customer_id", &self.customer_id)?;
        require("feature_id", &self.feature_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAccessParams {
    pub customer_id: String,
    pub metric_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subscription_filters: Vec<SubscriptionFilter>,
}

impl MetricAccessParams {
    pub fn new(customer_id: impl Into<String>, metric_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            metric_id: metric_id.into(),
            subscription_filters: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("customer_id", &self.customer_id)?;
        require("metric_id", &self.metric_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureAccess {
    #[serde(default)]
    pub feature_name: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    pub access: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentUsage {
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub metric_id: Option<String>,
    #[serde(default)]
    pub metric_usage: f64,
    #[serde(default)]
    pub metric_free_limit: Option<f64>,
    #[serde(default)]
    pub metric_total_limit: Option<f64>,
}

impl ComponentUsage {
    /// Whether usage is still below the total limit. No limit means unlimited.
    pub fn has_remaining(&self) -> bool {
        match self.metric_total_limit {
            Some(limit) => self.metric_usage < limit,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAccess {
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub usage_per_component: Vec<ComponentUsage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetricAccess {
    pub fn has_access(&self) -> bool {
        self.usage_per_component.iter().all(ComponentUsage::has_remaining)
    }
}

// ---------------------------------------------------------------------------
// Invoices and credits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceFilterParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub payment_status: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub cost_due: Option<f64>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditFilterParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub status: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateCreditParams {
    pub customer_id: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_paid: Option<f64>,
}

impl CreateCreditParams {
    pub fn new(customer_id: impl Into<String>, amount: f64) -> Self {
        Self {
            customer_id: customer_id.into(),
            amount,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("customer_id", &self.customer_id)?;
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(LotusError::invalid_value("amount must be a positive number"));
        }
        if let (Some(from), Some(until)) = (self.effective_at, self.expires_at) {
            if until <= from {
                return Err(LotusError::invalid_value(
                    "expires_at must be after effective_at",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub credit_id: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub amount_remaining: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Usage ingestion
// ---------------------------------------------------------------------------

/// Response body of `POST /api/track/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackResponse {
    #[serde(default)]
    pub success: Option<String>,
    #[serde(default)]
    pub failed_events: Option<Map<String, Value>>,
}

impl TrackResponse {
    pub fn has_failures(&self) -> bool {
        self.failed_events.as_ref().is_some_and(|f| !f.is_empty())
    }
}
