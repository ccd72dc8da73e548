use parking_lot::Mutex;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::core::validation::{require, validate_track_batch};
use crate::core::{
    Clock, EventQueue, FlushTimer, IdGenerator, LotusOptions, SystemClock, TrackBatch, TrackEvent,
    TrackEventRecord, UuidGenerator,
};
use crate::error::{ErrorCode, LotusError, Result};
use crate::http::{ApiRequest, HttpClient};
use crate::types::{
    CancelSubscriptionParams, CreateCreditParams, CreateCustomerParams,
    CreateCustomersBatchParams, CreateCustomersBatchResponse, CreateSubscriptionParams, Credit,
    CreditFilterParams, Customer, FeatureAccess, FeatureAccessParams, Invoice,
    InvoiceFilterParams, MetricAccess, MetricAccessParams, Plan, Subscription,
    SubscriptionFilterParams, TrackResponse, UpdateSubscriptionParams,
};

pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const TRACK_PATH: &str = "/api/track/";
pub const CUSTOMERS_PATH: &str = "/api/customers/";
pub const BATCH_CREATE_CUSTOMERS_PATH: &str = "/api/batch_create_customers/";
pub const PLANS_PATH: &str = "/api/plans/";
pub const SUBSCRIPTIONS_PATH: &str = "/api/subscriptions/";
pub const FEATURE_ACCESS_PATH: &str = "/api/customer_feature_access/";
pub const METRIC_ACCESS_PATH: &str = "/api/customer_metric_access/";
pub const INVOICES_PATH: &str = "/api/invoices/";
pub const CREDITS_PATH: &str = "/api/credits/";

/// Percent-encodes an identifier for use as a single path segment.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

struct Inner {
    options: LotusOptions,
    http: HttpClient,
    queue: Mutex<EventQueue>,
    timer: Mutex<FlushTimer>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    /// Cancels the idle timer, then removes the next batch from the queue.
    fn take_batch(&self) -> Option<TrackBatch> {
        self.timer.lock().cancel();
        self.queue.lock().drain_batch()
    }

    async fn flush(&self) -> Result<()> {
        match self.take_batch() {
            Some(batch) => self.send_batch(batch).await,
            None => Ok(()),
        }
    }

    async fn send_batch(&self, batch: TrackBatch) -> Result<()> {
        let events = batch.batch.len();
        let request = ApiRequest::post(TRACK_PATH).json(&batch)?;
        let body = self.http.execute_raw(&request).await?;

        // Any 2xx is a successful flush; the body is only inspected for rejections.
        let response: TrackResponse = serde_json::from_str(&body).unwrap_or_default();
        if response.has_failures() {
            tracing::warn!(
                events,
                failed = ?response.failed_events,
                "Billing API rejected some tracked events"
            );
        }
        tracing::debug!(events, "Flushed usage events");
        Ok(())
    }

    /// Drains one batch and sends it on a background task.
    fn spawn_flush(self: &Arc<Self>, runtime: &Handle) {
        let Some(batch) = self.take_batch() else {
            return;
        };

        let inner = Arc::clone(self);
        let handle = runtime.spawn(async move {
            let events = batch.batch.len();
            if let Err(e) = inner.send_batch(batch).await {
                tracing::warn!(events, "Failed to flush usage events: {}", e);
            }
        });

        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    /// Arms the idle timer unless one is already armed or the timer is disabled.
    fn arm_timer(self: &Arc<Self>, runtime: &Handle) {
        if !self.options.timer_enabled() {
            return;
        }

        let mut timer = self.timer.lock();
        if timer.is_armed() {
            return;
        }

        let generation = timer.next_generation();
        let interval = self.options.flush_interval;
        let weak = Arc::downgrade(self);
        let task_runtime = runtime.clone();

        let handle = runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.timer.lock().release(generation) {
                return;
            }
            tracing::debug!("Idle flush timer fired");
            inner.spawn_flush(&task_runtime);
        });

        timer.arm(generation, handle);
    }
}

/// Client for the Lotus billing API.
///
/// Usage events passed to [`track`](Self::track) are queued and sent in
/// batches of `flush_at`, either as soon as the queue holds that many or
/// after `flush_interval` without a flush. Every other method issues its
/// request immediately. All requests share the same retry policy.
///
/// Cloning is cheap and clones share the queue.
#[derive(Clone)]
pub struct LotusClient {
    inner: Arc<Inner>,
}

impl LotusClient {
    /// Creates a client using the system clock and random UUIDs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the options fail validation, most
    /// notably when the API key is empty.
    pub fn new(options: LotusOptions) -> Result<Self> {
        Self::with_sources(options, Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    /// Creates a client with explicit time and id sources for queued events.
    pub fn with_sources(
        options: LotusOptions,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self> {
        options.validate()?;

        let http = HttpClient::new(&options)?;
        let queue = EventQueue::with_sources(options.flush_at, clock, ids);

        Ok(Self {
            inner: Arc::new(Inner {
                options,
                http,
                queue: Mutex::new(queue),
                timer: Mutex::new(FlushTimer::new()),
                in_flight: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Creates a client from `LOTUS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(LotusOptions::from_env()?)
    }

    pub fn options(&self) -> &LotusOptions {
        &self.inner.options
    }

    // ------------------------------------------------------------------
    // Usage tracking
    // ------------------------------------------------------------------

    /// Queues a usage event.
    ///
    /// Must be called from within a Tokio runtime: reaching `flush_at`
    /// starts a background flush and the idle timer runs as a task.
    ///
    /// # Errors
    ///
    /// Returns a validation error, before anything is queued, if
    /// `event_name` or `customer_id` is empty. A disabled client accepts
    /// everything without validating.
    pub fn track(&self, event: TrackEvent) -> Result<()> {
        self.track_batch(vec![event])
    }

    /// Queues several events. Either all of them are accepted or none are.
    ///
    /// Reaching `flush_at` starts a single background flush of `flush_at`
    /// events, however many were added. A call that adds more than twice
    /// `flush_at` therefore leaves at least `flush_at` events queued until the
    /// next trigger (another `track`, the idle timer, `flush` or `shutdown`).
    pub fn track_batch(&self, events: Vec<TrackEvent>) -> Result<()> {
        if !self.inner.options.enable {
            return Ok(());
        }

        validate_track_batch(&events)?;

        let runtime = Handle::try_current().map_err(|e| {
            LotusError::with_source(
                ErrorCode::NetworkRuntimeUnavailable,
                "track must be called from within a Tokio runtime",
                e,
            )
        })?;

        let should_flush = {
            let mut queue = self.inner.queue.lock();
            for event in events {
                queue.enqueue(event);
            }
            queue.is_full()
        };

        if should_flush {
            self.inner.spawn_flush(&runtime);
        }
        self.inner.arm_timer(&runtime);

        Ok(())
    }

    /// Sends the next batch of up to `flush_at` queued events.
    ///
    /// Resolves once the request settles. The batch is removed from the
    /// queue before sending and is not re-queued if the request fails.
    pub async fn flush(&self) -> Result<()> {
        if !self.inner.options.enable {
            return Ok(());
        }
        self.inner.flush().await
    }

    /// Waits for background flushes started by the size threshold or the timer.
    pub async fn wait_in_flight(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.in_flight.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        tracing::warn!("Background flush panicked: {}", e);
                    }
                }
            }
        }
    }

    /// Cancels the idle timer and sends everything still queued.
    ///
    /// Keeps flushing after a failed batch so one bad request does not
    /// strand the rest; the first error is returned.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.timer.lock().cancel();
        self.wait_in_flight().await;

        if !self.inner.options.enable {
            return Ok(());
        }

        let mut first_error = None;
        while let Some(batch) = self.inner.take_batch() {
            if let Err(e) = self.inner.send_batch(batch).await {
                tracing::warn!("Failed to flush usage events during shutdown: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of events waiting to be flushed.
    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Copy of the queued records, oldest first.
    pub fn pending_events(&self) -> Vec<TrackEventRecord> {
        self.inner.queue.lock().pending()
    }

    /// Whether an idle flush timer is currently armed.
    pub fn has_pending_timer(&self) -> bool {
        self.inner.timer.lock().is_armed()
    }

    // ------------------------------------------------------------------
    // Customers
    // ------------------------------------------------------------------

    pub async fn list_customers(&self) -> Result<Vec<Customer>> {
        self.execute(ApiRequest::get(CUSTOMERS_PATH)).await
    }

    pub async fn get_customer(&self, customer_id: &str) -> Result<Customer> {
        require("customer_id", customer_id)?;
        let path = format!("{}{}/", CUSTOMERS_PATH, encode_segment(customer_id));
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn create_customer(&self, params: &CreateCustomerParams) -> Result<Customer> {
        params.validate()?;
        self.execute(ApiRequest::post(CUSTOMERS_PATH).json(params)?).await
    }

    pub async fn create_customers_batch(
        &self,
        params: &CreateCustomersBatchParams,
    ) -> Result<CreateCustomersBatchResponse> {
        params.validate()?;
        self.execute(ApiRequest::post(BATCH_CREATE_CUSTOMERS_PATH).json(params)?)
            .await
    }

    // ------------------------------------------------------------------
    // Plans
    // ------------------------------------------------------------------

    pub async fn list_plans(&self) -> Result<Vec<Plan>> {
        self.execute(ApiRequest::get(PLANS_PATH)).await
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<Plan> {
        require("plan_id", plan_id)?;
        let path = format!("{}{}/", PLANS_PATH, encode_segment(plan_id));
        self.execute(ApiRequest::get(path)).await
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    pub async fn list_subscriptions(
        &self,
        filter: &SubscriptionFilterParams,
    ) -> Result<Vec<Subscription>> {
        self.execute(ApiRequest::get(SUBSCRIPTIONS_PATH).query(filter)?)
            .await
    }

    pub async fn create_subscription(
        &self,
        params: &CreateSubscriptionParams,
    ) -> Result<Subscription> {
        params.validate()?;
        self.execute(ApiRequest::post(SUBSCRIPTIONS_PATH).json(params)?)
            .await
    }

    pub async fn update_subscription(
        &self,
        params: &UpdateSubscriptionParams,
    ) -> Result<Subscription> {
        params.validate()?;
        let path = format!(
            "{}{}/update/",
            SUBSCRIPTIONS_PATH,
            encode_segment(&params.subscription_id)
        );
        self.execute(ApiRequest::post(path).json(params)?).await
    }

    pub async fn cancel_subscription(
        &self,
        params: &CancelSubscriptionParams,
    ) -> Result<Subscription> {
        params.validate()?;
        let path = format!(
            "{}{}/cancel/",
            SUBSCRIPTIONS_PATH,
            encode_segment(&params.subscription_id)
        );
        self.execute(ApiRequest::post(path).json(params)?).await
    }

    // ------------------------------------------------------------------
    // Access checks
    // ------------------------------------------------------------------

    pub async fn get_customer_feature_access(
        &self,
        params: &FeatureAccessParams,
    ) -> Result<Vec<FeatureAccess>> {
        params.validate()?;
        self.execute(ApiRequest::get(FEATURE_ACCESS_PATH).query(&access_query(
            &params.customer_id,
            "feature_id",
            &params.feature_id,
            &params.subscription_filters,
        ))?)
        .await
    }

    pub async fn get_customer_metric_access(
        &self,
        params: &MetricAccessParams,
    ) -> Result<Vec<MetricAccess>> {
        params.validate()?;
        self.execute(ApiRequest::get(METRIC_ACCESS_PATH).query(&access_query(
            &params.customer_id,
            "metric_id",
            &params.metric_id,
            &params.subscription_filters,
        ))?)
        .await
    }

    // ------------------------------------------------------------------
    // Invoices and credits
    // ------------------------------------------------------------------

    pub async fn list_invoices(&self, filter: &InvoiceFilterParams) -> Result<Vec<Invoice>> {
        self.execute(ApiRequest::get(INVOICES_PATH).query(filter)?)
            .await
    }

    pub async fn list_credits(&self, filter: &CreditFilterParams) -> Result<Vec<Credit>> {
        self.execute(ApiRequest::get(CREDITS_PATH).query(filter)?)
            .await
    }

    pub async fn create_credit(&self, params: &CreateCreditParams) -> Result<Credit> {
        params.validate()?;
        self.execute(ApiRequest::post(CREDITS_PATH).json(params)?).await
    }

    pub async fn void_credit(&self, credit_id: &str) -> Result<Credit> {
        require("credit_id", credit_id)?;
        let path = format!("{}{}/void/", CREDITS_PATH, encode_segment(credit_id));
        self.execute(ApiRequest::new(Method::POST, path)).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.inner.http.execute(&request).await
    }
}

/// Query for the access-check endpoints. Subscription filters are sent as
/// `subscription_filters[<property>]=<value>`.
fn access_query(
    customer_id: &str,
    id_key: &str,
    id: &str,
    filters: &[crate::types::SubscriptionFilter],
) -> Value {
    let mut query = serde_json::Map::new();
    query.insert("customer_id".to_string(), Value::from(customer_id));
    query.insert(id_key.to_string(), Value::from(id));
    for filter in filters {
        query.insert(
            format!("subscription_filters[{}]", filter.property_name),
            Value::from(filter.value.as_str()),
        );
    }
    Value::Object(query)
}

impl std::fmt::Debug for LotusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LotusClient")
            .field("host", &self.inner.http.host())
            .field("queued", &self.queue_len())
            .field("timer_armed", &self.has_pending_timer())
            .finish()
    }
}
