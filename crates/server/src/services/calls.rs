//! The order-call state machine.
//!
//! An order carries two independent axes: the business disposition
//! (`status`) and the telephony disposition (`call_status`). Every event that
//! moves either axis goes through [`CallWorkflow`]:
//!
//! | Event | Effect |
//! |---|---|
//! | order ingested | new order `pending`/`not_called`, idempotent on the Shopify id |
//! | initiate call | compare-and-set to `calling`, dial, then `calling` or `failed` |
//! | menu input 1/0/2 | `confirmed`/`cancelled`/`support` |
//! | invalid input | nothing, caller is re-prompted |
//! | provider status callback | `completed`/`failed` for the current call only |
//! | agent override | any [`OrderStatus`] |
//! | Shopify cancellation | `cancelled` |
//!
//! Failed calls on unresolved orders are redialed through the durable
//! [`RetryQueue`](crate::db::RetryQueue), capped by the store's
//! `retryAttempts`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use voice_confirm_core::{
    CallHistoryEntry, CallStatus, MenuChoice, OrderId, OrderStatus, StoreId, VoiceSettings,
};

use crate::db::{Repositories, RepositoryError};
use crate::models::{NewOrder, Order, OrderUpdate};
use crate::services::telephony::{CallPlacement, ProviderCallStatus, Telephony, TelephonyError};

/// Errors surfaced by workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("order not found")]
    OrderNotFound,

    /// A call for this order is already in flight.
    #[error("call already in progress")]
    CallInProgress,

    /// The order has never been dialed.
    #[error("no call initiated for this order")]
    NoCall,

    /// The provider does not know the order's call.
    #[error("call not found")]
    CallNotFound,

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Telephony(#[from] TelephonyError),
}

/// Result of ingesting an order.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub order: Order,
    /// `false` when the order already existed (duplicate delivery)
    pub created: bool,
}

/// Result of a call attempt.
#[derive(Debug, Clone)]
pub struct CallAttempt {
    pub order: Order,
    pub placement: CallPlacement,
}

/// Drives order state in response to webhooks, callbacks and agent actions.
///
/// Holds only borrowed handles; construct one per request with
/// [`crate::AppState::workflow`].
pub struct CallWorkflow<'a> {
    repos: &'a Repositories,
    telephony: &'a dyn Telephony,
}

impl<'a> CallWorkflow<'a> {
    #[must_use]
    pub const fn new(repos: &'a Repositories, telephony: &'a dyn Telephony) -> Self {
        Self { repos, telephony }
    }

    /// Store the order unless the store already has one with this Shopify id.
    ///
    /// Safe under concurrent duplicate deliveries: a lost insert race
    /// returns the winner's order.
    ///
    /// # Errors
    ///
    /// Repository failures.
    #[instrument(skip(self, order), fields(store_id = %order.store_id, shopify_order_id = %order.shopify_order_id))]
    pub async fn ingest(&self, order: NewOrder) -> Result<Ingested, WorkflowError> {
        let store_id = order.store_id;
        let external_id = order.shopify_order_id.clone();

        if let Some(existing) = self
            .repos
            .orders
            .get_by_external_id(store_id, &external_id)
            .await?
        {
            debug!(order_id = %existing.id, "Duplicate order delivery");
            return Ok(Ingested {
                order: existing,
                created: false,
            });
        }

        match self.repos.orders.create(order).await {
            Ok(order) => {
                info!(order_id = %order.id, order_number = %order.order_number, "Order created");
                Ok(Ingested {
                    order,
                    created: true,
                })
            }
            Err(RepositoryError::Conflict(_)) => {
                let existing = self
                    .repos
                    .orders
                    .get_by_external_id(store_id, &external_id)
                    .await?
                    .ok_or(WorkflowError::OrderNotFound)?;
                Ok(Ingested {
                    order: existing,
                    created: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Dial the customer.
    ///
    /// Placement failures are recorded on the order (`call_status = failed`
    /// plus a history entry carrying the provider error) and may schedule a
    /// redial; they are not returned as errors. Once `calling` is taken the
    /// order always ends up with a recorded outcome, even when the write
    /// after placement fails.
    ///
    /// # Errors
    ///
    /// `CallInProgress` if the order is already `calling`, `OrderNotFound`
    /// if it does not exist.
    #[instrument(skip(self))]
    pub async fn initiate_call(&self, id: OrderId) -> Result<CallAttempt, WorkflowError> {
        // A manual call supersedes any pending redial
        self.repos.retries.cancel(id).await?;

        let order = self
            .repos
            .orders
            .try_begin_call(id)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => WorkflowError::CallInProgress,
                RepositoryError::NotFound => WorkflowError::OrderNotFound,
                other => WorkflowError::Repository(other),
            })?;

        let placement = self
            .telephony
            .place_call(&order.customer_phone, &order.order_number)
            .await;
        let call_status = placement.call_status();

        let mut entry = CallHistoryEntry::new(placement.timestamp, call_status);
        if let Some(error) = &placement.error {
            entry = entry.with_response(error.clone());
        }

        let recorded = self
            .repos
            .orders
            .update(
                id,
                OrderUpdate {
                    call_status: Some(call_status),
                    last_call_at: Some(placement.timestamp),
                    call_sid: placement.call_sid.clone(),
                    append_history: Some(entry),
                    ..OrderUpdate::default()
                },
            )
            .await;
        let order = match recorded {
            Ok(order) => order,
            Err(e) => {
                self.release_call(id, &placement, &e).await;
                return Err(e.into());
            }
        };

        if call_status == CallStatus::Failed {
            warn!(
                order_id = %id,
                error = placement.error.as_deref().unwrap_or("unknown"),
                "Call placement failed"
            );
            if let Err(e) = self.schedule_retry(&order).await {
                warn!(order_id = %id, error = %e, "Redial not scheduled");
            }
        } else {
            info!(order_id = %id, call_sid = ?placement.call_sid, "Call placed");
        }

        Ok(CallAttempt { order, placement })
    }

    /// Best-effort move out of `calling` after the placement outcome could
    /// not be stored.
    async fn release_call(&self, id: OrderId, placement: &CallPlacement, cause: &RepositoryError) {
        error!(order_id = %id, call_sid = ?placement.call_sid, error = %cause, "Call outcome not recorded");
        let entry = CallHistoryEntry::new(Utc::now(), CallStatus::Failed)
            .with_response(format!("outcome not recorded: {cause}"));
        let released = self
            .repos
            .orders
            .update(
                id,
                OrderUpdate {
                    call_status: Some(CallStatus::Failed),
                    last_call_at: Some(placement.timestamp),
                    append_history: Some(entry),
                    ..OrderUpdate::default()
                },
            )
            .await;
        if let Err(e) = released {
            error!(order_id = %id, error = %e, "Order left in calling state");
        }
    }

    /// Queue a redial for a failed, unresolved order.
    ///
    /// Returns the due time, or `None` when the order is resolved or has
    /// used up its `retryAttempts`.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn schedule_retry(
        &self,
        order: &Order,
    ) -> Result<Option<DateTime<Utc>>, WorkflowError> {
        if order.status.is_resolved() || order.call_status != CallStatus::Failed {
            return Ok(None);
        }

        let settings = self.voice_settings(order.store_id).await?;
        let failed = u32::try_from(order.failed_attempts()).unwrap_or(u32::MAX);
        if failed > settings.retry_attempts {
            info!(order_id = %order.id, failed, "Redial attempts exhausted");
            return Ok(None);
        }

        let due_at = Utc::now() + chrono::Duration::seconds(i64::from(settings.retry_delay));
        self.repos.retries.schedule(order.id, due_at).await?;
        info!(order_id = %order.id, %due_at, attempt = failed, "Redial scheduled");
        Ok(Some(due_at))
    }

    /// Voice settings of the owning store, or defaults when it is gone.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn voice_settings(
        &self,
        store_id: Option<StoreId>,
    ) -> Result<VoiceSettings, WorkflowError> {
        let Some(store_id) = store_id else {
            return Ok(VoiceSettings::default());
        };
        Ok(self
            .repos
            .stores
            .get(store_id)
            .await?
            .map(|store| store.voice_settings)
            .unwrap_or_default())
    }

    /// The order a provider callback is about.
    ///
    /// Order numbers repeat across shops, so the call id decides when the
    /// provider sends one. The number alone is used only when there is no
    /// id, or when the id is not stored yet because the callback overtook
    /// the write after placement.
    ///
    /// # Errors
    ///
    /// Repository failures.
    pub async fn callback_order(
        &self,
        order_number: &str,
        call_sid: Option<&str>,
    ) -> Result<Option<Order>, WorkflowError> {
        if let Some(call_sid) = call_sid
            && let Some(order) = self.repos.orders.get_by_call_sid(call_sid).await?
        {
            if order.order_number == order_number {
                return Ok(Some(order));
            }
            warn!(call_sid, order_id = %order.id, "Callback names another order's call");
            return Ok(None);
        }

        let order = self.repos.orders.get_by_number(order_number).await?;
        Ok(order.filter(|o| call_sid.is_none() || o.call_sid.is_none()))
    }

    /// Apply a keypad press to the order the call belongs to.
    ///
    /// The order is re-read here; nothing from call placement is assumed.
    /// Invalid input (including a timeout without digits) changes nothing
    /// but the history.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` if no order matches the callback.
    #[instrument(skip(self))]
    pub async fn apply_menu_input(
        &self,
        order_number: &str,
        call_sid: Option<&str>,
        digits: Option<&str>,
    ) -> Result<(Order, MenuChoice), WorkflowError> {
        let order = self
            .callback_order(order_number, call_sid)
            .await?
            .ok_or(WorkflowError::OrderNotFound)?;

        let choice = MenuChoice::from_digits(digits);
        let entry = CallHistoryEntry::new(Utc::now(), order.call_status)
            .with_response(choice.as_str());

        let order = self
            .repos
            .orders
            .update(
                order.id,
                OrderUpdate {
                    status: choice.resulting_status(),
                    append_history: Some(entry),
                    ..OrderUpdate::default()
                },
            )
            .await?;

        if order.status.is_resolved() {
            self.repos.retries.cancel(order.id).await?;
        }
        info!(order_id = %order.id, choice = choice.as_str(), status = %order.status, "Menu input applied");
        Ok((order, choice))
    }

    /// Agent override of the business status.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` if the order does not exist.
    #[instrument(skip(self))]
    pub async fn override_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, WorkflowError> {
        let order = self
            .repos
            .orders
            .update(id, OrderUpdate::status(status))
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => WorkflowError::OrderNotFound,
                other => WorkflowError::Repository(other),
            })?;

        if status.is_resolved() {
            self.repos.retries.cancel(id).await?;
        }
        Ok(order)
    }

    /// Ask the provider about the order's latest call. Never mutates state.
    ///
    /// # Errors
    ///
    /// `NoCall` if the order was never dialed successfully, `CallNotFound`
    /// if the provider has no record.
    pub async fn call_status(&self, order: &Order) -> Result<ProviderCallStatus, WorkflowError> {
        let call_sid = order.call_sid.as_deref().ok_or(WorkflowError::NoCall)?;
        self.telephony
            .fetch_call_status(call_sid)
            .await
            .map_err(|e| match e {
                TelephonyError::NotFound => WorkflowError::CallNotFound,
                other => WorkflowError::Telephony(other),
            })
    }

    /// Record a provider status callback.
    ///
    /// Only terminal statuses for the order's current call apply; anything
    /// else (progress events, a superseded call, a duplicate delivery) is
    /// ignored and returns `None`.
    ///
    /// # Errors
    ///
    /// Repository failures.
    #[instrument(skip(self))]
    pub async fn record_call_result(
        &self,
        order_number: &str,
        call_sid: &str,
        provider_status: &str,
        duration: Option<u32>,
    ) -> Result<Option<Order>, WorkflowError> {
        let call_status = CallStatus::from_provider(provider_status);
        if !call_status.is_terminal() {
            return Ok(None);
        }

        let Some(order) = self.callback_order(order_number, Some(call_sid)).await? else {
            debug!("Status callback for unknown order");
            return Ok(None);
        };

        let mut entry = CallHistoryEntry::new(Utc::now(), call_status).with_duration(duration);
        if call_status == CallStatus::Failed {
            entry = entry.with_response(provider_status.to_ascii_lowercase());
        }

        let Some(order) = self
            .repos
            .orders
            .finish_call(order.id, call_sid, call_status, entry)
            .await?
        else {
            debug!("Stale status callback ignored");
            return Ok(None);
        };

        match call_status {
            CallStatus::Failed => {
                self.schedule_retry(&order).await?;
            }
            _ => {
                self.repos.retries.cancel(order.id).await?;
            }
        }
        info!(order_id = %order.id, call_status = %order.call_status, "Call finished");
        Ok(Some(order))
    }

    /// Shopify reported the order cancelled.
    ///
    /// # Errors
    ///
    /// Repository failures.
    #[instrument(skip(self))]
    pub async fn cancel_from_platform(
        &self,
        store_id: StoreId,
        shopify_order_id: &str,
    ) -> Result<Option<Order>, WorkflowError> {
        let Some(order) = self
            .repos
            .orders
            .get_by_external_id(store_id, shopify_order_id)
            .await?
        else {
            return Ok(None);
        };
        if order.status == OrderStatus::Cancelled {
            return Ok(Some(order));
        }
        self.override_status(order.id, OrderStatus::Cancelled)
            .await
            .map(Some)
    }

    /// Redial every order whose retry is due. Returns how many calls were
    /// attempted.
    ///
    /// # Errors
    ///
    /// Only a failure to claim due tasks; per-order failures are logged.
    pub async fn run_due_retries(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<usize, WorkflowError> {
        let due = self.repos.retries.take_due(now, limit).await?;
        let mut attempted = 0;

        for id in due {
            match self.repos.orders.get(id).await {
                Ok(Some(order)) if !order.status.is_resolved() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(order_id = %id, error = %e, "Failed to load order for redial");
                    continue;
                }
            }

            match self.initiate_call(id).await {
                Ok(_) => attempted += 1,
                Err(WorkflowError::CallInProgress) => {
                    debug!(order_id = %id, "Redial skipped, call already in progress");
                }
                Err(e) => warn!(order_id = %id, error = %e, "Redial failed"),
            }
        }
        Ok(attempted)
    }
}
