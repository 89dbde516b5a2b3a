//! Message lifecycle engine.
//!
//! The only component that transitions a message out of `pending` or
//! `scheduled`. Orchestrates provider lookup, invokes delivery, interprets
//! the result, updates the store, and records the audit trail.
//!
//! Failure policy: a provider failure during a send attempt is persisted as a
//! `failed` status plus an audit row *before* the error is re-raised or
//! logged — persistence must not mask the failure signal, but must still
//! leave an auditable trail. Failure is terminal per message; the engine
//! never retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info};

use crate::providers::registry::ProviderRegistry;
use crate::providers::{DeliveryReceipt, ProviderError, SmsProvider};
use crate::store::{Message, MessageStatus, MessageStore, NewMessage, StoreError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The named provider is not registered — a caller error, never retried.
    #[error("provider {name:?} is not configured")]
    UnknownProvider {
        /// The unrecognised provider name.
        name: String,
    },

    /// The backend rejected the request. Already recorded as a failed message
    /// by the time the caller sees this.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Persistence failed. Propagated uncaught, no automatic retry.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Tally of one drain pass over the due-message snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Messages delivered and marked `sent`.
    pub sent: usize,
    /// Messages whose delivery attempt failed and were marked `failed`.
    pub failed: usize,
    /// Messages skipped because their provider is not registered; their
    /// status is left untouched so they are retried once it is.
    pub skipped: usize,
}

/// Dispatches messages through registered providers and records every
/// lifecycle transition in the store.
///
/// The registry is read-only after construction; the store is the only shared
/// mutable state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    store: MessageStore,
}

impl Dispatcher {
    /// Create a dispatcher over a populated registry and an opened store.
    pub fn new(registry: Arc<ProviderRegistry>, store: MessageStore) -> Self {
        Self { registry, store }
    }

    /// Send a message immediately.
    ///
    /// Creates a `pending` row, attempts delivery, and records the terminal
    /// outcome. On provider failure the message is marked `failed` with an
    /// audit row, then the original error is re-raised so the caller observes
    /// it even though the store already did.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownProvider`] before any row is created
    /// when the name is unregistered; otherwise provider and storage failures
    /// propagate.
    pub async fn send_now(
        &self,
        provider_name: &str,
        recipient: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, DispatchError> {
        let provider = self.resolve(provider_name)?;

        let message_id = self
            .store
            .create_message(NewMessage {
                recipient,
                body,
                provider: provider_name,
                status: MessageStatus::Pending,
                scheduled_at: None,
                contact_id: None,
            })
            .await?;

        match self.attempt(provider.as_ref(), message_id, recipient, body).await {
            Ok(receipt) => {
                info!(message_id, provider = provider_name, recipient, "message sent");
                Ok(receipt)
            }
            Err(err) => {
                error!(
                    message_id,
                    provider = provider_name,
                    recipient,
                    error = %err,
                    "send failed"
                );
                Err(err)
            }
        }
    }

    /// Schedule a message for deferred delivery.
    ///
    /// Validates the provider is registered, inserts a `scheduled` row, and
    /// returns its id. No delivery is attempted here. A `when` in the past is
    /// not an error — the message is simply due on the next drain pass.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownProvider`] for an unregistered name,
    /// [`DispatchError::Store`] on persistence failure.
    pub async fn schedule_for(
        &self,
        provider_name: &str,
        recipient: &str,
        body: &str,
        when: DateTime<Utc>,
    ) -> Result<i64, DispatchError> {
        self.resolve(provider_name)?;

        let message_id = self
            .store
            .create_message(NewMessage {
                recipient,
                body,
                provider: provider_name,
                status: MessageStatus::Scheduled,
                scheduled_at: Some(when),
                contact_id: None,
            })
            .await?;

        info!(message_id, provider = provider_name, %when, "message scheduled");
        Ok(message_id)
    }

    /// Process every message that is currently due.
    ///
    /// Each message in the snapshot is handled independently: one failure
    /// never aborts the rest of the pass. A message whose provider is
    /// unregistered at drain time is skipped without a status change or audit
    /// row — a recoverable condition, since the provider may be registered
    /// later.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Store`] only when the due snapshot itself
    /// cannot be fetched; per-message failures are recorded and logged.
    pub async fn drain_due(&self) -> Result<DrainOutcome, DispatchError> {
        let due = self.store.due_messages().await?;
        let mut outcome = DrainOutcome::default();

        for message in due {
            let Some(provider) = self.registry.get(&message.provider) else {
                error!(
                    message_id = message.id,
                    provider = %message.provider,
                    "provider not configured, skipping message"
                );
                outcome.skipped = outcome.skipped.saturating_add(1);
                continue;
            };

            match self.drain_one(provider.as_ref(), &message).await {
                Ok(()) => outcome.sent = outcome.sent.saturating_add(1),
                Err(err) => {
                    error!(
                        message_id = message.id,
                        provider = %message.provider,
                        error = %err,
                        "scheduled delivery failed"
                    );
                    outcome.failed = outcome.failed.saturating_add(1);
                }
            }
        }

        info!(
            sent = outcome.sent,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "drain pass complete"
        );
        Ok(outcome)
    }

    /// Query the account balance for a registered provider.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownProvider`] for an unregistered name,
    /// otherwise passes the backend result through.
    pub async fn balance(&self, provider_name: &str) -> Result<f64, DispatchError> {
        let provider = self.resolve(provider_name)?;
        Ok(provider.balance().await?)
    }

    /// Query delivery status for a previously sent message.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownProvider`] for an unregistered name,
    /// otherwise passes the backend result through.
    pub async fn delivery_status(
        &self,
        provider_name: &str,
        provider_message_id: &str,
    ) -> Result<Value, DispatchError> {
        let provider = self.resolve(provider_name)?;
        Ok(provider.delivery_status(provider_message_id).await?)
    }

    /// Returns the underlying store for inspection reads.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Returns the provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn SmsProvider>, DispatchError> {
        self.registry
            .get(name)
            .ok_or_else(|| DispatchError::UnknownProvider {
                name: name.to_owned(),
            })
    }

    /// One delivery attempt for an already persisted message.
    ///
    /// Success marks the row `sent` (stamping `sent_at` and the backend id in
    /// one statement) and appends a `sent` audit row with the raw response.
    /// Provider failure marks the row `failed`, appends a `failed` audit row
    /// with the error text, then re-raises the original error.
    async fn attempt(
        &self,
        provider: &dyn SmsProvider,
        message_id: i64,
        recipient: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, DispatchError> {
        match provider.send(recipient, body).await {
            Ok(receipt) => {
                self.store
                    .update_status(
                        message_id,
                        MessageStatus::Sent,
                        Some(&receipt.provider_message_id),
                    )
                    .await?;
                self.store
                    .append_audit(message_id, MessageStatus::Sent, &receipt.raw.to_string())
                    .await?;
                Ok(receipt)
            }
            Err(provider_err) => {
                // Record the terminal outcome before surfacing the error. A
                // storage failure here is logged, not returned — the caller
                // must still see the original delivery failure.
                if let Err(store_err) = self
                    .store
                    .update_status(message_id, MessageStatus::Failed, None)
                    .await
                {
                    error!(message_id, error = %store_err, "failed to record failed status");
                }
                if let Err(store_err) = self
                    .store
                    .append_audit(message_id, MessageStatus::Failed, &provider_err.to_string())
                    .await
                {
                    error!(message_id, error = %store_err, "failed to append failure audit row");
                }
                Err(provider_err.into())
            }
        }
    }

    async fn drain_one(
        &self,
        provider: &dyn SmsProvider,
        message: &Message,
    ) -> Result<(), DispatchError> {
        self.attempt(provider, message.id, &message.recipient, &message.body)
            .await?;
        info!(
            message_id = message.id,
            provider = provider.name(),
            recipient = %message.recipient,
            "scheduled message sent"
        );
        Ok(())
    }
}
