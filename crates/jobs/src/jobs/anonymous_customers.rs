//! Anonymous customer reclamation.
//!
//! Anonymous customers are created for every visitor who adds to a cart or
//! starts a checkout. Once an identity has not been modified within the
//! retention window and no order references it, it is deleted together with
//! everything it owns: shoppers, sessions, carts, draft orders, wish lists
//! and consent records.
//!
//! Customers referenced by an order are never deleted here, however old.

use chrono::{DateTime, Utc};
use sweeper_core::{BatchSize, Candidate, Clock, SystemClock};
use tracing::{debug, info, instrument, warn};

use super::{PassOutcome, ReclaimJob};
use crate::cascade::{self, CascadeOutcome};
use crate::error::Result;
use crate::settings::{self, SettingsSource};
use crate::store::ReclaimStore;

/// Deletes stale anonymous customers and their dependents.
#[derive(Debug, Clone)]
pub struct AnonymousCustomerReclaimer<S, P, C = SystemClock> {
    store: S,
    settings: P,
    clock: C,
}

impl<S, P> AnonymousCustomerReclaimer<S, P> {
    #[must_use]
    pub const fn new(store: S, settings: P) -> Self {
        Self::with_clock(store, settings, SystemClock)
    }
}

impl<S, P, C> AnonymousCustomerReclaimer<S, P, C> {
    #[must_use]
    pub const fn with_clock(store: S, settings: P, clock: C) -> Self {
        Self {
            store,
            settings,
            clock,
        }
    }
}

impl<S, P, C> AnonymousCustomerReclaimer<S, P, C>
where
    S: ReclaimStore,
    P: SettingsSource,
    C: Clock,
{
    /// Delete up to `max_count` anonymous customers last modified strictly
    /// before `cutoff`.
    ///
    /// Returns the number of customers actually deleted. Customers that fail
    /// to delete are logged and skipped; they are retried on a later call.
    ///
    /// # Errors
    ///
    /// Returns `ReclaimError::Repository` if the candidate scan fails.
    #[instrument(skip(self, max_count), fields(max_count = max_count.get()))]
    pub async fn reclaim_anonymous_customers(
        &self,
        cutoff: DateTime<Utc>,
        max_count: BatchSize,
    ) -> Result<usize> {
        let candidates = self
            .store
            .find_stale_anonymous_customers(cutoff, max_count)
            .await?;

        let mut deleted = 0;
        let mut failed = 0;
        for customer in &candidates {
            let candidate = Candidate::Customer {
                id: customer.id,
                cutoff,
            };
            match cascade::execute(&self.store, candidate).await {
                Ok(CascadeOutcome::Deleted(_)) => deleted += 1,
                Ok(outcome) => {
                    debug!(customer_id = %customer.id, ?outcome, "Customer not reclaimed");
                }
                Err(e) => {
                    warn!(
                        customer_id = %customer.id,
                        customer_guid = %customer.guid,
                        error = %e,
                        "Failed to reclaim anonymous customer, skipping"
                    );
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!(
                candidates = candidates.len(),
                deleted,
                failed,
                "Anonymous customer reclamation completed with errors"
            );
        } else if deleted > 0 {
            info!(deleted, "Reclaimed anonymous customers");
        } else {
            debug!("No anonymous customers to reclaim");
        }

        Ok(deleted)
    }

    /// One invocation with the current settings and clock.
    ///
    /// # Errors
    ///
    /// Returns `ReclaimError::Settings` if the settings are missing or
    /// invalid, or `ReclaimError::Repository` if the candidate scan fails.
    pub async fn run(&self) -> Result<usize> {
        Ok(self.pass().await?.deleted)
    }

    async fn pass(&self) -> Result<PassOutcome> {
        let policy = settings::load_customer_policy(&self.settings).await?;
        let cutoff = policy.cutoff(self.clock.now());
        let deleted = self
            .reclaim_anonymous_customers(cutoff, policy.batch_size)
            .await?;

        Ok(PassOutcome {
            deleted,
            batch_size: policy.batch_size,
            saturated: deleted >= policy.batch_size.as_usize(),
        })
    }
}

impl<S, P, C> ReclaimJob for AnonymousCustomerReclaimer<S, P, C>
where
    S: ReclaimStore,
    P: SettingsSource,
    C: Clock,
{
    fn name(&self) -> &'static str {
        "anonymous_customers"
    }

    async fn run_pass(&self) -> Result<PassOutcome> {
        self.pass().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;

    use chrono::Duration;
    use sweeper_core::{CascadeRoot, SettingKey};

    use super::*;
    use crate::error::ReclaimError;
    use crate::settings::{SettingsError, StaticSettings};
    use crate::store::MemoryStore;

    fn batch(n: u32) -> BatchSize {
        BatchSize::new(NonZeroU32::new(n).unwrap())
    }

    fn settings(batch_size: &str, days: &str) -> StaticSettings {
        StaticSettings::new()
            .with(SettingKey::AnonymousCustomerBatchSize, batch_size)
            .with(SettingKey::AnonymousCustomerMaxHistoryDays, days)
    }

    #[tokio::test]
    async fn test_registered_customers_are_never_candidates() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let registered = store
            .insert_customer(false, now - Duration::days(400))
            .await;
        let reclaimer = AnonymousCustomerReclaimer::new(store.clone(), StaticSettings::new());

        let deleted = reclaimer
            .reclaim_anonymous_customers(now - Duration::days(60), batch(10))
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert!(store.customer(registered.id).await.is_some());
    }

    #[tokio::test]
    async fn test_oldest_customers_go_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let newer = store.insert_customer(true, now - Duration::days(70)).await;
        let older = store.insert_customer(true, now - Duration::days(80)).await;
        let reclaimer = AnonymousCustomerReclaimer::new(store.clone(), StaticSettings::new());

        let deleted = reclaimer
            .reclaim_anonymous_customers(now - Duration::days(60), batch(1))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store.customer(older.id).await.is_none());
        assert!(store.customer(newer.id).await.is_some());
    }

    #[tokio::test]
    async fn test_failing_candidate_is_skipped() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let old = now - Duration::days(90);
        let broken = store.insert_customer(true, old).await;
        let fine = store.insert_customer(true, old).await;
        store
            .fail_deletes_of(CascadeRoot::Customer(broken.id))
            .await;
        let reclaimer = AnonymousCustomerReclaimer::new(store.clone(), StaticSettings::new());

        let deleted = reclaimer
            .reclaim_anonymous_customers(now - Duration::days(60), batch(10))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store.customer(broken.id).await.is_some());
        assert!(store.customer(fine.id).await.is_none());
    }

    #[tokio::test]
    async fn test_run_reads_settings_each_time() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(90);
        for _ in 0..3 {
            store.insert_customer(true, old).await;
        }
        let source = settings("1", "60");
        let reclaimer = AnonymousCustomerReclaimer::new(store.clone(), source.clone());

        assert_eq!(reclaimer.run().await.unwrap(), 1);

        source.set(SettingKey::AnonymousCustomerBatchSize, "5");
        assert_eq!(reclaimer.run().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalid_settings_abort_the_run() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(90);
        store.insert_customer(true, old).await;
        let reclaimer = AnonymousCustomerReclaimer::new(store.clone(), settings("-3", "60"));

        let err = reclaimer.run().await.unwrap_err();

        assert!(matches!(err, ReclaimError::Settings(SettingsError::Policy(_))));
        assert_eq!(store.counts().await.customers, 1);
    }

    #[tokio::test]
    async fn test_pass_reports_saturation() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for _ in 0..2 {
            store.insert_customer(true, now - Duration::days(90)).await;
        }
        let reclaimer = AnonymousCustomerReclaimer::new(store, settings("2", "60"));

        let outcome = reclaimer.run_pass().await.unwrap();
        assert_eq!(outcome.deleted, 2);
        assert!(outcome.saturated);

        let outcome = reclaimer.run_pass().await.unwrap();
        assert_eq!(outcome.deleted, 0);
        assert!(!outcome.saturated);
    }
}
