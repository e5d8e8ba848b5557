//! Session history purge.
//!
//! A pass has two steps:
//!
//! 1. Delete up to a batch of sessions whose last access is older than the
//!    retention window. Staleness is the only test: the customer's type and
//!    the shopper's carts do not matter.
//! 2. Delete up to a batch of orphaned shoppers (no session references them)
//!    whose carts may be thrown away, with their carts, draft orders and wish
//!    lists. An orphan with a non-empty cart for a registered customer is
//!    kept.
//!
//! A shopper only becomes an orphan once all its sessions are gone, so
//! clearing a backlog takes repeated passes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sweeper_core::{BatchSize, Candidate, Clock, SystemClock};
use tracing::{debug, info, instrument, warn};

use super::{PassOutcome, ReclaimJob};
use crate::cascade::{self, CascadeOutcome};
use crate::error::Result;
use crate::settings::{self, SettingsSource};
use crate::store::ReclaimStore;

/// What one pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionPurgeReport {
    /// Stale sessions deleted.
    pub sessions: usize,
    /// Orphaned shoppers deleted.
    pub shoppers: usize,
}

/// Purges stale sessions and the shoppers they leave behind.
#[derive(Debug, Clone)]
pub struct SessionCleanupJob<S, P, C = SystemClock> {
    store: S,
    settings: P,
    clock: C,
}

impl<S, P> SessionCleanupJob<S, P> {
    #[must_use]
    pub const fn new(store: S, settings: P) -> Self {
        Self::with_clock(store, settings, SystemClock)
    }
}

impl<S, P, C> SessionCleanupJob<S, P, C> {
    #[must_use]
    pub const fn with_clock(store: S, settings: P, clock: C) -> Self {
        Self {
            store,
            settings,
            clock,
        }
    }
}

impl<S, P, C> SessionCleanupJob<S, P, C>
where
    S: ReclaimStore,
    P: SettingsSource,
    C: Clock,
{
    /// Run one pass and return the number of sessions deleted.
    ///
    /// # Errors
    ///
    /// Returns `ReclaimError::Settings` if the settings are missing or
    /// invalid, or `ReclaimError::Repository` if the stale session scan
    /// fails. A failed orphan scan is reported and counts as zero shoppers.
    pub async fn purge_session_history(&self) -> Result<usize> {
        Ok(self.purge().await?.sessions)
    }

    /// Run one pass and report both steps.
    ///
    /// # Errors
    ///
    /// See [`Self::purge_session_history`].
    pub async fn purge(&self) -> Result<SessionPurgeReport> {
        Ok(self.pass().await?.0)
    }

    async fn pass(&self) -> Result<(SessionPurgeReport, BatchSize)> {
        let policy = settings::load_session_policy(&self.settings).await?;
        let cutoff = policy.cutoff(self.clock.now());

        let sessions = self
            .delete_stale_sessions(cutoff, policy.batch_size)
            .await?;
        // Step A has committed by now, so its count must survive a failed
        // orphan scan.
        let shoppers = match self.delete_orphaned_shoppers(policy.batch_size).await {
            Ok(shoppers) => shoppers,
            Err(e) => {
                e.capture_step(self.name(), "orphaned_shoppers");
                0
            }
        };

        let report = SessionPurgeReport { sessions, shoppers };
        if sessions > 0 || shoppers > 0 {
            info!(
                sessions,
                shoppers,
                max_days_history = policy.max_days_history.days(),
                "Purged session history"
            );
        } else {
            debug!("No session history to purge");
        }
        Ok((report, policy.batch_size))
    }

    /// Delete up to `batch_size` sessions last accessed before `cutoff`.
    #[instrument(skip(self, batch_size), fields(batch_size = batch_size.get()))]
    async fn delete_stale_sessions(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: BatchSize,
    ) -> Result<usize> {
        let sessions = self.store.find_stale_sessions(cutoff, batch_size).await?;

        let mut deleted = 0;
        for session in &sessions {
            let candidate = Candidate::Session {
                id: session.id,
                cutoff,
            };
            match cascade::execute(&self.store, candidate).await {
                Ok(CascadeOutcome::Deleted(_)) => deleted += 1,
                Ok(outcome) => debug!(session_id = %session.id, ?outcome, "Session not deleted"),
                Err(e) => warn!(
                    session_id = %session.id,
                    session_guid = %session.guid,
                    error = %e,
                    "Failed to delete stale session, skipping"
                ),
            }
        }

        Ok(deleted)
    }

    /// Delete up to `batch_size` orphaned shoppers with disposable carts.
    #[instrument(skip(self, batch_size), fields(batch_size = batch_size.get()))]
    async fn delete_orphaned_shoppers(&self, batch_size: BatchSize) -> Result<usize> {
        let shoppers = self.store.find_reclaimable_shoppers(batch_size).await?;

        let mut deleted = 0;
        for shopper in &shoppers {
            match cascade::execute(&self.store, Candidate::Shopper { id: shopper.id }).await {
                Ok(CascadeOutcome::Deleted(_)) => deleted += 1,
                Ok(outcome) => debug!(shopper_id = %shopper.id, ?outcome, "Shopper not deleted"),
                Err(e) => warn!(
                    shopper_id = %shopper.id,
                    shopper_guid = %shopper.guid,
                    error = %e,
                    "Failed to delete orphaned shopper, skipping"
                ),
            }
        }

        Ok(deleted)
    }
}

impl<S, P, C> ReclaimJob for SessionCleanupJob<S, P, C>
where
    S: ReclaimStore,
    P: SettingsSource,
    C: Clock,
{
    fn name(&self) -> &'static str {
        "session_cleanup"
    }

    async fn run_pass(&self) -> Result<PassOutcome> {
        let (report, batch_size) = self.pass().await?;
        let full = batch_size.as_usize();
        Ok(PassOutcome {
            deleted: report.sessions,
            batch_size,
            saturated: report.sessions >= full || report.shoppers >= full,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use sweeper_core::{CascadeRoot, Customer, CustomerSession, FixedClock, SettingKey, Shopper};

    use super::*;
    use crate::settings::StaticSettings;
    use crate::store::memory::MemoryUnit;
    use crate::store::{Backlog, MemoryStore, RepositoryError};

    /// A memory store whose orphaned shopper scan always fails.
    struct BrokenOrphanScan(MemoryStore);

    impl ReclaimStore for BrokenOrphanScan {
        type Unit<'a> = MemoryUnit;

        async fn begin(&self) -> std::result::Result<MemoryUnit, RepositoryError> {
            self.0.begin().await
        }

        async fn find_stale_anonymous_customers(
            &self,
            cutoff: DateTime<Utc>,
            limit: BatchSize,
        ) -> std::result::Result<Vec<Customer>, RepositoryError> {
            self.0.find_stale_anonymous_customers(cutoff, limit).await
        }

        async fn find_stale_sessions(
            &self,
            cutoff: DateTime<Utc>,
            limit: BatchSize,
        ) -> std::result::Result<Vec<CustomerSession>, RepositoryError> {
            self.0.find_stale_sessions(cutoff, limit).await
        }

        async fn find_reclaimable_shoppers(
            &self,
            _limit: BatchSize,
        ) -> std::result::Result<Vec<Shopper>, RepositoryError> {
            Err(RepositoryError::Unavailable(
                "orphan scan timed out".to_string(),
            ))
        }

        async fn backlog(
            &self,
            session_cutoff: DateTime<Utc>,
            customer_cutoff: DateTime<Utc>,
        ) -> std::result::Result<Backlog, RepositoryError> {
            self.0.backlog(session_cutoff, customer_cutoff).await
        }
    }

    fn settings(batch_size: &str, days: &str) -> StaticSettings {
        StaticSettings::new()
            .with(SettingKey::SessionCleanupBatchSize, batch_size)
            .with(SettingKey::SessionCleanupMaxDaysHistory, days)
    }

    #[tokio::test]
    async fn test_session_at_cutoff_is_kept() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let shopper = store.insert_shopper(None).await;
        let created = now - Duration::days(50);
        let at_cutoff = store
            .insert_session(shopper.id, created, now - Duration::days(20))
            .await;
        let past_cutoff = store
            .insert_session(
                shopper.id,
                created,
                now - Duration::days(20) - Duration::seconds(1),
            )
            .await;
        let job =
            SessionCleanupJob::with_clock(store.clone(), settings("10", "20"), FixedClock(now));

        assert_eq!(job.purge_session_history().await.unwrap(), 1);
        assert!(store.session(at_cutoff.id).await.is_some());
        assert!(store.session(past_cutoff.id).await.is_none());
    }

    #[tokio::test]
    async fn test_orphan_with_full_registered_cart_is_kept() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let registered = store.insert_customer(false, now).await;
        let keeper = store.insert_shopper(Some(registered.id)).await;
        store.insert_cart(keeper.id, 2).await;
        let empty = store.insert_shopper(Some(registered.id)).await;
        store.insert_cart(empty.id, 0).await;
        let job = SessionCleanupJob::new(store.clone(), settings("10", "20"));

        let report = job.purge().await.unwrap();

        assert_eq!((report.sessions, report.shoppers), (0, 1));
        assert!(store.shopper(keeper.id).await.is_some());
        assert!(store.shopper(empty.id).await.is_none());
    }

    #[tokio::test]
    async fn test_orphan_cascade_takes_owned_rows() {
        let store = MemoryStore::new();
        let shopper = store.insert_shopper(None).await;
        let cart = store.insert_cart(shopper.id, 4).await;
        let draft = store.insert_cart_order(&cart.guid).await;
        let wish_list = store.insert_wish_list(shopper.id).await;
        let job = SessionCleanupJob::new(store.clone(), settings("10", "20"));

        job.purge().await.unwrap();

        assert!(store.cart(cart.id).await.is_none());
        assert!(store.cart_order(draft.id).await.is_none());
        assert!(store.wish_list(wish_list.id).await.is_none());
        assert_eq!(store.counts().await.cart_items, 0);
    }

    #[tokio::test]
    async fn test_failed_session_is_skipped() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let old = now - Duration::days(30);
        let shopper = store.insert_shopper(None).await;
        let broken = store.insert_session(shopper.id, old, old).await;
        let fine = store.insert_session(shopper.id, old, old).await;
        store.fail_deletes_of(CascadeRoot::Session(broken.id)).await;
        let job = SessionCleanupJob::new(store.clone(), settings("10", "20"));

        assert_eq!(job.purge_session_history().await.unwrap(), 1);
        assert!(store.session(broken.id).await.is_some());
        assert!(store.session(fine.id).await.is_none());
        let shopper = store.shopper(shopper.id).await;
        assert!(shopper.is_some(), "still referenced");
    }

    #[tokio::test]
    async fn test_failed_orphan_scan_keeps_session_count() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(30);
        let shopper = store.insert_shopper(None).await;
        for _ in 0..3 {
            store.insert_session(shopper.id, old, old).await;
        }
        let job = SessionCleanupJob::new(BrokenOrphanScan(store.clone()), settings("10", "20"));

        let report = job.purge().await.unwrap();

        assert_eq!((report.sessions, report.shoppers), (3, 0));
        assert_eq!(store.counts().await.sessions, 0);
        assert!(store.shopper(shopper.id).await.is_some());
    }

    #[tokio::test]
    async fn test_missing_settings_abort_before_deleting() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(30);
        let shopper = store.insert_shopper(None).await;
        store.insert_session(shopper.id, old, old).await;
        let job = SessionCleanupJob::new(
            store.clone(),
            StaticSettings::new().with(SettingKey::SessionCleanupBatchSize, "10"),
        );

        assert!(job.purge_session_history().await.is_err());
        assert_eq!(store.counts().await.sessions, 1);
    }
}
