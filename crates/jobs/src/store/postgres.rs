//! `PostgreSQL` persistence engine.
//!
//! # Database: `np_storefront`
//!
//! The jobs read and delete rows in the `storefront` schema:
//!
//! - `customer`, `customer_order`
//! - `shopper`, `customer_session`
//! - `shopping_cart`, `cart_item`, `cart_order`, `wish_list`
//! - `customer_consent`, `customer_consent_history`
//! - `customer_profile_value`, `customer_address`, `customer_group_member`
//! - `setting` - retention tunables (JSONB)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/jobs/migrations/` and run via:
//! ```bash
//! cargo run -p sweeper-cli -- migrate
//! ```
//!
//! Queries are runtime-checked (`sqlx::query*` with binds) so the crate
//! builds without a live database.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use sweeper_core::eligibility;
use sweeper_core::{
    BatchSize, Candidate, CartContents, CascadeRoot, Customer, CustomerKind, CustomerSession,
    EntityKind, Shopper,
};
use tracing::instrument;

use super::{Backlog, ReclaimStore, Recheck, RepositoryError, UnitOfWork};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Order guard shared by the candidate scan, the backlog count and the
/// re-check: an order referencing the customer directly, or placed from one
/// of its shoppers' carts.
const ORDER_GUARD: &str = r"
    EXISTS (
        SELECT 1 FROM storefront.customer_order o
        WHERE o.customer_id = c.id
           OR o.shopping_cart_guid IN (
               SELECT sc.guid
               FROM storefront.shopping_cart sc
               JOIN storefront.shopper s ON s.id = sc.shopper_id
               WHERE s.customer_id = c.id
           )
    )
";

/// Orphaned shoppers with disposable carts. Mirrors
/// [`eligibility::shopper_is_reclaimable`].
const RECLAIMABLE_SHOPPER: &str = r"
    NOT EXISTS (
        SELECT 1 FROM storefront.customer_session cs WHERE cs.shopper_id = s.id
    )
    AND (
        c.id IS NULL
        OR c.anonymous
        OR NOT EXISTS (
            SELECT 1
            FROM storefront.shopping_cart sc
            JOIN storefront.cart_item ci ON ci.shopping_cart_id = sc.id
            WHERE sc.shopper_id = s.id
        )
    )
";

/// Locks every shopper of a customer, lowest key first. The session job
/// locks a shopper before touching its carts, so the customer cascade takes
/// the same locks in the same order before deleting anything.
const LOCK_CUSTOMER_SHOPPERS: &str = r"
    SELECT id
    FROM storefront.shopper
    WHERE customer_id = $1
    ORDER BY id
    FOR UPDATE
";

/// `PostgreSQL`-backed [`ReclaimStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, shared with the database settings source.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ReclaimStore for PgStore {
    type Unit<'a> = PgUnit;

    async fn begin(&self) -> Result<PgUnit, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(PgUnit { tx })
    }

    #[instrument(skip(self, limit), fields(limit = limit.get()))]
    async fn find_stale_anonymous_customers(
        &self,
        cutoff: DateTime<Utc>,
        limit: BatchSize,
    ) -> Result<Vec<Customer>, RepositoryError> {
        let sql = format!(
            r"
            SELECT c.id, c.guid, c.anonymous, c.last_modified_date
            FROM storefront.customer c
            WHERE c.anonymous
              AND c.last_modified_date < $1
              AND NOT {ORDER_GUARD}
            ORDER BY c.last_modified_date, c.id
            LIMIT $2
            "
        );
        let customers = sqlx::query_as::<_, Customer>(&sql)
            .bind(cutoff)
            .bind(i64::from(limit.get()))
            .fetch_all(&self.pool)
            .await?;

        Ok(customers)
    }

    #[instrument(skip(self, limit), fields(limit = limit.get()))]
    async fn find_stale_sessions(
        &self,
        cutoff: DateTime<Utc>,
        limit: BatchSize,
    ) -> Result<Vec<CustomerSession>, RepositoryError> {
        let sessions = sqlx::query_as::<_, CustomerSession>(
            r"
            SELECT id, guid, shopper_id, creation_date, last_accessed_date
            FROM storefront.customer_session
            WHERE last_accessed_date < $1
            ORDER BY last_accessed_date, id
            LIMIT $2
            ",
        )
        .bind(cutoff)
        .bind(i64::from(limit.get()))
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    #[instrument(skip(self, limit), fields(limit = limit.get()))]
    async fn find_reclaimable_shoppers(
        &self,
        limit: BatchSize,
    ) -> Result<Vec<Shopper>, RepositoryError> {
        let sql = format!(
            r"
            SELECT s.id, s.guid, s.customer_id
            FROM storefront.shopper s
            LEFT JOIN storefront.customer c ON c.id = s.customer_id
            WHERE {RECLAIMABLE_SHOPPER}
            ORDER BY s.id
            LIMIT $1
            "
        );
        let shoppers = sqlx::query_as::<_, Shopper>(&sql)
            .bind(i64::from(limit.get()))
            .fetch_all(&self.pool)
            .await?;

        Ok(shoppers)
    }

    async fn backlog(
        &self,
        session_cutoff: DateTime<Utc>,
        customer_cutoff: DateTime<Utc>,
    ) -> Result<Backlog, RepositoryError> {
        let sql = format!(
            r"
            SELECT
                (SELECT COUNT(*) FROM storefront.customer_session
                 WHERE last_accessed_date < $1) AS stale_sessions,
                (SELECT COUNT(*) FROM storefront.shopper s
                 LEFT JOIN storefront.customer c ON c.id = s.customer_id
                 WHERE {RECLAIMABLE_SHOPPER}) AS reclaimable_shoppers,
                (SELECT COUNT(*) FROM storefront.customer c
                 WHERE c.anonymous AND c.last_modified_date < $2
                   AND NOT {ORDER_GUARD}) AS stale_anonymous_customers,
                (SELECT COUNT(*) FROM storefront.customer c
                 WHERE c.anonymous AND c.last_modified_date < $2
                   AND {ORDER_GUARD}) AS order_guarded_customers
            "
        );
        let row: (i64, i64, i64, i64) = sqlx::query_as(&sql)
            .bind(session_cutoff)
            .bind(customer_cutoff)
            .fetch_one(&self.pool)
            .await?;
        let (
            stale_sessions,
            reclaimable_shoppers,
            stale_anonymous_customers,
            order_guarded_customers,
        ) = row;

        let count = |n: i64| {
            u64::try_from(n)
                .map_err(|_| RepositoryError::DataCorruption(format!("negative count: {n}")))
        };

        Ok(Backlog {
            stale_sessions: count(stale_sessions)?,
            reclaimable_shoppers: count(reclaimable_shoppers)?,
            stale_anonymous_customers: count(stale_anonymous_customers)?,
            order_guarded_customers: count(order_guarded_customers)?,
        })
    }
}

/// A `PostgreSQL` transaction. Rolled back on drop unless committed.
pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct CustomerLock {
    anonymous: bool,
    last_modified_date: DateTime<Utc>,
    has_orders: bool,
}

#[derive(sqlx::FromRow)]
struct ShopperLock {
    anonymous: Option<bool>,
    sessions: i64,
    carts: i64,
    line_items: i64,
}

impl PgUnit {
    async fn recheck_customer(
        &mut self,
        candidate_cutoff: DateTime<Utc>,
        id: sweeper_core::CustomerId,
    ) -> Result<Recheck, RepositoryError> {
        let sql = format!(
            r"
            SELECT c.anonymous, c.last_modified_date, {ORDER_GUARD} AS has_orders
            FROM storefront.customer c
            WHERE c.id = $1
            FOR UPDATE OF c
            "
        );
        let row = sqlx::query_as::<_, CustomerLock>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else {
            return Ok(Recheck::Gone);
        };

        sqlx::query(LOCK_CUSTOMER_SHOPPERS)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        let eligible = row.anonymous
            && eligibility::is_stale(row.last_modified_date, candidate_cutoff)
            && !row.has_orders;
        Ok(if eligible {
            Recheck::Eligible
        } else {
            Recheck::Ineligible
        })
    }

    async fn recheck_shopper(
        &mut self,
        id: sweeper_core::ShopperId,
    ) -> Result<Recheck, RepositoryError> {
        let row = sqlx::query_as::<_, ShopperLock>(
            r"
            SELECT
                c.anonymous AS anonymous,
                (SELECT COUNT(*) FROM storefront.customer_session cs
                 WHERE cs.shopper_id = s.id) AS sessions,
                (SELECT COUNT(*) FROM storefront.shopping_cart sc
                 WHERE sc.shopper_id = s.id) AS carts,
                (SELECT COUNT(*) FROM storefront.shopping_cart sc
                 JOIN storefront.cart_item ci ON ci.shopping_cart_id = sc.id
                 WHERE sc.shopper_id = s.id) AS line_items
            FROM storefront.shopper s
            LEFT JOIN storefront.customer c ON c.id = s.customer_id
            WHERE s.id = $1
            FOR UPDATE OF s
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(Recheck::Gone);
        };

        let carts = match (row.carts, row.line_items) {
            (0, _) => CartContents::NoCart,
            (_, 0) => CartContents::Empty,
            _ => CartContents::NonEmpty,
        };
        let owner = row.anonymous.map(CustomerKind::from_anonymous);
        let sessions = usize::try_from(row.sessions).unwrap_or(usize::MAX);

        Ok(if eligibility::shopper_is_reclaimable(sessions, owner, carts) {
            Recheck::Eligible
        } else {
            Recheck::Ineligible
        })
    }

    async fn recheck_session(
        &mut self,
        candidate_cutoff: DateTime<Utc>,
        id: sweeper_core::CustomerSessionId,
    ) -> Result<Recheck, RepositoryError> {
        let last_accessed: Option<DateTime<Utc>> = sqlx::query_scalar(
            r"
            SELECT last_accessed_date
            FROM storefront.customer_session
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(match last_accessed {
            None => Recheck::Gone,
            Some(at) if eligibility::is_stale(at, candidate_cutoff) => Recheck::Eligible,
            Some(_) => Recheck::Ineligible,
        })
    }
}

impl UnitOfWork for PgUnit {
    async fn recheck(&mut self, candidate: Candidate) -> Result<Recheck, RepositoryError> {
        match candidate {
            Candidate::Customer { id, cutoff } => self.recheck_customer(cutoff, id).await,
            Candidate::Shopper { id } => self.recheck_shopper(id).await,
            Candidate::Session { id, cutoff } => self.recheck_session(cutoff, id).await,
        }
    }

    async fn delete_owned(
        &mut self,
        kind: EntityKind,
        root: CascadeRoot,
    ) -> Result<u64, RepositoryError> {
        let sql =
            delete_statement(kind, root).ok_or(RepositoryError::InvalidCascade { kind, root })?;

        let result = sqlx::query(sql)
            .bind(root.id())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// The set-based `DELETE` for one plan step. `$1` is the root's key.
const fn delete_statement(kind: EntityKind, root: CascadeRoot) -> Option<&'static str> {
    let sql = match (root, kind) {
        (CascadeRoot::Customer(_), EntityKind::CartOrder) => {
            r"
            DELETE FROM storefront.cart_order co
            USING storefront.shopping_cart sc, storefront.shopper s
            WHERE co.shopping_cart_guid = sc.guid
              AND sc.shopper_id = s.id
              AND s.customer_id = $1
            "
        }
        (CascadeRoot::Customer(_), EntityKind::CartItem) => {
            r"
            DELETE FROM storefront.cart_item ci
            USING storefront.shopping_cart sc, storefront.shopper s
            WHERE ci.shopping_cart_id = sc.id
              AND sc.shopper_id = s.id
              AND s.customer_id = $1
            "
        }
        (CascadeRoot::Customer(_), EntityKind::ShoppingCart) => {
            r"
            DELETE FROM storefront.shopping_cart sc
            USING storefront.shopper s
            WHERE sc.shopper_id = s.id AND s.customer_id = $1
            "
        }
        (CascadeRoot::Customer(_), EntityKind::WishList) => {
            r"
            DELETE FROM storefront.wish_list wl
            USING storefront.shopper s
            WHERE wl.shopper_id = s.id AND s.customer_id = $1
            "
        }
        (CascadeRoot::Customer(_), EntityKind::CustomerSession) => {
            r"
            DELETE FROM storefront.customer_session cs
            USING storefront.shopper s
            WHERE cs.shopper_id = s.id AND s.customer_id = $1
            "
        }
        (CascadeRoot::Customer(_), EntityKind::Shopper) => {
            "DELETE FROM storefront.shopper WHERE customer_id = $1"
        }
        (CascadeRoot::Customer(_), EntityKind::CustomerConsentHistory) => {
            r"
            DELETE FROM storefront.customer_consent_history h
            USING storefront.customer c
            WHERE h.customer_guid = c.guid AND c.id = $1
            "
        }
        (CascadeRoot::Customer(_), EntityKind::CustomerConsent) => {
            r"
            DELETE FROM storefront.customer_consent cc
            USING storefront.customer c
            WHERE cc.customer_guid = c.guid AND c.id = $1
            "
        }
        (CascadeRoot::Customer(_), EntityKind::CustomerGroupMembership) => {
            "DELETE FROM storefront.customer_group_member WHERE customer_id = $1"
        }
        (CascadeRoot::Customer(_), EntityKind::CustomerProfileValue) => {
            "DELETE FROM storefront.customer_profile_value WHERE customer_id = $1"
        }
        (CascadeRoot::Customer(_), EntityKind::CustomerAddress) => {
            "DELETE FROM storefront.customer_address WHERE customer_id = $1"
        }
        (CascadeRoot::Customer(_), EntityKind::Customer) => {
            "DELETE FROM storefront.customer WHERE id = $1"
        }
        (CascadeRoot::Shopper(_), EntityKind::CartOrder) => {
            r"
            DELETE FROM storefront.cart_order co
            USING storefront.shopping_cart sc
            WHERE co.shopping_cart_guid = sc.guid AND sc.shopper_id = $1
            "
        }
        (CascadeRoot::Shopper(_), EntityKind::CartItem) => {
            r"
            DELETE FROM storefront.cart_item ci
            USING storefront.shopping_cart sc
            WHERE ci.shopping_cart_id = sc.id AND sc.shopper_id = $1
            "
        }
        (CascadeRoot::Shopper(_), EntityKind::ShoppingCart) => {
            "DELETE FROM storefront.shopping_cart WHERE shopper_id = $1"
        }
        (CascadeRoot::Shopper(_), EntityKind::WishList) => {
            "DELETE FROM storefront.wish_list WHERE shopper_id = $1"
        }
        (CascadeRoot::Shopper(_), EntityKind::Shopper) => {
            "DELETE FROM storefront.shopper WHERE id = $1"
        }
        (CascadeRoot::Session(_), EntityKind::CustomerSession) => {
            "DELETE FROM storefront.customer_session WHERE id = $1"
        }
        _ => return None,
    };
    Some(sql)
}
