//! Harness for scenarios against a real `PostgreSQL` database.
//!
//! Each test gets a fresh database from `#[sqlx::test]` with the sweeper
//! migrations applied. Rows are inserted with plain SQL, the way request
//! handling would, and the jobs run through [`PgStore`] and
//! [`DatabaseSettings`].
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/sweeper_test \
//!     cargo test -p sweeper-integration-tests -- --ignored
//! ```

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use sweeper_core::{
    CartContents, Customer, CustomerId, CustomerKind, CustomerSessionId, FixedClock, Guid,
    SettingKey, Shopper, ShopperId, ShoppingCartId,
};
use sweeper_jobs::jobs::{AnonymousCustomerReclaimer, SessionCleanupJob};
use sweeper_jobs::settings::DatabaseSettings;
use sweeper_jobs::store::PgStore;

use crate::{SESSION_CREATED_DAYS_AGO, fixed_now};

pub type PgSessions = SessionCleanupJob<PgStore, DatabaseSettings, FixedClock>;
pub type PgCustomers = AnonymousCustomerReclaimer<PgStore, DatabaseSettings, FixedClock>;

/// A cart row as inserted by the harness.
#[derive(Debug, Clone)]
pub struct PgCart {
    pub id: ShoppingCartId,
    pub guid: Guid,
}

/// A customer with one shopper and, optionally, one cart.
#[derive(Debug, Clone)]
pub struct PgVisitor {
    pub customer: Customer,
    pub shopper: Shopper,
    pub cart: Option<PgCart>,
}

/// Pool, settings table and frozen clock for one test database.
#[derive(Debug, Clone)]
pub struct PgFixture {
    pub pool: PgPool,
    pub settings: DatabaseSettings,
    pub now: DateTime<Utc>,
}

impl PgFixture {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            settings: DatabaseSettings::new(pool.clone()),
            pool,
            now: fixed_now(),
        }
    }

    #[must_use]
    pub fn days_ago(&self, days: i64) -> DateTime<Utc> {
        self.now - Duration::days(days)
    }

    /// Store the session job's settings in the settings table.
    pub async fn with_session_policy(self, batch_size: u32, max_days: u32) -> Self {
        self.store_setting(SettingKey::SessionCleanupBatchSize, batch_size)
            .await;
        self.store_setting(SettingKey::SessionCleanupMaxDaysHistory, max_days)
            .await;
        self
    }

    /// Store the customer job's settings in the settings table.
    pub async fn with_customer_policy(self, batch_size: u32, max_days: u32) -> Self {
        self.store_setting(SettingKey::AnonymousCustomerBatchSize, batch_size)
            .await;
        self.store_setting(SettingKey::AnonymousCustomerMaxHistoryDays, max_days)
            .await;
        self
    }

    async fn store_setting(&self, key: SettingKey, value: u32) {
        self.settings
            .set(key, &json!(value))
            .await
            .expect("Failed to store setting");
    }

    #[must_use]
    pub fn session_job(&self) -> PgSessions {
        SessionCleanupJob::with_clock(
            PgStore::new(self.pool.clone()),
            self.settings.clone(),
            FixedClock(self.now),
        )
    }

    #[must_use]
    pub fn customer_job(&self) -> PgCustomers {
        AnonymousCustomerReclaimer::with_clock(
            PgStore::new(self.pool.clone()),
            self.settings.clone(),
            FixedClock(self.now),
        )
    }

    pub async fn customer(&self, anonymous: bool, last_modified_date: DateTime<Utc>) -> Customer {
        let guid = Guid::generate();
        let id: CustomerId = sqlx::query_scalar(
            r"
            INSERT INTO storefront.customer (guid, anonymous, last_modified_date)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(&guid)
        .bind(anonymous)
        .bind(last_modified_date)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert customer");

        Customer {
            id,
            guid,
            anonymous,
            last_modified_date,
        }
    }

    pub async fn shopper(&self, customer_id: Option<CustomerId>) -> Shopper {
        let guid = Guid::generate();
        let id: ShopperId = sqlx::query_scalar(
            "INSERT INTO storefront.shopper (guid, customer_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(&guid)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert shopper");

        Shopper {
            id,
            guid,
            customer_id,
        }
    }

    /// A customer of `kind`, last modified now, with a shopper holding `cart`.
    pub async fn visitor(&self, kind: CustomerKind, cart: CartContents) -> PgVisitor {
        let customer = self
            .customer(kind == CustomerKind::Anonymous, self.now)
            .await;
        let shopper = self.shopper(Some(customer.id)).await;
        let cart = match cart {
            CartContents::NoCart => None,
            CartContents::Empty => Some(self.cart(shopper.id, 0).await),
            CartContents::NonEmpty => Some(self.cart(shopper.id, 1).await),
        };
        PgVisitor {
            customer,
            shopper,
            cart,
        }
    }

    /// A cart with `line_items` line items.
    pub async fn cart(&self, shopper_id: ShopperId, line_items: u32) -> PgCart {
        let guid = Guid::generate();
        let id: ShoppingCartId = sqlx::query_scalar(
            "INSERT INTO storefront.shopping_cart (guid, shopper_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(&guid)
        .bind(shopper_id)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert cart");

        for n in 0..line_items {
            sqlx::query(
                r"
                INSERT INTO storefront.cart_item (shopping_cart_id, sku_code, quantity)
                VALUES ($1, $2, 1)
                ",
            )
            .bind(id)
            .bind(format!("SKU-{n}"))
            .execute(&self.pool)
            .await
            .expect("Failed to insert cart item");
        }

        PgCart { id, guid }
    }

    /// A session on `shopper` last accessed `accessed_days_ago` days ago.
    pub async fn session(&self, shopper: &Shopper, accessed_days_ago: i64) -> CustomerSessionId {
        sqlx::query_scalar(
            r"
            INSERT INTO storefront.customer_session
                (guid, shopper_id, creation_date, last_accessed_date)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(Guid::generate())
        .bind(shopper.id)
        .bind(self.days_ago(SESSION_CREATED_DAYS_AGO))
        .bind(self.days_ago(accessed_days_ago))
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert session")
    }

    pub async fn wish_list(&self, shopper_id: ShopperId) {
        sqlx::query(
            "INSERT INTO storefront.wish_list (guid, shopper_id) VALUES ($1, $2)",
        )
        .bind(Guid::generate())
        .bind(shopper_id)
        .execute(&self.pool)
        .await
        .expect("Failed to insert wish list");
    }

    pub async fn cart_order(&self, cart_guid: &Guid) {
        sqlx::query(
            "INSERT INTO storefront.cart_order (guid, shopping_cart_guid) VALUES ($1, $2)",
        )
        .bind(Guid::generate())
        .bind(cart_guid)
        .execute(&self.pool)
        .await
        .expect("Failed to insert cart order");
    }

    pub async fn order(&self, customer_id: CustomerId, cart_guid: Option<&Guid>) {
        sqlx::query(
            r"
            INSERT INTO storefront.customer_order (guid, customer_id, shopping_cart_guid)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(Guid::generate())
        .bind(customer_id)
        .bind(cart_guid)
        .execute(&self.pool)
        .await
        .expect("Failed to insert order");
    }

    /// One consent and its history entry.
    pub async fn consent(&self, customer: &Customer) {
        for table in ["customer_consent", "customer_consent_history"] {
            sqlx::query(&format!(
                "INSERT INTO storefront.{table} (guid, customer_guid) VALUES ($1, $2)"
            ))
            .bind(Guid::generate())
            .bind(&customer.guid)
            .execute(&self.pool)
            .await
            .expect("Failed to insert consent");
        }
    }

    /// Five profile values, one address and membership of the `PUBLIC`
    /// group: what a storefront visit leaves on an anonymous customer.
    pub async fn profile(&self, customer: &Customer) {
        for key in ["CP_FIRST_NAME", "CP_LAST_NAME", "CP_EMAIL", "CP_LOCALE", "CP_CURRENCY"] {
            sqlx::query(
                r"
                INSERT INTO storefront.customer_profile_value (customer_id, attribute_key, value)
                VALUES ($1, $2, 'x')
                ",
            )
            .bind(customer.id)
            .bind(key)
            .execute(&self.pool)
            .await
            .expect("Failed to insert profile value");
        }

        sqlx::query(
            "INSERT INTO storefront.customer_address (guid, customer_id) VALUES ($1, $2)",
        )
        .bind(Guid::generate())
        .bind(customer.id)
        .execute(&self.pool)
        .await
        .expect("Failed to insert address");

        sqlx::query(
            r"
            INSERT INTO storefront.customer_group_member (customer_id, customer_group_id)
            SELECT $1, id FROM storefront.customer_group WHERE name = 'PUBLIC'
            ",
        )
        .bind(customer.id)
        .execute(&self.pool)
        .await
        .expect("Failed to insert group membership");
    }

    /// Rows in `storefront.<table>`.
    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM storefront.{table}"))
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count rows")
    }

    /// Whether the row of `storefront.<table>` keyed `id` exists, as 0 or 1.
    pub async fn rows(&self, table: &str, id: i64) -> i64 {
        self.count_where(table, "id", id).await
    }

    /// Rows in `storefront.<table>` whose `column` equals `id`.
    pub async fn count_where(&self, table: &str, column: &str, id: i64) -> i64 {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM storefront.{table} WHERE {column} = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to count rows")
    }

    /// Rows owned by `customer`, across every table its cascade clears.
    pub async fn owned_by(&self, customer: &Customer) -> i64 {
        let id = customer.id.as_i64();
        let mut total = 0;
        for table in ["customer_profile_value", "customer_address", "customer_group_member"] {
            total += self.count_where(table, "customer_id", id).await;
        }
        total += self.count_where("shopper", "customer_id", id).await;
        for table in ["customer_consent", "customer_consent_history"] {
            total += sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COUNT(*) FROM storefront.{table} WHERE customer_guid = $1"
            ))
            .bind(&customer.guid)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count consents");
        }
        total
    }
}
