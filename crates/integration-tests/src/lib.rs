//! Integration tests for the sweeper.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p sweeper-integration-tests
//! ```
//!
//! Most scenarios run both jobs against the in-memory engine with a stopped
//! clock, so ages are exact to the second. The `postgres_engine` scenarios
//! need a database and are ignored by default; see [`postgres`].
//!
//! # Test Categories
//!
//! - `session_cleanup` - Session matrix, multi-pass convergence, batch draining
//! - `anonymous_customers` - Age boundary, order guard, cascade, batch bound
//! - `concurrent_jobs` - Both jobs over one store at the same time
//! - `postgres_engine` - The same rules through the SQL engine

pub mod postgres;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sweeper_core::{
    CartContents, Customer, CustomerGroupId, CustomerKind, CustomerSession, FixedClock,
    SettingKey, Shopper, ShoppingCart,
};
use sweeper_jobs::jobs::{AnonymousCustomerReclaimer, SessionCleanupJob};
use sweeper_jobs::settings::StaticSettings;
use sweeper_jobs::store::MemoryStore;

/// Sessions in the scenarios were created this long ago.
pub const SESSION_CREATED_DAYS_AGO: i64 = 50;

/// The group every storefront visitor joins.
pub const PUBLIC_GROUP: CustomerGroupId = CustomerGroupId::new(1);

/// The instant every scenario treats as "now".
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub type Sessions = SessionCleanupJob<MemoryStore, StaticSettings, FixedClock>;
pub type Customers = AnonymousCustomerReclaimer<MemoryStore, StaticSettings, FixedClock>;

/// A customer with one shopper and, optionally, one cart.
#[derive(Debug, Clone)]
pub struct Visitor {
    pub customer: Customer,
    pub shopper: Shopper,
    pub cart: Option<ShoppingCart>,
}

/// Shared store, settings and frozen clock.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub store: MemoryStore,
    pub settings: StaticSettings,
    pub now: DateTime<Utc>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            settings: StaticSettings::new(),
            now: fixed_now(),
        }
    }

    #[must_use]
    pub fn days_ago(&self, days: i64) -> DateTime<Utc> {
        self.now - Duration::days(days)
    }

    #[must_use]
    pub fn with_session_policy(self, batch_size: u32, max_days: u32) -> Self {
        self.store_setting(SettingKey::SessionCleanupBatchSize, batch_size);
        self.store_setting(SettingKey::SessionCleanupMaxDaysHistory, max_days);
        self
    }

    #[must_use]
    pub fn with_customer_policy(self, batch_size: u32, max_days: u32) -> Self {
        self.store_setting(SettingKey::AnonymousCustomerBatchSize, batch_size);
        self.store_setting(SettingKey::AnonymousCustomerMaxHistoryDays, max_days);
        self
    }

    fn store_setting(&self, key: SettingKey, value: u32) {
        self.settings.set(key, value.to_string());
    }

    #[must_use]
    pub fn session_job(&self) -> Sessions {
        SessionCleanupJob::with_clock(
            self.store.clone(),
            self.settings.clone(),
            FixedClock(self.now),
        )
    }

    #[must_use]
    pub fn customer_job(&self) -> Customers {
        AnonymousCustomerReclaimer::with_clock(
            self.store.clone(),
            self.settings.clone(),
            FixedClock(self.now),
        )
    }

    /// A customer of `kind` with a shopper holding `cart`.
    pub async fn visitor(&self, kind: CustomerKind, cart: CartContents) -> Visitor {
        let customer = self
            .store
            .insert_customer(kind == CustomerKind::Anonymous, self.now)
            .await;
        let shopper = self.store.insert_shopper(Some(customer.id)).await;
        let cart = self.cart(&shopper, cart).await;
        Visitor {
            customer,
            shopper,
            cart,
        }
    }

    /// Give `shopper` a cart of the requested kind.
    pub async fn cart(&self, shopper: &Shopper, cart: CartContents) -> Option<ShoppingCart> {
        match cart {
            CartContents::NoCart => None,
            CartContents::Empty => Some(self.store.insert_cart(shopper.id, 0).await),
            CartContents::NonEmpty => Some(self.store.insert_cart(shopper.id, 1).await),
        }
    }

    /// A session on `shopper` last accessed `accessed_days_ago` days ago.
    pub async fn session(&self, shopper: &Shopper, accessed_days_ago: i64) -> CustomerSession {
        self.store
            .insert_session(
                shopper.id,
                self.days_ago(SESSION_CREATED_DAYS_AGO),
                self.days_ago(accessed_days_ago),
            )
            .await
    }

    /// Five profile values, one address and membership of [`PUBLIC_GROUP`]:
    /// what a storefront visit leaves on an anonymous customer.
    pub async fn profile(&self, customer: &Customer) {
        for key in ["CP_FIRST_NAME", "CP_LAST_NAME", "CP_EMAIL", "CP_LOCALE", "CP_CURRENCY"] {
            self.store
                .insert_profile_value(customer.id, key, "x")
                .await;
        }
        self.store.insert_address(customer.id).await;
        self.store.add_to_group(customer.id, PUBLIC_GROUP).await;
    }

    /// An anonymous customer last modified at `at`, with nothing attached.
    pub async fn anonymous_customer(&self, at: DateTime<Utc>) -> Customer {
        self.store.insert_customer(true, at).await
    }
}
