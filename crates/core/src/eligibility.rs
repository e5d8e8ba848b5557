//! Reclamation eligibility rules.
//!
//! Both persistence engines implement their candidate queries in terms of
//! these predicates: the in-memory engine calls them directly, the
//! `PostgreSQL` engine encodes the same conditions in SQL.

use chrono::{DateTime, Utc};

use crate::{CartContents, Customer, CustomerKind};

/// A timestamp is stale when it is strictly older than the cutoff.
///
/// A row touched exactly at the cutoff is retained.
#[must_use]
pub fn is_stale(timestamp: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    timestamp < cutoff
}

/// Whether a customer may be deleted by the anonymous-customer job.
///
/// Registered customers are never candidates. An anonymous customer is a
/// candidate once stale, unless any order references it.
#[must_use]
pub fn customer_is_reclaimable(
    customer: &Customer,
    cutoff: DateTime<Utc>,
    has_orders: bool,
) -> bool {
    customer.anonymous && is_stale(customer.last_modified_date, cutoff) && !has_orders
}

/// Whether a shopper's carts may be thrown away with it.
///
/// Carts of anonymous or absent customers carry no durable value. A
/// registered customer's cart is only disposable when it holds nothing.
#[must_use]
pub const fn carts_are_disposable(owner: Option<CustomerKind>, carts: CartContents) -> bool {
    match owner {
        None | Some(CustomerKind::Anonymous) => true,
        Some(CustomerKind::Registered) => !carts.has_items(),
    }
}

/// Whether the session job may delete a shopper.
///
/// The shopper must be orphaned (no session references it) and its carts
/// must be disposable.
#[must_use]
pub const fn shopper_is_reclaimable(
    referencing_sessions: usize,
    owner: Option<CustomerKind>,
    carts: CartContents,
) -> bool {
    referencing_sessions == 0 && carts_are_disposable(owner, carts)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{CustomerId, Guid};

    fn customer(anonymous: bool, last_modified_date: DateTime<Utc>) -> Customer {
        Customer {
            id: CustomerId::new(1),
            guid: Guid::parse("C-1").unwrap(),
            anonymous,
            last_modified_date,
        }
    }

    #[test]
    fn test_is_stale_is_strict() {
        let cutoff = Utc::now();
        assert!(!is_stale(cutoff, cutoff));
        assert!(is_stale(cutoff - Duration::seconds(1), cutoff));
        assert!(!is_stale(cutoff + Duration::seconds(1), cutoff));
    }

    #[test]
    fn test_customer_at_cutoff_is_kept() {
        let cutoff = Utc::now();
        let at_cutoff = customer(true, cutoff);
        let before_cutoff = customer(true, cutoff - Duration::days(1));
        assert!(!customer_is_reclaimable(&at_cutoff, cutoff, false));
        assert!(customer_is_reclaimable(&before_cutoff, cutoff, false));
    }

    #[test]
    fn test_registered_customer_is_never_reclaimable() {
        let cutoff = Utc::now();
        let old = cutoff - Duration::days(400);
        let registered = customer(false, old);
        assert!(!customer_is_reclaimable(&registered, cutoff, false));
    }

    #[test]
    fn test_order_guard_wins_over_age() {
        let cutoff = Utc::now();
        let ancient = cutoff - Duration::days(10_000);
        let ordered = customer(true, ancient);
        assert!(!customer_is_reclaimable(&ordered, cutoff, true));
    }

    #[test]
    fn test_shopper_with_session_is_kept() {
        assert!(!shopper_is_reclaimable(1, None, CartContents::NoCart));
    }

    #[test]
    fn test_registered_non_empty_cart_is_kept() {
        let registered = Some(CustomerKind::Registered);
        let non_empty = CartContents::NonEmpty;
        assert!(!shopper_is_reclaimable(0, registered, non_empty));
        assert!(shopper_is_reclaimable(0, registered, CartContents::Empty));
        assert!(shopper_is_reclaimable(0, registered, CartContents::NoCart));
    }

    #[test]
    fn test_anonymous_or_absent_owner_cart_is_disposable() {
        assert!(shopper_is_reclaimable(
            0,
            Some(CustomerKind::Anonymous),
            CartContents::NonEmpty
        ));
        assert!(shopper_is_reclaimable(0, None, CartContents::NonEmpty));
    }
}
