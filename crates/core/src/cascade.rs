//! Ordered deletion plans.
//!
//! Foreign keys force children to go before parents. Rather than leaning on
//! `ON DELETE CASCADE`, each root type has an explicit plan: the list of
//! entity kinds to delete, in order, when that root is reclaimed. The last
//! entry of every plan is the root itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CustomerId, CustomerSessionId, ShopperId};

/// The kinds of rows a cascade can remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CartOrder,
    CartItem,
    ShoppingCart,
    WishList,
    CustomerSession,
    Shopper,
    CustomerConsentHistory,
    CustomerConsent,
    CustomerGroupMembership,
    CustomerProfileValue,
    CustomerAddress,
    Customer,
}

impl EntityKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CartOrder => "cart_order",
            Self::CartItem => "cart_item",
            Self::ShoppingCart => "shopping_cart",
            Self::WishList => "wish_list",
            Self::CustomerSession => "customer_session",
            Self::Shopper => "shopper",
            Self::CustomerConsentHistory => "customer_consent_history",
            Self::CustomerConsent => "customer_consent",
            Self::CustomerGroupMembership => "customer_group_member",
            Self::CustomerProfileValue => "customer_profile_value",
            Self::CustomerAddress => "customer_address",
            Self::Customer => "customer",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The type of entity a cascade starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    /// An anonymous customer and everything it owns, sessions included.
    Customer,
    /// An orphaned shopper. Sessions are not part of this plan: an orphan has
    /// none, and one that gained a session is no longer a candidate.
    Shopper,
    /// A single stale session.
    Session,
}

const CUSTOMER_PLAN: &[EntityKind] = &[
    EntityKind::CartOrder,
    EntityKind::CartItem,
    EntityKind::ShoppingCart,
    EntityKind::WishList,
    EntityKind::CustomerSession,
    EntityKind::Shopper,
    EntityKind::CustomerConsentHistory,
    EntityKind::CustomerConsent,
    EntityKind::CustomerGroupMembership,
    EntityKind::CustomerProfileValue,
    EntityKind::CustomerAddress,
    EntityKind::Customer,
];

const SHOPPER_PLAN: &[EntityKind] = &[
    EntityKind::CartOrder,
    EntityKind::CartItem,
    EntityKind::ShoppingCart,
    EntityKind::WishList,
    EntityKind::Shopper,
];

const SESSION_PLAN: &[EntityKind] = &[EntityKind::CustomerSession];

impl RootKind {
    /// Entity kinds to delete, children first, ending with the root.
    #[must_use]
    pub const fn plan(self) -> &'static [EntityKind] {
        match self {
            Self::Customer => CUSTOMER_PLAN,
            Self::Shopper => SHOPPER_PLAN,
            Self::Session => SESSION_PLAN,
        }
    }

    /// The entity kind of the root row itself.
    #[must_use]
    pub const fn entity(self) -> EntityKind {
        match self {
            Self::Customer => EntityKind::Customer,
            Self::Shopper => EntityKind::Shopper,
            Self::Session => EntityKind::CustomerSession,
        }
    }
}

/// A concrete root row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CascadeRoot {
    Customer(CustomerId),
    Shopper(ShopperId),
    Session(CustomerSessionId),
}

impl CascadeRoot {
    #[must_use]
    pub const fn kind(self) -> RootKind {
        match self {
            Self::Customer(_) => RootKind::Customer,
            Self::Shopper(_) => RootKind::Shopper,
            Self::Session(_) => RootKind::Session,
        }
    }

    /// The root's primary key, for logging.
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Customer(id) => id.as_i64(),
            Self::Shopper(id) => id.as_i64(),
            Self::Session(id) => id.as_i64(),
        }
    }
}

impl std::fmt::Display for CascadeRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind().entity(), self.id())
    }
}

/// A root picked by a candidate scan, with the condition it was picked under.
///
/// The condition is re-checked inside the unit of work that deletes it, so a
/// row that changed between scan and delete is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// Anonymous, last modified before `cutoff`, not referenced by an order.
    Customer {
        id: CustomerId,
        cutoff: DateTime<Utc>,
    },
    /// Orphaned, with disposable carts.
    Shopper { id: ShopperId },
    /// Last accessed before `cutoff`.
    Session {
        id: CustomerSessionId,
        cutoff: DateTime<Utc>,
    },
}

impl Candidate {
    #[must_use]
    pub const fn root(&self) -> CascadeRoot {
        match *self {
            Self::Customer { id, .. } => CascadeRoot::Customer(id),
            Self::Shopper { id } => CascadeRoot::Shopper(id),
            Self::Session { id, .. } => CascadeRoot::Session(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(plan: &[EntityKind], kind: EntityKind) -> usize {
        plan.iter()
            .position(|k| *k == kind)
            .unwrap_or(usize::MAX)
    }

    #[test]
    fn test_every_plan_ends_with_its_root() {
        for root in [RootKind::Customer, RootKind::Shopper, RootKind::Session] {
            assert_eq!(root.plan().last(), Some(&root.entity()));
        }
    }

    #[test]
    fn test_customer_plan_deletes_children_first() {
        let plan = RootKind::Customer.plan();
        for (child, parent) in [
            (EntityKind::CartOrder, EntityKind::ShoppingCart),
            (EntityKind::CartItem, EntityKind::ShoppingCart),
            (EntityKind::ShoppingCart, EntityKind::Shopper),
            (EntityKind::WishList, EntityKind::Shopper),
            (EntityKind::CustomerSession, EntityKind::Shopper),
            (EntityKind::Shopper, EntityKind::Customer),
            (EntityKind::CustomerConsentHistory, EntityKind::CustomerConsent),
        ] {
            let (first, then) = (position(plan, child), position(plan, parent));
            assert!(first < then, "{child} after {parent}");
        }
    }

    #[test]
    fn test_customer_plan_clears_profile_before_customer() {
        let plan = RootKind::Customer.plan();
        let customer = position(plan, EntityKind::Customer);
        for kind in [
            EntityKind::CustomerGroupMembership,
            EntityKind::CustomerProfileValue,
            EntityKind::CustomerAddress,
        ] {
            assert!(position(plan, kind) < customer, "{kind} after customer");
        }
    }

    #[test]
    fn test_shopper_plan_never_touches_sessions() {
        let plan = RootKind::Shopper.plan();
        assert!(!plan.contains(&EntityKind::CustomerSession));
        assert!(!plan.contains(&EntityKind::Customer));
    }

    #[test]
    fn test_session_plan_is_only_the_session() {
        assert_eq!(RootKind::Session.plan(), &[EntityKind::CustomerSession]);
    }

    #[test]
    fn test_candidate_root() {
        let candidate = Candidate::Shopper {
            id: ShopperId::new(9),
        };
        assert_eq!(candidate.root(), CascadeRoot::Shopper(ShopperId::new(9)));
        assert_eq!(candidate.root().to_string(), "shopper#9");
    }
}
