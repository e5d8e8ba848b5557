//! Persisted storefront entities touched by reclamation.
//!
//! These records mirror the rows the jobs read. Request handling creates and
//! mutates them; the jobs only ever read and delete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    CartOrderId, CustomerAddressId, CustomerConsentId, CustomerGroupId, CustomerId, CustomerKind,
    CustomerProfileValueId, CustomerSessionId, Guid, OrderId, ShopperId, ShoppingCartId,
    WishListId,
};

/// A customer identity, anonymous or registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Customer {
    pub id: CustomerId,
    pub guid: Guid,
    pub anonymous: bool,
    pub last_modified_date: DateTime<Utc>,
}

impl Customer {
    /// Whether this identity is anonymous or registered.
    #[must_use]
    pub const fn kind(&self) -> CustomerKind {
        CustomerKind::from_anonymous(self.anonymous)
    }
}

/// A placed order. Its mere existence protects the referenced customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub guid: Guid,
    pub customer_id: CustomerId,
    /// GUID of the cart the order was placed from, if known.
    pub shopping_cart_guid: Option<Guid>,
}

/// A browsing session. `last_accessed_date` is the only staleness signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct CustomerSession {
    pub id: CustomerSessionId,
    pub guid: Guid,
    pub shopper_id: ShopperId,
    pub creation_date: DateTime<Utc>,
    pub last_accessed_date: DateTime<Utc>,
}

/// The shopping persona a session points at.
///
/// The customer reference is weak: it may be absent, and a shopper may
/// outlive the customer it once belonged to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Shopper {
    pub id: ShopperId,
    pub guid: Guid,
    pub customer_id: Option<CustomerId>,
}

/// A shopping cart and the number of line items it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingCart {
    pub id: ShoppingCartId,
    pub guid: Guid,
    pub shopper_id: ShopperId,
    pub line_item_count: u32,
}

impl ShoppingCart {
    /// A cart is empty when it has zero line items.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.line_item_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishList {
    pub id: WishListId,
    pub guid: Guid,
    pub shopper_id: ShopperId,
}

/// A draft order keyed by the GUID of the cart it was started from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartOrder {
    pub id: CartOrderId,
    pub guid: Guid,
    pub shopping_cart_guid: Guid,
}

/// A data-policy consent granted by a customer.
///
/// Consents never protect a customer; they go with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerConsent {
    pub id: CustomerConsentId,
    pub guid: Guid,
    pub customer_guid: Guid,
    pub consent_date: DateTime<Utc>,
}

/// One profile attribute (first name, email, locale...) of a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfileValue {
    pub id: CustomerProfileValueId,
    pub customer_id: CustomerId,
    pub attribute_key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAddress {
    pub id: CustomerAddressId,
    pub guid: Guid,
    pub customer_id: CustomerId,
}

/// A customer's membership of a customer group. Groups are shared and
/// outlive their members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerGroupMembership {
    pub customer_id: CustomerId,
    pub customer_group_id: CustomerGroupId,
}
