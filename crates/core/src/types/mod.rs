//! Core types for Sweeper.
//!
//! This module provides type-safe wrappers for the storefront actor graph.

pub mod entity;
pub mod guid;
pub mod id;
pub mod status;

pub use entity::{
    CartOrder, Customer, CustomerAddress, CustomerConsent, CustomerGroupMembership,
    CustomerProfileValue, CustomerSession, Order, Shopper, ShoppingCart, WishList,
};
pub use guid::{Guid, GuidError};
pub use id::*;
pub use status::*;
