//! In-process persistence engine.
//!
//! Holds the storefront graph in ordered maps behind a `tokio` mutex. A unit
//! of work takes the lock, edits a private copy of the state and writes it
//! back on commit, so an uncommitted unit leaves no trace.
//!
//! Candidate scans call the predicates in [`sweeper_core::eligibility`]
//! directly; the `PostgreSQL` engine encodes the same rules in SQL.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sweeper_core::eligibility;
use sweeper_core::{
    BatchSize, Candidate, CartContents, CartOrder, CartOrderId, CascadeRoot, Customer,
    CustomerAddress, CustomerAddressId, CustomerConsent, CustomerConsentId, CustomerGroupId,
    CustomerGroupMembership, CustomerId, CustomerProfileValue, CustomerProfileValueId,
    CustomerSession, CustomerSessionId, EntityKind, Guid, Order, OrderId, Shopper, ShopperId,
    ShoppingCart, ShoppingCartId, WishList, WishListId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Backlog, ReclaimStore, Recheck, RepositoryError, UnitOfWork};

/// Row counts per table, for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub customers: usize,
    pub orders: usize,
    pub shoppers: usize,
    pub sessions: usize,
    pub carts: usize,
    pub cart_items: usize,
    pub wish_lists: usize,
    pub cart_orders: usize,
    pub consents: usize,
    pub consent_history: usize,
    pub profile_values: usize,
    pub addresses: usize,
    pub group_memberships: usize,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    customers: BTreeMap<CustomerId, Customer>,
    orders: BTreeMap<OrderId, Order>,
    shoppers: BTreeMap<ShopperId, Shopper>,
    sessions: BTreeMap<CustomerSessionId, CustomerSession>,
    carts: BTreeMap<ShoppingCartId, ShoppingCart>,
    wish_lists: BTreeMap<WishListId, WishList>,
    cart_orders: BTreeMap<CartOrderId, CartOrder>,
    consents: BTreeMap<CustomerConsentId, CustomerConsent>,
    consent_history: Vec<CustomerConsent>,
    profile_values: BTreeMap<CustomerProfileValueId, CustomerProfileValue>,
    addresses: BTreeMap<CustomerAddressId, CustomerAddress>,
    group_memberships: HashSet<CustomerGroupMembership>,
    failing: HashSet<CascadeRoot>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn shoppers_of(&self, customer: CustomerId) -> Vec<ShopperId> {
        self.shoppers
            .values()
            .filter(|s| s.customer_id == Some(customer))
            .map(|s| s.id)
            .collect()
    }

    fn has_orders(&self, customer: CustomerId) -> bool {
        let shoppers = self.shoppers_of(customer);
        let cart_guids: Vec<&Guid> = self
            .carts
            .values()
            .filter(|cart| shoppers.contains(&cart.shopper_id))
            .map(|cart| &cart.guid)
            .collect();

        self.orders.values().any(|order| {
            order.customer_id == customer
                || order
                    .shopping_cart_guid
                    .as_ref()
                    .is_some_and(|guid| cart_guids.contains(&guid))
        })
    }

    fn customer_is_reclaimable(&self, customer: &Customer, cutoff: DateTime<Utc>) -> bool {
        eligibility::customer_is_reclaimable(customer, cutoff, self.has_orders(customer.id))
    }

    fn shopper_is_reclaimable(&self, shopper: &Shopper) -> bool {
        let sessions = self
            .sessions
            .values()
            .filter(|session| session.shopper_id == shopper.id)
            .count();
        let owner = shopper
            .customer_id
            .and_then(|id| self.customers.get(&id))
            .map(Customer::kind);
        let carts = CartContents::from_line_item_counts(
            self.carts
                .values()
                .filter(|cart| cart.shopper_id == shopper.id)
                .map(|cart| cart.line_item_count),
        );
        eligibility::shopper_is_reclaimable(sessions, owner, carts)
    }

    fn stale_sessions(&self, cutoff: DateTime<Utc>) -> Vec<&CustomerSession> {
        let mut sessions: Vec<&CustomerSession> = self
            .sessions
            .values()
            .filter(|session| eligibility::is_stale(session.last_accessed_date, cutoff))
            .collect();
        sessions.sort_by_key(|session| (session.last_accessed_date, session.id));
        sessions
    }

    fn stale_anonymous(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &Customer> {
        self.customers.values().filter(move |customer| {
            customer.anonymous && eligibility::is_stale(customer.last_modified_date, cutoff)
        })
    }

    /// The shoppers whose owned rows a root's cascade covers.
    fn owned_shoppers(&self, root: CascadeRoot) -> Vec<ShopperId> {
        match root {
            CascadeRoot::Customer(id) => self.shoppers_of(id),
            CascadeRoot::Shopper(id) => vec![id],
            CascadeRoot::Session(_) => Vec::new(),
        }
    }

    fn customer_guid(&self, root: CascadeRoot) -> Option<Guid> {
        match root {
            CascadeRoot::Customer(id) => self.customers.get(&id).map(|c| c.guid.clone()),
            _ => None,
        }
    }

    fn delete_owned(
        &mut self,
        kind: EntityKind,
        root: CascadeRoot,
    ) -> Result<u64, RepositoryError> {
        if !root.kind().plan().contains(&kind) {
            return Err(RepositoryError::InvalidCascade { kind, root });
        }
        if kind == root.kind().entity() && self.failing.contains(&root) {
            return Err(RepositoryError::Unavailable(format!(
                "injected failure deleting {root}"
            )));
        }

        let shoppers = self.owned_shoppers(root);
        let removed = match kind {
            EntityKind::CartOrder => {
                let cart_guids: Vec<Guid> = self
                    .carts
                    .values()
                    .filter(|cart| shoppers.contains(&cart.shopper_id))
                    .map(|cart| cart.guid.clone())
                    .collect();
                remove_where(&mut self.cart_orders, |co| {
                    cart_guids.contains(&co.shopping_cart_guid)
                })
            }
            EntityKind::CartItem => self
                .carts
                .values_mut()
                .filter(|cart| shoppers.contains(&cart.shopper_id))
                .map(|cart| u64::from(std::mem::take(&mut cart.line_item_count)))
                .sum(),
            EntityKind::ShoppingCart => {
                remove_where(&mut self.carts, |cart| shoppers.contains(&cart.shopper_id))
            }
            EntityKind::WishList => {
                remove_where(&mut self.wish_lists, |wl| shoppers.contains(&wl.shopper_id))
            }
            EntityKind::CustomerSession => match root {
                CascadeRoot::Session(id) => u64::from(self.sessions.remove(&id).is_some()),
                _ => remove_where(&mut self.sessions, |s| shoppers.contains(&s.shopper_id)),
            },
            EntityKind::Shopper => remove_where(&mut self.shoppers, |s| shoppers.contains(&s.id)),
            EntityKind::CustomerConsentHistory => {
                let Some(guid) = self.customer_guid(root) else {
                    return Ok(0);
                };
                let before = self.consent_history.len();
                self.consent_history.retain(|h| h.customer_guid != guid);
                (before - self.consent_history.len()) as u64
            }
            EntityKind::CustomerConsent => {
                let Some(guid) = self.customer_guid(root) else {
                    return Ok(0);
                };
                remove_where(&mut self.consents, |cc| cc.customer_guid == guid)
            }
            EntityKind::CustomerGroupMembership => match root {
                CascadeRoot::Customer(id) => {
                    let before = self.group_memberships.len();
                    self.group_memberships.retain(|m| m.customer_id != id);
                    (before - self.group_memberships.len()) as u64
                }
                _ => 0,
            },
            EntityKind::CustomerProfileValue => match root {
                CascadeRoot::Customer(id) => {
                    remove_where(&mut self.profile_values, |pv| pv.customer_id == id)
                }
                _ => 0,
            },
            EntityKind::CustomerAddress => match root {
                CascadeRoot::Customer(id) => {
                    remove_where(&mut self.addresses, |a| a.customer_id == id)
                }
                _ => 0,
            },
            EntityKind::Customer => match root {
                CascadeRoot::Customer(id) => {
                    let removed = self.customers.remove(&id).is_some();
                    // shopper.customer_id is ON DELETE SET NULL
                    for shopper in self.shoppers.values_mut() {
                        if shopper.customer_id == Some(id) {
                            shopper.customer_id = None;
                        }
                    }
                    u64::from(removed)
                }
                _ => 0,
            },
        };

        Ok(removed)
    }
}

fn remove_where<K: Ord, V>(map: &mut BTreeMap<K, V>, pred: impl Fn(&V) -> bool) -> u64 {
    let before = map.len();
    map.retain(|_, v| !pred(v));
    (before - map.len()) as u64
}

fn guid() -> Guid {
    Guid::generate()
}

/// In-memory [`ReclaimStore`].
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_customer(
        &self,
        anonymous: bool,
        last_modified_date: DateTime<Utc>,
    ) -> Customer {
        let mut state = self.state.lock().await;
        let customer = Customer {
            id: CustomerId::new(state.next_id()),
            guid: guid(),
            anonymous,
            last_modified_date,
        };
        state.customers.insert(customer.id, customer.clone());
        customer
    }

    pub async fn insert_shopper(&self, customer_id: Option<CustomerId>) -> Shopper {
        let mut state = self.state.lock().await;
        let shopper = Shopper {
            id: ShopperId::new(state.next_id()),
            guid: guid(),
            customer_id,
        };
        state.shoppers.insert(shopper.id, shopper.clone());
        shopper
    }

    pub async fn insert_session(
        &self,
        shopper_id: ShopperId,
        creation_date: DateTime<Utc>,
        last_accessed_date: DateTime<Utc>,
    ) -> CustomerSession {
        let mut state = self.state.lock().await;
        let session = CustomerSession {
            id: CustomerSessionId::new(state.next_id()),
            guid: guid(),
            shopper_id,
            creation_date,
            last_accessed_date,
        };
        state.sessions.insert(session.id, session.clone());
        session
    }

    /// Add a cart holding `line_item_count` line items.
    pub async fn insert_cart(&self, shopper_id: ShopperId, line_item_count: u32) -> ShoppingCart {
        let mut state = self.state.lock().await;
        let cart = ShoppingCart {
            id: ShoppingCartId::new(state.next_id()),
            guid: guid(),
            shopper_id,
            line_item_count,
        };
        state.carts.insert(cart.id, cart.clone());
        cart
    }

    pub async fn insert_wish_list(&self, shopper_id: ShopperId) -> WishList {
        let mut state = self.state.lock().await;
        let wish_list = WishList {
            id: WishListId::new(state.next_id()),
            guid: guid(),
            shopper_id,
        };
        state.wish_lists.insert(wish_list.id, wish_list.clone());
        wish_list
    }

    pub async fn insert_cart_order(&self, shopping_cart_guid: &Guid) -> CartOrder {
        let mut state = self.state.lock().await;
        let cart_order = CartOrder {
            id: CartOrderId::new(state.next_id()),
            guid: guid(),
            shopping_cart_guid: shopping_cart_guid.clone(),
        };
        state.cart_orders.insert(cart_order.id, cart_order.clone());
        cart_order
    }

    pub async fn insert_order(
        &self,
        customer_id: CustomerId,
        shopping_cart_guid: Option<Guid>,
    ) -> Order {
        let mut state = self.state.lock().await;
        let order = Order {
            id: OrderId::new(state.next_id()),
            guid: guid(),
            customer_id,
            shopping_cart_guid,
        };
        state.orders.insert(order.id, order.clone());
        order
    }

    /// Record a consent and its history entry.
    pub async fn insert_consent(
        &self,
        customer_guid: &Guid,
        consent_date: DateTime<Utc>,
    ) -> CustomerConsent {
        let mut state = self.state.lock().await;
        let consent = CustomerConsent {
            id: CustomerConsentId::new(state.next_id()),
            guid: guid(),
            customer_guid: customer_guid.clone(),
            consent_date,
        };
        state.consents.insert(consent.id, consent.clone());
        state.consent_history.push(consent.clone());
        consent
    }

    pub async fn insert_profile_value(
        &self,
        customer_id: CustomerId,
        attribute_key: &str,
        value: &str,
    ) -> CustomerProfileValue {
        let mut state = self.state.lock().await;
        let profile_value = CustomerProfileValue {
            id: CustomerProfileValueId::new(state.next_id()),
            customer_id,
            attribute_key: attribute_key.to_string(),
            value: value.to_string(),
        };
        state
            .profile_values
            .insert(profile_value.id, profile_value.clone());
        profile_value
    }

    pub async fn insert_address(&self, customer_id: CustomerId) -> CustomerAddress {
        let mut state = self.state.lock().await;
        let address = CustomerAddress {
            id: CustomerAddressId::new(state.next_id()),
            guid: guid(),
            customer_id,
        };
        state.addresses.insert(address.id, address.clone());
        address
    }

    pub async fn add_to_group(&self, customer_id: CustomerId, customer_group_id: CustomerGroupId) {
        self.state
            .lock()
            .await
            .group_memberships
            .insert(CustomerGroupMembership {
                customer_id,
                customer_group_id,
            });
    }

    /// Simulate request traffic on a session.
    pub async fn touch_session(&self, id: CustomerSessionId, at: DateTime<Utc>) {
        if let Some(session) = self.state.lock().await.sessions.get_mut(&id) {
            session.last_accessed_date = at;
        }
    }

    pub async fn touch_customer(&self, id: CustomerId, at: DateTime<Utc>) {
        if let Some(customer) = self.state.lock().await.customers.get_mut(&id) {
            customer.last_modified_date = at;
        }
    }

    /// Make every cascade rooted at `root` fail before it commits.
    pub async fn fail_deletes_of(&self, root: CascadeRoot) {
        self.state.lock().await.failing.insert(root);
    }

    pub async fn customer(&self, id: CustomerId) -> Option<Customer> {
        self.state.lock().await.customers.get(&id).cloned()
    }

    pub async fn shopper(&self, id: ShopperId) -> Option<Shopper> {
        self.state.lock().await.shoppers.get(&id).cloned()
    }

    pub async fn session(&self, id: CustomerSessionId) -> Option<CustomerSession> {
        self.state.lock().await.sessions.get(&id).cloned()
    }

    pub async fn cart(&self, id: ShoppingCartId) -> Option<ShoppingCart> {
        self.state.lock().await.carts.get(&id).cloned()
    }

    pub async fn wish_list(&self, id: WishListId) -> Option<WishList> {
        self.state.lock().await.wish_lists.get(&id).cloned()
    }

    pub async fn cart_order(&self, id: CartOrderId) -> Option<CartOrder> {
        self.state.lock().await.cart_orders.get(&id).cloned()
    }

    pub async fn consents_for(&self, customer_guid: &Guid) -> Vec<CustomerConsent> {
        self.state
            .lock()
            .await
            .consents
            .values()
            .filter(|consent| &consent.customer_guid == customer_guid)
            .cloned()
            .collect()
    }

    pub async fn consent_history_for(&self, customer_guid: &Guid) -> usize {
        self.state
            .lock()
            .await
            .consent_history
            .iter()
            .filter(|entry| &entry.customer_guid == customer_guid)
            .count()
    }

    pub async fn profile_values_for(&self, customer_id: CustomerId) -> usize {
        self.state
            .lock()
            .await
            .profile_values
            .values()
            .filter(|pv| pv.customer_id == customer_id)
            .count()
    }

    pub async fn addresses_for(&self, customer_id: CustomerId) -> usize {
        self.state
            .lock()
            .await
            .addresses
            .values()
            .filter(|address| address.customer_id == customer_id)
            .count()
    }

    pub async fn groups_of(&self, customer_id: CustomerId) -> Vec<CustomerGroupId> {
        let mut groups: Vec<CustomerGroupId> = self
            .state
            .lock()
            .await
            .group_memberships
            .iter()
            .filter(|m| m.customer_id == customer_id)
            .map(|m| m.customer_group_id)
            .collect();
        groups.sort_unstable();
        groups
    }

    pub async fn counts(&self) -> TableCounts {
        let state = self.state.lock().await;
        TableCounts {
            customers: state.customers.len(),
            orders: state.orders.len(),
            shoppers: state.shoppers.len(),
            sessions: state.sessions.len(),
            carts: state.carts.len(),
            cart_items: state
                .carts
                .values()
                .map(|cart| cart.line_item_count as usize)
                .sum(),
            wish_lists: state.wish_lists.len(),
            cart_orders: state.cart_orders.len(),
            consents: state.consents.len(),
            consent_history: state.consent_history.len(),
            profile_values: state.profile_values.len(),
            addresses: state.addresses.len(),
            group_memberships: state.group_memberships.len(),
        }
    }
}

impl ReclaimStore for MemoryStore {
    type Unit<'a> = MemoryUnit;

    async fn begin(&self) -> Result<MemoryUnit, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryUnit { guard, working })
    }

    async fn find_stale_anonymous_customers(
        &self,
        cutoff: DateTime<Utc>,
        limit: BatchSize,
    ) -> Result<Vec<Customer>, RepositoryError> {
        let state = self.state.lock().await;
        let mut customers: Vec<&Customer> = state
            .stale_anonymous(cutoff)
            .filter(|customer| !state.has_orders(customer.id))
            .collect();
        customers.sort_by_key(|customer| (customer.last_modified_date, customer.id));

        Ok(customers
            .into_iter()
            .take(limit.as_usize())
            .cloned()
            .collect())
    }

    async fn find_stale_sessions(
        &self,
        cutoff: DateTime<Utc>,
        limit: BatchSize,
    ) -> Result<Vec<CustomerSession>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .stale_sessions(cutoff)
            .into_iter()
            .take(limit.as_usize())
            .cloned()
            .collect())
    }

    async fn find_reclaimable_shoppers(
        &self,
        limit: BatchSize,
    ) -> Result<Vec<Shopper>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .shoppers
            .values()
            .filter(|shopper| state.shopper_is_reclaimable(shopper))
            .take(limit.as_usize())
            .cloned()
            .collect())
    }

    async fn backlog(
        &self,
        session_cutoff: DateTime<Utc>,
        customer_cutoff: DateTime<Utc>,
    ) -> Result<Backlog, RepositoryError> {
        let state = self.state.lock().await;
        let (guarded, free): (Vec<&Customer>, Vec<&Customer>) = state
            .stale_anonymous(customer_cutoff)
            .partition(|customer| state.has_orders(customer.id));

        Ok(Backlog {
            stale_sessions: state.stale_sessions(session_cutoff).len() as u64,
            reclaimable_shoppers: state
                .shoppers
                .values()
                .filter(|shopper| state.shopper_is_reclaimable(shopper))
                .count() as u64,
            stale_anonymous_customers: free.len() as u64,
            order_guarded_customers: guarded.len() as u64,
        })
    }
}

/// A unit of work over [`MemoryStore`]. Holds the store lock until it is
/// committed or dropped.
pub struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl UnitOfWork for MemoryUnit {
    async fn recheck(&mut self, candidate: Candidate) -> Result<Recheck, RepositoryError> {
        let state = &self.working;
        let eligible = match candidate {
            Candidate::Customer { id, cutoff } => match state.customers.get(&id) {
                None => return Ok(Recheck::Gone),
                Some(customer) => state.customer_is_reclaimable(customer, cutoff),
            },
            Candidate::Shopper { id } => match state.shoppers.get(&id) {
                None => return Ok(Recheck::Gone),
                Some(shopper) => state.shopper_is_reclaimable(shopper),
            },
            Candidate::Session { id, cutoff } => match state.sessions.get(&id) {
                None => return Ok(Recheck::Gone),
                Some(session) => eligibility::is_stale(session.last_accessed_date, cutoff),
            },
        };

        Ok(if eligible {
            Recheck::Eligible
        } else {
            Recheck::Ineligible
        })
    }

    async fn delete_owned(
        &mut self,
        kind: EntityKind,
        root: CascadeRoot,
    ) -> Result<u64, RepositoryError> {
        self.working.delete_owned(kind, root)
    }

    async fn commit(mut self) -> Result<(), RepositoryError> {
        *self.guard = self.working;
        Ok(())
    }
}
