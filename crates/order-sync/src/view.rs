//! Materialized order list.
//!
//! [`OrderView`] holds the orders visible to one subscriber, keyed by id,
//! with a separate position index so the list order never depends on
//! splicing a vector. The snapshot is kept in the order the server sent it
//! (newest first); inserts that arrive afterwards go in front of everything
//! already present, so later rows appear in arrival order.
//!
//! Changes that arrive before the snapshot are buffered and replayed, in
//! arrival order, once [`OrderView::load_snapshot`] is called.

use std::collections::{BTreeMap, HashMap};

use denim_core::{OrderChange, OrderId, OrderRecord, UserId};

/// Orders a view may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewScope {
    /// Every order (admin dashboards).
    All,
    /// Orders owned by one customer.
    Owner(UserId),
}

impl ViewScope {
    #[must_use]
    pub fn admits(self, change: &OrderChange) -> bool {
        self.admits_owner(change.owner())
    }

    #[must_use]
    pub fn admits_owner(self, owner: UserId) -> bool {
        match self {
            Self::All => true,
            Self::Owner(user_id) => user_id == owner,
        }
    }

    /// Value of the `scope` query parameter on the order endpoints.
    #[must_use]
    pub const fn query_value(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Owner(_) => "mine",
        }
    }
}

#[derive(Debug, Clone)]
struct Row {
    position: i64,
    order: OrderRecord,
}

impl Row {
    /// Overwrite the row's fields. The items already held are kept when the
    /// incoming row has none.
    fn replace(&mut self, mut order: OrderRecord) {
        if order.items.is_empty() {
            order.items = std::mem::take(&mut self.order.items);
        }
        self.order = order;
    }
}

/// Client-side order list kept current from a change feed.
#[derive(Debug, Clone)]
pub struct OrderView {
    scope: ViewScope,
    loaded: bool,
    pending: Vec<OrderChange>,
    rows: HashMap<OrderId, Row>,
    positions: BTreeMap<i64, OrderId>,
    /// Smallest position handed out so far; inserts take the one before it.
    front: i64,
}

impl OrderView {
    #[must_use]
    pub fn new(scope: ViewScope) -> Self {
        Self {
            scope,
            loaded: false,
            pending: Vec::new(),
            rows: HashMap::new(),
            positions: BTreeMap::new(),
            front: 0,
        }
    }

    #[must_use]
    pub const fn scope(&self) -> ViewScope {
        self.scope
    }

    /// Whether the snapshot has been loaded since the last reset.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Changes waiting for the snapshot.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: OrderId) -> Option<&OrderRecord> {
        self.rows.get(&id).map(|row| &row.order)
    }

    /// Current list, front first.
    #[must_use]
    pub fn orders(&self) -> Vec<OrderRecord> {
        self.positions
            .values()
            .filter_map(|id| self.rows.get(id))
            .map(|row| row.order.clone())
            .collect()
    }

    /// Replace the contents with a snapshot and replay buffered changes.
    ///
    /// Rows outside the view's scope are skipped, as are repeated ids.
    /// Returns the number of buffered changes replayed.
    pub fn load_snapshot(&mut self, orders: Vec<OrderRecord>) -> usize {
        self.rows.clear();
        self.positions.clear();
        self.front = 0;

        let mut position = 0_i64;
        for order in orders {
            if !self.scope.admits_owner(order.user_id) || self.rows.contains_key(&order.id) {
                continue;
            }
            self.positions.insert(position, order.id);
            self.rows.insert(order.id, Row { position, order });
            position += 1;
        }
        self.loaded = true;

        let pending = std::mem::take(&mut self.pending);
        let replayed = pending.len();
        for change in pending {
            self.merge(change);
        }
        replayed
    }

    /// Apply one change. Returns `true` if the visible list changed.
    ///
    /// Before the snapshot is loaded the change is buffered and `false` is
    /// returned. Changes for orders outside the view's scope are dropped.
    pub fn apply(&mut self, change: OrderChange) -> bool {
        if !self.scope.admits(&change) {
            tracing::trace!(order_id = %change.order_id(), "Dropping change outside view scope");
            return false;
        }
        if !self.loaded {
            self.pending.push(change);
            return false;
        }
        self.merge(change)
    }

    /// Forget everything and go back to buffering until the next snapshot.
    pub fn reset(&mut self) {
        self.loaded = false;
        self.pending.clear();
        self.rows.clear();
        self.positions.clear();
        self.front = 0;
    }

    fn merge(&mut self, change: OrderChange) -> bool {
        match change {
            OrderChange::Insert { order } => {
                if let Some(row) = self.rows.get_mut(&order.id) {
                    row.replace(order);
                    return true;
                }
                self.front -= 1;
                let position = self.front;
                self.positions.insert(position, order.id);
                self.rows.insert(order.id, Row { position, order });
                true
            }
            OrderChange::Update { order } => match self.rows.get_mut(&order.id) {
                Some(row) => {
                    row.replace(order);
                    true
                }
                None => {
                    tracing::debug!(order_id = %order.id, "Ignoring update for unknown order");
                    false
                }
            },
            OrderChange::Delete { id, .. } => match self.rows.remove(&id) {
                Some(row) => {
                    self.positions.remove(&row.position);
                    true
                }
                None => false,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use denim_core::{Cents, OrderItemRecord, OrderStatus, ProductId};

    use super::*;

    fn order(owner: UserId, status: OrderStatus, day: u32) -> OrderRecord {
        let at = Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap();
        OrderRecord {
            id: OrderId::generate(),
            user_id: owner,
            status,
            subtotal_cents: Cents::new(45_000),
            shipping_cents: Cents::new(0),
            total_cents: Cents::new(45_000),
            customer_name: Some("Selma".to_string()),
            customer_email: None,
            customer_phone: None,
            shipping_address: None,
            shipping_city: None,
            shipping_postal_code: None,
            shipping_country: None,
            notes: None,
            created_at: at,
            updated_at: at,
            items: Vec::new(),
        }
    }

    fn with_item(mut order: OrderRecord) -> OrderRecord {
        order.items.push(OrderItemRecord {
            product_id: Some(ProductId::generate()),
            product_title: Some("Slim Selvedge".to_string()),
            size_id: None,
            quantity: 1,
            price_cents: Cents::new(45_000),
        });
        order
    }

    fn ids(view: &OrderView) -> Vec<OrderId> {
        view.orders().iter().map(|o| o.id).collect()
    }

    #[test]
    fn test_snapshot_order_is_kept_and_inserts_go_first() {
        let owner = UserId::generate();
        let newest = order(owner, OrderStatus::Paid, 3);
        let oldest = order(owner, OrderStatus::Delivered, 1);
        let mut view = OrderView::new(ViewScope::Owner(owner));
        view.load_snapshot(vec![newest.clone(), oldest.clone()]);

        let first = order(owner, OrderStatus::Pending, 4);
        let second = order(owner, OrderStatus::Pending, 5);
        assert!(view.apply(OrderChange::Insert { order: first.clone() }));
        assert!(view.apply(OrderChange::Insert { order: second.clone() }));

        assert_eq!(ids(&view), [second.id, first.id, newest.id, oldest.id]);
    }

    #[test]
    fn test_update_replaces_fields_and_keeps_items() {
        let owner = UserId::generate();
        let placed = with_item(order(owner, OrderStatus::Paid, 2));
        let mut view = OrderView::new(ViewScope::Owner(owner));
        view.load_snapshot(vec![placed.clone()]);

        let mut shipped = placed.clone();
        shipped.status = OrderStatus::Shipped;
        shipped.items.clear();
        assert!(view.apply(OrderChange::Update { order: shipped }));

        let current = view.get(placed.id).unwrap();
        assert_eq!(current.status, OrderStatus::Shipped);
        assert_eq!(current.items.len(), 1);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn test_delete_removes_row() {
        let owner = UserId::generate();
        let keep = order(owner, OrderStatus::Paid, 2);
        let gone = order(owner, OrderStatus::Cancelled, 1);
        let mut view = OrderView::new(ViewScope::Owner(owner));
        view.load_snapshot(vec![keep.clone(), gone.clone()]);

        assert!(view.apply(OrderChange::Delete {
            id: gone.id,
            user_id: owner
        }));
        assert_eq!(ids(&view), [keep.id]);
        assert!(!view.apply(OrderChange::Delete {
            id: gone.id,
            user_id: owner
        }));
    }

    #[test]
    fn test_changes_before_snapshot_are_replayed_in_order() {
        let owner = UserId::generate();
        let existing = order(owner, OrderStatus::Paid, 1);
        let fresh = order(owner, OrderStatus::Pending, 2);
        let mut view = OrderView::new(ViewScope::Owner(owner));

        let mut shipped = existing.clone();
        shipped.status = OrderStatus::Shipped;
        assert!(!view.apply(OrderChange::Insert { order: fresh.clone() }));
        assert!(!view.apply(OrderChange::Update { order: shipped }));
        assert!(!view.apply(OrderChange::Delete {
            id: fresh.id,
            user_id: owner
        }));
        assert_eq!(view.pending_len(), 3);
        assert!(view.is_empty());

        assert_eq!(view.load_snapshot(vec![existing.clone()]), 3);
        assert_eq!(view.pending_len(), 0);
        assert_eq!(ids(&view), [existing.id]);
        assert_eq!(view.get(existing.id).unwrap().status, OrderStatus::Shipped);
    }

    #[test]
    fn test_insert_already_in_snapshot_does_not_duplicate() {
        let owner = UserId::generate();
        let placed = with_item(order(owner, OrderStatus::Pending, 1));
        let mut view = OrderView::new(ViewScope::Owner(owner));

        let mut from_feed = placed.clone();
        from_feed.items.clear();
        view.apply(OrderChange::Insert { order: from_feed });
        view.load_snapshot(vec![placed.clone()]);

        assert_eq!(view.len(), 1);
        assert_eq!(view.get(placed.id).unwrap().items.len(), 1);
    }

    #[test]
    fn test_owner_view_never_merges_foreign_orders() {
        let owner = UserId::generate();
        let stranger = UserId::generate();
        let mine = order(owner, OrderStatus::Paid, 1);
        let theirs = order(stranger, OrderStatus::Paid, 2);

        let mut view = OrderView::new(ViewScope::Owner(owner));
        assert!(!view.apply(OrderChange::Insert { order: theirs.clone() }));
        assert_eq!(view.pending_len(), 0);
        view.load_snapshot(vec![theirs.clone(), mine.clone()]);
        assert!(!view.apply(OrderChange::Insert { order: theirs.clone() }));
        assert!(!view.apply(OrderChange::Delete {
            id: mine.id,
            user_id: stranger
        }));
        assert_eq!(ids(&view), [mine.id]);

        let mut admin = OrderView::new(ViewScope::All);
        admin.load_snapshot(vec![mine.clone()]);
        assert!(admin.apply(OrderChange::Insert { order: theirs.clone() }));
        assert_eq!(ids(&admin), [theirs.id, mine.id]);
    }

    #[test]
    fn test_update_for_unknown_order_is_ignored() {
        let owner = UserId::generate();
        let mut view = OrderView::new(ViewScope::Owner(owner));
        view.load_snapshot(Vec::new());
        assert!(!view.apply(OrderChange::Update {
            order: order(owner, OrderStatus::Shipped, 1)
        }));
        assert!(view.is_empty());
    }

    #[test]
    fn test_matches_applying_changes_to_a_plain_list() {
        let owner = UserId::generate();
        let a = order(owner, OrderStatus::Paid, 3);
        let b = order(owner, OrderStatus::Paid, 2);
        let c = order(owner, OrderStatus::Pending, 1);
        let d = order(owner, OrderStatus::Pending, 4);
        let mut a_shipped = a.clone();
        a_shipped.status = OrderStatus::Shipped;
        let mut d_paid = d.clone();
        d_paid.status = OrderStatus::Paid;

        let changes = vec![
            OrderChange::Insert { order: d.clone() },
            OrderChange::Update { order: a_shipped },
            OrderChange::Delete {
                id: b.id,
                user_id: owner,
            },
            OrderChange::Update { order: d_paid },
        ];

        let mut expected = vec![a.clone(), b.clone(), c.clone()];
        for change in changes.clone() {
            match change {
                OrderChange::Insert { order } => expected.insert(0, order),
                OrderChange::Update { order } => {
                    if let Some(slot) = expected.iter_mut().find(|o| o.id == order.id) {
                        *slot = order;
                    }
                }
                OrderChange::Delete { id, .. } => expected.retain(|o| o.id != id),
            }
        }

        let mut view = OrderView::new(ViewScope::Owner(owner));
        view.load_snapshot(vec![a, b, c]);
        for change in changes {
            view.apply(change);
        }
        assert_eq!(view.orders(), expected);
    }

    #[test]
    fn test_reset_goes_back_to_buffering() {
        let owner = UserId::generate();
        let mut view = OrderView::new(ViewScope::Owner(owner));
        view.load_snapshot(vec![order(owner, OrderStatus::Paid, 1)]);
        view.reset();

        assert!(!view.is_loaded());
        assert!(view.is_empty());
        assert!(!view.apply(OrderChange::Insert {
            order: order(owner, OrderStatus::Pending, 2)
        }));
        assert_eq!(view.pending_len(), 1);
    }

    #[test]
    fn test_scope_query_values() {
        assert_eq!(ViewScope::All.query_value(), "all");
        assert_eq!(ViewScope::Owner(UserId::generate()).query_value(), "mine");
    }
}
