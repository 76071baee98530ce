use crate::{
    entities::{cart, cart_item, Cart, CartItem},
    errors::ServiceError,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Who a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartOwner {
    /// Authenticated user with a persisted cart.
    User(Uuid),
    /// Anonymous visitor identified by a cart session token.
    Guest(String),
}

/// One product line in a cart, backend independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl CartLine {
    pub fn new(product_id: Uuid, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            quantity,
            unit_price,
            total_price: unit_price * Decimal::from(quantity),
        }
    }

    /// Same line at a new quantity; the price snapshot is kept.
    pub fn with_quantity(&self, quantity: i32) -> Self {
        Self {
            quantity,
            total_price: self.unit_price * Decimal::from(quantity),
            ..self.clone()
        }
    }
}

impl From<cart_item::Model> for CartLine {
    fn from(item: cart_item::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
        }
    }
}

/// A single line mutation, decided by the cart service after stock was reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartChange {
    Insert(CartLine),
    Update(CartLine),
    Remove(CartLine),
}

/// Storage backend for cart lines.
///
/// Reservation logic lives in the cart service; a store only records lines.
/// Mutations are applied in two steps: `stage` runs inside the stock
/// transaction, and `publish` runs after that transaction committed. Stores
/// that cannot take part in a database transaction do their work in `publish`.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn lines(
        &self,
        txn: &DatabaseTransaction,
        owner: &CartOwner,
    ) -> Result<Vec<CartLine>, ServiceError>;

    async fn find_line(
        &self,
        txn: &DatabaseTransaction,
        owner: &CartOwner,
        item_id: Uuid,
    ) -> Result<CartLine, ServiceError> {
        self.lines(txn, owner)
            .await?
            .into_iter()
            .find(|line| line.id == item_id)
            .ok_or_else(|| ServiceError::not_found("Cart item", item_id))
    }

    async fn stage(
        &self,
        txn: &DatabaseTransaction,
        owner: &CartOwner,
        change: &CartChange,
    ) -> Result<(), ServiceError>;

    fn publish(&self, _owner: &CartOwner, _change: CartChange) {}

    /// Owners whose carts sat untouched for at least `ttl`. Stores that keep
    /// carts forever return nothing.
    fn idle_owners(&self, _ttl: Duration) -> Vec<CartOwner> {
        Vec::new()
    }

    /// The owner's lines if the cart is still idle, without touching it.
    fn idle_lines(&self, _owner: &CartOwner, _ttl: Duration) -> Option<Vec<CartLine>> {
        None
    }

    /// Forgets the owner's cart. Stock is the caller's business.
    fn discard(&self, _owner: &CartOwner) {}
}

/// Database-backed cart for authenticated users.
#[derive(Debug, Clone, Default)]
pub struct PersistentCartStore;

impl PersistentCartStore {
    fn user_id(owner: &CartOwner) -> Result<Uuid, ServiceError> {
        match owner {
            CartOwner::User(id) => Ok(*id),
            CartOwner::Guest(_) => Err(ServiceError::InternalError(
                "persistent cart requested for a guest session".to_string(),
            )),
        }
    }

    pub async fn find_cart(
        txn: &DatabaseTransaction,
        user_id: Uuid,
    ) -> Result<Option<cart::Model>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(txn)
            .await?)
    }

    /// Carts are created lazily on first access.
    pub async fn get_or_create_cart(
        txn: &DatabaseTransaction,
        user_id: Uuid,
    ) -> Result<cart::Model, ServiceError> {
        if let Some(existing) = Self::find_cart(txn, user_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(cart.insert(txn).await?)
    }

    pub async fn items(
        txn: &DatabaseTransaction,
        cart_id: Uuid,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(txn)
            .await?)
    }

    /// Deletes every line of the user's cart without touching stock; used
    /// when the lines become order items.
    pub async fn clear(txn: &DatabaseTransaction, cart_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(txn)
            .await?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl CartStore for PersistentCartStore {
    async fn lines(
        &self,
        txn: &DatabaseTransaction,
        owner: &CartOwner,
    ) -> Result<Vec<CartLine>, ServiceError> {
        let cart = Self::get_or_create_cart(txn, Self::user_id(owner)?).await?;
        Ok(Self::items(txn, cart.id)
            .await?
            .into_iter()
            .map(CartLine::from)
            .collect())
    }

    async fn find_line(
        &self,
        txn: &DatabaseTransaction,
        owner: &CartOwner,
        item_id: Uuid,
    ) -> Result<CartLine, ServiceError> {
        let user_id = Self::user_id(owner)?;
        let item = CartItem::find_by_id(item_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cart item", item_id))?;

        let owns_item = Self::find_cart(txn, user_id)
            .await?
            .map(|cart| cart.id == item.cart_id)
            .unwrap_or(false);
        if !owns_item {
            return Err(ServiceError::Forbidden(
                "cart item belongs to another cart".to_string(),
            ));
        }

        Ok(item.into())
    }

    async fn stage(
        &self,
        txn: &DatabaseTransaction,
        owner: &CartOwner,
        change: &CartChange,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        match change {
            CartChange::Insert(line) => {
                let cart = Self::get_or_create_cart(txn, Self::user_id(owner)?).await?;
                cart_item::ActiveModel {
                    id: Set(line.id),
                    cart_id: Set(cart.id),
                    product_id: Set(line.product_id),
                    quantity: Set(line.quantity),
                    unit_price: Set(line.unit_price),
                    total_price: Set(line.total_price),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await?;
            }
            CartChange::Update(line) => {
                let item = CartItem::find_by_id(line.id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Cart item", line.id))?;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(line.quantity);
                active.total_price = Set(line.total_price);
                active.updated_at = Set(now);
                active.update(txn).await?;
            }
            CartChange::Remove(line) => {
                CartItem::delete_by_id(line.id).exec(txn).await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct GuestCart {
    lines: Vec<CartLine>,
    touched_at: Instant,
}

impl Default for GuestCart {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            touched_at: Instant::now(),
        }
    }
}

impl GuestCart {
    fn is_idle(&self, ttl: Duration) -> bool {
        self.touched_at.elapsed() >= ttl
    }
}

/// In-process cart for anonymous visitors, keyed by session token.
///
/// Lines only change in `publish`, i.e. after the stock transaction
/// committed, so a failed reservation never leaves a phantom line behind.
/// Every read or write refreshes the cart's idle clock.
#[derive(Debug, Default)]
pub struct SessionCartStore {
    sessions: DashMap<String, GuestCart>,
}

impl SessionCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_key(owner: &CartOwner) -> Result<&str, ServiceError> {
        match owner {
            CartOwner::Guest(key) => Ok(key.as_str()),
            CartOwner::User(_) => Err(ServiceError::InternalError(
                "session cart requested for an authenticated user".to_string(),
            )),
        }
    }
}

#[async_trait]
impl CartStore for SessionCartStore {
    async fn lines(
        &self,
        _txn: &DatabaseTransaction,
        owner: &CartOwner,
    ) -> Result<Vec<CartLine>, ServiceError> {
        let key = Self::session_key(owner)?;
        Ok(match self.sessions.get_mut(key) {
            Some(mut cart) => {
                cart.touched_at = Instant::now();
                cart.lines.clone()
            }
            None => Vec::new(),
        })
    }

    async fn stage(
        &self,
        _txn: &DatabaseTransaction,
        owner: &CartOwner,
        _change: &CartChange,
    ) -> Result<(), ServiceError> {
        Self::session_key(owner).map(|_| ())
    }

    fn publish(&self, owner: &CartOwner, change: CartChange) {
        let CartOwner::Guest(key) = owner else {
            return;
        };
        let mut cart = self.sessions.entry(key.clone()).or_default();
        cart.touched_at = Instant::now();
        let lines = &mut cart.lines;
        match change {
            CartChange::Insert(line) => lines.push(line),
            CartChange::Update(line) => {
                if let Some(existing) = lines.iter_mut().find(|l| l.id == line.id) {
                    *existing = line;
                }
            }
            CartChange::Remove(line) => lines.retain(|l| l.id != line.id),
        }
    }

    fn idle_owners(&self, ttl: Duration) -> Vec<CartOwner> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_idle(ttl))
            .map(|entry| CartOwner::Guest(entry.key().clone()))
            .collect()
    }

    fn idle_lines(&self, owner: &CartOwner, ttl: Duration) -> Option<Vec<CartLine>> {
        let key = Self::session_key(owner).ok()?;
        self.sessions
            .get(key)
            .filter(|cart| cart.is_idle(ttl))
            .map(|cart| cart.lines.clone())
    }

    fn discard(&self, owner: &CartOwner) {
        if let CartOwner::Guest(key) = owner {
            self.sessions.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_total_tracks_quantity() {
        let line = CartLine::new(Uuid::new_v4(), 3, dec!(100000));
        assert_eq!(line.total_price, dec!(300000));

        let bumped = line.with_quantity(5);
        assert_eq!(bumped.id, line.id);
        assert_eq!(bumped.unit_price, dec!(100000));
        assert_eq!(bumped.total_price, dec!(500000));
    }

    #[test]
    fn session_store_applies_published_changes() {
        let store = SessionCartStore::new();
        let owner = CartOwner::Guest("abc".into());
        let line = CartLine::new(Uuid::new_v4(), 2, dec!(5000));

        store.publish(&owner, CartChange::Insert(line.clone()));
        store.publish(&owner, CartChange::Update(line.with_quantity(4)));
        {
            let cart = store.sessions.get("abc").unwrap();
            assert_eq!(cart.lines.len(), 1);
            assert_eq!(cart.lines[0].quantity, 4);
        }

        store.publish(&owner, CartChange::Remove(line));
        assert!(store.sessions.get("abc").unwrap().lines.is_empty());
    }

    #[test]
    fn only_idle_sessions_are_reported() {
        let store = SessionCartStore::new();
        let owner = CartOwner::Guest("idle".into());
        store.publish(
            &owner,
            CartChange::Insert(CartLine::new(Uuid::new_v4(), 1, dec!(700))),
        );

        assert!(store.idle_owners(Duration::from_secs(3600)).is_empty());
        assert!(store.idle_lines(&owner, Duration::from_secs(3600)).is_none());
        assert_eq!(store.idle_owners(Duration::ZERO), vec![owner.clone()]);
        assert_eq!(store.idle_lines(&owner, Duration::ZERO).map(|l| l.len()), Some(1));

        store.discard(&owner);
        assert!(store.idle_owners(Duration::ZERO).is_empty());
    }

    #[test]
    fn session_store_ignores_user_owners() {
        let store = SessionCartStore::new();
        let line = CartLine::new(Uuid::new_v4(), 1, dec!(1));
        store.publish(&CartOwner::User(Uuid::new_v4()), CartChange::Insert(line));
        assert!(store.sessions.is_empty());
    }
}
