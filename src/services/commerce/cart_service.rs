use super::{
    cart_store::{CartChange, CartLine, CartOwner, CartStore, PersistentCartStore, SessionCartStore},
    pricing::{self, OrderTotals, PricingPolicy},
};
use crate::{
    entities::{product, Product},
    errors::ServiceError,
    services::inventory,
};
use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Shopping cart service.
///
/// Owns the stock reservation rules shared by both cart backends: every
/// add, quantity change and removal moves `products.stock_quantity` in the
/// same transaction that records the cart line, so the cart never holds
/// more than was reserved. Authenticated users get the persistent store,
/// guests the session store.
///
/// Operations on one cart are serialized by a per-owner lock held from the
/// first read of its lines until the change is published.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    persistent: Arc<dyn CartStore>,
    session: Arc<dyn CartStore>,
    pricing: PricingPolicy,
    locks: Arc<DashMap<CartOwner, Arc<Mutex<()>>>>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, pricing: PricingPolicy) -> Self {
        Self::with_stores(
            db,
            Arc::new(PersistentCartStore),
            Arc::new(SessionCartStore::new()),
            pricing,
        )
    }

    pub fn with_stores(
        db: Arc<DatabaseConnection>,
        persistent: Arc<dyn CartStore>,
        session: Arc<dyn CartStore>,
        pricing: PricingPolicy,
    ) -> Self {
        Self {
            db,
            persistent,
            session,
            pricing,
            locks: Arc::new(DashMap::new()),
        }
    }

    async fn lock_owner(&self, owner: &CartOwner) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(owner.clone()).or_default().clone();
        lock.lock_owned().await
    }

    fn store_for(&self, owner: &CartOwner) -> &dyn CartStore {
        match owner {
            CartOwner::User(_) => self.persistent.as_ref(),
            CartOwner::Guest(_) => self.session.as_ref(),
        }
    }

    /// Adds `quantity` units of a product, reserving them immediately.
    ///
    /// An existing line for the same product is incremented and keeps its
    /// original price snapshot.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        input: AddToCartInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;
        let store = self.store_for(owner);
        let _guard = self.lock_owner(owner).await;
        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Product {} not found or inactive",
                    input.product_id
                ))
            })?;

        inventory::reserve(&txn, product.id, input.quantity).await?;

        let existing = store
            .lines(&txn, owner)
            .await?
            .into_iter()
            .find(|line| line.product_id == product.id);
        let change = match existing {
            Some(line) => CartChange::Update(line.with_quantity(line.quantity + input.quantity)),
            None => CartChange::Insert(CartLine::new(product.id, input.quantity, product.price)),
        };

        store.stage(&txn, owner, &change).await?;
        txn.commit().await?;
        store.publish(owner, change);

        info!(product_id = %product.id, quantity = input.quantity, "Item added to cart");
        self.view(owner).await
    }

    /// Sets a line's quantity; zero or less removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let store = self.store_for(owner);
        let _guard = self.lock_owner(owner).await;
        let txn = self.db.begin().await?;

        let line = store.find_line(&txn, owner, item_id).await?;
        let change = if quantity <= 0 {
            inventory::release(&txn, line.product_id, line.quantity).await?;
            CartChange::Remove(line)
        } else {
            inventory::adjust(&txn, line.product_id, line.quantity, quantity).await?;
            CartChange::Update(line.with_quantity(quantity))
        };

        store.stage(&txn, owner, &change).await?;
        txn.commit().await?;
        store.publish(owner, change);

        info!(%item_id, quantity, "Cart item updated");
        self.view(owner).await
    }

    /// Removes a line and returns its whole reservation to stock.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let store = self.store_for(owner);
        let _guard = self.lock_owner(owner).await;
        let txn = self.db.begin().await?;

        let line = store.find_line(&txn, owner, item_id).await?;
        inventory::release(&txn, line.product_id, line.quantity).await?;
        let change = CartChange::Remove(line);

        store.stage(&txn, owner, &change).await?;
        txn.commit().await?;
        store.publish(owner, change);

        info!(%item_id, "Cart item removed");
        self.view(owner).await
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let _guard = self.lock_owner(owner).await;
        self.view(owner).await
    }

    /// Drops guest carts idle for at least `ttl` and returns their reserved
    /// stock to the catalog. Returns the number of carts expired.
    #[instrument(skip(self))]
    pub async fn expire_idle_carts(&self, ttl: Duration) -> Result<usize, ServiceError> {
        let mut expired = 0;
        for owner in self.session.idle_owners(ttl) {
            let _guard = self.lock_owner(&owner).await;
            let Some(lines) = self.session.idle_lines(&owner, ttl) else {
                continue;
            };

            let txn = self.db.begin().await?;
            for line in &lines {
                inventory::release(&txn, line.product_id, line.quantity).await?;
            }
            txn.commit().await?;
            self.session.discard(&owner);

            expired += 1;
            info!(lines = lines.len(), "Idle guest cart expired");
        }

        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(expired)
    }

    /// Runs [`Self::expire_idle_carts`] every `every` until the runtime stops.
    pub fn spawn_expiry(self, ttl: Duration, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.expire_idle_carts(ttl).await {
                    warn!(error = %e, "Guest cart expiry failed");
                }
            }
        })
    }

    async fn view(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;
        let lines = self.store_for(owner).lines(&txn, owner).await?;
        let names = product_names(&txn, &lines).await?;
        txn.commit().await?;

        Ok(CartView::build(lines, &names, &self.pricing))
    }
}

async fn product_names(
    txn: &DatabaseTransaction,
    lines: &[CartLine],
) -> Result<HashMap<Uuid, String>, ServiceError> {
    if lines.is_empty() {
        return Ok(HashMap::new());
    }
    let ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
    Ok(Product::find()
        .filter(product::Column::Id.is_in(ids))
        .all(txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect())
}

/// Input for adding an item to the cart
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

/// Input for changing a cart line's quantity
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCartItemInput {
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

/// Cart contents plus the checkout price preview.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub item_count: i32,
    #[serde(flatten)]
    pub totals: OrderTotals,
}

impl CartView {
    fn build(lines: Vec<CartLine>, names: &HashMap<Uuid, String>, policy: &PricingPolicy) -> Self {
        let subtotal = pricing::subtotal(lines.iter().map(|l| (l.unit_price, l.quantity)));
        let item_count = lines.iter().map(|l| l.quantity).sum();
        let items = lines
            .into_iter()
            .map(|line| CartLineView {
                product_name: names.get(&line.product_id).cloned().unwrap_or_default(),
                id: line.id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                total_price: line.total_price,
            })
            .collect();

        Self {
            items,
            item_count,
            totals: policy.totals(subtotal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn add_input_rejects_non_positive_quantity() {
        let input = AddToCartInput {
            product_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn view_previews_checkout_totals() {
        let product_id = Uuid::new_v4();
        let lines = vec![CartLine::new(product_id, 3, dec!(50000))];
        let names = HashMap::from([(product_id, "Martillo".to_string())]);

        let view = CartView::build(lines, &names, &PricingPolicy::default());
        assert_eq!(view.item_count, 3);
        assert_eq!(view.items[0].product_name, "Martillo");
        assert_eq!(view.totals.subtotal, dec!(150000));
        assert_eq!(view.totals.total_amount, dec!(193500));
    }

    #[test]
    fn empty_view_still_serializes_items() {
        let view = CartView::build(vec![], &HashMap::new(), &PricingPolicy::default());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["items"], serde_json::json!([]));
        assert_eq!(json["item_count"], 0);
        assert!(json.get("total_amount").is_some());
    }
}
