use super::{
    cart_store::PersistentCartStore,
    pricing::{self, PricingPolicy},
};
use crate::{
    entities::{order, order_item, product, NotificationKind, Order, OrderStatus, Product},
    errors::ServiceError,
    services::{
        addresses,
        notifications::NotificationService,
        orders::{append_history, HistoryEntry, OrderWithItems},
    },
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_PAYMENT_METHOD: &str = "credit_card";

/// Source of candidate order numbers. Uniqueness is checked by the caller.
pub trait OrderNumberGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// `ORD` + `YYYYMMDD` + a random four digit suffix.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatedOrderNumberGenerator;

impl OrderNumberGenerator for DatedOrderNumberGenerator {
    fn generate(&self) -> String {
        let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
        format!("ORD{}{}", Utc::now().format("%Y%m%d"), suffix)
    }
}

/// Turns an authenticated user's cart into an order.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    pricing: PricingPolicy,
    order_numbers: Arc<dyn OrderNumberGenerator>,
    max_attempts: u32,
    notifications: NotificationService,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        pricing: PricingPolicy,
        max_attempts: u32,
        notifications: NotificationService,
    ) -> Self {
        Self {
            db,
            pricing,
            order_numbers: Arc::new(DatedOrderNumberGenerator),
            max_attempts: max_attempts.max(1),
            notifications,
        }
    }

    pub fn with_order_numbers(mut self, generator: Arc<dyn OrderNumberGenerator>) -> Self {
        self.order_numbers = generator;
        self
    }

    /// Creates the order from the cart's snapshot lines.
    ///
    /// Order, order items and the cart clearing commit together. Stock is not
    /// touched: it was reserved when the lines entered the cart.
    #[instrument(skip(self))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        input: CreateOrderInput,
    ) -> Result<OrderWithItems, ServiceError> {
        input.validate()?;
        let txn = self.db.begin().await?;

        let cart = PersistentCartStore::find_cart(&txn, user_id).await?;
        let lines = match &cart {
            Some(cart) => PersistentCartStore::items(&txn, cart.id).await?,
            None => Vec::new(),
        };
        let cart = match cart {
            Some(cart) if !lines.is_empty() => cart,
            _ => return Err(ServiceError::EmptyCart),
        };

        let subtotal = pricing::subtotal(lines.iter().map(|l| (l.unit_price, l.quantity)));
        let totals = self.pricing.totals(subtotal);

        let shipping_address = match input
            .shipping_address
            .filter(|address| !address.trim().is_empty())
        {
            Some(address) => Some(address),
            None => addresses::default_shipping_address(&txn, user_id).await?,
        };

        let order_number = self.next_order_number(&txn).await?;
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            order_number: Set(order_number),
            status: Set(OrderStatus::Pending),
            subtotal: Set(totals.subtotal),
            shipping_cost: Set(totals.shipping_cost),
            tax_amount: Set(totals.tax_amount),
            total_amount: Set(totals.total_amount),
            shipping_address: Set(shipping_address),
            payment_method: Set(input
                .payment_method
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string())),
            notes: Set(input.notes.unwrap_or_default()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let names: HashMap<Uuid, String> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                product_name: Set(names.get(&line.product_id).cloned().unwrap_or_default()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.unit_price * Decimal::from(line.quantity)),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        PersistentCartStore::clear(&txn, cart.id).await?;
        append_history(
            &txn,
            order.id,
            HistoryEntry::new(OrderStatus::Pending, "Order created").by(user_id),
        )
        .await?;
        txn.commit().await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "Order created from cart"
        );

        self.notifications
            .notify(
                user_id,
                order.id,
                NotificationKind::OrderConfirmed,
                &order.order_number,
                None,
            )
            .await;

        Ok(OrderWithItems { order, items })
    }

    async fn next_order_number(&self, txn: &DatabaseTransaction) -> Result<String, ServiceError> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.order_numbers.generate();
            let taken = Order::find()
                .filter(order::Column::OrderNumber.eq(candidate.as_str()))
                .count(txn)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
            warn!(attempt, %candidate, "Order number collision");
        }

        Err(ServiceError::Conflict(format!(
            "could not allocate a unique order number after {} attempts",
            self.max_attempts
        )))
    }
}

/// Input for creating an order from the cart
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateOrderInput {
    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub shipping_address: Option<String>,
}
