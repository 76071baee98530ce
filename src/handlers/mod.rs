pub mod addresses;
pub mod commerce;
pub mod common;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod tickets;
pub mod tracking;

use crate::{
    config::AppConfig,
    services::{
        addresses::AddressService,
        commerce::{CartService, CheckoutService, PricingPolicy, ProductCatalogService},
        geocoding::MapsClient,
        notifications::NotificationService,
        orders::OrderService,
        tickets::TicketService,
        tracking::{TrackingService, TrackingSettings},
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub product_catalog: Arc<ProductCatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub addresses: Arc<AddressService>,
    pub tracking: Arc<TrackingService>,
    pub notifications: Arc<NotificationService>,
    pub tickets: Arc<TicketService>,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig, maps: Arc<dyn MapsClient>) -> Self {
        let pricing = PricingPolicy::from(config);
        let notifications = NotificationService::new(db.clone());

        Self {
            product_catalog: Arc::new(ProductCatalogService::new(db.clone())),
            cart: Arc::new(CartService::new(db.clone(), pricing)),
            checkout: Arc::new(CheckoutService::new(
                db.clone(),
                pricing,
                config.order_number_max_attempts,
                notifications.clone(),
            )),
            orders: Arc::new(OrderService::new(db.clone(), notifications.clone())),
            addresses: Arc::new(AddressService::new(db.clone())),
            tickets: Arc::new(TicketService::new(db.clone())),
            tracking: Arc::new(TrackingService::new(
                db,
                maps,
                notifications.clone(),
                TrackingSettings::from(config),
            )),
            notifications: Arc::new(notifications),
        }
    }
}
