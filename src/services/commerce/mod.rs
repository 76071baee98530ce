/// Commerce services module - catalog, cart reservation and checkout
pub mod cart_service;
pub mod cart_store;
pub mod checkout_service;
pub mod pricing;
pub mod product_catalog_service;

// Re-export services for convenience
pub use cart_service::{AddToCartInput, CartService, CartView, UpdateCartItemInput};
pub use cart_store::{CartOwner, CartStore, PersistentCartStore, SessionCartStore};
pub use checkout_service::{CheckoutService, CreateOrderInput, OrderNumberGenerator};
pub use pricing::{OrderTotals, PricingPolicy};
pub use product_catalog_service::ProductCatalogService;
