// Customer-facing commerce: catalog, carts, checkout
pub mod commerce;

// Stock reservation shared by both cart backends
pub mod inventory;

// Orders and their addresses
pub mod addresses;
pub mod orders;

// Delivery
pub mod geocoding;
pub mod notifications;
pub mod tracking;

// Customer support
pub mod tickets;
