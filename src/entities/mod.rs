pub mod address;
pub mod cart;
pub mod cart_item;
pub mod category;
pub mod delivery_tracking;
pub mod order;
pub mod order_item;
pub mod order_notification;
pub mod order_status_history;
pub mod product;
pub mod ticket;
pub mod ticket_message;

pub use address::{Entity as Address, Model as AddressModel};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use delivery_tracking::{Entity as DeliveryTracking, Model as DeliveryTrackingModel, TrackingState};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use order_notification::{
    Entity as OrderNotification, Model as OrderNotificationModel, NotificationKind,
};
pub use order_status_history::{Entity as OrderStatusHistory, Model as OrderStatusHistoryModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use ticket::{Entity as Ticket, Model as TicketModel, TicketPriority, TicketStatus};
pub use ticket_message::{Entity as TicketMessage, Model as TicketMessageModel};
