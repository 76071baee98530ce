//! Per-entity deletion policy.
//!
//! Each entity kind has exactly one way of leaving the live data set. Services
//! ask the policy instead of re-deriving the rule from status checks.

use crate::entities::OrderStatus;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Product,
    Category,
    Order,
    CartItem,
    Address,
    DeliveryTracking,
    OrderStatusHistory,
    OrderNotification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Row stays; an `active` flag is cleared. Used for rows referenced by orders.
    SoftDelete,
    /// Row is removed, but only while the order is still pending.
    HardDeleteWhilePending,
    /// Row is removed unconditionally.
    HardDelete,
    /// Row stays and is marked inactive; it can be reactivated later.
    Deactivate,
    /// Row can never be deleted through the API.
    Immutable,
}

impl EntityKind {
    pub fn deletion_policy(self) -> DeletionPolicy {
        match self {
            EntityKind::Product | EntityKind::Category => DeletionPolicy::SoftDelete,
            EntityKind::Order => DeletionPolicy::HardDeleteWhilePending,
            EntityKind::CartItem | EntityKind::Address => DeletionPolicy::HardDelete,
            EntityKind::DeliveryTracking => DeletionPolicy::Deactivate,
            EntityKind::OrderStatusHistory | EntityKind::OrderNotification => {
                DeletionPolicy::Immutable
            }
        }
    }
}

/// Checks whether an order in `status` may be hard deleted.
pub fn ensure_order_deletable(status: OrderStatus) -> Result<(), ServiceError> {
    match EntityKind::Order.deletion_policy() {
        DeletionPolicy::HardDeleteWhilePending if status == OrderStatus::Pending => Ok(()),
        _ => Err(ServiceError::InvalidOperation(format!(
            "only pending orders can be deleted (order is {})",
            status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn catalog_entities_are_soft_deleted() {
        assert_eq!(
            EntityKind::Product.deletion_policy(),
            DeletionPolicy::SoftDelete
        );
        assert_eq!(
            EntityKind::Category.deletion_policy(),
            DeletionPolicy::SoftDelete
        );
    }

    #[test]
    fn audit_rows_are_immutable() {
        assert_eq!(
            EntityKind::OrderStatusHistory.deletion_policy(),
            DeletionPolicy::Immutable
        );
        assert_eq!(
            EntityKind::DeliveryTracking.deletion_policy(),
            DeletionPolicy::Deactivate
        );
    }

    #[test]
    fn only_pending_orders_are_deletable() {
        assert!(ensure_order_deletable(OrderStatus::Pending).is_ok());
        assert_matches!(
            ensure_order_deletable(OrderStatus::Processing),
            Err(ServiceError::InvalidOperation(_))
        );
        assert_matches!(
            ensure_order_deletable(OrderStatus::Delivered),
            Err(ServiceError::InvalidOperation(_))
        );
    }
}
