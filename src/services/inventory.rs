//! Stock reservation against `products.stock_quantity`.
//!
//! Both cart backends and any admin restock go through these functions. The
//! decrement is a single conditional `UPDATE`, so two concurrent reservations
//! can never both pass the availability check and drive stock negative.

use crate::entities::product;
use crate::errors::ServiceError;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;
use uuid::Uuid;

/// Decrements stock by `quantity` if at least that much is available.
///
/// Zero affected rows means the product vanished or stock was short; the
/// caller's transaction should then be dropped so nothing else persists.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "reservation quantity must be positive".to_string(),
        ));
    }

    let result = product::Entity::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).sub(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::StockQuantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let available = product::Entity::find_by_id(product_id)
            .one(conn)
            .await?
            .map(|p| p.stock_quantity)
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
        return Err(ServiceError::InsufficientStock(format!(
            "requested {} but only {} available",
            quantity, available
        )));
    }

    debug!(%product_id, quantity, "stock reserved");
    Ok(())
}

/// Returns `quantity` units to stock.
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Ok(());
    }

    let result = product::Entity::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::not_found("Product", product_id));
    }

    debug!(%product_id, quantity, "stock released");
    Ok(())
}

/// Moves a reservation from `old_quantity` to `new_quantity` by the delta.
pub async fn adjust<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    old_quantity: i32,
    new_quantity: i32,
) -> Result<(), ServiceError> {
    let delta = new_quantity - old_quantity;
    if delta > 0 {
        reserve(conn, product_id, delta).await
    } else {
        release(conn, product_id, -delta).await
    }
}
