mod common;

use assert_matches::assert_matches;
use common::TestApp;
use ferrejunior::{
    auth::Role,
    entities::{
        order_item, order_notification, order_status_history, NotificationKind, Order,
        OrderItem, OrderNotification, OrderStatus, OrderStatusHistory,
    },
    errors::ServiceError,
    services::orders::{OrderListQuery, UpdateOrderStatusInput},
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

fn status(status: &str) -> UpdateOrderStatusInput {
    UpdateOrderStatusInput {
        status: status.to_string(),
        notes: None,
    }
}

#[tokio::test]
async fn clients_see_only_their_own_orders() {
    let app = TestApp::new().await;
    let orders = app.state.services.orders.clone();
    let (alice, _) = app.user(Role::Client);
    let (bob, _) = app.user(Role::Client);
    let (employee, _) = app.user(Role::Employee);

    let alice_order = app.place_order(alice.user_id, None).await;
    app.place_order(bob.user_id, None).await;

    let mine = orders
        .list_orders(&alice, OrderListQuery::default())
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].order.id, alice_order.id);
    assert_eq!(mine[0].items.len(), 1);

    let all = orders
        .list_orders(&employee, OrderListQuery::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    assert_matches!(
        orders.get_order(&bob, alice_order.id).await,
        Err(ServiceError::Forbidden(_))
    );
    assert!(orders.get_order(&employee, alice_order.id).await.is_ok());
    assert_matches!(
        orders.get_order(&alice, Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn status_filter_is_validated() {
    let app = TestApp::new().await;
    let orders = app.state.services.orders.clone();
    let (admin, _) = app.user(Role::Admin);
    let (client, _) = app.user(Role::Client);
    app.place_order(client.user_id, None).await;

    let pending = orders
        .list_orders(
            &admin,
            OrderListQuery {
                status: Some("pending".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    let delivered = orders
        .list_orders(
            &admin,
            OrderListQuery {
                status: Some("delivered".into()),
            },
        )
        .await
        .unwrap();
    assert!(delivered.is_empty());

    assert_matches!(
        orders
            .list_orders(
                &admin,
                OrderListQuery {
                    status: Some("lost".into()),
                },
            )
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn admin_status_changes_are_recorded_and_notified() {
    let app = TestApp::new().await;
    let orders = app.state.services.orders.clone();
    let (admin, _) = app.user(Role::Admin);
    let (employee, _) = app.user(Role::Employee);
    let (client, _) = app.user(Role::Client);
    let order = app.place_order(client.user_id, None).await;

    assert_matches!(
        orders
            .update_status(&employee, order.id, status("processing"))
            .await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        orders.update_status(&admin, order.id, status("teleported")).await,
        Err(ServiceError::ValidationError(_))
    );

    let updated = orders
        .update_status(&admin, order.id, status("processing"))
        .await
        .unwrap();
    assert_eq!(updated.order.status, OrderStatus::Processing);

    let history = OrderStatusHistory::find()
        .filter(order_status_history::Column::OrderId.eq(order.id))
        .filter(order_status_history::Column::Status.eq("processing"))
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        history.note.as_deref(),
        Some("Status changed from pending to processing")
    );
    assert_eq!(history.actor_id, Some(admin.user_id));

    let in_preparation = OrderNotification::find()
        .filter(order_notification::Column::OrderId.eq(order.id))
        .filter(order_notification::Column::Kind.eq(NotificationKind::InPreparation))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(in_preparation, 1);

    // Shipped has no customer notice.
    orders
        .update_status(&admin, order.id, status("shipped"))
        .await
        .unwrap();
    let total = OrderNotification::find()
        .filter(order_notification::Column::OrderId.eq(order.id))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn only_pending_orders_can_be_deleted() {
    let app = TestApp::new().await;
    let orders = app.state.services.orders.clone();
    let (admin, _) = app.user(Role::Admin);
    let (client, _) = app.user(Role::Client);

    let shipped = app.place_order(client.user_id, None).await;
    orders
        .update_status(&admin, shipped.id, status("shipped"))
        .await
        .unwrap();
    assert_matches!(
        orders.delete_order(&admin, shipped.id).await,
        Err(ServiceError::InvalidOperation(_))
    );

    let pending = app.place_order(client.user_id, None).await;
    assert_matches!(
        orders.delete_order(&client, pending.id).await,
        Err(ServiceError::Forbidden(_))
    );

    let line = orders.get_order(&admin, pending.id).await.unwrap().items[0].clone();
    let stock_before = app.stock_of(line.product_id).await;

    orders.delete_order(&admin, pending.id).await.unwrap();

    assert!(Order::find_by_id(pending.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        OrderItem::find()
            .filter(order_item::Column::OrderId.eq(pending.id))
            .count(&*app.state.db)
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        app.stock_of(line.product_id).await,
        stock_before + line.quantity
    );
}

#[tokio::test]
async fn deleting_an_order_keeps_its_audit_trail() {
    let app = TestApp::new().await;
    let orders = app.state.services.orders.clone();
    let (admin, _) = app.user(Role::Admin);
    let (client, _) = app.user(Role::Client);
    let order = app.place_order(client.user_id, None).await;

    let notices_before = OrderNotification::find()
        .filter(order_notification::Column::OrderId.eq(order.id))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert!(notices_before > 0);

    orders.delete_order(&admin, order.id).await.unwrap();

    let history = OrderStatusHistory::find()
        .filter(order_status_history::Column::OrderId.eq(order.id))
        .order_by_asc(order_status_history::Column::CreatedAt)
        .all(&*app.state.db)
        .await
        .unwrap();
    let statuses: Vec<_> = history.iter().map(|h| h.status.as_str()).collect();
    assert_eq!(statuses, vec!["pending", "deleted"]);
    assert_eq!(history[1].actor_id, Some(admin.user_id));

    assert_eq!(
        OrderNotification::find()
            .filter(order_notification::Column::OrderId.eq(order.id))
            .count(&*app.state.db)
            .await
            .unwrap(),
        notices_before
    );
    assert_matches!(
        orders.get_order(&admin, order.id).await,
        Err(ServiceError::NotFound(_))
    );
}
