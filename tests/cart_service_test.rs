mod common;

use assert_matches::assert_matches;
use common::TestApp;
use ferrejunior::{
    errors::ServiceError,
    services::commerce::{AddToCartInput, CartOwner},
};
use rust_decimal_macros::dec;
use std::time::Duration;
use uuid::Uuid;

fn add(product_id: Uuid, quantity: i32) -> AddToCartInput {
    AddToCartInput {
        product_id,
        quantity,
    }
}

#[tokio::test]
async fn adding_an_item_reserves_stock() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let product = app.seed_product("MART-001", dec!(25000), 10).await;
    let owner = CartOwner::User(Uuid::new_v4());

    let view = cart.add_item(&owner, add(product.id, 3)).await.unwrap();

    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
    assert_eq!(view.items[0].product_name, "Producto MART-001");
    assert_eq!(view.item_count, 3);
    assert_eq!(view.totals.subtotal, dec!(75000));
    assert_eq!(app.stock_of(product.id).await, 7);
}

#[tokio::test]
async fn adding_the_same_product_merges_into_one_line() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let product = app.seed_product("TORN-010", dec!(1200), 50).await;
    let owner = CartOwner::User(Uuid::new_v4());

    cart.add_item(&owner, add(product.id, 2)).await.unwrap();
    let view = cart.add_item(&owner, add(product.id, 5)).await.unwrap();

    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 7);
    assert_eq!(view.items[0].total_price, dec!(8400));
    assert_eq!(app.stock_of(product.id).await, 43);
}

#[tokio::test]
async fn insufficient_stock_leaves_cart_and_stock_untouched() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let product = app.seed_product("TALA-100", dec!(180000), 2).await;
    let owner = CartOwner::User(Uuid::new_v4());

    let err = cart.add_item(&owner, add(product.id, 3)).await.unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock(_));
    assert_eq!(app.stock_of(product.id).await, 2);
    assert!(cart.get_cart(&owner).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn zero_or_negative_quantities_are_rejected_on_add() {
    let app = TestApp::new().await;
    let product = app.seed_product("LIJA-080", dec!(900), 10).await;
    let owner = CartOwner::User(Uuid::new_v4());

    let err = app
        .state
        .services
        .cart
        .add_item(&owner, add(product.id, 0))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(app.stock_of(product.id).await, 10);
}

#[tokio::test]
async fn inactive_products_cannot_be_added() {
    let app = TestApp::new().await;
    let catalog = app.state.services.product_catalog.clone();
    let product = app.seed_product("PINT-004", dec!(45000), 10).await;
    catalog.deactivate_product(product.id).await.unwrap();

    let err = app
        .state
        .services
        .cart
        .add_item(&CartOwner::User(Uuid::new_v4()), add(product.id, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn updating_quantity_moves_only_the_difference() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let product = app.seed_product("CABL-012", dec!(3000), 20).await;
    let owner = CartOwner::User(Uuid::new_v4());

    let view = cart.add_item(&owner, add(product.id, 4)).await.unwrap();
    let item_id = view.items[0].id;

    let view = cart.update_item(&owner, item_id, 10).await.unwrap();
    assert_eq!(view.items[0].quantity, 10);
    assert_eq!(app.stock_of(product.id).await, 10);

    let view = cart.update_item(&owner, item_id, 1).await.unwrap();
    assert_eq!(view.items[0].quantity, 1);
    assert_eq!(app.stock_of(product.id).await, 19);
}

#[tokio::test]
async fn updating_beyond_available_stock_fails_without_changes() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let product = app.seed_product("BROC-006", dec!(7000), 5).await;
    let owner = CartOwner::User(Uuid::new_v4());

    let view = cart.add_item(&owner, add(product.id, 2)).await.unwrap();
    let err = cart
        .update_item(&owner, view.items[0].id, 9)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock(_));
    assert_eq!(app.stock_of(product.id).await, 3);
    assert_eq!(cart.get_cart(&owner).await.unwrap().items[0].quantity, 2);
}

#[tokio::test]
async fn zero_quantity_update_and_removal_return_stock() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let a = app.seed_product("CLAV-001", dec!(100), 100).await;
    let b = app.seed_product("TUER-002", dec!(200), 100).await;
    let owner = CartOwner::User(Uuid::new_v4());

    cart.add_item(&owner, add(a.id, 10)).await.unwrap();
    let view = cart.add_item(&owner, add(b.id, 20)).await.unwrap();
    let line_a = view.items.iter().find(|l| l.product_id == a.id).unwrap().id;
    let line_b = view.items.iter().find(|l| l.product_id == b.id).unwrap().id;

    let view = cart.update_item(&owner, line_a, 0).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(app.stock_of(a.id).await, 100);

    let view = cart.remove_item(&owner, line_b).await.unwrap();
    assert!(view.items.is_empty());
    assert_eq!(app.stock_of(b.id).await, 100);
}

#[tokio::test]
async fn items_of_another_users_cart_are_forbidden() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let product = app.seed_product("NIVE-030", dec!(15000), 10).await;
    let alice = CartOwner::User(Uuid::new_v4());
    let bob = CartOwner::User(Uuid::new_v4());

    let view = cart.add_item(&alice, add(product.id, 1)).await.unwrap();
    let item_id = view.items[0].id;

    assert_matches!(
        cart.update_item(&bob, item_id, 5).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        cart.remove_item(&bob, item_id).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        cart.remove_item(&alice, Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
    assert_eq!(app.stock_of(product.id).await, 9);
}

#[tokio::test]
async fn guest_carts_are_isolated_per_session() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let product = app.seed_product("CINT-002", dec!(5000), 10).await;
    let first = CartOwner::Guest("session-one".into());
    let second = CartOwner::Guest("session-two".into());

    let view = cart.add_item(&first, add(product.id, 2)).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert!(cart.get_cart(&second).await.unwrap().items.is_empty());

    assert_matches!(
        cart.remove_item(&second, view.items[0].id).await,
        Err(ServiceError::NotFound(_))
    );

    cart.remove_item(&first, view.items[0].id).await.unwrap();
    assert_eq!(app.stock_of(product.id).await, 10);
}

#[tokio::test]
async fn failed_guest_reservation_leaves_no_line() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let product = app.seed_product("SERR-005", dec!(22000), 1).await;
    let guest = CartOwner::Guest("visitor".into());

    assert_matches!(
        cart.add_item(&guest, add(product.id, 2)).await,
        Err(ServiceError::InsufficientStock(_))
    );
    assert!(cart.get_cart(&guest).await.unwrap().items.is_empty());
    assert_eq!(app.stock_of(product.id).await, 1);
}

#[tokio::test]
async fn cart_preview_uses_checkout_pricing() {
    let app = TestApp::new().await;
    let product = app.seed_product("TALA-900", dec!(250000), 3).await;
    let owner = CartOwner::User(Uuid::new_v4());

    let view = app
        .state
        .services
        .cart
        .add_item(&owner, add(product.id, 1))
        .await
        .unwrap();

    assert_eq!(view.totals.subtotal, dec!(250000));
    assert_eq!(view.totals.shipping_cost, dec!(0));
    assert_eq!(view.totals.tax_amount, dec!(47500));
    assert_eq!(view.totals.total_amount, dec!(297500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_guest_adds_merge_into_one_line() {
    let app = TestApp::new().await;
    let product = app.seed_product("TACO-FIS", dec!(900), 40).await;
    let owner = CartOwner::Guest(Uuid::new_v4().simple().to_string());

    let adds: Vec<_> = (0..16)
        .map(|_| {
            let cart = app.state.services.cart.clone();
            let owner = owner.clone();
            tokio::spawn(async move { cart.add_item(&owner, add(product.id, 2)).await })
        })
        .collect();
    for handle in adds {
        handle.await.unwrap().unwrap();
    }

    let view = app.state.services.cart.get_cart(&owner).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 32);
    assert_eq!(app.stock_of(product.id).await, 8);
}

#[tokio::test]
async fn idle_guest_carts_expire_and_return_their_stock() {
    let app = TestApp::new().await;
    let cart = app.state.services.cart.clone();
    let product = app.seed_product("LIJA-120", dec!(1500), 30).await;
    let idle = CartOwner::Guest("abandonada".into());
    let member = CartOwner::User(Uuid::new_v4());

    cart.add_item(&idle, add(product.id, 5)).await.unwrap();
    cart.add_item(&member, add(product.id, 4)).await.unwrap();
    assert_eq!(app.stock_of(product.id).await, 21);

    assert_eq!(
        cart.expire_idle_carts(Duration::from_secs(3600)).await.unwrap(),
        0
    );
    assert_eq!(cart.get_cart(&idle).await.unwrap().item_count, 5);

    assert_eq!(cart.expire_idle_carts(Duration::ZERO).await.unwrap(), 1);
    assert!(cart.get_cart(&idle).await.unwrap().items.is_empty());
    assert_eq!(cart.get_cart(&member).await.unwrap().item_count, 4);
    assert_eq!(app.stock_of(product.id).await, 26);

    assert_eq!(cart.expire_idle_carts(Duration::ZERO).await.unwrap(), 0);
}
