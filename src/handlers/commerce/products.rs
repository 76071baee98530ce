use crate::handlers::common::{AppJson, AppPath, AppQuery, created_response, success_response};
use crate::{
    auth::{AuthUser, MaybeAuthUser},
    errors::ServiceError,
    services::commerce::product_catalog_service::{
        CreateCategoryInput, CreateProductInput, ProductQuery, SetStockInput, UpdateProductInput,
    },
    AppState,
};
use axum::{
    extract::State,
    response::Response,
    routing::{delete, get, put},
    Router,
};
use serde_json::json;
use uuid::Uuid;

/// Creates the router for catalog endpoints (products and categories)
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/low-stock", get(low_stock_products))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/:id/stock", put(set_stock))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", delete(delete_category))
}

fn is_staff(user: &MaybeAuthUser) -> bool {
    user.0.as_ref().is_some_and(AuthUser::is_staff)
}

/// List products; staff may include inactive ones
async fn list_products(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    AppQuery(query): AppQuery<ProductQuery>,
) -> Result<Response, ServiceError> {
    let result = state
        .services
        .product_catalog
        .list_products(query, is_staff(&user))
        .await?;

    Ok(success_response(json!({
        "products": result.products,
        "total": result.total,
    })))
}

/// Get a product by ID; inactive products are hidden from non-staff callers
async fn get_product(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let product = state.services.product_catalog.get_product(id).await?;
    if !product.active && !is_staff(&user) {
        return Err(ServiceError::not_found("Product", id));
    }

    Ok(success_response(json!({ "product": product })))
}

/// Create a new product
async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateProductInput>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let product = state
        .services
        .product_catalog
        .create_product(payload)
        .await?;

    Ok(created_response(json!({ "product": product })))
}

/// Update an existing product
async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateProductInput>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let product = state
        .services
        .product_catalog
        .update_product(id, payload)
        .await?;

    Ok(success_response(json!({ "product": product })))
}

/// Soft delete: the product stops being listed but stays referenced by orders
async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let product = state
        .services
        .product_catalog
        .deactivate_product(id)
        .await?;

    Ok(success_response(json!({ "product": product })))
}

/// Admin restock
async fn set_stock(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<SetStockInput>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let product = state
        .services
        .product_catalog
        .set_stock(id, payload.stock_quantity)
        .await?;

    Ok(success_response(json!({ "product": product })))
}

async fn low_stock_products(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    user.require_staff()?;
    let products = state.services.product_catalog.low_stock().await?;

    Ok(success_response(json!({
        "count": products.len(),
        "products": products,
    })))
}

async fn list_categories(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let categories = state.services.product_catalog.list_categories().await?;
    Ok(success_response(json!({ "categories": categories })))
}

async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateCategoryInput>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let category = state
        .services
        .product_catalog
        .create_category(payload)
        .await?;

    Ok(created_response(json!({ "category": category })))
}

async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    user.require_admin()?;
    let category = state
        .services
        .product_catalog
        .deactivate_category(id)
        .await?;

    Ok(success_response(json!({ "category": category })))
}
