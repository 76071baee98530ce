use crate::handlers::common::{AppJson, AppPath, success_response};
use crate::{
    auth::MaybeAuthUser,
    errors::ServiceError,
    services::commerce::{AddToCartInput, CartOwner, CartView, UpdateCartItemInput},
    AppState,
};
use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::Response,
    routing::{get, post, put},
    Router,
};
use serde_json::json;
use uuid::Uuid;

/// Header carrying an anonymous visitor's cart session token.
pub const CART_SESSION_HEADER: &str = "x-cart-session";

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/add", post(add_to_cart))
        .route("/cart/item/:id", put(update_cart_item).delete(remove_cart_item))
}

/// Resolved cart owner plus the session token to hand back to a new guest.
struct ResolvedOwner {
    owner: CartOwner,
    issued_session: Option<String>,
}

fn resolve_owner(user: MaybeAuthUser, headers: &HeaderMap) -> ResolvedOwner {
    if let Some(user) = user.0 {
        return ResolvedOwner {
            owner: CartOwner::User(user.user_id),
            issued_session: None,
        };
    }

    let session = headers
        .get(CART_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(str::to_string);

    match session {
        Some(session) => ResolvedOwner {
            owner: CartOwner::Guest(session),
            issued_session: None,
        },
        None => {
            let session = Uuid::new_v4().simple().to_string();
            ResolvedOwner {
                owner: CartOwner::Guest(session.clone()),
                issued_session: Some(session),
            }
        }
    }
}

fn cart_response(
    resolved: &ResolvedOwner,
    cart: CartView,
) -> Result<Response, ServiceError> {
    let mut body = json!({ "cart": cart });
    if let CartOwner::Guest(session) = &resolved.owner {
        body["session_id"] = json!(session);
    }

    let mut response = success_response(body);
    if let Some(session) = &resolved.issued_session {
        let value = HeaderValue::from_str(session)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        response
            .headers_mut()
            .insert(HeaderName::from_static(CART_SESSION_HEADER), value);
    }
    Ok(response)
}

/// Current cart with totals preview
async fn get_cart(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let resolved = resolve_owner(user, &headers);
    let cart = state.services.cart.get_cart(&resolved.owner).await?;
    cart_response(&resolved, cart)
}

/// Add item to cart, reserving its stock
async fn add_to_cart(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    headers: HeaderMap,
    AppJson(payload): AppJson<AddToCartInput>,
) -> Result<Response, ServiceError> {
    let resolved = resolve_owner(user, &headers);
    let cart = state
        .services
        .cart
        .add_item(&resolved.owner, payload)
        .await?;
    cart_response(&resolved, cart)
}

/// Update cart item quantity; zero removes the line
async fn update_cart_item(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    headers: HeaderMap,
    AppPath(item_id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateCartItemInput>,
) -> Result<Response, ServiceError> {
    let resolved = resolve_owner(user, &headers);
    let cart = state
        .services
        .cart
        .update_item(&resolved.owner, item_id, payload.quantity)
        .await?;
    cart_response(&resolved, cart)
}

/// Remove item from cart, returning its stock
async fn remove_cart_item(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    headers: HeaderMap,
    AppPath(item_id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let resolved = resolve_owner(user, &headers);
    let cart = state
        .services
        .cart
        .remove_item(&resolved.owner, item_id)
        .await?;
    cart_response(&resolved, cart)
}
