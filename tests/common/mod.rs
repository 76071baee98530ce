#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use ferrejunior::{
    auth::{AuthConfig, AuthService, AuthUser, Role},
    config::AppConfig,
    db,
    entities::{OrderModel, ProductModel},
    errors::ServiceError,
    handlers::AppServices,
    services::{
        commerce::{
            product_catalog_service::CreateProductInput, AddToCartInput, CartOwner,
            CreateOrderInput,
        },
        geocoding::{
            Coordinates, GeocodedAddress, MapsClient, RouteStep, RouteSummary, TravelEstimate,
        },
    },
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Scripted mapping client. Addresses containing "nowhere" cannot be
/// geocoded; distance answers are popped from a queue.
#[derive(Default)]
pub struct FakeMaps {
    distances: Mutex<VecDeque<Result<f64, ServiceError>>>,
    pub reverse_geocode_fails: Mutex<bool>,
    pub geocoder_unreachable: Mutex<bool>,
}

impl FakeMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the distance (km) reported by the next lookup.
    pub fn push_distance(&self, distance_km: f64) {
        self.distances
            .lock()
            .unwrap()
            .push_back(Ok(distance_km));
    }

    pub fn push_distance_failure(&self) {
        self.distances
            .lock()
            .unwrap()
            .push_back(Err(ServiceError::ExternalServiceError(
                "distance matrix unavailable".into(),
            )));
    }
}

#[async_trait]
impl MapsClient for FakeMaps {
    async fn geocode(&self, address: &str) -> Result<GeocodedAddress, ServiceError> {
        if *self.geocoder_unreachable.lock().unwrap() {
            return Err(ServiceError::ExternalServiceError(
                "geocoding request failed: connection refused".into(),
            ));
        }
        if address.to_lowercase().contains("nowhere") {
            return Err(ServiceError::UnresolvableLocation(format!(
                "no results for {}",
                address
            )));
        }
        Ok(GeocodedAddress {
            coordinates: Coordinates::new(4.6097, -74.0817),
            formatted_address: format!("{}, Bogotá, Colombia", address),
        })
    }

    async fn reverse_geocode(&self, position: Coordinates) -> Result<String, ServiceError> {
        if *self.reverse_geocode_fails.lock().unwrap() {
            return Err(ServiceError::ExternalServiceError("geocoder down".into()));
        }
        Ok(format!(
            "Near {:.4},{:.4}",
            position.latitude, position.longitude
        ))
    }

    async fn distance_and_duration(
        &self,
        _origin: Coordinates,
        _destination: Coordinates,
    ) -> Result<TravelEstimate, ServiceError> {
        let next = self.distances.lock().unwrap().pop_front().unwrap_or(Ok(5.0));
        next.map(|distance_km| TravelEstimate {
            distance_km,
            duration_minutes: distance_km * 2.5,
        })
    }

    async fn route(
        &self,
        _origin: Coordinates,
        _destination: Coordinates,
    ) -> Result<RouteSummary, ServiceError> {
        Ok(RouteSummary {
            distance_km: 3.2,
            distance_text: "3.2 km".into(),
            duration_minutes: 9.0,
            duration_text: "9 mins".into(),
            start_address: "Calle 80".into(),
            end_address: "Carrera 7".into(),
            polyline: "abc123".into(),
            steps: vec![RouteStep {
                instruction: "Head north".into(),
                distance: "3.2 km".into(),
                duration: "9 mins".into(),
            }],
        })
    }
}

/// Application state backed by a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub maps: Arc<FakeMaps>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "test".to_string(),
        );
        // One connection: every in-memory SQLite connection is its own database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let maps = Arc::new(FakeMaps::new());
        let services = AppServices::new(db_arc.clone(), &cfg, maps.clone());
        let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg)));

        let state = AppState {
            db: db_arc,
            config: Arc::new(cfg),
            auth,
            services,
        };
        let router = ferrejunior::build_router(state.clone());

        Self {
            router,
            state,
            maps,
        }
    }

    /// A fresh user with the given role and a bearer token for it.
    pub fn user(&self, role: Role) -> (AuthUser, String) {
        let user = AuthUser::new(Uuid::new_v4(), role);
        let token = self
            .state
            .auth
            .issue_token(user.user_id, role, Some(format!("{} user", role)))
            .expect("issue test token");
        (user, token)
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn seed_product(&self, sku: &str, price: Decimal, stock: i32) -> ProductModel {
        self.state
            .services
            .product_catalog
            .create_product(CreateProductInput {
                name: format!("Producto {}", sku),
                sku: sku.to_string(),
                description: Some("Seeded for integration tests".to_string()),
                price,
                stock_quantity: Some(stock),
                min_stock_level: None,
                category_id: None,
                brand: Some("Truper".to_string()),
            })
            .await
            .expect("seed product for tests")
    }

    /// Checkout of a one-line cart for `user_id`.
    pub async fn place_order(&self, user_id: Uuid, shipping_address: Option<&str>) -> OrderModel {
        let product = self
            .seed_product(&format!("SKU-{}", Uuid::new_v4().simple()), Decimal::from(40000), 10)
            .await;
        self.state
            .services
            .cart
            .add_item(
                &CartOwner::User(user_id),
                AddToCartInput {
                    product_id: product.id,
                    quantity: 1,
                },
            )
            .await
            .expect("add to cart");
        self.state
            .services
            .checkout
            .create_order(
                user_id,
                CreateOrderInput {
                    shipping_address: shipping_address.map(str::to_string),
                    ..Default::default()
                },
            )
            .await
            .expect("checkout")
            .order
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        self.state
            .services
            .product_catalog
            .get_product(product_id)
            .await
            .expect("product exists")
            .stock_quantity
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
