use std::sync::Arc;

use axum::http::{header, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{accounts, auth, health, loans, transactions, transfers};
use crate::middlewares::auth::{auth_middleware, ApiKeyExtractor};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    // Per-caller rate limit on the transfer route, keyed by the bearer token.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(10)
            .key_extractor(ApiKeyExtractor)
            .finish()
            .expect("valid rate limiter configuration"),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let account_routes = Router::new()
        .route("/", post(accounts::open_account).get(accounts::list_accounts))
        .route(
            "/{account_number}/status",
            post(accounts::set_account_status),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let transfer_routes = Router::new()
        .route("/", post(transfers::transfer).options(transfers::preflight))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(GovernorLayer::new(governor_conf));

    let transaction_routes = Router::new()
        .route("/", get(transactions::list_transactions))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let loan_routes = Router::new()
        .route("/", post(loans::apply).get(loans::list_loans))
        .route("/{id}/decision", post(loans::decide))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/", get(health::health_check))
        .nest("/auth", auth_routes)
        .nest("/accounts", account_routes)
        .nest("/transfers", transfer_routes)
        .nest("/transactions", transaction_routes)
        .nest("/loans", loan_routes)
        .layer(cors)
        .with_state(state)
}
