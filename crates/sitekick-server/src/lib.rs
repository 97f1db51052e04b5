pub mod auth;
pub mod error;
pub mod mailer;
pub mod pg;
pub mod routes;
pub mod state;
pub mod stripe;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route(
            "/api/admin/notifications/send",
            post(routes::notifications::send_notification),
        )
        .route(
            "/api/admin/notifications/status",
            get(routes::notifications::notification_status),
        )
        .route(
            "/api/admin/notifications/history",
            get(routes::notifications::notification_history),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.admin.clone(),
            auth::admin_auth,
        ));

    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/webhooks/stripe", post(routes::webhooks::stripe_webhook))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the HTTP server on `0.0.0.0:{port}`.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(app_state, listener).await
}

/// Start the HTTP server on a pre-bound listener.
///
/// The caller can read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("sitekick server listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}
