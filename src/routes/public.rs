use crate::{AppState, handlers, pages};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without an identity. Pages still receive the materialized
/// session (if any) so the navigation bar can reflect it.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for monitoring and load balancer checks.
        .route("/health", get(handlers::health))
        // GET /
        // Landing page. Specialities are only listed for signed-in visitors.
        .route("/", get(pages::home))
        // GET /find-doctors?nombre=...&especialidad=...
        // Doctor directory with name and speciality filters.
        .route("/find-doctors", get(pages::find_doctors))
        // POST /registro
        // Creates a `usuario` account.
        .route("/registro", post(handlers::register))
        // POST /login
        // Opens a session and issues the identity cookies.
        .route("/login", post(handlers::login))
        // GET /logout
        // Destroys the session, clears cookies, redirects home.
        .route("/logout", get(handlers::logout))
        // GET /setup-admin/{email}
        // One-time bootstrap of the first administrator.
        .route("/setup-admin/{email}", get(handlers::setup_admin))
}
