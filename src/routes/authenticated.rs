use super::gated;
use crate::{
    AppState,
    auth::{Failure, Gate},
    handlers, pages,
};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Authenticated Router Module
///
/// Routes that need a materialized identity. Browser pages bounce a rejected
/// request back to `/`; the JSON endpoints answer 401/403 with an error body.
///
/// Two gates are in play:
/// - authenticated-only: any identity, even one without a recognised role.
/// - user-or-admin: the identity must carry the `usuario` or `admin` role.
pub fn authenticated_routes() -> Router<AppState> {
    // GET /dashboard
    // Profile and pending appointments of the signed-in user.
    let page_routes = gated(
        Router::new().route("/dashboard", get(pages::dashboard)),
        Gate::Authenticated,
        Failure::Redirect,
    );

    let api_routes = gated(
        Router::new()
            // GET /me
            // The identity resolved for this request.
            .route("/me", get(handlers::me))
            // POST /perfil
            // Self-service profile update. Cannot touch the role.
            .route("/perfil", post(handlers::update_profile)),
        Gate::Authenticated,
        Failure::Json,
    );

    // GET /dates
    // Booking page: own appointments plus the doctor list.
    let booking_page_routes = gated(
        Router::new().route("/dates", get(pages::dates)),
        Gate::UserOrAdmin,
        Failure::Redirect,
    );

    let booking_api_routes = gated(
        Router::new()
            // POST /citas
            // Books an appointment owned by the session identity.
            .route("/citas", post(handlers::create_appointment))
            // DELETE /citas/{id}
            // Cancels one of the holder's own appointments (Owner-Only).
            .route("/citas/{id}", delete(handlers::cancel_appointment)),
        Gate::UserOrAdmin,
        Failure::Json,
    );

    Router::new()
        .merge(page_routes)
        .merge(api_routes)
        .merge(booking_page_routes)
        .merge(booking_api_routes)
}
