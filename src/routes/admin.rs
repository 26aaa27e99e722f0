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

/// Admin Router Module
///
/// Everything under `/admin`, restricted to identities with the `admin` role.
/// Pages redirect rejected requests to `/`; the API answers 401/403.
///
/// Handlers that change or delete users additionally run the self-action guard,
/// so an admin can never demote or delete their own account.
pub fn admin_routes() -> Router<AppState> {
    let page_routes = gated(
        Router::new()
            // GET /admin
            // All appointments with patient details and the dashboard counters.
            .route("/", get(pages::admin_dashboard))
            // GET /admin/manage-doctors
            .route("/manage-doctors", get(pages::manage_doctors))
            // GET /admin/manage-users
            .route("/manage-users", get(pages::manage_users)),
        Gate::Admin,
        Failure::Redirect,
    );

    let api_routes = gated(
        Router::new()
            // --- Doctor Directory ---
            // POST /admin/doctores
            .route("/doctores", post(handlers::create_doctor))
            // POST /admin/doctores/actualizar/{id}
            // Partial update; absent fields keep their value.
            .route(
                "/doctores/actualizar/{id}",
                post(handlers::update_doctor),
            )
            // DELETE /admin/doctores/{id}
            .route("/doctores/{id}", delete(handlers::delete_doctor))
            // --- Appointments ---
            // DELETE /admin/citas/{id}
            // Admin override: removes any user's appointment.
            .route("/citas/{id}", delete(handlers::delete_appointment))
            // --- User Management (self-action guarded) ---
            // POST /admin/usuarios/{id}/promover-admin
            .route(
                "/usuarios/{id}/promover-admin",
                post(handlers::promote_user),
            )
            // POST /admin/usuarios/{id}/remover-admin
            .route(
                "/usuarios/{id}/remover-admin",
                post(handlers::demote_user),
            )
            // POST /admin/usuarios/{id}/eliminar
            // Also deletes the user's appointments.
            .route("/usuarios/{id}/eliminar", post(handlers::delete_user)),
        Gate::Admin,
        Failure::Json,
    );

    Router::new().merge(page_routes).merge(api_routes)
}
