/// Router Module Index
///
/// Splits the HTTP surface by access level. Each group attaches its gate with
/// `route_layer`, so a route can never be mounted without the check that
/// belongs to it.
use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
};

use crate::{
    AppState,
    auth::{self, Failure, Gate},
};

/// Routes open to everyone, signed in or not.
pub mod public;

/// Routes behind the authenticated-only and user-or-admin gates.
pub mod authenticated;

/// Routes behind the admin-only gate, nested under `/admin`.
pub mod admin;

/// gated
///
/// Wraps every route already registered on `router` with `gate`, answering
/// rejected requests as `failure` dictates.
pub(crate) fn gated(router: Router<AppState>, gate: Gate, failure: Failure) -> Router<AppState> {
    router.route_layer(middleware::from_fn(move |request: Request, next: Next| {
        auth::enforce(gate, failure, request, next)
    }))
}
