use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, SelfAction},
    models::{Role, User},
    session::{self, RequestSession, SessionId},
};

/// Identity
///
/// The resolved `{id, display name, role}` of the current request. It is what
/// the server-side session stores and what the three identity cookies mirror.
///
/// `role` is `None` only for an identity rebuilt from a missing or unrecognised
/// `usuario_rol` cookie: such a request counts as signed in, but no role-based
/// gate admits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Identity {
    pub id: Uuid,
    #[serde(rename = "nombre")]
    pub display_name: String,
    #[serde(rename = "rol")]
    pub role: Option<Role>,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            display_name: user.first_name.clone(),
            role: Some(user.role),
        }
    }
}

// --- Gates ---

/// Gate
///
/// The three access predicates. Each is evaluated on the materialized identity;
/// what happens on rejection is decided separately by `Failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Any resolved identity.
    Authenticated,
    /// Identity with role `admin`.
    Admin,
    /// Identity with role `usuario` or `admin`.
    UserOrAdmin,
}

impl Gate {
    /// check
    ///
    /// Returns the admitted identity, `Unauthenticated` when there is none, or
    /// `Forbidden` when its role does not satisfy the gate.
    pub fn check(self, identity: Option<&Identity>) -> Result<&Identity, AppError> {
        let identity = identity.ok_or(AppError::Unauthenticated)?;

        let admitted = match self {
            Gate::Authenticated => true,
            Gate::Admin => identity.role == Some(Role::Admin),
            Gate::UserOrAdmin => matches!(identity.role, Some(Role::Usuario | Role::Admin)),
        };

        if admitted {
            Ok(identity)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Failure
///
/// How a rejected request is answered: browser pages are sent home, JSON
/// endpoints get a structured error with 401/403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Redirect,
    Json,
}

impl Failure {
    pub fn reject(self, err: AppError) -> Response {
        match self {
            Failure::Redirect => Redirect::to("/").into_response(),
            Failure::Json => err.into_response(),
        }
    }
}

/// enforce
///
/// Middleware body shared by every gated router. Reads the `RequestSession`
/// placed by `load_session`; a request that never went through it has no identity.
pub async fn enforce(gate: Gate, failure: Failure, request: Request, next: Next) -> Response {
    let verdict = gate
        .check(
            request
                .extensions()
                .get::<RequestSession>()
                .and_then(|session| session.identity.as_ref()),
        )
        .map(|_| ());

    match verdict {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::debug!(
                ?gate,
                path = %request.uri().path(),
                reason = %err,
                "request rejected by gate"
            );
            failure.reject(err)
        }
    }
}

// --- Session Middleware ---

/// load_session
///
/// Runs in front of every route. Resolves the server-side session named by the
/// `sessionId` cookie, materializes the identity from the identity cookies when
/// the session holds none, and hands the result to the rest of the chain as a
/// `RequestSession` extension.
pub async fn load_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let mut context = RequestSession {
        id: jar
            .get(session::SESSION_COOKIE)
            .and_then(|cookie| cookie.value().parse::<SessionId>().ok()),
        identity: None,
    };

    if let Some(id) = &context.id {
        context.identity = state.sessions.get(id).await;
    }

    let from_store = context.identity.is_some();
    session::materialize(&mut context, &jar);

    if !from_store && !state.config.trust_role_cookie {
        context.identity = rederive(&state, context.identity.take()).await;
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Replaces the cookie-supplied name and role with the stored ones. An id the
/// credential store does not know resolves to no identity.
async fn rederive(state: &AppState, identity: Option<Identity>) -> Option<Identity> {
    let identity = identity?;
    match state.repo.get_user(identity.id).await {
        Ok(Some(user)) => Some(Identity::from(&user)),
        Ok(None) => {
            tracing::warn!(user_id = %identity.id, "identity cookie names an unknown user");
            None
        }
        Err(err) => {
            tracing::error!(user_id = %identity.id, "role lookup failed: {}", err);
            None
        }
    }
}

// --- Extractors ---

/// The per-request session context. Requests outside `load_session` see an empty one.
impl<S> FromRequestParts<S> for RequestSession
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestSession>()
            .cloned()
            .unwrap_or_default())
    }
}

/// CurrentUser
///
/// The gated identity, threaded into handler signatures. Rejects with
/// `Unauthenticated` when no identity was resolved, so a handler taking it can
/// never run anonymously even if mounted without a gate.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestSession>()
            .and_then(|session| session.identity.clone())
            .map(CurrentUser)
            .ok_or(AppError::Unauthenticated)
    }
}

// --- Self-Action Guard ---

/// ensure_not_self
///
/// Rejects a privileged mutation whose target is the acting identity. `actor`
/// must come from the materialized session, never from the request body.
pub fn ensure_not_self(actor: &Identity, target: Uuid, action: SelfAction) -> Result<(), AppError> {
    if actor.id == target {
        tracing::warn!(user_id = %actor.id, ?action, "self-targeted admin action refused");
        return Err(AppError::SelfActionDenied(action));
    }
    Ok(())
}
