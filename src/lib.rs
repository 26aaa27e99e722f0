use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Session and authorization core.
pub mod auth;
pub mod session;

// Application services and components.
pub mod accounts;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pages;
pub mod repository;
pub mod seed;

// Router segregation by access level (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use session::{MemorySessionStore, SessionState};

/// ApiDoc
///
/// OpenAPI document for the JSON API, served at `/api-docs/openapi.json` and
/// browsable at `/swagger-ui`. Page routes return page models and are left out.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::register, handlers::login, handlers::logout,
        handlers::setup_admin, handlers::me, handlers::update_profile,
        handlers::create_appointment, handlers::cancel_appointment,
        handlers::create_doctor, handlers::update_doctor, handlers::delete_doctor,
        handlers::delete_appointment, handlers::promote_user, handlers::demote_user,
        handlers::delete_user
    ),
    components(
        schemas(
            auth::Identity, models::Role, models::AppointmentStatus, models::User,
            models::Doctor, models::Appointment, models::PatientAppointment,
            models::RegisterRequest, models::LoginRequest, models::UpdateProfileRequest,
            models::CreateAppointmentRequest, models::DoctorRequest,
            models::UpdateDoctorRequest, models::MessageResponse, models::LoginResponse,
            models::UserResponse, models::DoctorResponse, models::AppointmentResponse,
            models::ErrorBody,
        )
    ),
    tags(
        (name = "hospital-portal", description = "Hospital appointment portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for the services every request needs. Cloning is
/// cheap: each field is an `Arc` or small configuration data.
#[derive(Clone)]
pub struct AppState {
    /// Credential store, doctor directory and appointments.
    pub repo: RepositoryState,
    /// Server-side sessions of this process.
    pub sessions: SessionState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing tree. Every route, public or gated, runs behind
/// `auth::load_session`, so gates and handlers all see the same materialized
/// identity.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no gate.
        .merge(public::public_routes())
        // Authenticated Routes: each group carries its own gate.
        .merge(authenticated::authenticated_routes())
        // Admin Routes: admin-only gate, nested under '/admin'.
        .nest("/admin", admin::admin_routes())
        // Session materialization runs before any gate or handler.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::load_session,
        ))
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing, correlated by the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span: method, uri and the `x-request-id` set above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
