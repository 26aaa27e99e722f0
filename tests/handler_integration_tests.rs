use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use chrono::NaiveDate;
use hospital_portal::{
    AppConfig, AppError, AppState, MemoryRepository, MemorySessionStore,
    auth::{CurrentUser, Identity},
    error::SelfAction,
    handlers,
    models::{
        CreateAppointmentRequest, LoginRequest, RegisterRequest, Role, UpdateProfileRequest, User,
    },
    repository::{Repository, RepositoryState},
    session::{self, RequestSession, SessionId, SessionState, SessionStore},
};
use std::sync::Arc;
use uuid::Uuid;

// --- Test State Setup ---

struct TestContext {
    state: AppState,
    repo: Arc<MemoryRepository>,
    sessions: Arc<MemorySessionStore>,
}

fn create_test_state() -> TestContext {
    let config = AppConfig::default();
    let repo = Arc::new(MemoryRepository::new());
    let sessions = Arc::new(MemorySessionStore::new(config.session_ttl));
    TestContext {
        state: AppState {
            repo: repo.clone() as RepositoryState,
            sessions: sessions.clone() as SessionState,
            config,
        },
        repo,
        sessions,
    }
}

async fn register(ctx: &TestContext, name: &str, email: &str) -> User {
    let (_, Json(body)) = handlers::register(
        State(ctx.state.clone()),
        Json(RegisterRequest {
            first_name: name.to_string(),
            last_name: "Prueba".to_string(),
            email: email.to_string(),
            phone: None,
            birth_date: None,
            password: "secreta123".to_string(),
        }),
    )
    .await
    .unwrap();
    body.user
}

async fn register_admin(ctx: &TestContext, name: &str, email: &str) -> Identity {
    let user = register(ctx, name, email).await;
    let admin = ctx.repo.set_role(user.id, Role::Admin).await.unwrap().unwrap();
    Identity::from(&admin)
}

fn booking(date: NaiveDate) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        doctor: "Dr. Juan Pérez".to_string(),
        date,
        time: "10:00".to_string(),
        reason: "Chequeo general".to_string(),
    }
}

fn open_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()
}

// --- Registration & Login ---

#[tokio::test]
async fn test_register_creates_usuario_account() {
    let ctx = create_test_state();

    let (status, Json(body)) = handlers::register(
        State(ctx.state.clone()),
        Json(RegisterRequest {
            first_name: "  Ana ".to_string(),
            last_name: "García".to_string(),
            email: "ana@example.com".to_string(),
            phone: Some("   ".to_string()),
            birth_date: None,
            password: "secreta123".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.user.first_name, "Ana");
    assert_eq!(body.user.role, Role::Usuario);
    assert_eq!(body.user.phone, None);
}

#[tokio::test]
async fn test_register_duplicate_email_is_rejected() {
    let ctx = create_test_state();
    register(&ctx, "Ana", "ana@example.com").await;

    let result = handlers::register(
        State(ctx.state.clone()),
        Json(RegisterRequest {
            first_name: "Otra".to_string(),
            last_name: "Persona".to_string(),
            email: "ana@example.com".to_string(),
            phone: None,
            birth_date: None,
            password: "x".to_string(),
        }),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_issues_session_and_identity_cookies() {
    let ctx = create_test_state();
    let user = register(&ctx, "Ana", "ana@example.com").await;

    let (jar, Json(body)) = handlers::login(
        State(ctx.state.clone()),
        RequestSession::default(),
        CookieJar::new(),
        Json(LoginRequest {
            email: "ana@example.com".to_string(),
            password: "secreta123".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(body.identity.id, user.id);
    assert_eq!(body.identity.role, Some(Role::Usuario));
    assert_eq!(body.message, "Inicio de sesión exitoso");

    assert_eq!(jar.get(session::USER_ID_COOKIE).unwrap().value(), user.id.to_string());
    assert_eq!(jar.get(session::USER_NAME_COOKIE).unwrap().value(), "Ana");
    assert_eq!(jar.get(session::USER_ROLE_COOKIE).unwrap().value(), "usuario");
    let role_cookie = jar.get(session::USER_ROLE_COOKIE).unwrap();
    assert_eq!(role_cookie.http_only(), Some(true));
    assert_eq!(role_cookie.max_age(), Some(session::IDENTITY_COOKIE_MAX_AGE));

    let session_id: SessionId = jar
        .get(session::SESSION_COOKIE)
        .unwrap()
        .value()
        .parse()
        .unwrap();
    assert_eq!(ctx.sessions.get(&session_id).await, Some(body.identity));
}

#[tokio::test]
async fn test_login_replaces_previous_session() {
    let ctx = create_test_state();
    let user = register(&ctx, "Ana", "ana@example.com").await;
    let old = ctx.sessions.create(Identity::from(&user)).await;

    let (jar, _) = handlers::login(
        State(ctx.state.clone()),
        RequestSession {
            id: Some(old),
            identity: None,
        },
        CookieJar::new(),
        Json(LoginRequest {
            email: "ana@example.com".to_string(),
            password: "secreta123".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(ctx.sessions.get(&old).await, None);
    assert_ne!(jar.get(session::SESSION_COOKIE).unwrap().value(), old.to_string());
    assert_eq!(ctx.sessions.len().await, 1);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let ctx = create_test_state();
    register(&ctx, "Ana", "ana@example.com").await;

    for (email, password) in [("ana@example.com", "incorrecta"), ("nadie@example.com", "secreta123")] {
        let result = handlers::login(
            State(ctx.state.clone()),
            RequestSession::default(),
            CookieJar::new(),
            Json(LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            }),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
        assert_eq!(err.to_string(), "Credenciales incorrectas");
    }
    assert!(ctx.sessions.is_empty().await);
}

#[tokio::test]
async fn test_logout_destroys_session_and_clears_cookies() {
    let ctx = create_test_state();
    let user = register(&ctx, "Ana", "ana@example.com").await;
    let identity = Identity::from(&user);
    let id = ctx.sessions.create(identity.clone()).await;
    let jar = session::issue_session_cookie(CookieJar::new(), id, false);
    let jar = session::issue_identity_cookies(jar, &identity, false);

    let (jar, redirect) = handlers::logout(
        State(ctx.state.clone()),
        RequestSession {
            id: Some(id),
            identity: Some(identity),
        },
        jar,
    )
    .await;

    assert_eq!(ctx.sessions.get(&id).await, None);
    for name in [
        session::USER_ID_COOKIE,
        session::USER_NAME_COOKIE,
        session::USER_ROLE_COOKIE,
        session::SESSION_COOKIE,
    ] {
        assert!(jar.get(name).is_none(), "{name} should be cleared");
    }
    assert_eq!(redirect.into_response().status(), StatusCode::SEE_OTHER);
}

// --- Self-Action Guard ---

#[tokio::test]
async fn test_admin_cannot_change_own_role() {
    let ctx = create_test_state();
    let admin = register_admin(&ctx, "Marta", "marta@example.com").await;

    for result in [
        handlers::promote_user(CurrentUser(admin.clone()), State(ctx.state.clone()), Path(admin.id)).await,
        handlers::demote_user(CurrentUser(admin.clone()), State(ctx.state.clone()), Path(admin.id)).await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(err, AppError::SelfActionDenied(SelfAction::ChangeRole)));
        assert_eq!(err.to_string(), "No puedes cambiar tu propio rol");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    let stored = ctx.repo.get_user(admin.id).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::Admin);
}

#[tokio::test]
async fn test_admin_cannot_delete_own_account() {
    let ctx = create_test_state();
    let admin = register_admin(&ctx, "Marta", "marta@example.com").await;

    let result =
        handlers::delete_user(CurrentUser(admin.clone()), State(ctx.state.clone()), Path(admin.id))
            .await;

    let err = result.unwrap_err();
    assert!(matches!(err, AppError::SelfActionDenied(SelfAction::DeleteAccount)));
    assert_eq!(err.to_string(), "No puedes eliminar tu propia cuenta");
    assert!(ctx.repo.get_user(admin.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_admin_can_promote_and_demote_another_user() {
    let ctx = create_test_state();
    let admin = register_admin(&ctx, "Marta", "marta@example.com").await;
    let other = register(&ctx, "Ana", "ana@example.com").await;

    let Json(promoted) =
        handlers::promote_user(CurrentUser(admin.clone()), State(ctx.state.clone()), Path(other.id))
            .await
            .unwrap();
    assert_eq!(promoted.user.role, Role::Admin);
    assert_eq!(promoted.message, "Usuario promovido a administrador");

    let Json(demoted) =
        handlers::demote_user(CurrentUser(admin), State(ctx.state.clone()), Path(other.id))
            .await
            .unwrap();
    assert_eq!(demoted.user.role, Role::Usuario);
}

#[tokio::test]
async fn test_admin_can_delete_another_user_with_appointments() {
    let ctx = create_test_state();
    let admin = register_admin(&ctx, "Marta", "marta@example.com").await;
    let other = register(&ctx, "Ana", "ana@example.com").await;
    ctx.repo.create_appointment(other.id, booking(open_day())).await.unwrap();

    handlers::delete_user(CurrentUser(admin), State(ctx.state.clone()), Path(other.id))
        .await
        .unwrap();

    assert!(ctx.repo.get_user(other.id).await.unwrap().is_none());
    assert!(ctx.repo.list_appointments_for(other.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_role_change_on_unknown_user_is_not_found() {
    let ctx = create_test_state();
    let admin = register_admin(&ctx, "Marta", "marta@example.com").await;

    let result =
        handlers::promote_user(CurrentUser(admin), State(ctx.state.clone()), Path(Uuid::new_v4()))
            .await;

    assert_eq!(result.unwrap_err().status(), StatusCode::NOT_FOUND);
}

// --- Appointments (Owner-Only) ---

#[tokio::test]
async fn test_create_appointment_is_owned_by_session_identity() {
    let ctx = create_test_state();
    let user = register(&ctx, "Ana", "ana@example.com").await;

    let (status, Json(body)) = handlers::create_appointment(
        CurrentUser(Identity::from(&user)),
        State(ctx.state.clone()),
        Json(booking(open_day())),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.appointment.user_id, user.id);
    assert_eq!(ctx.repo.list_pending_for(user.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_appointment_rejects_unavailable_day() {
    let ctx = create_test_state();
    let user = register(&ctx, "Ana", "ana@example.com").await;
    let closed = ctx.state.config.unavailable_days[0];

    let result = handlers::create_appointment(
        CurrentUser(Identity::from(&user)),
        State(ctx.state.clone()),
        Json(booking(closed)),
    )
    .await;

    assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    assert!(ctx.repo.list_appointments_for(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_appointment_is_owner_only() {
    let ctx = create_test_state();
    let owner = register(&ctx, "Ana", "ana@example.com").await;
    let stranger = register(&ctx, "Luis", "luis@example.com").await;
    let appointment = ctx.repo.create_appointment(owner.id, booking(open_day())).await.unwrap();

    let result = handlers::cancel_appointment(
        CurrentUser(Identity::from(&stranger)),
        State(ctx.state.clone()),
        Path(appointment.id),
    )
    .await;
    assert_eq!(result.unwrap_err().status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.repo.list_appointments_for(owner.id).await.unwrap().len(), 1);

    let Json(body) = handlers::cancel_appointment(
        CurrentUser(Identity::from(&owner)),
        State(ctx.state.clone()),
        Path(appointment.id),
    )
    .await
    .unwrap();
    assert_eq!(body.message, "Cita cancelada exitosamente");
    assert!(ctx.repo.list_appointments_for(owner.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_can_delete_any_appointment() {
    let ctx = create_test_state();
    let admin = register_admin(&ctx, "Marta", "marta@example.com").await;
    let owner = register(&ctx, "Ana", "ana@example.com").await;
    let appointment = ctx.repo.create_appointment(owner.id, booking(open_day())).await.unwrap();

    handlers::delete_appointment(CurrentUser(admin), State(ctx.state.clone()), Path(appointment.id))
        .await
        .unwrap();

    assert!(ctx.repo.list_all_appointments().await.unwrap().is_empty());
}

// --- Profile ---

#[tokio::test]
async fn test_update_profile_renames_session_and_cookie() {
    let ctx = create_test_state();
    let user = register(&ctx, "Ana", "ana@example.com").await;
    let identity = Identity::from(&user);
    let session_id = ctx.sessions.create(identity.clone()).await;

    let (jar, Json(body)) = handlers::update_profile(
        CurrentUser(identity.clone()),
        State(ctx.state.clone()),
        RequestSession {
            id: Some(session_id),
            identity: Some(identity),
        },
        CookieJar::new(),
        Json(UpdateProfileRequest {
            first_name: Some(" Ana María ".to_string()),
            phone: Some("4270000000".to_string()),
            ..UpdateProfileRequest::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(body.user.first_name, "Ana María");
    assert_eq!(body.user.last_name, "Prueba");
    assert_eq!(body.user.role, Role::Usuario);
    assert_eq!(jar.get(session::USER_NAME_COOKIE).unwrap().value(), "Ana María");
    assert_eq!(
        ctx.sessions.get(&session_id).await.unwrap().display_name,
        "Ana María"
    );
}

#[tokio::test]
async fn test_update_profile_rejects_blank_name() {
    let ctx = create_test_state();
    let user = register(&ctx, "Ana", "ana@example.com").await;

    let result = handlers::update_profile(
        CurrentUser(Identity::from(&user)),
        State(ctx.state.clone()),
        RequestSession::default(),
        CookieJar::new(),
        Json(UpdateProfileRequest {
            first_name: Some("   ".to_string()),
            ..UpdateProfileRequest::default()
        }),
    )
    .await;

    assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
}

// --- First Admin Bootstrap ---

#[tokio::test]
async fn test_setup_admin_only_while_no_admin_exists() {
    let ctx = create_test_state();
    let first = register(&ctx, "Ana", "ana@example.com").await;
    register(&ctx, "Luis", "luis@example.com").await;

    let missing =
        handlers::setup_admin(State(ctx.state.clone()), Path("nadie@example.com".to_string())).await;
    assert_eq!(missing.unwrap_err().status(), StatusCode::NOT_FOUND);

    let Json(body) =
        handlers::setup_admin(State(ctx.state.clone()), Path("ana@example.com".to_string()))
            .await
            .unwrap();
    assert_eq!(body.user.id, first.id);
    assert_eq!(body.user.role, Role::Admin);

    let second =
        handlers::setup_admin(State(ctx.state.clone()), Path("luis@example.com".to_string())).await;
    let err = second.unwrap_err();
    assert!(matches!(err, AppError::AdminAlreadyExists));
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
}
