use crate::{
    AppState, accounts,
    auth::{CurrentUser, Identity, ensure_not_self},
    error::{AppError, SelfAction},
    models::{
        AppointmentResponse, CreateAppointmentRequest, DoctorRequest, DoctorResponse, ErrorBody,
        LoginRequest, LoginResponse, MessageResponse, RegisterRequest, Role, UpdateDoctorRequest,
        UpdateProfileRequest, UserResponse, non_blank,
    },
    session::{self, RequestSession},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::Redirect,
};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

// --- Public Handlers ---

/// health
///
/// [Public Route] Liveness probe for load balancers.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// register
///
/// [Public Route] Creates a `usuario` account. The new account is not signed in;
/// the browser follows up with `POST /login`.
#[utoipa::path(
    post,
    path = "/registro",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = UserResponse),
        (status = 400, description = "Invalid input or duplicate email", body = ErrorBody)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = accounts::register(state.repo.as_ref(), payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "¡Usuario registrado exitosamente!".to_string(),
            user,
        }),
    ))
}

/// login
///
/// [Public Route] Verifies credentials, then opens a fresh server-side session and
/// issues the identity cookies.
///
/// *Session Fixation*: any session the request arrived with is destroyed first, so
/// the `sessionId` handed out after login is always new.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session and identity cookies set", body = LoginResponse),
        (status = 400, description = "Credenciales incorrectas", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: RequestSession,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let identity = accounts::login(state.repo.as_ref(), &payload.email, &payload.password).await?;

    if let Some(old) = &session.id {
        state.sessions.destroy(old).await;
    }
    let session_id = state.sessions.create(identity.clone()).await;

    let secure = state.config.cookie_secure;
    let jar = session::issue_session_cookie(jar, session_id, secure);
    let jar = session::issue_identity_cookies(jar, &identity, secure);

    Ok((
        jar,
        Json(LoginResponse {
            message: "Inicio de sesión exitoso".to_string(),
            identity,
        }),
    ))
}

/// logout
///
/// [Public Route] Destroys the server-side session, clears every session cookie and
/// sends the browser home. Safe to call without a session.
#[utoipa::path(
    get,
    path = "/logout",
    responses((status = 303, description = "Session cleared; redirect to /"))
)]
pub async fn logout(
    State(state): State<AppState>,
    session: RequestSession,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(id) = &session.id {
        state.sessions.destroy(id).await;
    }
    if let Some(identity) = &session.identity {
        tracing::info!(user_id = %identity.id, "user signed out");
    }
    (session::clear_cookies(jar), Redirect::to("/"))
}

/// setup_admin
///
/// [Public Route] Bootstrap for a fresh install: promotes the account with `email`
/// to admin, but only while the system has no admin at all.
///
/// *Note*: the existence check and the promotion are two operations; two concurrent
/// calls may both succeed (last write wins).
#[utoipa::path(
    get,
    path = "/setup-admin/{email}",
    params(("email" = String, Path, description = "Email of the account to promote")),
    responses(
        (status = 200, description = "Promoted", body = UserResponse),
        (status = 403, description = "An admin already exists", body = ErrorBody),
        (status = 404, description = "Unknown email", body = ErrorBody)
    )
)]
pub async fn setup_admin(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    if state.repo.admin_exists().await? {
        return Err(AppError::AdminAlreadyExists);
    }

    let user = state
        .repo
        .find_user_by_email(email.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("Usuario no encontrado".to_string()))?;

    let user = state
        .repo
        .set_role(user.id, Role::Admin)
        .await?
        .ok_or_else(|| AppError::NotFound("Usuario no encontrado".to_string()))?;

    tracing::warn!(user_id = %user.id, "first administrator bootstrapped");
    Ok(Json(UserResponse {
        message: "Usuario promovido a administrador correctamente".to_string(),
        user,
    }))
}

// --- Authenticated Handlers ---

/// me
///
/// [Authenticated Route] Returns the identity materialized for this request.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current identity", body = Identity),
        (status = 401, description = "No identity", body = ErrorBody)
    )
)]
pub async fn me(CurrentUser(identity): CurrentUser) -> Json<Identity> {
    Json(identity)
}

/// update_profile
///
/// [Authenticated Route] Updates the holder's own profile. Only the holder's record
/// is touched (`id` comes from the session) and the role cannot be changed here.
///
/// When the first name changes, the session identity and the `usuario_nombre`
/// cookie are refreshed so the navigation bar follows.
#[utoipa::path(
    post,
    path = "/perfil",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 404, description = "Account no longer exists", body = ErrorBody)
    )
)]
pub async fn update_profile(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
    session: RequestSession,
    jar: CookieJar,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<(CookieJar, Json<UserResponse>), AppError> {
    let trimmed = |value: Option<String>| value.map(|v| v.trim().to_string());
    let update = UpdateProfileRequest {
        first_name: trimmed(payload.first_name),
        last_name: trimmed(payload.last_name),
        phone: non_blank(payload.phone),
        birth_date: non_blank(payload.birth_date),
    };
    if update.first_name.as_deref() == Some("") {
        return Err(AppError::Validation("El nombre es obligatorio".to_string()));
    }
    if update.last_name.as_deref() == Some("") {
        return Err(AppError::Validation("El apellido es obligatorio".to_string()));
    }

    let user = state
        .repo
        .update_profile(identity.id, update)
        .await?
        .ok_or_else(|| AppError::NotFound("Usuario no encontrado".to_string()))?;

    let mut jar = jar;
    if user.first_name != identity.display_name {
        let renamed = Identity {
            display_name: user.first_name.clone(),
            ..identity
        };
        if let Some(id) = &session.id {
            state.sessions.set(id, renamed).await;
        }
        jar = session::issue_name_cookie(jar, &user.first_name, state.config.cookie_secure);
    }

    tracing::info!(user_id = %user.id, "profile updated");
    Ok((
        jar,
        Json(UserResponse {
            message: "Perfil actualizado exitosamente".to_string(),
            user,
        }),
    ))
}

// --- User-or-Admin Handlers ---

/// create_appointment
///
/// [User-or-Admin Route] Books an appointment owned by the session identity. The
/// request body cannot name another owner.
#[utoipa::path(
    post,
    path = "/citas",
    request_body = CreateAppointmentRequest,
    responses(
        (status = 201, description = "Booked", body = AppointmentResponse),
        (status = 400, description = "Invalid input or unavailable day", body = ErrorBody)
    )
)]
pub async fn create_appointment(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentResponse>), AppError> {
    let request = CreateAppointmentRequest {
        doctor: payload.doctor.trim().to_string(),
        date: payload.date,
        time: payload.time.trim().to_string(),
        reason: payload.reason.trim().to_string(),
    };
    if request.doctor.is_empty() {
        return Err(AppError::Validation("Selecciona un doctor".to_string()));
    }
    if request.time.is_empty() {
        return Err(AppError::Validation("Selecciona una hora".to_string()));
    }
    if request.reason.is_empty() {
        return Err(AppError::Validation(
            "El motivo de la cita es obligatorio".to_string(),
        ));
    }
    if state.config.is_unavailable(request.date) {
        return Err(AppError::Validation(
            "La fecha seleccionada no está disponible".to_string(),
        ));
    }

    let appointment = state.repo.create_appointment(identity.id, request).await?;
    tracing::info!(user_id = %identity.id, appointment_id = %appointment.id, "appointment booked");

    Ok((
        StatusCode::CREATED,
        Json(AppointmentResponse {
            message: "Cita agendada exitosamente".to_string(),
            appointment,
        }),
    ))
}

/// cancel_appointment
///
/// [User-or-Admin Route] Cancels one of the holder's own appointments.
///
/// *Authorization*: **Owner-Only** is enforced by the repository query; another
/// user's appointment is reported exactly like a missing one.
#[utoipa::path(
    delete,
    path = "/citas/{id}",
    params(("id" = Uuid, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Cancelled", body = MessageResponse),
        (status = 404, description = "Not found or not owned", body = ErrorBody)
    )
)]
pub async fn cancel_appointment(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    if !state.repo.cancel_appointment(id, identity.id).await? {
        return Err(AppError::NotFound(
            "Cita no encontrada o no autorizado para borrarla".to_string(),
        ));
    }
    Ok(Json(MessageResponse::new("Cita cancelada exitosamente")))
}

// --- Admin Handlers ---

/// create_doctor
///
/// [Admin Route] Adds a doctor to the directory.
#[utoipa::path(
    post,
    path = "/admin/doctores",
    request_body = DoctorRequest,
    responses(
        (status = 201, description = "Created", body = DoctorResponse),
        (status = 400, description = "Invalid input or duplicate email", body = ErrorBody)
    )
)]
pub async fn create_doctor(
    CurrentUser(admin): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<DoctorRequest>,
) -> Result<(StatusCode, Json<DoctorResponse>), AppError> {
    let request = payload.normalized().map_err(AppError::Validation)?;
    let doctor = state.repo.create_doctor(request).await?;
    tracing::info!(admin_id = %admin.id, doctor_id = %doctor.id, "doctor created");

    Ok((
        StatusCode::CREATED,
        Json(DoctorResponse {
            message: "Doctor añadido exitosamente".to_string(),
            doctor,
        }),
    ))
}

/// update_doctor
///
/// [Admin Route] Partially updates a doctor; absent fields are kept.
#[utoipa::path(
    post,
    path = "/admin/doctores/actualizar/{id}",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    request_body = UpdateDoctorRequest,
    responses(
        (status = 200, description = "Updated", body = DoctorResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn update_doctor(
    CurrentUser(admin): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDoctorRequest>,
) -> Result<Json<DoctorResponse>, AppError> {
    let request = payload.normalized().map_err(AppError::Validation)?;
    let doctor = state
        .repo
        .update_doctor(id, request)
        .await?
        .ok_or_else(|| AppError::NotFound("Doctor no encontrado".to_string()))?;
    tracing::info!(admin_id = %admin.id, doctor_id = %doctor.id, "doctor updated");

    Ok(Json(DoctorResponse {
        message: "Doctor actualizado exitosamente".to_string(),
        doctor,
    }))
}

/// delete_doctor
#[utoipa::path(
    delete,
    path = "/admin/doctores/{id}",
    params(("id" = Uuid, Path, description = "Doctor ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_doctor(
    CurrentUser(admin): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    if !state.repo.delete_doctor(id).await? {
        return Err(AppError::NotFound("Doctor no encontrado".to_string()));
    }
    tracing::info!(admin_id = %admin.id, doctor_id = %id, "doctor deleted");
    Ok(Json(MessageResponse::new("Doctor eliminado exitosamente")))
}

/// delete_appointment
///
/// [Admin Route] Removes any appointment regardless of its owner.
#[utoipa::path(
    delete,
    path = "/admin/citas/{id}",
    params(("id" = Uuid, Path, description = "Appointment ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_appointment(
    CurrentUser(admin): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    if !state.repo.delete_appointment(id).await? {
        return Err(AppError::NotFound("Cita no encontrada".to_string()));
    }
    tracing::info!(admin_id = %admin.id, appointment_id = %id, "appointment deleted by admin");
    Ok(Json(MessageResponse::new("Cita eliminada por el administrador")))
}

/// promote_user
///
/// [Admin Route] Grants the admin role to another account.
///
/// *Self-Action Guard*: the acting admin is read from the session, never the body.
#[utoipa::path(
    post,
    path = "/admin/usuarios/{id}/promover-admin",
    params(("id" = Uuid, Path, description = "Target user ID")),
    responses(
        (status = 200, description = "Promoted", body = UserResponse),
        (status = 400, description = "Target is the acting admin", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn promote_user(
    CurrentUser(admin): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    change_role(&state, &admin, id, Role::Admin, "Usuario promovido a administrador").await
}

/// demote_user
///
/// [Admin Route] Returns another admin to the `usuario` role. Same guard as `promote_user`.
#[utoipa::path(
    post,
    path = "/admin/usuarios/{id}/remover-admin",
    params(("id" = Uuid, Path, description = "Target user ID")),
    responses(
        (status = 200, description = "Demoted", body = UserResponse),
        (status = 400, description = "Target is the acting admin", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn demote_user(
    CurrentUser(admin): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    change_role(&state, &admin, id, Role::Usuario, "Permisos de administrador removidos").await
}

async fn change_role(
    state: &AppState,
    admin: &Identity,
    target: Uuid,
    role: Role,
    message: &str,
) -> Result<Json<UserResponse>, AppError> {
    ensure_not_self(admin, target, SelfAction::ChangeRole)?;

    let user = state
        .repo
        .set_role(target, role)
        .await?
        .ok_or_else(|| AppError::NotFound("Usuario no encontrado".to_string()))?;
    tracing::info!(admin_id = %admin.id, user_id = %target, role = %role, "role changed");

    Ok(Json(UserResponse {
        message: message.to_string(),
        user,
    }))
}

/// delete_user
///
/// [Admin Route] Deletes another account together with its appointments.
#[utoipa::path(
    post,
    path = "/admin/usuarios/{id}/eliminar",
    params(("id" = Uuid, Path, description = "Target user ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 400, description = "Target is the acting admin", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_user(
    CurrentUser(admin): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    ensure_not_self(&admin, id, SelfAction::DeleteAccount)?;

    if !state.repo.delete_user(id).await? {
        return Err(AppError::NotFound("Usuario no encontrado".to_string()));
    }
    tracing::info!(admin_id = %admin.id, user_id = %id, "user deleted");
    Ok(Json(MessageResponse::new("Usuario eliminado exitosamente")))
}
