//! Browser page routes.
//!
//! Each handler answers with the JSON page model a template would be rendered
//! from. Data failures never surface as errors here: the browser is redirected
//! instead, as the gates do for rejected page requests.

use std::collections::BTreeSet;

use axum::{
    Json,
    extract::{Query, State},
    response::Redirect,
};

use crate::{
    AppState,
    auth::CurrentUser,
    error::AppError,
    models::{
        AdminPage, AppointmentStatus, DashboardPage, DatesPage, Doctor, DoctorFilter,
        FindDoctorsPage, HomePage, ManageDoctorsPage, ManageUsersPage, PageView,
    },
    session::RequestSession,
};

type PageResult<T> = Result<Json<PageView<T>>, Redirect>;

fn redirect_on_error(target: &'static str) -> impl FnOnce(AppError) -> Redirect {
    move |err| {
        tracing::error!(redirect = target, "page data unavailable: {}", err);
        Redirect::to(target)
    }
}

fn specialties_of(doctors: &[Doctor]) -> Vec<String> {
    doctors
        .iter()
        .map(|doctor| doctor.specialty.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// home
///
/// [Public Page] Landing page. The speciality list is only loaded for visitors with
/// an identity; anonymous visitors get an empty list.
pub async fn home(
    State(state): State<AppState>,
    session: RequestSession,
) -> Json<PageView<HomePage>> {
    let specialties = match &session.identity {
        Some(_) => match state.repo.list_doctors().await {
            Ok(doctors) => specialties_of(&doctors),
            Err(err) => {
                tracing::error!("could not load specialities for home page: {}", err);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    Json(PageView::new(
        "Inicio",
        session.identity,
        HomePage { specialties },
    ))
}

/// find_doctors
///
/// [Public Page] Doctor directory with optional filters: a case-insensitive name
/// substring and an exact speciality. The speciality list always covers the whole
/// directory so the filter drop-down stays complete.
pub async fn find_doctors(
    State(state): State<AppState>,
    session: RequestSession,
    Query(filter): Query<DoctorFilter>,
) -> PageResult<FindDoctorsPage> {
    let all = state
        .repo
        .list_doctors()
        .await
        .map_err(redirect_on_error("/"))?;
    let specialties = specialties_of(&all);

    let name = filter
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_lowercase);
    let specialty = filter
        .specialty
        .as_deref()
        .map(str::trim)
        .filter(|specialty| !specialty.is_empty());

    let doctors = all
        .into_iter()
        .filter(|doctor| {
            name.as_ref()
                .is_none_or(|name| doctor.full_name.to_lowercase().contains(name.as_str()))
        })
        .filter(|doctor| specialty.is_none_or(|specialty| doctor.specialty == specialty))
        .collect();

    Ok(Json(PageView::new(
        "Buscar Doctores",
        session.identity,
        FindDoctorsPage {
            doctors,
            specialties,
            filters: filter,
        },
    )))
}

/// dashboard
///
/// [Authenticated Page] Profile plus pending appointments. An identity whose
/// account is gone is signed out.
pub async fn dashboard(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
) -> PageResult<DashboardPage> {
    let user = state
        .repo
        .get_user(identity.id)
        .await
        .map_err(redirect_on_error("/logout"))?
        .ok_or_else(|| {
            tracing::warn!(user_id = %identity.id, "dashboard requested for a deleted account");
            Redirect::to("/logout")
        })?;

    let pending_appointments = state
        .repo
        .list_pending_for(identity.id)
        .await
        .map_err(redirect_on_error("/logout"))?;

    Ok(Json(PageView::new(
        "Mi Panel",
        Some(identity),
        DashboardPage {
            user,
            pending_appointments,
            unavailable_days: state.config.unavailable_days.clone(),
        },
    )))
}

/// dates
///
/// [User-or-Admin Page] Booking page: the holder's appointments and the doctors to
/// book with.
pub async fn dates(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
) -> PageResult<DatesPage> {
    let appointments = state
        .repo
        .list_appointments_for(identity.id)
        .await
        .map_err(redirect_on_error("/"))?;
    let doctors = state
        .repo
        .list_doctors()
        .await
        .map_err(redirect_on_error("/"))?;

    Ok(Json(PageView::new(
        "Agendar Cita",
        Some(identity),
        DatesPage {
            appointments,
            doctors,
            unavailable_days: state.config.unavailable_days.clone(),
        },
    )))
}

/// admin_dashboard
///
/// [Admin Page] Every appointment with its patient, plus the headline counters.
pub async fn admin_dashboard(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
) -> PageResult<AdminPage> {
    let appointments = state
        .repo
        .list_all_appointments()
        .await
        .map_err(redirect_on_error("/"))?;
    let doctor_count = state
        .repo
        .list_doctors()
        .await
        .map_err(redirect_on_error("/"))?
        .len();
    let pending_count = appointments
        .iter()
        .filter(|a| a.appointment.status == AppointmentStatus::Pending)
        .count();

    Ok(Json(PageView::new(
        "Panel de Administración",
        Some(identity),
        AdminPage {
            appointment_count: appointments.len(),
            doctor_count,
            pending_count,
            appointments,
        },
    )))
}

/// manage_doctors
pub async fn manage_doctors(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
) -> PageResult<ManageDoctorsPage> {
    let doctors = state
        .repo
        .list_doctors()
        .await
        .map_err(redirect_on_error("/admin"))?;

    Ok(Json(PageView::new(
        "Gestionar Doctores",
        Some(identity),
        ManageDoctorsPage { doctors },
    )))
}

/// manage_users
pub async fn manage_users(
    CurrentUser(identity): CurrentUser,
    State(state): State<AppState>,
) -> PageResult<ManageUsersPage> {
    let users = state
        .repo
        .list_users()
        .await
        .map_err(redirect_on_error("/admin"))?;

    Ok(Json(PageView::new(
        "Gestionar Usuarios",
        Some(identity),
        ManageUsersPage { users },
    )))
}
