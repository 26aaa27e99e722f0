use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr, sync::LazyLock};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;

// Field names on the wire follow the browser front-end (Spanish, camelCase);
// Rust fields and database columns stay in English.

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".+@.+\..+").expect("email pattern compiles"));

/// Loose `something@domain.tld` check shared by user and doctor records.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

// --- Roles & Statuses ---

/// Role
///
/// The RBAC field of a user. Serialized as `usuario` / `admin`, which is also the
/// value stored in the database and mirrored in the `usuario_rol` cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Usuario,
    Admin,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Usuario => "usuario",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usuario" => Ok(Role::Usuario),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// AppointmentStatus
///
/// Lifecycle of an appointment. New bookings start as `Pendiente`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub enum AppointmentStatus {
    #[default]
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "Confirmada")]
    Confirmed,
    #[serde(rename = "Cancelada")]
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "Pendiente",
            AppointmentStatus::Confirmed => "Confirmada",
            AppointmentStatus::Cancelled => "Cancelada",
        }
    }
}

impl TryFrom<String> for AppointmentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "Pendiente" => Ok(AppointmentStatus::Pending),
            "Confirmada" => Ok(AppointmentStatus::Confirmed),
            "Cancelada" => Ok(AppointmentStatus::Cancelled),
            _ => Err(format!("unknown appointment status `{value}`")),
        }
    }
}

// --- Core Records (Mapped to Database) ---

/// User
///
/// A registered account as exposed to the application. The password hash lives in
/// `StoredCredentials` and never leaves the repository/accounts boundary.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    #[serde(rename = "nombre")]
    pub first_name: String,
    #[serde(rename = "apellido")]
    pub last_name: String,
    pub email: String,
    #[serde(rename = "telefono")]
    pub phone: Option<String>,
    #[serde(rename = "fechaNacimiento")]
    pub birth_date: Option<String>,
    #[serde(rename = "rol")]
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[serde(rename = "fechaRegistro")]
    #[ts(type = "string")]
    pub registered_at: DateTime<Utc>,
}

/// StoredCredentials
///
/// A user row together with its Argon2 PHC hash, used only for login.
#[derive(Debug, Clone, FromRow)]
pub struct StoredCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

/// NewUser
///
/// A validated registration ready for insertion (password already hashed).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Doctor
///
/// An entry of the hospital's doctor directory.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Doctor {
    pub id: Uuid,
    #[serde(rename = "nombreCompleto")]
    pub full_name: String,
    #[serde(rename = "especialidad")]
    pub specialty: String,
    #[serde(rename = "consultorio")]
    pub office: String,
    pub email: String,
    #[serde(rename = "telefono")]
    pub phone: Option<String>,
    #[serde(rename = "fechaRegistro")]
    #[ts(type = "string")]
    pub registered_at: DateTime<Utc>,
}

/// Appointment
///
/// A booking owned by a single user (`user_id`). Only the owner may cancel it
/// through the self-service path; admins may remove any.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Appointment {
    pub id: Uuid,
    #[serde(rename = "usuario")]
    pub user_id: Uuid,
    pub doctor: String,
    #[serde(rename = "fecha")]
    #[sqlx(rename = "scheduled_on")]
    #[ts(type = "string")]
    pub date: NaiveDate,
    #[serde(rename = "hora")]
    #[sqlx(rename = "slot")]
    pub time: String,
    #[serde(rename = "motivo")]
    pub reason: String,
    #[serde(rename = "estado")]
    #[sqlx(try_from = "String")]
    pub status: AppointmentStatus,
    #[serde(rename = "fechaCreacion")]
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// PatientAppointment
///
/// Admin view of an appointment, joined with the owner's name and email.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct PatientAppointment {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub appointment: Appointment,
    #[serde(rename = "nombrePaciente")]
    pub patient_name: String,
    #[serde(rename = "emailPaciente")]
    pub patient_email: String,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterRequest
///
/// Input payload for `POST /registro`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    #[serde(rename = "nombre")]
    pub first_name: String,
    #[serde(rename = "apellido")]
    pub last_name: String,
    pub email: String,
    #[serde(rename = "telefono", default)]
    pub phone: Option<String>,
    #[serde(rename = "fechaNacimiento", default)]
    pub birth_date: Option<String>,
    pub password: String,
}

/// LoginRequest
///
/// Input payload for `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// UpdateProfileRequest
///
/// Partial self-service update (`POST /perfil`). There is no role,
/// email or password field: a holder cannot change their own role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "apellido", default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(rename = "telefono", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "fechaNacimiento", default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
}

/// CreateAppointmentRequest
///
/// Input payload for `POST /citas`. The owner is never read from the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateAppointmentRequest {
    pub doctor: String,
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "hora")]
    pub time: String,
    #[serde(rename = "motivo")]
    pub reason: String,
}

/// DoctorRequest
///
/// Input payload for `POST /admin/doctores`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DoctorRequest {
    #[serde(rename = "nombreCompleto")]
    pub full_name: String,
    #[serde(rename = "especialidad")]
    pub specialty: String,
    #[serde(rename = "consultorio")]
    pub office: String,
    pub email: String,
    #[serde(rename = "telefono", default)]
    pub phone: Option<String>,
}

/// UpdateDoctorRequest
///
/// Partial update for `POST /admin/doctores/actualizar/{id}`. Absent fields keep
/// their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateDoctorRequest {
    #[serde(rename = "nombreCompleto", default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(rename = "especialidad", default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(rename = "consultorio", default, skip_serializing_if = "Option::is_none")]
    pub office: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "telefono", default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl DoctorRequest {
    /// Trims every field and checks the required ones.
    pub fn normalized(self) -> Result<Self, String> {
        let doctor = Self {
            full_name: self.full_name.trim().to_string(),
            specialty: self.specialty.trim().to_string(),
            office: self.office.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: non_blank(self.phone),
        };
        if doctor.full_name.is_empty() {
            return Err("El nombre completo es obligatorio".to_string());
        }
        if doctor.specialty.is_empty() {
            return Err("La especialidad es obligatoria".to_string());
        }
        if doctor.office.is_empty() {
            return Err("El número de consultorio es obligatorio".to_string());
        }
        if !is_valid_email(&doctor.email) {
            return Err("Por favor ingresa un email válido".to_string());
        }
        Ok(doctor)
    }
}

impl UpdateDoctorRequest {
    pub fn normalized(self) -> Result<Self, String> {
        let trim = |value: Option<String>| value.map(|v| v.trim().to_string());
        let update = Self {
            full_name: trim(self.full_name),
            specialty: trim(self.specialty),
            office: trim(self.office),
            email: trim(self.email),
            phone: trim(self.phone),
        };
        let blank = |value: &Option<String>| value.as_deref().is_some_and(str::is_empty);
        if blank(&update.full_name) || blank(&update.specialty) || blank(&update.office) {
            return Err("Los campos del doctor no pueden quedar vacíos".to_string());
        }
        if let Some(email) = &update.email {
            if !is_valid_email(email) {
                return Err("Por favor ingresa un email válido".to_string());
            }
        }
        Ok(update)
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// --- Responses (Output Schemas) ---

/// MessageResponse
///
/// Plain confirmation body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    #[serde(rename = "mensaje")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// LoginResponse
///
/// Body of a successful `POST /login`, carrying the identity now held by the
/// session and mirrored in the identity cookies.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    #[serde(rename = "mensaje")]
    pub message: String,
    #[serde(rename = "usuario")]
    pub identity: Identity,
}

/// UserResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserResponse {
    #[serde(rename = "mensaje")]
    pub message: String,
    #[serde(rename = "usuario")]
    pub user: User,
}

/// DoctorResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DoctorResponse {
    #[serde(rename = "mensaje")]
    pub message: String,
    pub doctor: Doctor,
}

/// AppointmentResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AppointmentResponse {
    #[serde(rename = "mensaje")]
    pub message: String,
    #[serde(rename = "cita")]
    pub appointment: Appointment,
}

/// ErrorBody
///
/// Machine-readable failure body returned by every JSON route.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub error: String,
}

// --- Page Models (browser routes) ---

/// PageView
///
/// Data handed to a browser page: its title, the identity resolved for the
/// request (drives the navigation bar) and the page-specific payload.
#[derive(Debug, Clone, Serialize)]
pub struct PageView<T> {
    #[serde(rename = "pageTitle")]
    pub page_title: String,
    #[serde(rename = "sesion")]
    pub session: Option<Identity>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> PageView<T> {
    pub fn new(page_title: impl Into<String>, session: Option<Identity>, data: T) -> Self {
        Self {
            page_title: page_title.into(),
            session,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, Default)]
#[ts(export)]
pub struct HomePage {
    #[serde(rename = "especialidades")]
    pub specialties: Vec<String>,
}

/// DoctorFilter
///
/// Query parameters of `GET /find-doctors`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, Default)]
#[ts(export)]
pub struct DoctorFilter {
    /// Case-insensitive substring of the doctor's full name.
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Exact speciality.
    #[serde(rename = "especialidad", default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, Default)]
#[ts(export)]
pub struct FindDoctorsPage {
    #[serde(rename = "doctores")]
    pub doctors: Vec<Doctor>,
    #[serde(rename = "especialidades")]
    pub specialties: Vec<String>,
    #[serde(rename = "filtros")]
    pub filters: DoctorFilter,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DashboardPage {
    #[serde(rename = "usuario")]
    pub user: User,
    #[serde(rename = "citasPendientes")]
    pub pending_appointments: Vec<Appointment>,
    #[serde(rename = "diasNoDisponibles")]
    pub unavailable_days: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DatesPage {
    #[serde(rename = "citas")]
    pub appointments: Vec<Appointment>,
    #[serde(rename = "doctores")]
    pub doctors: Vec<Doctor>,
    #[serde(rename = "diasNoDisponibles")]
    pub unavailable_days: Vec<NaiveDate>,
}

/// AdminPage
///
/// Admin dashboard: every appointment plus the three counters shown on top.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AdminPage {
    #[serde(rename = "citas")]
    pub appointments: Vec<PatientAppointment>,
    #[serde(rename = "conteoCitas")]
    pub appointment_count: usize,
    #[serde(rename = "conteoDoctores")]
    pub doctor_count: usize,
    #[serde(rename = "conteoPendientes")]
    pub pending_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManageDoctorsPage {
    #[serde(rename = "doctores")]
    pub doctors: Vec<Doctor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManageUsersPage {
    #[serde(rename = "usuarios")]
    pub users: Vec<User>,
}
