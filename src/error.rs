use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use thiserror::Error;

use crate::models::ErrorBody;

/// SelfAction
///
/// Privileged mutations an admin may never aim at their own account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfAction {
    ChangeRole,
    DeleteAccount,
}

impl fmt::Display for SelfAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelfAction::ChangeRole => f.write_str("No puedes cambiar tu propio rol"),
            SelfAction::DeleteAccount => f.write_str("No puedes eliminar tu propia cuenta"),
        }
    }
}

/// AppError
///
/// Every failure a handler, gate or repository call can surface. Converted into a
/// JSON `{"error": ...}` body with the matching status code.
#[derive(Debug, Error)]
pub enum AppError {
    /// No identity could be resolved for the request.
    #[error("No autorizado")]
    Unauthenticated,
    /// An identity is present but its role does not satisfy the gate.
    #[error("Acceso denegado")]
    Forbidden,
    #[error("{0}")]
    SelfActionDenied(SelfAction),
    #[error("Credenciales incorrectas")]
    InvalidCredentials,
    #[error("Ya existe un administrador en el sistema. Usa /admin/manage-users")]
    AdminAlreadyExists,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::AdminAlreadyExists => StatusCode::FORBIDDEN,
            AppError::SelfActionDenied(_)
            | AppError::InvalidCredentials
            | AppError::Validation(_)
            | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err).context("database operation failed"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            AppError::Internal(err) => {
                // Internal details stay in the logs.
                tracing::error!("internal error: {:#}", err);
                "Error interno del servidor".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}
