//! Credential handling: registration and login against the credential store.

use anyhow::anyhow;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;

use crate::{
    auth::Identity,
    error::AppError,
    models::{NewUser, RegisterRequest, Role, User, is_valid_email, non_blank},
    repository::Repository,
};

/// register
///
/// Validates a registration, hashes the password with a fresh salt and stores
/// the account with role `usuario`. A taken email is rejected before hashing.
pub async fn register(repo: &dyn Repository, req: RegisterRequest) -> Result<User, AppError> {
    let first_name = req.first_name.trim().to_string();
    let last_name = req.last_name.trim().to_string();
    let email = req.email.trim().to_string();

    if first_name.is_empty() {
        return Err(AppError::Validation("El nombre es obligatorio".to_string()));
    }
    if last_name.is_empty() {
        return Err(AppError::Validation("El apellido es obligatorio".to_string()));
    }
    if !is_valid_email(&email) {
        return Err(AppError::Validation(
            "Por favor ingresa un email válido".to_string(),
        ));
    }
    if req.password.is_empty() {
        return Err(AppError::Validation(
            "La contraseña es obligatoria".to_string(),
        ));
    }

    if repo.find_credentials(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "El correo electrónico ya está registrado.".to_string(),
        ));
    }

    let user = repo
        .create_user(NewUser {
            first_name,
            last_name,
            email,
            phone: non_blank(req.phone),
            birth_date: non_blank(req.birth_date),
            password_hash: hash_password(&req.password)?,
            role: Role::Usuario,
        })
        .await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

/// login
///
/// Verifies `email`/`password` and returns the identity the session will hold.
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn login(repo: &dyn Repository, email: &str, password: &str) -> Result<Identity, AppError> {
    let Some(credentials) = repo.find_credentials(email.trim()).await? else {
        tracing::info!("login failed: unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(password, &credentials.password_hash)? {
        tracing::info!(user_id = %credentials.user.id, "login failed: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    tracing::info!(user_id = %credentials.user.id, role = %credentials.user.role, "login succeeded");
    Ok(Identity::from(&credentials.user))
}

/// Hash password using Argon2
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow!("password hashing failed: {e}")))
}

/// Verify password against a stored PHC string
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(anyhow!("stored password hash is malformed: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
