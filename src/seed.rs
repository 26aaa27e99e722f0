//! Default doctor directory loaded into fresh installations.

use crate::{error::AppError, models::DoctorRequest, repository::Repository};

/// The five doctors every new installation starts with.
pub fn default_doctors() -> Vec<DoctorRequest> {
    [
        ("Dr. Juan Pérez", "Cardiología", "101-A", "juan.perez@hospital.com", "4271234567"),
        ("Dra. Ana García", "Dermatología", "102-B", "ana.garcia@hospital.com", "4271234568"),
        ("Dr. Carlos Sánchez", "Pediatría", "201-A", "carlos.sanchez@hospital.com", "4271234569"),
        ("Dra. Laura Martínez", "Ginecología", "202-B", "laura.martinez@hospital.com", "4271234570"),
        ("Dr. Miguel Rodríguez", "Traumatología", "301-A", "miguel.rodriguez@hospital.com", "4271234571"),
    ]
    .into_iter()
    .map(|(full_name, specialty, office, email, phone)| DoctorRequest {
        full_name: full_name.to_string(),
        specialty: specialty.to_string(),
        office: office.to_string(),
        email: email.to_string(),
        phone: Some(phone.to_string()),
    })
    .collect()
}

/// seed_doctors
///
/// Inserts the default directory. Doctors already present (same email) are left
/// alone, so running it twice is harmless. Returns how many were inserted.
pub async fn seed_doctors(repo: &dyn Repository) -> Result<usize, AppError> {
    let mut inserted = 0;
    for doctor in default_doctors() {
        match repo.create_doctor(doctor).await {
            Ok(doctor) => {
                tracing::debug!(doctor_id = %doctor.id, name = %doctor.full_name, "doctor seeded");
                inserted += 1;
            }
            Err(AppError::Conflict(_)) => {}
            Err(err) => return Err(err),
        }
    }
    tracing::info!(inserted, "doctor directory seeded");
    Ok(inserted)
}
