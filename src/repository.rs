use crate::{
    error::AppError,
    models::{
        Appointment, AppointmentStatus, CreateAppointmentRequest, Doctor, DoctorRequest, NewUser,
        PatientAppointment, Role, StoredCredentials, UpdateDoctorRequest, UpdateProfileRequest,
        User,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Repository Trait
///
/// The persistence contract for users, doctors and appointments. Handlers only
/// see this trait; `PostgresRepository` backs production and `MemoryRepository`
/// backs tests and database-less local runs.
///
/// Methods scoped by `user_id` enforce ownership in the query itself: a row that
/// exists but belongs to someone else behaves exactly like a missing row.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users / Credentials ---
    // Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn find_credentials(&self, email: &str) -> Result<Option<StoredCredentials>, AppError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self) -> Result<Vec<User>, AppError>;
    // Absent fields keep their stored value. Role is not updatable here.
    async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<Option<User>, AppError>;
    // Admin action: callers must have run the self-action guard.
    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, AppError>;
    // Admin action: also removes the user's appointments.
    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError>;
    async fn admin_exists(&self) -> Result<bool, AppError>;

    // --- Doctor Directory ---
    async fn create_doctor(&self, req: DoctorRequest) -> Result<Doctor, AppError>;
    // Sorted by full name.
    async fn list_doctors(&self) -> Result<Vec<Doctor>, AppError>;
    async fn update_doctor(
        &self,
        id: Uuid,
        req: UpdateDoctorRequest,
    ) -> Result<Option<Doctor>, AppError>;
    async fn delete_doctor(&self, id: Uuid) -> Result<bool, AppError>;

    // --- Appointments ---
    async fn create_appointment(
        &self,
        user_id: Uuid,
        req: CreateAppointmentRequest,
    ) -> Result<Appointment, AppError>;
    // Owner's appointments, earliest first.
    async fn list_appointments_for(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppError>;
    // Owner's `Pendiente` appointments, earliest first.
    async fn list_pending_for(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppError>;
    // Admin listing with patient details, latest first.
    async fn list_all_appointments(&self) -> Result<Vec<PatientAppointment>, AppError>;
    // Owner-Only: deletes only if `user_id` owns the appointment.
    async fn cancel_appointment(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError>;
    // Admin Override: no ownership check.
    async fn delete_appointment(&self, id: Uuid) -> Result<bool, AppError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, phone, birth_date, role, registered_at";
const DOCTOR_COLUMNS: &str = "id, full_name, specialty, office, email, phone, registered_at";
const APPOINTMENT_COLUMNS: &str =
    "a.id, a.user_id, a.doctor, a.scheduled_on, a.slot, a.reason, a.status, a.created_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (id, first_name, last_name, email, phone, birth_date, password_hash, role, registered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.birth_date)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict("El correo electrónico ya está registrado.".to_string())
                } else {
                    e.into()
                }
            })
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<StoredCredentials>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, StoredCredentials>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY registered_at ASC");
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?)
    }

    /// Uses `COALESCE` so only the provided fields change.
    async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<Option<User>, AppError> {
        let sql = format!(
            "UPDATE users SET \
                first_name = COALESCE($2, first_name), \
                last_name = COALESCE($3, last_name), \
                phone = COALESCE($4, phone), \
                birth_date = COALESCE($5, birth_date) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(req.first_name)
            .bind(req.last_name)
            .bind(req.phone)
            .bind(req.birth_date)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, AppError> {
        let sql = format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Appointments go with the user through `ON DELETE CASCADE`.
    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn admin_exists(&self) -> Result<bool, AppError> {
        Ok(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE role = 'admin')")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn create_doctor(&self, req: DoctorRequest) -> Result<Doctor, AppError> {
        let sql = format!(
            "INSERT INTO doctors (id, full_name, specialty, office, email, phone, registered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) RETURNING {DOCTOR_COLUMNS}"
        );
        sqlx::query_as::<_, Doctor>(&sql)
            .bind(Uuid::new_v4())
            .bind(&req.full_name)
            .bind(&req.specialty)
            .bind(&req.office)
            .bind(&req.email)
            .bind(&req.phone)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict("Ya existe un doctor con ese email".to_string())
                } else {
                    e.into()
                }
            })
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, AppError> {
        let sql = format!("SELECT {DOCTOR_COLUMNS} FROM doctors ORDER BY full_name ASC");
        Ok(sqlx::query_as::<_, Doctor>(&sql).fetch_all(&self.pool).await?)
    }

    async fn update_doctor(
        &self,
        id: Uuid,
        req: UpdateDoctorRequest,
    ) -> Result<Option<Doctor>, AppError> {
        let sql = format!(
            "UPDATE doctors SET \
                full_name = COALESCE($2, full_name), \
                specialty = COALESCE($3, specialty), \
                office = COALESCE($4, office), \
                email = COALESCE($5, email), \
                phone = COALESCE($6, phone) \
             WHERE id = $1 RETURNING {DOCTOR_COLUMNS}"
        );
        sqlx::query_as::<_, Doctor>(&sql)
            .bind(id)
            .bind(req.full_name)
            .bind(req.specialty)
            .bind(req.office)
            .bind(req.email)
            .bind(req.phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict("Ya existe un doctor con ese email".to_string())
                } else {
                    e.into()
                }
            })
    }

    async fn delete_doctor(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM doctors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_appointment(
        &self,
        user_id: Uuid,
        req: CreateAppointmentRequest,
    ) -> Result<Appointment, AppError> {
        let sql = format!(
            "INSERT INTO appointments AS a (id, user_id, doctor, scheduled_on, slot, reason, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) RETURNING {APPOINTMENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&req.doctor)
            .bind(req.date)
            .bind(&req.time)
            .bind(&req.reason)
            .bind(AppointmentStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_appointments_for(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppError> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments a \
             WHERE a.user_id = $1 ORDER BY a.scheduled_on ASC, a.slot ASC"
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_pending_for(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppError> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments a \
             WHERE a.user_id = $1 AND a.status = $2 ORDER BY a.scheduled_on ASC, a.slot ASC"
        );
        Ok(sqlx::query_as::<_, Appointment>(&sql)
            .bind(user_id)
            .bind(AppointmentStatus::Pending.as_str())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_all_appointments(&self) -> Result<Vec<PatientAppointment>, AppError> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS}, \
                    u.first_name || ' ' || u.last_name AS patient_name, \
                    u.email AS patient_email \
             FROM appointments a JOIN users u ON u.id = a.user_id \
             ORDER BY a.scheduled_on DESC, a.slot DESC"
        );
        Ok(sqlx::query_as::<_, PatientAppointment>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn cancel_appointment(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// --- In-Memory Implementation ---

#[derive(Default)]
struct MemoryTables {
    users: Vec<StoredCredentials>,
    doctors: Vec<Doctor>,
    appointments: Vec<Appointment>,
}

/// MemoryRepository
///
/// `Repository` kept entirely in process memory. Mirrors the ordering, ownership
/// and uniqueness rules of `PostgresRepository`, so handler tests and local runs
/// without `DATABASE_URL` behave like production.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<MemoryTables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|c| c.user.email == user.email) {
            return Err(AppError::Conflict(
                "El correo electrónico ya está registrado.".to_string(),
            ));
        }
        let created = User {
            id: Uuid::new_v4(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            birth_date: user.birth_date,
            role: user.role,
            registered_at: Utc::now(),
        };
        tables.users.push(StoredCredentials {
            user: created.clone(),
            password_hash: user.password_hash,
        });
        Ok(created)
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<StoredCredentials>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|c| c.user.email == email).cloned())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|c| c.user.id == id)
            .map(|c| c.user.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_credentials(email).await?.map(|c| c.user))
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().map(|c| c.user.clone()).collect())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<Option<User>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.users.iter_mut().find(|c| c.user.id == id) else {
            return Ok(None);
        };
        let user = &mut stored.user;
        if let Some(first_name) = req.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = req.last_name {
            user.last_name = last_name;
        }
        if let Some(phone) = req.phone {
            user.phone = Some(phone);
        }
        if let Some(birth_date) = req.birth_date {
            user.birth_date = Some(birth_date);
        }
        Ok(Some(user.clone()))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .users
            .iter_mut()
            .find(|c| c.user.id == id)
            .map(|c| {
                c.user.role = role;
                c.user.clone()
            }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|c| c.user.id != id);
        let deleted = tables.users.len() < before;
        if deleted {
            tables.appointments.retain(|a| a.user_id != id);
        }
        Ok(deleted)
    }

    async fn admin_exists(&self) -> Result<bool, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().any(|c| c.user.role == Role::Admin))
    }

    async fn create_doctor(&self, req: DoctorRequest) -> Result<Doctor, AppError> {
        let mut tables = self.tables.write().await;
        if tables.doctors.iter().any(|d| d.email == req.email) {
            return Err(AppError::Conflict(
                "Ya existe un doctor con ese email".to_string(),
            ));
        }
        let doctor = Doctor {
            id: Uuid::new_v4(),
            full_name: req.full_name,
            specialty: req.specialty,
            office: req.office,
            email: req.email,
            phone: req.phone,
            registered_at: Utc::now(),
        };
        tables.doctors.push(doctor.clone());
        Ok(doctor)
    }

    async fn list_doctors(&self) -> Result<Vec<Doctor>, AppError> {
        let tables = self.tables.read().await;
        let mut doctors = tables.doctors.clone();
        doctors.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(doctors)
    }

    async fn update_doctor(
        &self,
        id: Uuid,
        req: UpdateDoctorRequest,
    ) -> Result<Option<Doctor>, AppError> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &req.email {
            if tables.doctors.iter().any(|d| d.id != id && &d.email == email) {
                return Err(AppError::Conflict(
                    "Ya existe un doctor con ese email".to_string(),
                ));
            }
        }
        let Some(doctor) = tables.doctors.iter_mut().find(|d| d.id == id) else {
            return Ok(None);
        };
        if let Some(full_name) = req.full_name {
            doctor.full_name = full_name;
        }
        if let Some(specialty) = req.specialty {
            doctor.specialty = specialty;
        }
        if let Some(office) = req.office {
            doctor.office = office;
        }
        if let Some(email) = req.email {
            doctor.email = email;
        }
        if let Some(phone) = req.phone {
            doctor.phone = Some(phone);
        }
        Ok(Some(doctor.clone()))
    }

    async fn delete_doctor(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.doctors.len();
        tables.doctors.retain(|d| d.id != id);
        Ok(tables.doctors.len() < before)
    }

    async fn create_appointment(
        &self,
        user_id: Uuid,
        req: CreateAppointmentRequest,
    ) -> Result<Appointment, AppError> {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            user_id,
            doctor: req.doctor,
            date: req.date,
            time: req.time,
            reason: req.reason,
            status: AppointmentStatus::Pending,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .appointments
            .push(appointment.clone());
        Ok(appointment)
    }

    async fn list_appointments_for(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppError> {
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        appointments.sort_by(|a, b| (a.date, &a.time).cmp(&(b.date, &b.time)));
        Ok(appointments)
    }

    async fn list_pending_for(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppError> {
        Ok(self
            .list_appointments_for(user_id)
            .await?
            .into_iter()
            .filter(|a| a.status == AppointmentStatus::Pending)
            .collect())
    }

    async fn list_all_appointments(&self) -> Result<Vec<PatientAppointment>, AppError> {
        let tables = self.tables.read().await;
        let mut appointments: Vec<PatientAppointment> = tables
            .appointments
            .iter()
            .filter_map(|a| {
                let owner = tables.users.iter().find(|c| c.user.id == a.user_id)?;
                Some(PatientAppointment {
                    appointment: a.clone(),
                    patient_name: format!("{} {}", owner.user.first_name, owner.user.last_name),
                    patient_email: owner.user.email.clone(),
                })
            })
            .collect();
        appointments.sort_by(|a, b| {
            (b.appointment.date, &b.appointment.time).cmp(&(a.appointment.date, &a.appointment.time))
        });
        Ok(appointments)
    }

    async fn cancel_appointment(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.appointments.len();
        tables
            .appointments
            .retain(|a| !(a.id == id && a.user_id == user_id));
        Ok(tables.appointments.len() < before)
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.appointments.len();
        tables.appointments.retain(|a| a.id != id);
        Ok(tables.appointments.len() < before)
    }
}
