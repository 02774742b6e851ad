use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use super::models::{ActivityLogEntry, ActivityResult, LoginActivity, NewActivity, NewUser, Record, Role, User};
use super::{not_found, DatabaseError, Store};
use crate::resources::Resource;
use crate::types::Operation;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        phone_number TEXT,
        job_title TEXT,
        appointment_date DATE,
        appointment_validity DATE,
        role TEXT NOT NULL DEFAULT 'gerente',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        is_superuser BOOLEAN NOT NULL DEFAULT FALSE,
        date_joined TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_login TIMESTAMPTZ,
        password_hash TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS records (
        resource TEXT NOT NULL,
        id BIGINT NOT NULL,
        owner_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (resource, id)
    )",
    "CREATE TABLE IF NOT EXISTS token_blacklist (
        jti TEXT PRIMARY KEY,
        expires_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS login_activity (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        email TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        logged_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS activity_log (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT,
        email TEXT,
        module TEXT NOT NULL,
        operation TEXT NOT NULL,
        record_id TEXT,
        result TEXT NOT NULL,
        detail TEXT NOT NULL DEFAULT '',
        ip TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
];

const USER_COLUMNS: &str = "id, email, first_name, last_name, phone_number, job_title, appointment_date, \
     appointment_validity, role, is_active, is_superuser, date_joined, last_login, password_hash";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    phone_number: Option<String>,
    job_title: Option<String>,
    appointment_date: Option<NaiveDate>,
    appointment_validity: Option<NaiveDate>,
    role: String,
    is_active: bool,
    is_superuser: bool,
    date_joined: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
    password_hash: String,
}

impl TryFrom<UserRow> for User {
    type Error = DatabaseError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| DatabaseError::QueryError(format!("unknown role '{}' for user {}", row.role, row.id)))?;
        Ok(User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone_number: row.phone_number,
            job_title: row.job_title,
            appointment_date: row.appointment_date,
            appointment_validity: row.appointment_validity,
            role,
            is_active: row.is_active,
            is_superuser: row.is_superuser,
            date_joined: row.date_joined,
            last_login: row.last_login,
            password_hash: row.password_hash,
        })
    }
}

#[derive(FromRow)]
struct RecordRow {
    resource: String,
    id: i64,
    owner_id: Option<i64>,
    data: Json<Map<String, Value>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for Record {
    type Error = DatabaseError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let resource = Resource::from_path(&row.resource)
            .ok_or_else(|| DatabaseError::QueryError(format!("unknown resource '{}'", row.resource)))?;
        Ok(Record {
            id: row.id,
            resource,
            owner_id: row.owner_id,
            data: row.data.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ActivityRow {
    id: i64,
    user_id: Option<i64>,
    email: Option<String>,
    module: String,
    operation: String,
    record_id: Option<String>,
    result: String,
    detail: String,
    ip: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityLogEntry {
    type Error = DatabaseError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let operation = Operation::parse(&row.operation)
            .ok_or_else(|| DatabaseError::QueryError(format!("unknown operation '{}'", row.operation)))?;
        let result = ActivityResult::parse(&row.result)
            .ok_or_else(|| DatabaseError::QueryError(format!("unknown result '{}'", row.result)))?;
        Ok(ActivityLogEntry {
            id: row.id,
            user_id: row.user_id,
            email: row.email,
            module: row.module,
            operation,
            record_id: row.record_id,
            result,
            detail: row.detail,
            ip: row.ip,
            created_at: row.created_at,
        })
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables when missing; safe to run on every start
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, password_hash, first_name, last_name, phone_number, job_title,
                 appointment_date, appointment_validity, role, is_superuser)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(&user.job_title)
        .bind(user.appointment_date)
        .bind(user.appointment_validity)
        .bind(user.role.as_str())
        .bind(user.is_superuser)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, &format!("user with email {}", user.email)))?;

        row.try_into()
    }

    async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("user", id))?
            .try_into()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn update_user(&self, user: &User) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET email = $2, first_name = $3, last_name = $4, phone_number = $5,
                 job_title = $6, appointment_date = $7, appointment_validity = $8, role = $9,
                 is_active = $10, is_superuser = $11, last_login = $12, password_hash = $13
             WHERE id = $1
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone_number)
        .bind(&user.job_title)
        .bind(user.appointment_date)
        .bind(user.appointment_validity)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.is_superuser)
        .bind(user.last_login)
        .bind(&user.password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, &format!("user with email {}", user.email)))?
        .ok_or_else(|| not_found("user", user.id))?
        .try_into()
    }

    async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn insert_record(
        &self,
        resource: Resource,
        owner_id: Option<i64>,
        data: Map<String, Value>,
    ) -> Result<Record, DatabaseError> {
        // Ids are sequential per resource
        sqlx::query_as::<_, RecordRow>(
            "INSERT INTO records (resource, id, owner_id, data)
             SELECT $1, COALESCE(MAX(id), 0) + 1, $2, $3 FROM records WHERE resource = $1
             RETURNING resource, id, owner_id, data, created_at, updated_at",
        )
        .bind(resource.path())
        .bind(owner_id)
        .bind(Json(&data))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, &format!("{} record", resource)))?
        .try_into()
    }

    async fn get_record(&self, resource: Resource, id: i64) -> Result<Record, DatabaseError> {
        sqlx::query_as::<_, RecordRow>(
            "SELECT resource, id, owner_id, data, created_at, updated_at
             FROM records WHERE resource = $1 AND id = $2",
        )
        .bind(resource.path())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(resource, id))?
        .try_into()
    }

    async fn list_records(&self, resource: Resource) -> Result<Vec<Record>, DatabaseError> {
        sqlx::query_as::<_, RecordRow>(
            "SELECT resource, id, owner_id, data, created_at, updated_at
             FROM records WHERE resource = $1 ORDER BY id",
        )
        .bind(resource.path())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Record::try_from)
        .collect()
    }

    async fn update_record(
        &self,
        resource: Resource,
        id: i64,
        data: Map<String, Value>,
    ) -> Result<Record, DatabaseError> {
        sqlx::query_as::<_, RecordRow>(
            "UPDATE records SET data = $3, updated_at = now()
             WHERE resource = $1 AND id = $2
             RETURNING resource, id, owner_id, data, created_at, updated_at",
        )
        .bind(resource.path())
        .bind(id)
        .bind(Json(&data))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(resource, id))?
        .try_into()
    }

    async fn delete_record(&self, resource: Resource, id: i64) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM records WHERE resource = $1 AND id = $2")
            .bind(resource.path())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(resource, id));
        }
        Ok(())
    }

    async fn blacklist_token(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM token_blacklist WHERE expires_at < now()")
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT INTO token_blacklist (jti, expires_at) VALUES ($1, $2) ON CONFLICT (jti) DO NOTHING")
            .bind(jti)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, DatabaseError> {
        let found: Option<(String,)> = sqlx::query_as("SELECT jti FROM token_blacklist WHERE jti = $1")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn record_login(
        &self,
        user: &User,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<LoginActivity, DatabaseError> {
        let row = sqlx::query_as::<_, LoginActivity>(
            "INSERT INTO login_activity (user_id, email, ip_address, user_agent)
             VALUES ($1, $2, $3, $4)
             RETURNING id, user_id, email, ip_address, user_agent, logged_at",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(ip_address)
        .bind(user_agent)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_logins(&self) -> Result<Vec<LoginActivity>, DatabaseError> {
        let rows = sqlx::query_as::<_, LoginActivity>(
            "SELECT id, user_id, email, ip_address, user_agent, logged_at
             FROM login_activity ORDER BY logged_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn record_activity(&self, entry: NewActivity) -> Result<ActivityLogEntry, DatabaseError> {
        sqlx::query_as::<_, ActivityRow>(
            "INSERT INTO activity_log (user_id, email, module, operation, record_id, result, detail, ip)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id, user_id, email, module, operation, record_id, result, detail, ip, created_at",
        )
        .bind(entry.user_id)
        .bind(&entry.email)
        .bind(&entry.module)
        .bind(entry.operation.as_str())
        .bind(&entry.record_id)
        .bind(entry.result.as_str())
        .bind(&entry.detail)
        .bind(&entry.ip)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn list_activity(&self) -> Result<Vec<ActivityLogEntry>, DatabaseError> {
        sqlx::query_as::<_, ActivityRow>(
            "SELECT id, user_id, email, module, operation, record_id, result, detail, ip, created_at
             FROM activity_log ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ActivityLogEntry::try_from)
        .collect()
    }
}
