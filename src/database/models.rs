use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::resources::Resource;
use crate::types::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Dpo,
    Gerente,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Dpo => "dpo",
            Role::Gerente => "gerente",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "dpo" => Some(Role::Dpo),
            "gerente" => Some(Role::Gerente),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub job_title: Option<String>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_validity: Option<NaiveDate>,
    pub role: Role,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

impl User {
    /// Superusers count as admins
    pub fn is_admin(&self) -> bool {
        self.is_superuser || self.role == Role::Admin
    }

    pub fn is_dpo(&self) -> bool {
        self.role == Role::Dpo
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub job_title: Option<String>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_validity: Option<NaiveDate>,
    pub role: Role,
    pub is_superuser: bool,
}

impl NewUser {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into().trim().to_lowercase(),
            password_hash: password_hash.into(),
            first_name: String::new(),
            last_name: String::new(),
            phone_number: None,
            job_title: None,
            appointment_date: None,
            appointment_validity: None,
            role,
            is_superuser: false,
        }
    }

    pub fn into_user(self, id: i64, now: DateTime<Utc>) -> User {
        User {
            id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            phone_number: self.phone_number,
            job_title: self.job_title,
            appointment_date: self.appointment_date,
            appointment_validity: self.appointment_validity,
            role: self.role,
            is_active: true,
            is_superuser: self.is_superuser,
            date_joined: now,
            last_login: None,
            password_hash: self.password_hash,
        }
    }
}

/// One row of any CRUD resource; the payload is schema-validated JSON
#[derive(Debug, Clone)]
pub struct Record {
    pub id: i64,
    pub resource: Resource,
    pub owner_id: Option<i64>,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }

    pub fn date_field(&self, name: &str) -> Option<NaiveDate> {
        self.str_field(name)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    }

    /// Wire representation: payload fields plus id, owner and timestamps
    pub fn to_json(&self) -> Value {
        let mut out = self.data.clone();
        out.insert("id".to_string(), Value::from(self.id));
        out.insert(
            self.resource.owner_field().to_string(),
            self.owner_id.map(Value::from).unwrap_or(Value::Null),
        );
        out.insert("data_criacao".to_string(), Value::String(self.created_at.to_rfc3339()));
        out.insert("data_atualizacao".to_string(), Value::String(self.updated_at.to_rfc3339()));
        Value::Object(out)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LoginActivity {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityResult {
    Success,
    Invalid,
    Error,
}

impl ActivityResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityResult::Success => "success",
            ActivityResult::Invalid => "invalid",
            ActivityResult::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(ActivityResult::Success),
            "invalid" => Some(ActivityResult::Invalid),
            "error" => Some(ActivityResult::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityLogEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub module: String,
    pub operation: Operation,
    pub record_id: Option<String>,
    pub result: ActivityResult,
    pub detail: String,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Activity log entry before the store assigns id and timestamp
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub module: String,
    pub operation: Operation,
    pub record_id: Option<String>,
    pub result: ActivityResult,
    pub detail: String,
    pub ip: Option<String>,
}

impl NewActivity {
    pub fn into_entry(self, id: i64, now: DateTime<Utc>) -> ActivityLogEntry {
        ActivityLogEntry {
            id,
            user_id: self.user_id,
            email: self.email,
            module: self.module,
            operation: self.operation,
            record_id: self.record_id,
            result: self.result,
            detail: self.detail,
            ip: self.ip,
            created_at: now,
        }
    }
}
