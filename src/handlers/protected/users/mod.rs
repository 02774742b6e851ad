// handlers/protected/users/mod.rs - /users/ endpoints
//
// me/dpo are open to any authenticated user; the directory itself and every
// write on other accounts is admin only.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::auth::check_password_strength;
use crate::database::models::{Role, User};
use crate::resources::ValidationErrors;

pub mod admin;
pub mod me;

pub use admin::{create, deactivate, list, reactivate, retrieve, update};
pub use me::{dpo_get, me_get, me_patch};

const AUDIT_MODULE: &str = "users";

/// Writable user fields; absent fields are left untouched
#[derive(Debug, Default, Deserialize)]
pub struct UserPayload {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub job_title: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_validity: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
    pub current_password: Option<String>,
    /// Refresh token to revoke after a password change
    pub refresh: Option<String>,
}

fn optional_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_date(field: &str, raw: &str, errors: &mut ValidationErrors) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            errors.add(field, "Date has wrong format. Use YYYY-MM-DD.");
            None
        }
    }
}

impl UserPayload {
    /// Apply profile fields (everything except role and password)
    pub fn apply_profile(&self, user: &mut User, errors: &mut ValidationErrors) {
        if let Some(email) = &self.email {
            let email = email.trim().to_lowercase();
            if email.is_empty() || !email.contains('@') {
                errors.add("email", "Enter a valid email address.");
            } else {
                user.email = email;
            }
        }
        if let Some(v) = &self.first_name {
            user.first_name = v.trim().to_string();
        }
        if let Some(v) = &self.last_name {
            user.last_name = v.trim().to_string();
        }
        if let Some(v) = &self.phone_number {
            if v.trim().chars().count() > 20 {
                errors.add("phone_number", "Ensure this field has no more than 20 characters.");
            } else {
                user.phone_number = optional_text(v);
            }
        }
        if let Some(v) = &self.job_title {
            user.job_title = optional_text(v);
        }
        if let Some(v) = &self.appointment_date {
            user.appointment_date = parse_date("appointment_date", v, errors);
        }
        if let Some(v) = &self.appointment_validity {
            user.appointment_validity = parse_date("appointment_validity", v, errors);
        }
    }

    pub fn parsed_role(&self, errors: &mut ValidationErrors) -> Option<Role> {
        let raw = self.role.as_deref()?;
        match Role::parse(raw) {
            Some(role) => Some(role),
            None => {
                errors.add("role", format!("\"{}\" is not a valid choice.", raw));
                None
            }
        }
    }

    /// New password, if one was supplied and passes the policy
    pub fn new_password(&self, errors: &mut ValidationErrors) -> Option<String> {
        let password = self.password.as_deref().filter(|p| !p.is_empty())?;
        match check_password_strength(password) {
            Ok(()) => Some(password.to_string()),
            Err(msg) => {
                errors.add("password", msg);
                None
            }
        }
    }
}

/// Serialized user with extra keys merged in
pub(crate) fn user_json(user: &User, extra: &[(&str, Value)]) -> Value {
    let mut out = match serde_json::to_value(user) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    out.insert("full_name".into(), Value::String(user.full_name()));
    for (k, v) in extra {
        out.insert(k.to_string(), v.clone());
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_fields_are_normalized() {
        let mut user = crate::testing::user(1, "a@example.com", Role::Gerente);
        let payload = UserPayload {
            email: Some("  New@Example.COM ".into()),
            phone_number: Some("   ".into()),
            appointment_date: Some("2025-03-01".into()),
            ..Default::default()
        };
        let mut errors = ValidationErrors::new();
        payload.apply_profile(&mut user, &mut errors);

        assert!(errors.is_empty());
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.phone_number, None);
        assert_eq!(user.appointment_date, NaiveDate::from_ymd_opt(2025, 3, 1));
    }

    #[test]
    fn bad_role_and_weak_password_are_reported() {
        let payload = UserPayload {
            role: Some("root".into()),
            password: Some("weak".into()),
            ..Default::default()
        };
        let mut errors = ValidationErrors::new();
        assert_eq!(payload.parsed_role(&mut errors), None);
        assert_eq!(payload.new_password(&mut errors), None);
        assert!(errors.get("role").is_some());
        assert!(errors.get("password").is_some());
    }

    #[test]
    fn user_json_hides_password_hash() {
        let mut user = crate::testing::user(1, "a@example.com", Role::Dpo);
        user.password_hash = "secret-hash".into();
        let json = user_json(&user, &[("reauth_required", Value::Bool(true))]);
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "dpo");
        assert_eq!(json["reauth_required"], true);
    }
}
