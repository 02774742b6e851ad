use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use uuid::Uuid;

use super::JwtError;

pub fn hash_password(password: &str) -> Result<String, JwtError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| JwtError::PasswordHash(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| JwtError::PasswordHash(e.to_string()))
}

/// Unparseable stored hashes never verify
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Password policy: minimum length plus upper, lower, digit and symbol
pub fn check_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_LENGTH
        ));
    }

    let upper = password.chars().any(char::is_uppercase);
    let lower = password.chars().any(char::is_lowercase);
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace() && c != '_');

    if upper && lower && digit && symbol {
        Ok(())
    } else {
        Err("The password must contain an uppercase letter, a lowercase letter, a digit and a symbol.".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_policy() {
        assert!(check_password_strength("Sh0rt!").is_err());
        assert!(check_password_strength("alllowercase1!").is_err());
        assert!(check_password_strength("NoDigits!!").is_err());
        assert!(check_password_strength("NoSymbol123").is_err());
        assert!(check_password_strength("Adequate#2025").is_ok());
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-hash"));
    }
}
