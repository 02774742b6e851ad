// Role checks shared by the protected handlers
//
// admin: superuser or role admin, full access including user management
// dpo:   writes every shared resource
// other: reads shared resources, owns their calendar events

use super::AuthUser;
use crate::database::models::Record;
use crate::error::ApiError;
use crate::resources::Resource;

const FORBIDDEN: &str = "You do not have permission to perform this action.";

pub fn require_admin(auth: &AuthUser) -> Result<(), ApiError> {
    if auth.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden(FORBIDDEN))
    }
}

pub fn require_admin_or_dpo(auth: &AuthUser) -> Result<(), ApiError> {
    if auth.is_admin_or_dpo() {
        Ok(())
    } else {
        Err(ApiError::forbidden(FORBIDDEN))
    }
}

/// Write check before touching a collection
pub fn can_write(auth: &AuthUser, resource: Resource) -> Result<(), ApiError> {
    if resource.is_owner_scoped() {
        return Ok(());
    }
    require_admin_or_dpo(auth)
}

/// Owner-scoped records are invisible to everyone else, including admins
pub fn can_see(auth: &AuthUser, record: &Record) -> bool {
    !record.resource.is_owner_scoped() || record.owner_id == Some(auth.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Role;
    use chrono::Utc;
    use serde_json::Map;

    fn auth(id: i64, role: Role) -> AuthUser {
        AuthUser {
            user: crate::testing::user(id, "u@example.com", role),
            jti: "jti".into(),
        }
    }

    fn record(resource: Resource, owner: Option<i64>) -> Record {
        Record {
            id: 1,
            resource,
            owner_id: owner,
            data: Map::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn gerente_reads_but_does_not_write_shared_resources() {
        let gerente = auth(3, Role::Gerente);
        assert!(can_write(&gerente, Resource::Riscos).is_err());
        assert!(can_see(&gerente, &record(Resource::Riscos, Some(1))));
        assert!(can_write(&auth(2, Role::Dpo), Resource::Riscos).is_ok());
    }

    #[test]
    fn calendar_events_are_private() {
        let owner = auth(3, Role::Gerente);
        let admin = auth(1, Role::Admin);
        let event = record(Resource::CalendarEvent, Some(3));

        assert!(can_write(&owner, Resource::CalendarEvent).is_ok());
        assert!(can_see(&owner, &event));
        assert!(!can_see(&admin, &event));
    }

    #[test]
    fn superuser_counts_as_admin() {
        let mut su = auth(9, Role::Gerente);
        su.user.is_superuser = true;
        assert!(require_admin(&su).is_ok());
        assert!(require_admin(&auth(2, Role::Dpo)).is_err());
    }
}
