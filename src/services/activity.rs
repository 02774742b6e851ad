use std::sync::Arc;

use tracing::warn;

use crate::database::models::{ActivityResult, NewActivity, User};
use crate::database::Store;
use crate::types::Operation;

/// Best-effort writer for the activity log; failures are logged, never surfaced
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn Store>,
    enabled: bool,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn Store>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    pub async fn record(
        &self,
        actor: Option<&User>,
        module: &str,
        operation: Operation,
        record_id: Option<String>,
        result: ActivityResult,
        detail: impl Into<String>,
        ip: Option<String>,
    ) {
        if !self.enabled {
            return;
        }

        let entry = NewActivity {
            user_id: actor.map(|u| u.id),
            email: actor.map(|u| u.email.clone()),
            module: module.to_string(),
            operation,
            record_id,
            result,
            detail: detail.into(),
            ip,
        };

        if let Err(e) = self.store.record_activity(entry).await {
            warn!("Failed to write activity log for {} {}: {}", module, operation.as_str(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::database::models::Role;

    #[tokio::test]
    async fn disabled_trail_writes_nothing() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone(), false);
        trail
            .record(None, "riscos", Operation::Access, None, ActivityResult::Success, "", None)
            .await;
        assert!(store.list_activity().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn entries_carry_the_actor() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let trail = AuditTrail::new(store.clone(), true);
        let user = crate::testing::user(3, "dpo@example.com", Role::Dpo);

        trail
            .record(
                Some(&user),
                "incidentes",
                Operation::Create,
                Some("1".into()),
                ActivityResult::Success,
                "created",
                Some("10.0.0.1".into()),
            )
            .await;

        let entries = store.list_activity().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id, Some(3));
        assert_eq!(entries[0].email.as_deref(), Some("dpo@example.com"));
        assert_eq!(entries[0].operation, Operation::Create);
    }
}
