/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Operations recorded in the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Access,
    Create,
    Update,
    Delete,
    Deactivate,
    Reactivate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Access => "ACCESS",
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Deactivate => "DEACTIVATE",
            Operation::Reactivate => "REACTIVATE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACCESS" => Some(Operation::Access),
            "CREATE" => Some(Operation::Create),
            "UPDATE" => Some(Operation::Update),
            "DELETE" => Some(Operation::Delete),
            "DEACTIVATE" => Some(Operation::Deactivate),
            "REACTIVATE" => Some(Operation::Reactivate),
            _ => None,
        }
    }
}
