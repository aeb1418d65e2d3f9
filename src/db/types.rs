use serde::{Deserialize, Serialize};
use sqlx::Type;

/// What drove a session into termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "terminationkind", rename_all = "lowercase")]
pub(crate) enum TerminationKind {
    Manual,
    Expired,
}

impl TerminationKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Expired => "expired",
        }
    }
}
