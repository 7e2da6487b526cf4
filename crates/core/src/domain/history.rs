use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::PrincipalId;
use crate::domain::request::{RequestId, RequestStatus};

/// One row of the append-only status ledger. Entries are written in the
/// same transaction as the status change they record and are never
/// updated or deleted. `changed_by` is `None` for system transitions;
/// there is no sentinel system user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: String,
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub changed_by: Option<PrincipalId>,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn is_system_action(&self) -> bool {
        self.changed_by.is_none()
    }
}
