//! Job (§3): a logical grouping of endpoints owned by a user. Jobs are
//! never hard-deleted, only archived; archiving a job cascades to its
//! child endpoints (§3 "Ownership & lifecycle").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::common::{JobId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A paused parent job suppresses dispatch of every child endpoint;
    /// this is the condition `claimDueEndpoints` checks (§4.2).
    pub fn allows_dispatch(&self) -> bool {
        self.status == JobStatus::Active
    }
}
