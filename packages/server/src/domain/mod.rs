//! Domain model (§3): Job, Endpoint, Run, AISession, and tier limits.
//! Plain data + invariant checks; no store or transport concerns live here.

pub mod endpoint;
pub mod job;
pub mod run;
pub mod session;
pub mod tier;

pub use endpoint::{BaselineSchedule, Endpoint, HttpMethod};
pub use job::{Job, JobStatus};
pub use run::{
    truncate_for_llm, FilteredMetrics, HealthSummary, Run, RunSource, RunStatus, SiblingResponse,
    WindowHealth,
};
pub use session::{AiSession, ToolCallRecord};
pub use tier::{Tier, TierLimits};
