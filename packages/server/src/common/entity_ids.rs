//! Typed ID definitions for all domain entities.

pub use super::id::{Id, V4, V7};

/// Marker type for Job entities (a user's logical grouping of endpoints).
pub struct Job;

/// Marker type for Endpoint entities (a scheduled HTTP invocation target).
pub struct Endpoint;

/// Marker type for Run entities (one execution attempt of an endpoint).
pub struct Run;

/// Marker type for AISession entities (one LLM analysis of an endpoint).
pub struct AiSession;

/// Marker type for User entities (external identity; tier lives here).
pub struct User;

/// Typed ID for Job entities.
pub type JobId = Id<Job>;

/// Typed ID for Endpoint entities.
pub type EndpointId = Id<Endpoint>;

/// Typed ID for Run entities.
pub type RunId = Id<Run>;

/// Typed ID for AISession entities.
pub type AiSessionId = Id<AiSession>;

/// Typed ID for User entities.
pub type UserId = Id<User>;
