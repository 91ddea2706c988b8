//! HTTP server setup (Axum). The management API (C14, §4.12): thin CRUD
//! and control routes over the stores the scheduler and planner workers
//! also use, with no GraphQL layer and no auth middleware ("the core
//! never authorizes", §7).

pub mod app;
pub mod error;
pub mod routes;

pub use app::*;
