//! Postgres-backed implementations of the store traits, grounded in the
//! `FOR UPDATE SKIP LOCKED` claim pattern used throughout the teacher's
//! job queue. All queries are runtime `query_as`/`query`, never the
//! compile-time `query!` macros, since there's no live database to check
//! them against at build time.

pub mod endpoint_store;
pub mod job_store;
pub mod run_store;
pub mod session_store;

pub use endpoint_store::PgEndpointStore;
pub use job_store::PgJobStore;
pub use run_store::PgRunStore;
pub use session_store::PgSessionStore;
