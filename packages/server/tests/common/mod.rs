//! Shared integration test harness (real Postgres via testcontainers).

pub mod harness;

pub use harness::TestHarness;
