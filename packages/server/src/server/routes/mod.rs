//! Management API route modules (C14, §4.12, §6).

pub mod endpoints;
pub mod health;
pub mod jobs;
pub mod runs;
pub mod sessions;
pub mod usage;

pub use health::*;
