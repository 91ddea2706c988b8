//! AI Planner (C10 worker, C11 tool surface, §4.8-§4.9).

pub mod tools;
pub mod worker;

pub use worker::{PlannerConfig, PlannerWorker};
