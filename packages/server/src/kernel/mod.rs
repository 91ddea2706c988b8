//! Kernel-level seams: the clock abstraction workers test against, and the
//! LLM client contract the planner (C10) depends on.

pub mod ai;
pub mod traits;

pub use traits::{BaseClock, BaseLlmClient, FixedClock, SystemClock};
