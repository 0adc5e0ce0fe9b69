//! The pipeline shared by every automation: extract, derive, guard, write.

pub mod derive;
pub mod extract;
pub mod guard;
pub mod writer;

pub use guard::{Decision, Outcome, Plan, SkipReason, Target};
