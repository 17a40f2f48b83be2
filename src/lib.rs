//! Session-aware identity state with a guarded onboarding step.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod session;
