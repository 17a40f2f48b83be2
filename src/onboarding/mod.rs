//! Onboarding: the one-time role selection step for a new identity.
//!
//! The user enters a name and phone number and picks a role. The workflow
//! validates the form, creates the profile document, and pushes the result
//! into the `SessionStore` so the session view flips to "has profile"
//! without waiting for the profile stream.

pub mod form;
pub mod phone;
pub mod routes;
pub mod workflow;

pub use form::FormDraft;
pub use phone::{format_phone, is_valid_phone};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use workflow::OnboardingWorkflow;
