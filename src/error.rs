//! Error types for the session and onboarding layers.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Profile store error: {0}")]
    Store(#[from] StoreError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures of the identity or profile event streams.
///
/// Only `SubscribeFailed` on the identity stream ever reaches a caller; the
/// rest are absorbed by the session store and turned into a settled view.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to subscribe to {stream} stream: {reason}")]
    SubscribeFailed { stream: String, reason: String },

    #[error("{stream} stream disconnected: {reason}")]
    Disconnected { stream: String, reason: String },

    #[error("Profile for {identity_id} not resolved within {window:?}")]
    ReconcileTimeout {
        identity_id: String,
        window: Duration,
    },
}

impl StreamError {
    pub fn subscribe_failed(stream: &str, reason: impl Into<String>) -> Self {
        Self::SubscribeFailed {
            stream: stream.to_string(),
            reason: reason.into(),
        }
    }

    pub fn disconnected(stream: &str, reason: impl Into<String>) -> Self {
        Self::Disconnected {
            stream: stream.to_string(),
            reason: reason.into(),
        }
    }
}

/// Remote profile store write failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Profile already exists for {identity_id}")]
    AlreadyExists { identity_id: String },

    #[error("Profile store unavailable: {0}")]
    Unavailable(String),

    #[error("Profile write for {identity_id} rejected: {reason}")]
    Rejected { identity_id: String, reason: String },
}

/// Local form validation failures. The Display text is shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter your name and phone number.")]
    MissingFields,

    #[error("Please enter a valid phone number in the format XXX-XXX-XXXX.")]
    InvalidPhone,

    #[error("Could not find user information. Please try registering again.")]
    MissingIdentity,
}

impl ValidationError {
    /// Short heading for the inline error.
    pub fn title(&self) -> &'static str {
        match self {
            Self::MissingFields => "Missing Fields",
            Self::InvalidPhone => "Invalid Phone Number",
            Self::MissingIdentity => "Error",
        }
    }
}

/// Profile creation failed after validation passed. Retryable by the user.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmissionError {
    #[error("Failed to set up profile. Please try again.")]
    Store(#[source] StoreError),

    #[error("Failed to set up profile. Please try again.")]
    Timeout(Duration),
}

/// Everything `OnboardingWorkflow::submit` can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OnboardingError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Submission(#[from] SubmissionError),

    #[error("A submission is already in progress")]
    InFlight,

    #[error("Onboarding was dismissed")]
    Disposed,
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
