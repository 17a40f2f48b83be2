//! Onboarding form draft and its validation.

use serde::Serialize;

use crate::error::ValidationError;
use crate::session::Identity;

use super::phone::{format_phone, is_valid_phone};

/// Unsubmitted form fields. Lives only as long as the onboarding screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDraft {
    pub name: String,
    pub phone_number_raw: String,
    pub phone_number_formatted: String,
}

impl FormDraft {
    pub fn set_name(&mut self, text: &str) {
        self.name = text.to_string();
    }

    /// Store the raw input and its masked form.
    pub fn set_phone(&mut self, text: &str) {
        self.phone_number_raw = text.to_string();
        self.phone_number_formatted = format_phone(text);
    }

    /// Check the draft and the signed-in identity, in the order the user
    /// should hear about problems: missing fields, bad phone, then identity.
    pub fn validate<'a>(
        &self,
        identity: Option<&'a Identity>,
    ) -> Result<&'a Identity, ValidationError> {
        if self.name.trim().is_empty() || self.phone_number_formatted.is_empty() {
            return Err(ValidationError::MissingFields);
        }
        if !is_valid_phone(&self.phone_number_formatted) {
            return Err(ValidationError::InvalidPhone);
        }
        match identity {
            Some(identity) if identity.is_complete() => Ok(identity),
            _ => Err(ValidationError::MissingIdentity),
        }
    }
}
