//! Identity, profile and merged session view models.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// An authenticated principal, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }

    /// Both fields are required before a profile can be created for this
    /// identity.
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.email.is_empty()
    }
}

/// What the user does on the platform. Chosen once, during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Photographer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Photographer => write!(f, "photographer"),
        }
    }
}

/// Per-identity profile document, keyed by `Identity::id` in the remote store.
///
/// Field names on the wire follow the stored document: `phoneNumber`,
/// `createdAt`, and the snake_case `name_lowercase` search key. `createdAt`
/// is written with exactly three fractional digits so its text sorts in time
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email: String,
    pub name: String,
    #[serde(rename = "name_lowercase")]
    pub name_lowercase: String,
    pub phone_number: String,
    pub role: Role,
    #[serde(serialize_with = "serialize_millis")]
    pub created_at: DateTime<Utc>,
}

fn serialize_millis<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl Profile {
    /// Build a profile for `identity`. `name_lowercase` is derived here and
    /// nowhere else. `created_at` is truncated to milliseconds.
    pub fn new(
        identity: &Identity,
        name: impl Into<String>,
        phone_number: impl Into<String>,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        Self {
            email: identity.email.clone(),
            name_lowercase: name.to_lowercase(),
            name,
            phone_number: phone_number.into(),
            role,
            created_at: created_at.trunc_subsecs(3),
        }
    }
}

/// One event from a profile subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSnapshot {
    Found(Profile),
    NotFound,
}

impl ProfileSnapshot {
    pub fn into_profile(self) -> Option<Profile> {
        match self {
            Self::Found(profile) => Some(profile),
            Self::NotFound => None,
        }
    }
}

impl From<Option<Profile>> for ProfileSnapshot {
    fn from(profile: Option<Profile>) -> Self {
        profile.map_or(Self::NotFound, Self::Found)
    }
}

/// The merged read model: who is signed in, their profile, and whether the
/// profile is still being resolved.
///
/// `profile` is always `None` while `identity` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl Default for SessionView {
    /// Nothing has been heard from the identity stream yet.
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            loading: true,
        }
    }
}

impl SessionView {
    /// Signed in, resolved, and without a profile.
    pub fn needs_onboarding(&self) -> bool {
        self.identity.is_some() && !self.loading && self.profile.is_none()
    }

    pub fn identity_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }
}
