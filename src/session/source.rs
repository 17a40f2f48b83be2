//! Collaborator traits for the identity provider and the remote profile store.

use async_trait::async_trait;

use crate::error::{StoreError, StreamError};

use super::model::{Identity, Profile, ProfileSnapshot};
use super::subscription::Subscription;

/// One item from the identity stream: the signed-in identity, `None` when
/// signed out.
pub type IdentityEvent = Result<Option<Identity>, StreamError>;

/// One item from a profile stream scoped to a single identity.
pub type ProfileEvent = Result<ProfileSnapshot, StreamError>;

/// Emits identity changes.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Open an identity subscription. The first event carries the current
    /// state, then one event per change. Dropping the subscription
    /// unsubscribes.
    async fn subscribe(&self) -> Result<Subscription<IdentityEvent>, StreamError>;
}

/// Emits changes of one identity's profile document.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn subscribe(&self, identity_id: &str)
    -> Result<Subscription<ProfileEvent>, StreamError>;
}

/// Accepts profile writes.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create the profile document for `identity_id`. Single attempt; the
    /// caller decides what to do with a failure.
    async fn create(&self, identity_id: &str, profile: &Profile) -> Result<(), StoreError>;
}
