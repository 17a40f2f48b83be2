//! In-process identity provider and profile store.
//!
//! Backed by `watch` channels, so every subscription receives the current
//! value first and then each change. Used by the dev server and by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::info;

use crate::error::{StoreError, StreamError};

use super::model::{Identity, Profile, ProfileSnapshot};
use super::source::{IdentityEvent, IdentitySource, ProfileEvent, ProfileSource, ProfileStore};
use super::subscription::Subscription;

/// Wraps `events` in a subscription that keeps `active` up to date.
fn tracked<T>(
    events: impl futures::Stream<Item = T> + Send + 'static,
    active: &Arc<AtomicUsize>,
) -> Subscription<T> {
    active.fetch_add(1, Ordering::SeqCst);
    let active = Arc::clone(active);
    Subscription::new(events).on_unsubscribe(move || {
        active.fetch_sub(1, Ordering::SeqCst);
    })
}

/// Identity provider whose sign-in state is driven by method calls.
pub struct MemoryIdentityProvider {
    current: watch::Sender<Option<Identity>>,
    active: Arc<AtomicUsize>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        info!(identity_id = %identity.id, "Identity signed in");
        self.current.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        info!("Identity signed out");
        self.current.send_replace(None);
    }

    pub fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    /// Number of open identity subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentitySource for MemoryIdentityProvider {
    async fn subscribe(&self) -> Result<Subscription<IdentityEvent>, StreamError> {
        let events = WatchStream::new(self.current.subscribe()).map(Ok);
        Ok(tracked(events, &self.active))
    }
}

/// Profile store keeping one document per identity id.
pub struct MemoryProfileStore {
    documents: Mutex<HashMap<String, watch::Sender<Option<Profile>>>>,
    active: Arc<AtomicUsize>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Write a document directly, bypassing `create`'s existence check.
    pub fn insert(&self, identity_id: &str, profile: Profile) {
        Self::document(&mut self.lock(), identity_id)
            .send_replace(Some(profile));
    }

    /// Delete a document. Subscribers see `NotFound`.
    pub fn remove(&self, identity_id: &str) {
        if let Some(doc) = self.lock().get(identity_id) {
            doc.send_replace(None);
        }
    }

    pub fn get(&self, identity_id: &str) -> Option<Profile> {
        self.lock()
            .get(identity_id)
            .and_then(|doc| doc.borrow().clone())
    }

    /// Number of open profile subscriptions across all identities.
    pub fn subscriber_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<Option<Profile>>>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn document<'a>(
        documents: &'a mut HashMap<String, watch::Sender<Option<Profile>>>,
        identity_id: &str,
    ) -> &'a watch::Sender<Option<Profile>> {
        documents
            .entry(identity_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileSource for MemoryProfileStore {
    async fn subscribe(
        &self,
        identity_id: &str,
    ) -> Result<Subscription<ProfileEvent>, StreamError> {
        let rx = Self::document(&mut self.lock(), identity_id).subscribe();
        let events = WatchStream::new(rx).map(|doc| Ok(ProfileSnapshot::from(doc)));
        Ok(tracked(events, &self.active))
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn create(&self, identity_id: &str, profile: &Profile) -> Result<(), StoreError> {
        let mut documents = self.lock();
        let doc = Self::document(&mut documents, identity_id);
        if doc.borrow().is_some() {
            return Err(StoreError::AlreadyExists {
                identity_id: identity_id.to_string(),
            });
        }
        doc.send_replace(Some(profile.clone()));
        info!(identity_id, role = %profile.role, "Profile created");
        Ok(())
    }
}
