//! Subscription handles.
//!
//! A [`Subscription`] owns an event stream plus the provider's unsubscribe
//! hook, which runs exactly once when the handle is dropped. The
//! [`SubscriptionManager`] holds the store's two live handles by name and
//! enforces close-before-open on the profile side.

use std::pin::Pin;

use futures::{Stream, StreamExt};

use super::source::{IdentityEvent, ProfileEvent};

/// Boxed event stream handed out by providers.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription<T> {
    events: EventStream<T>,
    unsubscribe: Option<Unsubscribe>,
}

impl<T> Subscription<T> {
    pub fn new(events: impl Stream<Item = T> + Send + 'static) -> Self {
        Self {
            events: Box::pin(events),
            unsubscribe: None,
        }
    }

    /// Attach the provider's unsubscribe hook.
    pub fn on_unsubscribe(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.unsubscribe = Some(Box::new(hook));
        self
    }

    /// Next event, or `None` once the provider closed the stream.
    pub async fn next(&mut self) -> Option<T> {
        self.events.next().await
    }

    /// Explicitly close the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(hook) = self.unsubscribe.take() {
            hook();
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("has_unsubscribe", &self.unsubscribe.is_some())
            .finish_non_exhaustive()
    }
}

/// Profile subscription tagged with the identity it was opened for.
#[derive(Debug)]
pub(crate) struct ProfileHandle {
    pub identity_id: String,
    pub subscription: Subscription<ProfileEvent>,
}

/// What the manager's streams produced next.
#[derive(Debug)]
pub(crate) enum Managed {
    /// `None` means the identity stream ended.
    Identity(Option<IdentityEvent>),
    /// `event` is `None` when the profile stream ended.
    Profile {
        identity_id: String,
        event: Option<ProfileEvent>,
    },
}

/// The store's two subscription handles.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionManager {
    identity_handle: Option<Subscription<IdentityEvent>>,
    profile_handle: Option<ProfileHandle>,
}

impl SubscriptionManager {
    pub fn new(identity: Subscription<IdentityEvent>) -> Self {
        Self {
            identity_handle: Some(identity),
            profile_handle: None,
        }
    }

    /// Identity the open profile subscription belongs to.
    #[cfg(test)]
    pub fn profile_identity(&self) -> Option<&str> {
        self.profile_handle.as_ref().map(|h| h.identity_id.as_str())
    }

    /// Close the profile subscription, if any. Returns the identity it was
    /// tagged with.
    pub fn close_profile(&mut self) -> Option<String> {
        self.profile_handle.take().map(|handle| {
            let ProfileHandle {
                identity_id,
                subscription,
            } = handle;
            subscription.unsubscribe();
            identity_id
        })
    }

    /// Install a profile subscription. Any previous one is closed first.
    pub fn open_profile(&mut self, identity_id: String, subscription: Subscription<ProfileEvent>) {
        self.close_profile();
        self.profile_handle = Some(ProfileHandle {
            identity_id,
            subscription,
        });
    }

    /// Profile first, then identity.
    pub fn close_all(&mut self) {
        self.close_profile();
        if let Some(identity) = self.identity_handle.take() {
            identity.unsubscribe();
        }
    }

    /// Wait for the next event from either handle. Identity events win when
    /// both are ready. Pends forever when neither handle is open.
    pub async fn next(&mut self) -> Managed {
        let Self {
            identity_handle,
            profile_handle,
        } = self;

        tokio::select! {
            biased;
            event = next_identity(identity_handle) => Managed::Identity(event),
            (identity_id, event) = next_profile(profile_handle) => {
                Managed::Profile { identity_id, event }
            }
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

// A handle whose stream ended is dropped so it is not polled again.
async fn next_identity(handle: &mut Option<Subscription<IdentityEvent>>) -> Option<IdentityEvent> {
    let Some(subscription) = handle.as_mut() else {
        return std::future::pending().await;
    };
    let event = subscription.next().await;
    if event.is_none() {
        *handle = None;
    }
    event
}

async fn next_profile(handle: &mut Option<ProfileHandle>) -> (String, Option<ProfileEvent>) {
    let Some(open) = handle.as_mut() else {
        return std::future::pending().await;
    };
    let event = open.subscription.next().await;
    let identity_id = open.identity_id.clone();
    if event.is_none() {
        *handle = None;
    }
    (identity_id, event)
}
