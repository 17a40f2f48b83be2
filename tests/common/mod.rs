//! Scripted collaborators shared by the integration tests.
//!
//! Every subscription is backed by an unbounded mpsc channel whose sender
//! the test keeps, so events can be delivered (or withheld) at exactly the
//! point a test needs them.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc, watch};
use tokio::time::timeout;
use tokio_stream::wrappers::UnboundedReceiverStream;

use session_profile::error::{StoreError, StreamError};
use session_profile::session::{
    IdentityEvent, IdentitySource, Profile, ProfileEvent, ProfileSource, ProfileStore,
    SessionView, Subscription,
};

/// Maximum time any wait is allowed before we consider the test hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn tracked<T: Send + 'static>(
    rx: mpsc::UnboundedReceiver<T>,
    active: &Arc<AtomicUsize>,
) -> Subscription<T> {
    active.fetch_add(1, Ordering::SeqCst);
    let active = Arc::clone(active);
    Subscription::new(UnboundedReceiverStream::new(rx)).on_unsubscribe(move || {
        active.fetch_sub(1, Ordering::SeqCst);
    })
}

/// Identity source whose events are pushed by the test.
#[derive(Default)]
pub struct ScriptedIdentity {
    senders: Mutex<Vec<mpsc::UnboundedSender<IdentityEvent>>>,
    active: Arc<AtomicUsize>,
    pub fail_subscribe: bool,
}

impl ScriptedIdentity {
    pub fn failing() -> Self {
        Self {
            fail_subscribe: true,
            ..Self::default()
        }
    }

    /// Sender of the most recent subscription.
    pub fn sender(&self) -> mpsc::UnboundedSender<IdentityEvent> {
        self.senders
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("identity stream was never subscribed")
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentitySource for ScriptedIdentity {
    async fn subscribe(&self) -> Result<Subscription<IdentityEvent>, StreamError> {
        if self.fail_subscribe {
            return Err(StreamError::subscribe_failed("identity", "provider offline"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        Ok(tracked(rx, &self.active))
    }
}

/// Profile source that hands the test one sender per opened subscription.
#[derive(Default)]
pub struct ScriptedProfiles {
    opened: Mutex<Vec<(String, mpsc::UnboundedSender<ProfileEvent>)>>,
    failing_ids: Mutex<Vec<String>>,
    active: Arc<AtomicUsize>,
    notify: Notify,
}

impl ScriptedProfiles {
    pub fn fail_for(&self, identity_id: &str) {
        self.failing_ids.lock().unwrap().push(identity_id.to_string());
    }

    /// Sender of the latest subscription opened for `identity_id`, waiting
    /// for it to be opened if necessary.
    pub async fn sender_for(&self, identity_id: &str) -> mpsc::UnboundedSender<ProfileEvent> {
        timeout(TEST_TIMEOUT, async {
            loop {
                let notified = self.notify.notified();
                if let Some(tx) = self.latest(identity_id) {
                    return tx;
                }
                notified.await;
            }
        })
        .await
        .expect("profile subscription was never opened")
    }

    fn latest(&self, identity_id: &str) -> Option<mpsc::UnboundedSender<ProfileEvent>> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == identity_id)
            .map(|(_, tx)| tx.clone())
    }

    /// Drop every retained sender for `identity_id`, ending its streams once
    /// the test's own clones are gone.
    pub fn close(&self, identity_id: &str) {
        self.opened.lock().unwrap().retain(|(id, _)| id != identity_id);
    }

    /// Ids subscribed so far, in order.
    pub fn opened_ids(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileSource for ScriptedProfiles {
    async fn subscribe(
        &self,
        identity_id: &str,
    ) -> Result<Subscription<ProfileEvent>, StreamError> {
        if self.failing_ids.lock().unwrap().iter().any(|id| id == identity_id) {
            return Err(StreamError::subscribe_failed("profile", "permission denied"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = tracked(rx, &self.active);
        self.opened
            .lock()
            .unwrap()
            .push((identity_id.to_string(), tx));
        self.notify.notify_waiters();
        Ok(subscription)
    }
}

/// Profile source whose `subscribe` never completes.
#[derive(Default)]
pub struct StalledProfiles {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl ProfileSource for StalledProfiles {
    async fn subscribe(
        &self,
        _identity_id: &str,
    ) -> Result<Subscription<ProfileEvent>, StreamError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// How `RecordingStore::create` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Succeed,
    Fail,
    /// Block until `release()` is called.
    Gated,
}

/// Profile store that records every create call.
pub struct RecordingStore {
    pub calls: Mutex<Vec<(String, Profile)>>,
    mode: Mutex<WriteMode>,
    gate: Notify,
    called: Notify,
}

impl RecordingStore {
    pub fn new(mode: WriteMode) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            mode: Mutex::new(mode),
            gate: Notify::new(),
            called: Notify::new(),
        }
    }

    pub fn set_mode(&self, mode: WriteMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Wait until at least `n` create calls have been made.
    pub async fn wait_for_calls(&self, n: usize) {
        timeout(TEST_TIMEOUT, async {
            loop {
                let called = self.called.notified();
                if self.call_count() >= n {
                    return;
                }
                called.await;
            }
        })
        .await
        .expect("create was never called");
    }
}

#[async_trait]
impl ProfileStore for RecordingStore {
    async fn create(&self, identity_id: &str, profile: &Profile) -> Result<(), StoreError> {
        let mode = *self.mode.lock().unwrap();
        self.calls
            .lock()
            .unwrap()
            .push((identity_id.to_string(), profile.clone()));
        self.called.notify_waiters();

        match mode {
            WriteMode::Succeed => Ok(()),
            WriteMode::Fail => Err(StoreError::Unavailable("backend offline".into())),
            WriteMode::Gated => {
                self.gate.notified().await;
                Ok(())
            }
        }
    }
}

/// Wait until the view satisfies `predicate`, returning that view.
pub async fn wait_for_view(
    rx: &mut watch::Receiver<SessionView>,
    predicate: impl FnMut(&SessionView) -> bool,
) -> SessionView {
    timeout(TEST_TIMEOUT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session view")
        .expect("session store dropped")
        .clone()
}

/// Poll `condition` until it holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// Count of profiles keyed by identity id, for assertions.
pub fn calls_by_id(store: &RecordingStore) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for (id, _) in store.calls.lock().unwrap().iter() {
        *counts.entry(id.clone()).or_insert(0) += 1;
    }
    counts
}
