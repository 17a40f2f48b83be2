//! SessionStore: merges the identity stream and the per-identity profile
//! stream into a single `SessionView`.
//!
//! `initialize()` opens the identity subscription and spawns one
//! reconciliation task. That task is the only reader of both streams: on
//! every identity event it closes the current profile subscription before
//! applying the change and opening a new one, so at most one profile
//! subscription is ever live. The view is published through a `watch`
//! channel; `set_profile_for` writes through the same channel.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::StreamError;

use super::model::{Identity, Profile, ProfileSnapshot, SessionView};
use super::reconcile::{Outcome, SessionEvent, reconcile};
use super::source::{IdentitySource, ProfileSource};
use super::subscription::{Managed, SubscriptionManager};

/// Handle to the running reconciliation task.
struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Inner {
    identity_source: Arc<dyn IdentitySource>,
    profile_source: Arc<dyn ProfileSource>,
    reconcile_window: Duration,
    view_tx: Arc<watch::Sender<SessionView>>,
    running: Mutex<Option<Running>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.task.abort();
        }
    }
}

/// Session state holder. Cheap to clone; clones share one view.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(
        identity_source: Arc<dyn IdentitySource>,
        profile_source: Arc<dyn ProfileSource>,
        config: &SessionConfig,
    ) -> Self {
        let (view_tx, _) = watch::channel(SessionView::default());
        Self {
            inner: Arc::new(Inner {
                identity_source,
                profile_source,
                reconcile_window: config.reconcile_window,
                view_tx: Arc::new(view_tx),
                running: Mutex::new(None),
            }),
        }
    }

    /// Open the identity subscription and start reconciling.
    ///
    /// A failure to subscribe is returned to the caller. Calling this while
    /// already running is a no-op.
    pub async fn initialize(&self) -> Result<(), StreamError> {
        if self.is_running() {
            debug!("Session store already initialized");
            return Ok(());
        }

        let identity = self.inner.identity_source.subscribe().await?;

        let mut running = self.lock_running();
        if running.is_some() {
            // Lost a race with a concurrent initialize; ours is dropped and
            // thereby unsubscribed.
            return Ok(());
        }

        self.inner.view_tx.send_replace(SessionView::default());

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            SubscriptionManager::new(identity),
            Arc::clone(&self.inner.profile_source),
            Arc::clone(&self.inner.view_tx),
            self.inner.reconcile_window,
            shutdown_rx,
        ));
        *running = Some(Running { shutdown, task });

        info!(window = ?self.inner.reconcile_window, "Session store initialized");
        Ok(())
    }

    /// Current view.
    pub fn view(&self) -> SessionView {
        self.inner.view_tx.borrow().clone()
    }

    /// Receiver that observes every view change.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.inner.view_tx.subscribe()
    }

    /// Replace the profile slice without waiting for the profile stream.
    ///
    /// Ignored while signed out. Does not touch `loading`. Returns whether
    /// the view was updated.
    pub fn set_profile(&self, profile: Profile) -> bool {
        self.inner.view_tx.send_if_modified(|view| {
            if view.identity.is_none() {
                warn!("Ignoring profile update while signed out");
                return false;
            }
            view.profile = Some(profile);
            true
        })
    }

    /// Like [`set_profile`](Self::set_profile), but only if `identity_id` is
    /// still the signed-in identity.
    pub fn set_profile_for(&self, identity_id: &str, profile: Profile) -> bool {
        self.inner.view_tx.send_if_modified(|view| {
            if view.identity_id() != Some(identity_id) {
                warn!(identity_id, "Ignoring profile update for an identity that is no longer current");
                return false;
            }
            view.profile = Some(profile);
            true
        })
    }

    /// Close both subscriptions (profile, then identity) and stop the task.
    /// Safe to call repeatedly.
    pub async fn teardown(&self) {
        let running = self.lock_running().take();
        let Some(Running { shutdown, task }) = running else {
            return;
        };
        let _ = shutdown.send(());
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                warn!("Session task ended abnormally: {}", e);
            }
        }
        info!("Session store torn down");
    }

    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reconciliation loop. Owns both subscriptions for its whole lifetime.
async fn run(
    mut manager: SubscriptionManager,
    profile_source: Arc<dyn ProfileSource>,
    view_tx: Arc<watch::Sender<SessionView>>,
    window: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    // The first identity event must also arrive within the window.
    let mut deadline = Some(Instant::now() + window);

    loop {
        let managed = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            managed = manager.next() => managed,
            _ = wait_until(deadline) => {
                expire_window(&view_tx, window);
                deadline = None;
                continue;
            }
        };

        match managed {
            Managed::Identity(Some(Ok(identity))) => {
                let Some(identity_id) = switch_identity(&mut manager, &view_tx, identity) else {
                    deadline = None;
                    continue;
                };
                deadline = view_tx
                    .borrow()
                    .loading
                    .then(|| Instant::now() + window);

                // A stalled subscribe must not outlive the window or block
                // shutdown.
                let subscribed = tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = wait_until(deadline) => None,
                    result = profile_source.subscribe(&identity_id) => Some(result),
                };
                match subscribed {
                    Some(Ok(subscription)) => manager.open_profile(identity_id, subscription),
                    Some(Err(error)) => {
                        warn!(identity_id = %identity_id, "Failed to subscribe to profile: {}", error);
                        apply(&view_tx, SessionEvent::ProfileFailed { identity_id, error });
                    }
                    None => {
                        warn!(identity_id = %identity_id, "Profile subscribe did not complete within {:?}", window);
                        expire_window(&view_tx, window);
                    }
                }
            }
            Managed::Identity(Some(Err(error))) => {
                warn!("Identity stream error: {}", error);
                apply(&view_tx, SessionEvent::IdentityFailed(error));
            }
            Managed::Identity(None) => {
                warn!("Identity stream closed; stopping session reconciliation");
                manager.close_profile();
                if view_tx.borrow().loading {
                    expire_window(&view_tx, window);
                }
                break;
            }
            Managed::Profile {
                identity_id,
                event: Some(Ok(snapshot)),
            } => {
                let found = matches!(snapshot, ProfileSnapshot::Found(_));
                debug!(identity_id = %identity_id, found, "Profile snapshot");
                apply(
                    &view_tx,
                    SessionEvent::ProfileChanged {
                        identity_id,
                        snapshot,
                    },
                );
            }
            Managed::Profile {
                identity_id,
                event: Some(Err(error)),
            } => {
                warn!(identity_id = %identity_id, "Profile stream error: {}", error);
                apply(&view_tx, SessionEvent::ProfileFailed { identity_id, error });
            }
            Managed::Profile {
                identity_id,
                event: None,
            } => {
                debug!(identity_id = %identity_id, "Profile stream closed");
                if view_tx.borrow().loading {
                    apply(
                        &view_tx,
                        SessionEvent::ProfileFailed {
                            identity_id,
                            error: StreamError::disconnected("profile", "stream ended"),
                        },
                    );
                }
            }
        }

        if !view_tx.borrow().loading {
            deadline = None;
        }
    }

    manager.close_all();
    debug!("Session subscriptions closed");
}

/// Close the old profile subscription and apply the identity. Returns the
/// id to open a profile subscription for, if signed in. The caller opens it
/// only after this returns, so it is never open-before-close.
fn switch_identity(
    manager: &mut SubscriptionManager,
    view_tx: &watch::Sender<SessionView>,
    identity: Option<Identity>,
) -> Option<String> {
    if let Some(previous) = manager.close_profile() {
        debug!(identity_id = %previous, "Closed profile subscription");
    }

    let identity_id = identity.as_ref().map(|i| i.id.clone());
    apply(view_tx, SessionEvent::IdentityChanged(identity));

    match &identity_id {
        Some(id) => info!(identity_id = %id, "Signed in; subscribing to profile"),
        None => info!("Signed out"),
    }
    identity_id
}

fn expire_window(view_tx: &watch::Sender<SessionView>, window: Duration) {
    let identity_id = current_identity(view_tx);
    let outcome = apply(
        view_tx,
        SessionEvent::WindowExpired {
            identity_id: identity_id.clone(),
        },
    );
    if outcome == Outcome::Applied {
        let error = StreamError::ReconcileTimeout {
            identity_id: identity_id.unwrap_or_else(|| "<none>".to_string()),
            window,
        };
        warn!("{}", error);
    }
}

fn current_identity(view_tx: &watch::Sender<SessionView>) -> Option<String> {
    view_tx.borrow().identity_id().map(str::to_string)
}

fn apply(view_tx: &watch::Sender<SessionView>, event: SessionEvent) -> Outcome {
    let mut outcome = Outcome::Stale;
    view_tx.send_if_modified(|view| {
        outcome = reconcile(view, event);
        outcome == Outcome::Applied
    });
    if outcome == Outcome::Stale {
        debug!("Dropped stale session event");
    }
    outcome
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
