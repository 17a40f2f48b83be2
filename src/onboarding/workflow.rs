//! OnboardingWorkflow: collects the profile form for a signed-in identity
//! without a profile, validates it, and creates the profile exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::config::SessionConfig;
use crate::error::{OnboardingError, SubmissionError};
use crate::session::{Profile, ProfileStore, Role, SessionStore};

use super::form::FormDraft;

/// Holds the `submitting` flag for the lifetime of one submission, including
/// when the submitting future is dropped midway.
struct SubmitGuard<'a>(&'a AtomicBool);

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One onboarding screen's worth of state.
pub struct OnboardingWorkflow {
    session: SessionStore,
    store: Arc<dyn ProfileStore>,
    submit_timeout: Duration,
    draft: Mutex<FormDraft>,
    submitting: AtomicBool,
    disposed: AtomicBool,
}

impl OnboardingWorkflow {
    pub fn new(session: SessionStore, store: Arc<dyn ProfileStore>, config: &SessionConfig) -> Self {
        Self {
            session,
            store,
            submit_timeout: config.submit_timeout,
            draft: Mutex::new(FormDraft::default()),
            submitting: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn on_name_change(&self, text: &str) -> FormDraft {
        let mut draft = self.lock_draft();
        if !self.is_disposed() {
            draft.set_name(text);
        }
        draft.clone()
    }

    /// Apply the phone mask to `text` and store both forms.
    pub fn on_phone_change(&self, text: &str) -> FormDraft {
        let mut draft = self.lock_draft();
        if !self.is_disposed() {
            draft.set_phone(text);
        }
        draft.clone()
    }

    pub fn draft(&self) -> FormDraft {
        self.lock_draft().clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// The screen went away. Any submission still in flight will not touch
    /// the session store when it resolves.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            *self.lock_draft() = FormDraft::default();
            debug!("Onboarding workflow disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Validate the draft and create the profile with `role`.
    ///
    /// 1. Reject if another submission is in flight or the screen is gone.
    /// 2. Validate the draft against the current identity.
    /// 3. Make one `create` call, bounded by the submit timeout.
    /// 4. On success push the profile into the session store and clear the
    ///    draft. On failure leave both untouched.
    pub async fn submit(&self, role: Role) -> Result<Profile, OnboardingError> {
        if self.is_disposed() {
            return Err(OnboardingError::Disposed);
        }
        let Some(_guard) = SubmitGuard::acquire(&self.submitting) else {
            debug!("Submission already in flight; ignoring");
            return Err(OnboardingError::InFlight);
        };

        let view = self.session.view();
        let (identity, profile) = {
            let draft = self.lock_draft();
            let identity = draft.validate(view.identity.as_ref())?.clone();
            let profile = Profile::new(
                &identity,
                draft.name.clone(),
                draft.phone_number_formatted.clone(),
                role,
                Utc::now(),
            );
            (identity, profile)
        };

        let result = tokio::time::timeout(
            self.submit_timeout,
            self.store.create(&identity.id, &profile),
        )
        .await;

        if self.is_disposed() {
            info!(identity_id = %identity.id, "Onboarding dismissed before submission resolved; discarding result");
            return Err(OnboardingError::Disposed);
        }

        match result {
            Ok(Ok(())) => {
                self.session.set_profile_for(&identity.id, profile.clone());
                *self.lock_draft() = FormDraft::default();
                info!(identity_id = %identity.id, role = %role, "Onboarding complete");
                Ok(profile)
            }
            Ok(Err(e)) => {
                error!(identity_id = %identity.id, "Failed to create profile: {}", e);
                Err(SubmissionError::Store(e).into())
            }
            Err(_) => {
                error!(
                    identity_id = %identity.id,
                    timeout = ?self.submit_timeout,
                    "Profile creation timed out"
                );
                Err(SubmissionError::Timeout(self.submit_timeout).into())
            }
        }
    }

    fn lock_draft(&self) -> MutexGuard<'_, FormDraft> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
