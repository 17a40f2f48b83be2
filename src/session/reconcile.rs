//! Session reconciliation: the one place `SessionView` transitions happen.
//!
//! Every identity or profile stream event, and every expiry of the
//! reconciliation window, goes through [`reconcile`]. Profile-side events
//! carry the identity id their subscription was opened for and are dropped
//! as stale when that no longer matches the view.

use crate::error::StreamError;

use super::model::{Identity, ProfileSnapshot, SessionView};

/// Input to [`reconcile`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The identity stream reported a sign-in, a switch, or a sign-out.
    IdentityChanged(Option<Identity>),
    /// The identity stream reported an error.
    IdentityFailed(StreamError),
    /// A profile subscription delivered a snapshot.
    ProfileChanged {
        identity_id: String,
        snapshot: ProfileSnapshot,
    },
    /// A profile subscription failed to open, errored, or ended before
    /// resolving.
    ProfileFailed {
        identity_id: String,
        error: StreamError,
    },
    /// The reconciliation window ran out. `identity_id` is the identity the
    /// window was started for (`None` while waiting for the first identity).
    WindowExpired { identity_id: Option<String> },
}

/// Whether an event changed the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Event belonged to an identity that is no longer current, or arrived
    /// after the view had already settled.
    Stale,
}

/// Apply one event to the view.
pub fn reconcile(view: &mut SessionView, event: SessionEvent) -> Outcome {
    match event {
        SessionEvent::IdentityChanged(Some(identity)) => {
            view.identity = Some(identity);
            view.profile = None;
            view.loading = true;
            Outcome::Applied
        }
        SessionEvent::IdentityChanged(None) => {
            view.identity = None;
            view.profile = None;
            view.loading = false;
            Outcome::Applied
        }
        SessionEvent::IdentityFailed(_) => {
            // Only the wait for the very first identity event is settled
            // here. A signed-in identity keeps waiting on its profile.
            if view.loading && view.identity.is_none() {
                view.loading = false;
                Outcome::Applied
            } else {
                Outcome::Stale
            }
        }
        SessionEvent::ProfileChanged {
            identity_id,
            snapshot,
        } => {
            if view.identity_id() != Some(identity_id.as_str()) {
                return Outcome::Stale;
            }
            view.profile = snapshot.into_profile();
            view.loading = false;
            Outcome::Applied
        }
        SessionEvent::ProfileFailed { identity_id, .. } => {
            if view.identity_id() != Some(identity_id.as_str()) {
                return Outcome::Stale;
            }
            view.profile = None;
            view.loading = false;
            Outcome::Applied
        }
        SessionEvent::WindowExpired { identity_id } => {
            if !view.loading || view.identity_id() != identity_id.as_deref() {
                return Outcome::Stale;
            }
            view.profile = None;
            view.loading = false;
            Outcome::Applied
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use crate::session::model::{Profile, Role};

    use super::*;

    fn identity(id: &str) -> Identity {
        Identity::new(id, format!("{id}@example.com"))
    }

    fn profile_for(id: &str) -> Profile {
        Profile::new(&identity(id), id.to_uppercase(), "123-456-7890", Role::Customer, Utc::now())
    }

    fn found(id: &str) -> SessionEvent {
        SessionEvent::ProfileChanged {
            identity_id: id.to_string(),
            snapshot: ProfileSnapshot::Found(profile_for(id)),
        }
    }

    fn failed(id: &str) -> SessionEvent {
        SessionEvent::ProfileFailed {
            identity_id: id.to_string(),
            error: StreamError::disconnected("profile", "boom"),
        }
    }

    fn assert_consistent(view: &SessionView) {
        if view.identity.is_none() {
            assert!(view.profile.is_none(), "profile without identity: {view:?}");
        }
    }

    #[test]
    fn sign_in_then_profile_found() {
        let mut view = SessionView::default();
        reconcile(&mut view, SessionEvent::IdentityChanged(Some(identity("a"))));
        assert!(view.loading);
        assert!(view.profile.is_none());

        let profile = profile_for("a");
        let event = SessionEvent::ProfileChanged {
            identity_id: "a".into(),
            snapshot: ProfileSnapshot::Found(profile.clone()),
        };
        assert_eq!(reconcile(&mut view, event), Outcome::Applied);
        assert!(!view.loading);
        assert_eq!(view.profile, Some(profile));
    }

    #[test]
    fn sign_in_then_not_found_needs_onboarding() {
        let mut view = SessionView::default();
        reconcile(&mut view, SessionEvent::IdentityChanged(Some(identity("a"))));
        reconcile(
            &mut view,
            SessionEvent::ProfileChanged {
                identity_id: "a".into(),
                snapshot: ProfileSnapshot::NotFound,
            },
        );
        assert!(view.needs_onboarding());
    }

    #[test]
    fn signed_out_resolves_immediately() {
        let mut view = SessionView::default();
        reconcile(&mut view, SessionEvent::IdentityChanged(None));
        assert!(!view.loading);
        assert!(view.identity.is_none());
    }

    #[test]
    fn late_profile_for_previous_identity_is_stale() {
        let mut view = SessionView::default();
        reconcile(&mut view, SessionEvent::IdentityChanged(Some(identity("a"))));
        reconcile(&mut view, SessionEvent::IdentityChanged(Some(identity("b"))));

        assert_eq!(reconcile(&mut view, found("a")), Outcome::Stale);
        assert_eq!(view.identity_id(), Some("b"));
        assert!(view.profile.is_none());
        assert!(view.loading, "b is still waiting on its own profile");
    }

    #[test]
    fn late_profile_after_sign_out_is_stale() {
        let mut view = SessionView::default();
        reconcile(&mut view, SessionEvent::IdentityChanged(Some(identity("a"))));
        reconcile(&mut view, SessionEvent::IdentityChanged(None));

        assert_eq!(reconcile(&mut view, found("a")), Outcome::Stale);
        assert_eq!(reconcile(&mut view, failed("a")), Outcome::Stale);
        assert_consistent(&view);
    }

    #[test]
    fn profile_failure_settles_to_absent() {
        let mut view = SessionView::default();
        reconcile(&mut view, SessionEvent::IdentityChanged(Some(identity("a"))));
        assert_eq!(reconcile(&mut view, failed("a")), Outcome::Applied);
        assert!(!view.loading);
        assert!(view.profile.is_none());
    }

    #[test]
    fn window_expiry_only_applies_to_its_own_identity() {
        let mut view = SessionView::default();
        reconcile(&mut view, SessionEvent::IdentityChanged(Some(identity("b"))));

        let stale = SessionEvent::WindowExpired {
            identity_id: Some("a".into()),
        };
        assert_eq!(reconcile(&mut view, stale), Outcome::Stale);
        assert!(view.loading);

        let current = SessionEvent::WindowExpired {
            identity_id: Some("b".into()),
        };
        assert_eq!(reconcile(&mut view, current.clone()), Outcome::Applied);
        assert!(!view.loading);
        assert_eq!(reconcile(&mut view, current), Outcome::Stale);
    }

    #[test]
    fn window_expiry_before_first_identity() {
        let mut view = SessionView::default();
        let outcome = reconcile(&mut view, SessionEvent::WindowExpired { identity_id: None });
        assert_eq!(outcome, Outcome::Applied);
        assert!(!view.loading);
    }

    #[test]
    fn identity_failure_settles_only_the_initial_wait() {
        let err = || {
            SessionEvent::IdentityFailed(StreamError::ReconcileTimeout {
                identity_id: "x".into(),
                window: Duration::from_secs(1),
            })
        };
        let mut view = SessionView::default();
        assert_eq!(reconcile(&mut view, err()), Outcome::Applied);
        assert!(!view.loading);

        reconcile(&mut view, SessionEvent::IdentityChanged(Some(identity("a"))));
        assert_eq!(reconcile(&mut view, err()), Outcome::Stale);
        assert!(view.loading);
    }

    #[test]
    fn invariants_hold_across_mixed_sequences() {
        let ids = ["a", "b", "c"];
        let mut view = SessionView::default();

        for round in 0..60usize {
            let id = ids[round % ids.len()];
            let other = ids[(round / 2) % ids.len()];
            let event = match round % 7 {
                0 => SessionEvent::IdentityChanged(Some(identity(id))),
                1 => found(other),
                2 => SessionEvent::IdentityChanged(None),
                3 => failed(id),
                4 => SessionEvent::WindowExpired {
                    identity_id: Some(other.to_string()),
                },
                5 => found(id),
                _ => SessionEvent::ProfileChanged {
                    identity_id: other.to_string(),
                    snapshot: ProfileSnapshot::NotFound,
                },
            };

            let was_loading = view.loading;
            let is_identity_change = matches!(event, SessionEvent::IdentityChanged(_));
            let before = view.identity_id().map(str::to_string);
            let outcome = reconcile(&mut view, event);
            assert_consistent(&view);

            if outcome == Outcome::Stale {
                assert_eq!(view.loading, was_loading);
            }
            // loading only ever goes back to true on an identity change
            if !was_loading && view.loading {
                assert!(is_identity_change);
            }
            if let Some(profile) = &view.profile {
                let owner = view.identity_id().unwrap();
                assert_eq!(profile.email, format!("{owner}@example.com"));
            }
            if !is_identity_change {
                assert_eq!(view.identity_id().map(str::to_string), before);
            }
        }
    }
}
