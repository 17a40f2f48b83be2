//! Session state: who is signed in and what their profile is.
//!
//! `SessionStore` composes two external streams: identity changes from the
//! auth provider, and per-identity profile document changes from the remote
//! store. Both are consumed through the traits in [`source`]; the merged
//! result is a `SessionView`.

pub mod memory;
pub mod model;
pub mod reconcile;
pub mod source;
pub mod store;
pub mod subscription;

pub use memory::{MemoryIdentityProvider, MemoryProfileStore};
pub use model::{Identity, Profile, ProfileSnapshot, Role, SessionView};
pub use reconcile::{Outcome, SessionEvent, reconcile};
pub use source::{IdentityEvent, IdentitySource, ProfileEvent, ProfileSource, ProfileStore};
pub use store::SessionStore;
pub use subscription::{EventStream, Subscription};
