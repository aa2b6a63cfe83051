//! OAuth grant types and provider endpoint operations.
//!
//! The authorization code flow runs in three steps:
//! 1. Build the provider's authorize URL with a CSRF state token
//! 2. User authorizes on the provider's site and is redirected back
//! 3. Exchange the code for an [`AccessGrant`] and hand it to a connection factory

mod grant;
mod operations;
mod state_manager;

pub use grant::{AccessGrant, AuthorizationGrant, OAuth1Token};
pub use operations::{OAuth1Operations, OAuth2Operations};
pub use state_manager::{run_state_cleanup, PendingConnect, StateManager, StateRejection};
