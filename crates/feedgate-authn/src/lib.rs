//! feedgate-authn: authenticated-user resolution.
//!
//! Validates bearer tokens and resolves opaque user identifiers to enriched
//! user records through a cached external identity endpoint. The gatekeeper
//! cache keeps records at most `recheck_ttl` stale in steady state and at
//! most `expire_ttl` stale during identity outages.

pub mod client;
pub mod error;
pub mod gatekeeper;
pub mod singleflight;
pub mod token;
pub mod user;

pub use client::{HttpIdentityClient, IdentityClient, StaticIdentityClient};
pub use error::{AuthnError, AuthnResult};
pub use gatekeeper::{Gatekeeper, GatekeeperConfig, NullSharedCache, SharedUserCache};
pub use token::TokenValidator;
pub use user::User;
