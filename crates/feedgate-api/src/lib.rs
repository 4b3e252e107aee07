//! feedgate-api: the admin HTTP surface.
//!
//! A flat JSON router mapping request paths onto policy-layer operations.
//! All decisions live in the policy layer; this crate only translates
//! paths, bodies, and error kinds.

pub mod auth;
pub mod config;
pub mod observability;
pub mod routes;
pub mod state;

pub use auth::{AuthMode, Authenticator};
pub use config::FeedgateConfig;
pub use routes::create_router;
pub use state::AppState;
