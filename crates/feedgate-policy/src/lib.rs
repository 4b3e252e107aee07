//! feedgate-policy: domain-aware authorization decisions.
//!
//! Translates API operations (view/edit/list/modify-membership of tenants,
//! groups, feeds, and feed versions) into relation-engine checks and tuple
//! writes, and builds the permission filter that scopes SQL list queries to
//! authorized rows.

pub mod checker;
pub mod entities;
pub mod error;
pub mod filter;
pub mod postgres;

pub use checker::{
    Checker, CheckerConfig, FeedPermissions, FeedVersionPermissions, GroupPermissions,
    SubjectGrant, TenantPermissions,
};
pub use entities::{Cursor, EntityDb, Feed, FeedVersion, Group, MemoryEntityDb, Tenant};
pub use error::{DbError, DbResult, PolicyError, PolicyResult};
pub use filter::PermFilter;
pub use postgres::PostgresEntityDb;
