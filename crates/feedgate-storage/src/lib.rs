//! feedgate-storage: tuple persistence for the authorization core.
//!
//! The relation engine is the only consumer. Two backends are provided:
//! an in-memory store (DashMap) used in tests and single-process
//! deployments, and a Postgres store (sqlx) for shared deployments.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryTupleStore;
pub use postgres::{PostgresConfig, PostgresTupleStore};
pub use traits::{StoredTuple, TupleFilter, TupleStore};
