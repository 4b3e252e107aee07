//! feedgate-domain: tuple model and relation engine
//!
//! This crate contains the authorization core:
//! - Tuple vocabulary (entity keys, relations, actions) and parsing
//! - The closed type-relation schema for the transit hierarchy
//! - The relation engine answering Check / ListObjects / ReadTuples and
//!   applying tuple mutations with schema enforcement
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               feedgate-domain               │
//! ├─────────────────────────────────────────────┤
//! │  tuple.rs   - EntityKey/TupleKey vocabulary │
//! │  schema.rs  - type-relation schema, rewrites│
//! │  engine.rs  - check/list/mutate over a      │
//! │               TupleStore                    │
//! └─────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod error;
pub mod schema;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use engine::RelationEngine;
pub use error::{EngineError, EngineResult};
pub use tuple::{Action, EntityKey, ObjectType, Relation, TupleKey};
