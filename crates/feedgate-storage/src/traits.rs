//! TupleStore trait definition.

use async_trait::async_trait;

use crate::error::StorageResult;

/// Filter for reading tuples. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct TupleFilter {
    /// Filter by object type.
    pub object_type: Option<String>,
    /// Filter by object name.
    pub object_name: Option<String>,
    /// Filter by relation.
    pub relation: Option<String>,
    /// Filter by subject type.
    pub subject_type: Option<String>,
    /// Filter by subject name.
    pub subject_name: Option<String>,
}

impl TupleFilter {
    /// Whether a stored tuple matches this filter.
    pub fn matches(&self, tuple: &StoredTuple) -> bool {
        self.object_type
            .as_ref()
            .map_or(true, |v| &tuple.object_type == v)
            && self
                .object_name
                .as_ref()
                .map_or(true, |v| &tuple.object_name == v)
            && self.relation.as_ref().map_or(true, |v| &tuple.relation == v)
            && self
                .subject_type
                .as_ref()
                .map_or(true, |v| &tuple.subject_type == v)
            && self
                .subject_name
                .as_ref()
                .map_or(true, |v| &tuple.subject_name == v)
    }
}

/// A stored tuple: (subject, relation, object), with the subject optionally
/// qualified by a subject-set relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredTuple {
    pub object_type: String,
    pub object_name: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_name: String,
    pub subject_relation: Option<String>,
}

impl StoredTuple {
    /// Wire rendering, `object#relation@subject`.
    pub fn render(&self) -> String {
        format!(
            "{}:{}#{}@{}",
            self.object_type,
            self.object_name,
            self.relation,
            self.subject_str()
        )
    }

    /// The subject as a `type:name[#relation]` string.
    pub fn subject_str(&self) -> String {
        match &self.subject_relation {
            Some(rel) => format!("{}:{}#{}", self.subject_type, self.subject_name, rel),
            None => format!("{}:{}", self.subject_type, self.subject_name),
        }
    }

    /// Whether two tuples share the same subject, qualifier included.
    pub fn same_subject(&self, other: &StoredTuple) -> bool {
        self.subject_type == other.subject_type
            && self.subject_name == other.subject_name
            && self.subject_relation == other.subject_relation
    }
}

/// Abstract tuple storage.
///
/// Implementations must be thread-safe (Send + Sync). Point mutations are
/// strict: writing an existing tuple or deleting a missing one is an error,
/// which is how the engine detects replay of idempotent mutations. The batch
/// `apply` is the normalization primitive behind replace/exclusive
/// operations and is itself idempotent.
#[async_trait]
pub trait TupleStore: Send + Sync + 'static {
    /// Reads tuples matching the filter.
    async fn read_tuples(&self, filter: &TupleFilter) -> StorageResult<Vec<StoredTuple>>;

    /// Writes one tuple; fails with `DuplicateTuple` if it is present.
    async fn write_tuple(&self, tuple: StoredTuple) -> StorageResult<()>;

    /// Deletes one tuple; fails with `TupleNotFound` if it is absent.
    async fn delete_tuple(&self, tuple: &StoredTuple) -> StorageResult<()>;

    /// Applies deletes then writes as one batch. Tuples already absent or
    /// already present are skipped silently.
    async fn apply(
        &self,
        deletes: Vec<StoredTuple>,
        writes: Vec<StoredTuple>,
    ) -> StorageResult<()>;
}
