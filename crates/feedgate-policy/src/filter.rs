//! The allowed-ids bundle scoping list queries to authorized rows.

use serde::Serialize;

/// Per-request permission filter for feed and feed-version list queries.
///
/// Built once at request entry from two ListObjects calls (or the
/// global-admin flag) and spliced into every downstream SELECT as a
/// predicate, so list endpoints cost one engine round-trip instead of one
/// per row. The guarantee: no row passes the predicate that the caller
/// could not have obtained from a direct Check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PermFilter {
    /// Caller sees everything; the predicate collapses to TRUE.
    GlobalAdmin,
    /// Caller sees public rows plus the listed ids.
    Ids {
        feed_ids: Vec<i64>,
        feed_version_ids: Vec<i64>,
    },
}

impl PermFilter {
    /// The filter for anonymous callers: public rows only.
    pub fn anonymous() -> Self {
        PermFilter::Ids {
            feed_ids: Vec::new(),
            feed_version_ids: Vec::new(),
        }
    }

    pub fn is_global_admin(&self) -> bool {
        matches!(self, PermFilter::GlobalAdmin)
    }

    /// Evaluates the list predicate for one row:
    /// `public OR global_admin OR feed_id ∈ allowed OR feed_version_id ∈ allowed`.
    pub fn allows(&self, feed_id: Option<i64>, feed_version_id: Option<i64>, public: bool) -> bool {
        if public {
            return true;
        }
        match self {
            PermFilter::GlobalAdmin => true,
            PermFilter::Ids {
                feed_ids,
                feed_version_ids,
            } => {
                feed_id.map_or(false, |id| feed_ids.contains(&id))
                    || feed_version_id.map_or(false, |id| feed_version_ids.contains(&id))
            }
        }
    }
}
