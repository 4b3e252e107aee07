//! Application state for HTTP handlers.

use std::sync::Arc;

use feedgate_authn::IdentityClient;
use feedgate_domain::RelationEngine;
use feedgate_policy::{Checker, CheckerConfig, EntityDb};
use feedgate_storage::TupleStore;

use crate::auth::Authenticator;

/// Shared state behind every HTTP handler: the policy checker and the
/// request authenticator.
pub struct AppState<S: TupleStore, D: EntityDb> {
    pub checker: Arc<Checker<S, D>>,
    pub authenticator: Arc<Authenticator>,
}

impl<S: TupleStore, D: EntityDb> Clone for AppState<S, D> {
    fn clone(&self) -> Self {
        Self {
            checker: Arc::clone(&self.checker),
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

impl<S: TupleStore, D: EntityDb> AppState<S, D> {
    pub fn new(
        store: Arc<S>,
        db: Arc<D>,
        identity: Arc<dyn IdentityClient>,
        authenticator: Authenticator,
        checker_config: CheckerConfig,
    ) -> Self {
        let engine = RelationEngine::new(store);
        let checker = Arc::new(Checker::new(engine, db, identity, checker_config));
        Self {
            checker,
            authenticator: Arc::new(authenticator),
        }
    }
}
