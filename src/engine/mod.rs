mod conflict;
mod error;
mod mutations;
mod queries;

pub use conflict::find_primary_conflict;
pub use error::EngineError;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::auth::{Authorizer, RoleAuthorizer};
use crate::directory::UserDirectory;
use crate::observability::*;
use crate::policy::{NoPromotion, PrimaryDeletedPolicy};
use crate::repository::ReservationRepository;

/// Reservation lifecycle for one shared resource.
///
/// Reads go straight to the repository. Every mutation runs its
/// read-check-write sequence under `mutations`, so two overlapping
/// creates can never both observe "no conflict".
pub struct Engine {
    repo: Arc<dyn ReservationRepository>,
    users: Arc<dyn UserDirectory>,
    authorizer: Arc<dyn Authorizer>,
    policy: Arc<dyn PrimaryDeletedPolicy>,
    mutations: Mutex<()>,
}

impl Engine {
    pub fn new(repo: Arc<dyn ReservationRepository>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            repo,
            users,
            authorizer: Arc::new(RoleAuthorizer),
            policy: Arc::new(NoPromotion),
            mutations: Mutex::new(()),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn PrimaryDeletedPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn repository(&self) -> &Arc<dyn ReservationRepository> {
        &self.repo
    }

    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    /// Run `work` while holding the mutation lock, recording outcome metrics.
    async fn serialized<T, F>(&self, op: &'static str, work: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        let _guard = self.mutations.lock().await;
        let started = Instant::now();
        let result = work.await;
        metrics::histogram!(MUTATION_DURATION_SECONDS, "op" => op)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => metrics::counter!(MUTATIONS_TOTAL, "op" => op).increment(1),
            Err(e) => {
                metrics::counter!(MUTATIONS_REJECTED_TOTAL, "op" => op, "kind" => e.kind())
                    .increment(1);
                if let EngineError::InvariantViolation(ids) = e {
                    metrics::counter!(INVARIANT_VIOLATIONS_TOTAL).increment(1);
                    tracing::error!("{op}: overlapping primary reservations in store: {ids:?}");
                } else if e.is_server_fault() {
                    tracing::error!("{op} failed: {e}");
                } else {
                    tracing::debug!("{op} rejected: {e}");
                }
            }
        }
        result
    }
}
