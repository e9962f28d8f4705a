use crate::model::Reservation;

/// Runs after a primary reservation is deleted, while the engine's mutation
/// lock is still held. `dependents` are the backups that referenced it.
pub trait PrimaryDeletedPolicy: Send + Sync {
    fn on_primary_deleted(&self, deleted: &Reservation, dependents: &[Reservation]);
}

/// Leaves dependent backups as they are. Promotion is a human decision.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPromotion;

impl PrimaryDeletedPolicy for NoPromotion {
    fn on_primary_deleted(&self, deleted: &Reservation, dependents: &[Reservation]) {
        if dependents.is_empty() {
            return;
        }
        tracing::info!(
            "primary {} ({}) deleted; {} backup(s) still reference it and were not promoted",
            deleted.id,
            deleted.range,
            dependents.len()
        );
    }
}
