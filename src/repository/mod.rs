mod durable;
mod memory;

pub use durable::DurableRepository;
pub use memory::InMemoryRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Reservation, ReservationId};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("no stored reservation {0}")]
    NotFound(ReservationId),
    #[error("reservation {0} already stored")]
    AlreadyExists(ReservationId),
    #[error("WAL error: {0}")]
    Wal(String),
}

/// Storage for one resource's reservations.
///
/// Implementations need not serialize writers; the engine holds its
/// mutation lock across every check-then-write sequence.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// All reservations, in no particular order.
    async fn list(&self) -> Result<Vec<Reservation>, RepositoryError>;

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, RepositoryError>;

    async fn insert(&self, reservation: Reservation) -> Result<(), RepositoryError>;

    /// Replace the stored row with the same id.
    async fn update(&self, reservation: Reservation) -> Result<(), RepositoryError>;

    /// Remove and return the stored row.
    async fn delete(&self, id: ReservationId) -> Result<Reservation, RepositoryError>;
}
