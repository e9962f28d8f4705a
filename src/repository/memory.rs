use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::model::{Reservation, ReservationId};

use super::{RepositoryError, ReservationRepository};

#[derive(Default)]
pub struct InMemoryRepository {
    rows: DashMap<ReservationId, Reservation>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed rows directly, skipping the engine. Test fixtures only.
    pub fn with_rows(rows: impl IntoIterator<Item = Reservation>) -> Self {
        let repo = Self::new();
        for r in rows {
            repo.rows.insert(r.id, r);
        }
        repo
    }
}

#[async_trait]
impl ReservationRepository for InMemoryRepository {
    async fn list(&self) -> Result<Vec<Reservation>, RepositoryError> {
        Ok(self.rows.iter().map(|e| e.value().clone()).collect())
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, RepositoryError> {
        Ok(self.rows.get(&id).map(|e| e.value().clone()))
    }

    async fn insert(&self, reservation: Reservation) -> Result<(), RepositoryError> {
        match self.rows.entry(reservation.id) {
            Entry::Occupied(_) => Err(RepositoryError::AlreadyExists(reservation.id)),
            Entry::Vacant(slot) => {
                slot.insert(reservation);
                Ok(())
            }
        }
    }

    async fn update(&self, reservation: Reservation) -> Result<(), RepositoryError> {
        match self.rows.get_mut(&reservation.id) {
            Some(mut row) => {
                *row = reservation;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(reservation.id)),
        }
    }

    async fn delete(&self, id: ReservationId) -> Result<Reservation, RepositoryError> {
        self.rows
            .remove(&id)
            .map(|(_, r)| r)
            .ok_or(RepositoryError::NotFound(id))
    }
}
