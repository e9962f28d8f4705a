use chrono::NaiveDate;

use crate::model::*;

use super::conflict::overlapping_primaries;
use super::{Engine, EngineError};

fn chronological(mut reservations: Vec<Reservation>) -> Vec<Reservation> {
    reservations.sort_by_key(|r| (r.range.from, r.id));
    reservations
}

impl Engine {
    /// Every reservation on the resource, ordered by start day then id.
    pub async fn list_reservations(&self) -> Result<Vec<Reservation>, EngineError> {
        Ok(chronological(self.repo.list().await?))
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.repo.get(id).await?.ok_or(EngineError::NotFound(id))
    }

    pub async fn reservations_of(&self, owner_id: &str) -> Result<Vec<Reservation>, EngineError> {
        let mine = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|r| r.owner_id == owner_id)
            .collect();
        Ok(chronological(mine))
    }

    /// The primary reservation holding the cabin on `day`.
    pub async fn occupant_on(&self, day: NaiveDate) -> Result<Option<Reservation>, EngineError> {
        let mut holders: Vec<Reservation> = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|r| r.is_primary() && r.range.contains(day))
            .collect();
        if holders.len() > 1 {
            let ids = holders.iter().map(|r| r.id).collect();
            tracing::error!("{} primaries hold {day}", holders.len());
            return Err(EngineError::InvariantViolation(ids));
        }
        Ok(holders.pop())
    }

    /// Backups queued behind `primary_id`.
    pub async fn backups_of(&self, primary_id: ReservationId) -> Result<Vec<Reservation>, EngineError> {
        let queued = self
            .repo
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status == ReservationStatus::Backup && r.conflicts_with_id == Some(primary_id))
            .collect();
        Ok(chronological(queued))
    }

    /// The note the previous occupant left for whoever holds `id`.
    ///
    /// "Previous" is the primary reservation ending latest before `id` starts.
    pub async fn handover_for(&self, id: ReservationId) -> Result<Option<Handover>, EngineError> {
        let all = self.repo.list().await?;
        let target = all
            .iter()
            .find(|r| r.id == id)
            .ok_or(EngineError::NotFound(id))?;

        let previous = all
            .iter()
            .filter(|r| r.is_primary() && r.id != id && r.range.to < target.range.from)
            .max_by_key(|r| (r.range.to, r.range.from));

        Ok(previous.and_then(|p| {
            p.handover_note.as_ref().map(|note| Handover {
                from_reservation: p.id,
                from_owner: p.owner_id.clone(),
                left_on: p.range.to,
                note: note.clone(),
            })
        }))
    }

    /// Check that no two primaries overlap. Returns the offending ids otherwise.
    pub async fn audit(&self) -> Result<(), EngineError> {
        let offenders = overlapping_primaries(&self.repo.list().await?);
        if offenders.is_empty() {
            return Ok(());
        }
        tracing::error!("audit found overlapping primaries: {offenders:?}");
        Err(EngineError::InvariantViolation(offenders))
    }
}
