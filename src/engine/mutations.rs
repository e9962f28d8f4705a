use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::RESERVATIONS_CREATED_TOTAL;

use super::conflict::{
    find_primary_conflict, validate_note, validate_purpose, validate_range, validate_user_id,
};
use super::{Engine, EngineError};

impl Engine {
    /// Book a stay for `owner_id`.
    ///
    /// Soft requests are stored as soft without looking at anything else.
    /// Otherwise the stay becomes primary if no primary overlaps it, or a
    /// backup pointing at the primary it collides with.
    pub async fn create_reservation(
        &self,
        owner_id: &str,
        request: BookingRequest,
    ) -> Result<Reservation, EngineError> {
        validate_user_id("owner_id", owner_id)?;
        validate_range(&request.range)?;
        let purpose = validate_purpose(&request.purpose)?;
        let notes = validate_note(request.notes.as_deref())?;
        let handover_note = validate_note(request.handover_note.as_deref())?;

        self.serialized("create", async {
            let current = self.repo.list().await?;
            if current.len() >= MAX_RESERVATIONS_PER_RESOURCE {
                return Err(EngineError::LimitExceeded("too many reservations on resource"));
            }

            let (status, conflicts_with_id) = if request.soft {
                (ReservationStatus::Soft, None)
            } else {
                match find_primary_conflict(&request.range, &current, None)? {
                    None => (ReservationStatus::Primary, None),
                    Some(primary) => {
                        tracing::debug!(
                            "{} overlaps primary {} ({}), queueing as backup",
                            request.range,
                            primary.id,
                            primary.range
                        );
                        (ReservationStatus::Backup, Some(primary.id))
                    }
                }
            };

            let reservation = Reservation {
                id: Ulid::new(),
                owner_id: owner_id.to_string(),
                range: request.range,
                purpose,
                notes,
                handover_note,
                status,
                conflicts_with_id,
            };
            self.repo.insert(reservation.clone()).await?;

            metrics::counter!(RESERVATIONS_CREATED_TOTAL, "status" => status.as_str()).increment(1);
            info!(
                "{owner_id} booked {} as {status} ({})",
                reservation.range, reservation.id
            );
            Ok::<_, EngineError>(reservation)
        })
        .await
    }

    /// Apply `patch` to a reservation owned by the requester (or any, for admins).
    ///
    /// Status never changes unless the patch says so. A primary that moves,
    /// or a reservation made primary, must not overlap another primary. A
    /// backup that moves keeps its reference while that primary still
    /// overlaps, otherwise it follows whichever primary it now overlaps; if
    /// it overlaps none the old reference is left in place.
    pub async fn edit_reservation(
        &self,
        id: ReservationId,
        requester: &Requester,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        self.serialized("edit", async {
            let existing = self.repo.get(id).await?.ok_or(EngineError::NotFound(id))?;
            self.authorize_modify(&existing, requester, "edit this reservation")?;
            if patch.is_empty() {
                return Ok(existing);
            }

            let range = patch.merged_range(&existing.range);
            validate_range(&range)?;
            let purpose = patch.purpose.as_deref().map(validate_purpose).transpose()?;
            let notes = patch
                .notes
                .as_ref()
                .map(|n| validate_note(n.as_deref()))
                .transpose()?;
            let handover_note = patch
                .handover_note
                .as_ref()
                .map(|n| validate_note(n.as_deref()))
                .transpose()?;

            let mut next = existing.clone();
            next.range = range;
            if let Some(purpose) = purpose {
                next.purpose = purpose;
            }
            if let Some(notes) = notes {
                next.notes = notes;
            }
            if let Some(handover_note) = handover_note {
                next.handover_note = handover_note;
            }
            next.status = patch.status.unwrap_or(existing.status);

            let moved = next.range != existing.range;
            let restatused = next.status != existing.status;
            match next.status {
                ReservationStatus::Soft => next.conflicts_with_id = None,
                ReservationStatus::Primary => {
                    if moved || restatused {
                        let current = self.repo.list().await?;
                        if let Some(primary) = find_primary_conflict(&next.range, &current, Some(id))? {
                            return Err(EngineError::Conflict(primary.id));
                        }
                    }
                    next.conflicts_with_id = None;
                }
                ReservationStatus::Backup => {
                    if moved || restatused {
                        let current = self.repo.list().await?;
                        next.conflicts_with_id =
                            relink_backup(&next, &existing, &current, restatused)?;
                    }
                }
            }

            self.repo.update(next.clone()).await?;
            info!(
                "{} edited {} ({} {}, was {} {})",
                requester.id, id, next.range, next.status, existing.range, existing.status
            );
            Ok::<_, EngineError>(next)
        })
        .await
    }

    /// Remove a reservation. Backups that referenced it are left as they are;
    /// the primary-deleted policy is told about them.
    pub async fn delete_reservation(
        &self,
        id: ReservationId,
        requester: &Requester,
    ) -> Result<Reservation, EngineError> {
        self.serialized("delete", async {
            let existing = self.repo.get(id).await?.ok_or(EngineError::NotFound(id))?;
            self.authorize_modify(&existing, requester, "delete this reservation")?;

            let dependents: Vec<Reservation> = if existing.is_primary() {
                self.repo
                    .list()
                    .await?
                    .into_iter()
                    .filter(|r| {
                        r.status == ReservationStatus::Backup && r.conflicts_with_id == Some(id)
                    })
                    .collect()
            } else {
                Vec::new()
            };

            let deleted = self.repo.delete(id).await?;
            info!("{} deleted {} ({} {})", requester.id, id, deleted.range, deleted.status);

            if deleted.is_primary() {
                self.policy.on_primary_deleted(&deleted, &dependents);
            }
            Ok::<_, EngineError>(deleted)
        })
        .await
    }

    /// Hand a reservation to another, non-admin member. Admins only.
    pub async fn assign_reservation(
        &self,
        id: ReservationId,
        requester: &Requester,
        new_owner_id: &str,
    ) -> Result<Reservation, EngineError> {
        validate_user_id("new_owner_id", new_owner_id)?;

        self.serialized("assign", async {
            if !self.authorizer.can_assign(requester) {
                warn!("{} tried to assign {id} without admin rights", requester.id);
                return Err(EngineError::PermissionDenied {
                    requester: requester.id.clone(),
                    action: "assign reservations",
                });
            }
            let existing = self.repo.get(id).await?.ok_or(EngineError::NotFound(id))?;
            if existing.owner_id == new_owner_id {
                return Err(EngineError::InvalidTarget {
                    user: new_owner_id.to_string(),
                    reason: "already owns this reservation",
                });
            }
            let target = self
                .users
                .find_user(new_owner_id)
                .ok_or_else(|| EngineError::UserNotFound(new_owner_id.to_string()))?;
            if target.role == Role::Admin {
                return Err(EngineError::InvalidTarget {
                    user: target.id,
                    reason: "administrators cannot be given reservations",
                });
            }

            let mut next = existing.clone();
            next.owner_id = target.id;
            self.repo.update(next.clone()).await?;
            info!(
                "{} reassigned {id} from {} to {}",
                requester.id, existing.owner_id, next.owner_id
            );
            Ok::<_, EngineError>(next)
        })
        .await
    }

    fn authorize_modify(
        &self,
        reservation: &Reservation,
        requester: &Requester,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if self.authorizer.can_modify(reservation, requester) {
            return Ok(());
        }
        warn!(
            "{} denied: {action} ({} is owned by {})",
            requester.id, reservation.id, reservation.owner_id
        );
        Err(EngineError::PermissionDenied {
            requester: requester.id.clone(),
            action,
        })
    }
}

/// Pick the primary a moved or newly-backup reservation should point at.
fn relink_backup(
    next: &Reservation,
    existing: &Reservation,
    current: &[Reservation],
    becoming_backup: bool,
) -> Result<Option<ReservationId>, EngineError> {
    let still_overlapping = existing.conflicts_with_id.filter(|pid| {
        current
            .iter()
            .any(|r| r.id == *pid && r.is_primary() && r.range.overlaps(&next.range))
    });
    if still_overlapping.is_some() {
        return Ok(still_overlapping);
    }
    match find_primary_conflict(&next.range, current, Some(next.id))? {
        Some(primary) => Ok(Some(primary.id)),
        None if becoming_backup => Err(EngineError::Validation {
            field: "status",
            message: "a backup must overlap a primary reservation".into(),
        }),
        None => Ok(existing.conflicts_with_id),
    }
}
