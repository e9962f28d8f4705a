use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// The primary reservation `candidate` would collide with, if any.
///
/// Only primaries take part; backups and soft reservations never block.
/// `exclude` skips the reservation being edited. When several primaries
/// overlap the candidate the earliest-starting one is returned, unless two
/// of them overlap each other, which is a broken store and reported as
/// `InvariantViolation`.
pub fn find_primary_conflict<'a>(
    candidate: &DateRange,
    reservations: &'a [Reservation],
    exclude: Option<ReservationId>,
) -> Result<Option<&'a Reservation>, EngineError> {
    let mut hits: Vec<&Reservation> = reservations
        .iter()
        .filter(|r| r.is_primary() && Some(r.id) != exclude && r.range.overlaps(candidate))
        .collect();
    hits.sort_by_key(|r| (r.range.from, r.id));

    if let Some(pair) = hits.windows(2).find(|w| w[0].range.overlaps(&w[1].range)) {
        return Err(EngineError::InvariantViolation(vec![pair[0].id, pair[1].id]));
    }
    Ok(hits.first().copied())
}

/// Every pair of overlapping primaries in `reservations`, as id lists.
pub(crate) fn overlapping_primaries(reservations: &[Reservation]) -> Vec<ReservationId> {
    let mut primaries: Vec<&Reservation> = reservations.iter().filter(|r| r.is_primary()).collect();
    primaries.sort_by_key(|r| (r.range.from, r.id));

    let mut offenders = Vec::new();
    // Sorted by start, so each range only needs checking against the
    // latest-ending range seen so far.
    let mut reach: Option<&Reservation> = None;
    for r in primaries {
        if let Some(prev) = reach {
            if prev.range.to >= r.range.from {
                if !offenders.contains(&prev.id) {
                    offenders.push(prev.id);
                }
                offenders.push(r.id);
            }
            if r.range.to > prev.range.to {
                reach = Some(r);
            }
        } else {
            reach = Some(r);
        }
    }
    offenders
}

pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    if range.from > range.to {
        return Err(EngineError::InvalidRange {
            from: range.from,
            to: range.to,
        });
    }
    if range.days() > MAX_RANGE_DAYS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// Trimmed purpose, or an error if nothing is left.
pub(crate) fn validate_purpose(purpose: &str) -> Result<String, EngineError> {
    let trimmed = purpose.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation {
            field: "purpose",
            message: "must not be empty".into(),
        });
    }
    if trimmed.chars().count() > MAX_PURPOSE_LEN {
        return Err(EngineError::LimitExceeded("purpose too long"));
    }
    Ok(trimmed.to_string())
}

/// Blank notes are stored as absent.
pub(crate) fn validate_note(note: Option<&str>) -> Result<Option<String>, EngineError> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if note.chars().count() > MAX_NOTE_LEN {
        return Err(EngineError::LimitExceeded("note too long"));
    }
    Ok(Some(note.to_string()))
}

pub(crate) fn validate_user_id(field: &'static str, id: &str) -> Result<(), EngineError> {
    if id.trim().is_empty() {
        return Err(EngineError::Validation {
            field,
            message: "must not be empty".into(),
        });
    }
    if id.len() > MAX_USER_ID_LEN {
        return Err(EngineError::LimitExceeded("user id too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn res(from: &str, to: &str, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            owner_id: "astrid".into(),
            range: DateRange::parse(from, to).unwrap(),
            purpose: "Stay".into(),
            notes: None,
            handover_note: None,
            status,
            conflicts_with_id: None,
        }
    }

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::parse(from, to).unwrap()
    }

    #[test]
    fn no_reservations_no_conflict() {
        let hit = find_primary_conflict(&range("2024-07-01", "2024-07-05"), &[], None).unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn overlapping_primary_is_found() {
        let p = res("2024-07-01", "2024-07-05", ReservationStatus::Primary);
        let all = vec![p.clone()];
        let hit = find_primary_conflict(&range("2024-07-03", "2024-07-10"), &all, None).unwrap();
        assert_eq!(hit.map(|r| r.id), Some(p.id));
    }

    #[test]
    fn shared_endpoint_day_conflicts() {
        let p = res("2024-07-01", "2024-07-05", ReservationStatus::Primary);
        let all = vec![p.clone()];
        assert!(find_primary_conflict(&range("2024-07-05", "2024-07-06"), &all, None)
            .unwrap()
            .is_some());
        assert!(find_primary_conflict(&range("2024-07-06", "2024-07-08"), &all, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn backups_and_soft_never_block() {
        let all = vec![
            res("2024-07-01", "2024-07-05", ReservationStatus::Backup),
            res("2024-07-01", "2024-07-05", ReservationStatus::Soft),
        ];
        let hit = find_primary_conflict(&range("2024-07-01", "2024-07-05"), &all, None).unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn excluded_reservation_is_skipped() {
        let p = res("2024-07-01", "2024-07-05", ReservationStatus::Primary);
        let all = vec![p.clone()];
        let hit = find_primary_conflict(&range("2024-07-02", "2024-07-04"), &all, Some(p.id)).unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn spanning_candidate_returns_earliest_primary() {
        let late = res("2024-07-10", "2024-07-12", ReservationStatus::Primary);
        let early = res("2024-07-01", "2024-07-03", ReservationStatus::Primary);
        let all = vec![late, early.clone()];
        let hit = find_primary_conflict(&range("2024-06-28", "2024-07-15"), &all, None).unwrap();
        assert_eq!(hit.map(|r| r.id), Some(early.id));
    }

    #[test]
    fn overlapping_primaries_are_an_invariant_violation() {
        let a = res("2024-07-01", "2024-07-05", ReservationStatus::Primary);
        let b = res("2024-07-04", "2024-07-08", ReservationStatus::Primary);
        let all = vec![a.clone(), b.clone()];
        let err = find_primary_conflict(&range("2024-07-04", "2024-07-04"), &all, None).unwrap_err();
        match err {
            EngineError::InvariantViolation(ids) => {
                assert!(ids.contains(&a.id) && ids.contains(&b.id));
            }
            other => panic!("expected invariant violation, got {other:?}"),
        }
    }

    #[test]
    fn audit_finds_nested_overlap() {
        let long = res("2024-07-01", "2024-07-31", ReservationStatus::Primary);
        let short = res("2024-07-05", "2024-07-06", ReservationStatus::Primary);
        let later = res("2024-07-20", "2024-07-21", ReservationStatus::Primary);
        let clean = res("2024-08-01", "2024-08-02", ReservationStatus::Primary);
        let all = vec![long.clone(), short.clone(), later.clone(), clean.clone()];
        let offenders = overlapping_primaries(&all);
        assert!(offenders.contains(&long.id));
        assert!(offenders.contains(&short.id));
        assert!(offenders.contains(&later.id));
        assert!(!offenders.contains(&clean.id));
    }

    #[test]
    fn audit_clean_set() {
        let all = vec![
            res("2024-07-01", "2024-07-05", ReservationStatus::Primary),
            res("2024-07-06", "2024-07-08", ReservationStatus::Primary),
            res("2024-07-01", "2024-07-08", ReservationStatus::Backup),
        ];
        assert!(overlapping_primaries(&all).is_empty());
    }

    #[test]
    fn purpose_and_notes_validation() {
        assert_eq!(validate_purpose("  Easter  ").unwrap(), "Easter");
        assert!(matches!(
            validate_purpose("   "),
            Err(EngineError::Validation { field: "purpose", .. })
        ));
        assert!(matches!(
            validate_purpose(&"x".repeat(MAX_PURPOSE_LEN + 1)),
            Err(EngineError::LimitExceeded(_))
        ));
        assert_eq!(validate_note(Some("  ")).unwrap(), None);
        assert_eq!(validate_note(None).unwrap(), None);
        assert_eq!(validate_note(Some(" keys under the mat ")).unwrap().as_deref(), Some("keys under the mat"));
    }

    #[test]
    fn range_length_limit() {
        assert!(validate_range(&range("2024-01-01", "2024-12-31")).is_ok()); // 366 days, leap year
        assert!(matches!(
            validate_range(&range("2024-01-01", "2025-01-01")),
            Err(EngineError::LimitExceeded(_))
        ));
    }
}
