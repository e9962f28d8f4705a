use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

pub type ReservationId = Ulid;

/// Household member handle.
pub type UserId = String;

/// Inclusive calendar-day interval `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, EngineError> {
        if from > to {
            return Err(EngineError::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// Parse two `YYYY-MM-DD` dates.
    pub fn parse(from: &str, to: &str) -> Result<Self, EngineError> {
        let from = parse_day(from)?;
        let to = parse_day(to)?;
        Self::new(from, to)
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    /// Both endpoints are inclusive, so ranges sharing an endpoint day overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.from <= other.to && self.to >= other.from
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.from && day <= self.to
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn nights(&self) -> i64 {
        self.days() - 1
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

fn parse_day(input: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::MalformedDate(input.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Authoritative occupant. Never overlaps another primary.
    Primary,
    /// Queued behind a specific primary it overlaps.
    Backup,
    /// Tentative interest. Invisible to primary conflict detection.
    Soft,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Primary => "primary",
            ReservationStatus::Backup => "backup",
            ReservationStatus::Soft => "soft",
        }
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(ReservationStatus::Primary),
            "backup" => Ok(ReservationStatus::Backup),
            "soft" => Ok(ReservationStatus::Soft),
            other => Err(EngineError::Validation {
                field: "status",
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub owner_id: UserId,
    pub range: DateRange,
    pub purpose: String,
    pub notes: Option<String>,
    /// Left for whoever occupies the cabin next.
    pub handover_note: Option<String>,
    pub status: ReservationStatus,
    /// Set only on backups: the primary this reservation queued behind.
    pub conflicts_with_id: Option<ReservationId>,
}

impl Reservation {
    pub fn is_primary(&self) -> bool {
        self.status == ReservationStatus::Primary
    }
}

/// What a requester asked for when booking. Status is decided by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub range: DateRange,
    pub purpose: String,
    pub notes: Option<String>,
    pub handover_note: Option<String>,
    pub soft: bool,
}

impl BookingRequest {
    pub fn new(range: DateRange, purpose: impl Into<String>) -> Self {
        Self {
            range,
            purpose: purpose.into(),
            notes: None,
            handover_note: None,
            soft: false,
        }
    }

    pub fn soft(mut self) -> Self {
        self.soft = true;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_handover_note(mut self, note: impl Into<String>) -> Self {
        self.handover_note = Some(note.into());
        self
    }
}

/// Partial edit. `None` leaves a field untouched; for the optional text
/// fields `Some(None)` clears them.
///
/// `from` and `to` move a single end of the stay and win over `range`.
/// They are merged with the stored range under the mutation lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub range: Option<DateRange>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub purpose: Option<String>,
    pub notes: Option<Option<String>>,
    pub handover_note: Option<Option<String>>,
    pub status: Option<ReservationStatus>,
}

impl ReservationPatch {
    /// The range after applying this patch to `current`. Not validated.
    pub fn merged_range(&self, current: &DateRange) -> DateRange {
        let base = self.range.unwrap_or(*current);
        DateRange {
            from: self.from.unwrap_or(base.from),
            to: self.to.unwrap_or(base.to),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_none()
            && self.from.is_none()
            && self.to.is_none()
            && self.purpose.is_none()
            && self.notes.is_none()
            && self.handover_note.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
}

/// The identity an operation runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub role: Role,
}

impl Requester {
    pub fn member(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Member,
        }
    }

    pub fn admin(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Requester {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            role: user.role,
        }
    }
}

/// Write-ahead log record format. Flat: each record carries the full row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated(Reservation),
    ReservationUpdated(Reservation),
    ReservationDeleted { id: ReservationId },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handover {
    /// The reservation that left the note.
    pub from_reservation: ReservationId,
    pub from_owner: UserId,
    pub left_on: NaiveDate,
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn range_basics() {
        let r = DateRange::parse("2024-07-01", "2024-07-05").unwrap();
        assert_eq!(r.days(), 5);
        assert_eq!(r.nights(), 4);
        assert!(r.contains(day("2024-07-01")));
        assert!(r.contains(day("2024-07-05"))); // inclusive end
        assert!(!r.contains(day("2024-07-06")));
        assert_eq!(r.to_string(), "2024-07-01..2024-07-05");
    }

    #[test]
    fn single_day_range() {
        let r = DateRange::single(day("2024-02-29"));
        assert_eq!(r.days(), 1);
        assert_eq!(r.nights(), 0);
    }

    #[test]
    fn range_overlap_shares_endpoint() {
        let a = DateRange::parse("2024-07-01", "2024-07-05").unwrap();
        let b = DateRange::parse("2024-07-05", "2024-07-10").unwrap();
        let c = DateRange::parse("2024-07-06", "2024-07-10").unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent days, no shared day
    }

    #[test]
    fn range_overlap_containment() {
        let outer = DateRange::parse("2024-01-01", "2024-12-31").unwrap();
        let inner = DateRange::parse("2024-06-01", "2024-06-02").unwrap();
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn inverted_range_rejected() {
        let err = DateRange::parse("2024-07-05", "2024-07-01").unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange { .. }));
    }

    #[test]
    fn malformed_dates_rejected() {
        for bad in ["2024-02-30", "07/01/2024", "", "2024-13-01"] {
            let err = DateRange::parse(bad, "2024-07-01").unwrap_err();
            assert!(matches!(err, EngineError::MalformedDate(_)), "{bad}");
        }
    }

    #[test]
    fn status_parsing() {
        assert_eq!("Primary".parse::<ReservationStatus>().unwrap(), ReservationStatus::Primary);
        assert_eq!(" soft ".parse::<ReservationStatus>().unwrap(), ReservationStatus::Soft);
        assert!(matches!(
            "pending".parse::<ReservationStatus>(),
            Err(EngineError::Validation { field: "status", .. })
        ));
    }

    #[test]
    fn patch_emptiness() {
        assert!(ReservationPatch::default().is_empty());
        let p = ReservationPatch {
            notes: Some(None),
            ..Default::default()
        };
        assert!(!p.is_empty());
    }

    #[test]
    fn patch_endpoint_merges_with_current_range() {
        let current = DateRange::parse("2024-07-01", "2024-07-05").unwrap();

        let later_end = ReservationPatch {
            to: Some(day("2024-07-09")),
            ..Default::default()
        };
        assert!(!later_end.is_empty());
        assert_eq!(
            later_end.merged_range(&current),
            DateRange::parse("2024-07-01", "2024-07-09").unwrap()
        );

        let both = ReservationPatch {
            range: Some(DateRange::parse("2024-08-01", "2024-08-03").unwrap()),
            from: Some(day("2024-07-30")),
            ..Default::default()
        };
        assert_eq!(
            both.merged_range(&current),
            DateRange::parse("2024-07-30", "2024-08-03").unwrap()
        );
        assert_eq!(ReservationPatch::default().merged_range(&current), current);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCreated(Reservation {
            id: Ulid::new(),
            owner_id: "astrid".into(),
            range: DateRange::parse("2024-07-01", "2024-07-05").unwrap(),
            purpose: "Summer week".into(),
            notes: None,
            handover_note: Some("Firewood is low".into()),
            status: ReservationStatus::Backup,
            conflicts_with_id: Some(Ulid::new()),
        });
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn users_deserialize_from_json() {
        let users: Vec<User> = serde_json::from_str(
            r#"[{"id":"astrid","name":"Astrid","role":"admin"},{"id":"bo","role":"member"}]"#,
        )
        .unwrap();
        assert_eq!(users[0].role, Role::Admin);
        assert_eq!(users[1].name, None);
        assert!(Requester::from(&users[0]).is_admin());
    }
}
