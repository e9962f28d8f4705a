/// Maximum length of a reservation purpose, in chars.
pub const MAX_PURPOSE_LEN: usize = 200;

/// Maximum length of notes and handover notes, in chars.
pub const MAX_NOTE_LEN: usize = 4000;

/// Longest bookable stay, in calendar days.
pub const MAX_RANGE_DAYS: i64 = 366;

pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 10_000;

pub const MAX_USER_ID_LEN: usize = 64;

pub const MAX_RESOURCE_NAME_LEN: usize = 128;

pub const MAX_RESOURCES: usize = 64;
