// ── Reservation lifecycle ───────────────────────────────────────

/// Counter: reservations created. Labels: status.
pub const RESERVATIONS_CREATED_TOTAL: &str = "cabinbook_reservations_created_total";

/// Counter: committed mutations. Labels: op.
pub const MUTATIONS_TOTAL: &str = "cabinbook_mutations_total";

/// Counter: rejected mutations. Labels: op, kind.
pub const MUTATIONS_REJECTED_TOTAL: &str = "cabinbook_mutations_rejected_total";

/// Histogram: time spent holding the mutation lock, in seconds. Labels: op.
pub const MUTATION_DURATION_SECONDS: &str = "cabinbook_mutation_duration_seconds";

/// Counter: overlapping primaries detected. Should stay at zero.
pub const INVARIANT_VIOLATIONS_TOTAL: &str = "cabinbook_invariant_violations_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "cabinbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "cabinbook_wal_flush_batch_size";

/// Gauge: resources with an open engine.
pub const RESOURCES_OPEN: &str = "cabinbook_resources_open";
