//! Coordinator settings.

use super::bracket::Seeding;
use std::time::Duration;

/// Days a finished tournament is kept before cleanup removes it
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Tuning for the tournament coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// How round-0 slots are assigned
    pub seeding: Seeding,

    /// Upper bound on every ledger and store call
    pub external_timeout: Duration,

    /// Queued requests per tournament actor
    pub inbox_capacity: usize,

    /// How long finished tournaments are kept
    pub retention: chrono::Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            seeding: Seeding::Shuffled,
            external_timeout: Duration::from_secs(5),
            inbox_capacity: 64,
            retention: chrono::Duration::days(DEFAULT_RETENTION_DAYS),
        }
    }
}
