/// Error taxonomy for the rental transaction lifecycle.
///
/// The first five variants are expected, user-recoverable conditions and are
/// surfaced to callers verbatim. `Consistency` marks a failed post-condition
/// and is treated as fatal rather than user-recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("no authenticated principal")]
    Unauthenticated,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error(
        "application limit reached: {renter_open} open across all trips (max {global_limit}), \
         {trip_open} for this trip (max {per_trip_limit})"
    )]
    QuotaExceeded {
        trip_open: u32,
        renter_open: u32,
        per_trip_limit: u32,
        global_limit: u32,
    },
    #[error("consistency violation: {0}")]
    Consistency(String),
}

impl LifecycleError {
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::Unauthorized(detail.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_state(detail: impl Into<String>) -> Self {
        Self::InvalidState(detail.into())
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation(detail.into())
    }
}
