use ulid::Ulid;

use crate::model::Ms;

/// Every failure the engine surfaces. All are per-request and recoverable;
/// nothing here is fatal at the process level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Malformed request; rejected before any side effect.
    Validation(&'static str),
    NotFound(Ulid),
    /// The requested window does not fit the mentor's open hours.
    NoAvailability { start: Ms, end: Ms },
    /// A 1:1 window lost the race to an existing reservation.
    SlotConflict { occurrence_id: Ulid },
    /// Group session has no remaining seats.
    CapacityExceeded { capacity: u32 },
    /// Group session already started; joins are closed.
    JoinWindowClosed { occurrence_id: Ulid },
    /// One occurrence of a recurring package could not be admitted; the
    /// whole attempt was rolled back. Carries the first failing step.
    PartialRecurrenceConflict { index: usize, start: Ms },
    /// Gateway declined or timed out; the reservation was released.
    PaymentFailed(String),
    /// Lifecycle transition not permitted from the current state.
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    LimitExceeded(&'static str),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::Validation(msg) => write!(f, "invalid request: {msg}"),
            BookingError::NotFound(id) => write!(f, "not found: {id}"),
            BookingError::NoAvailability { start, end } => {
                write!(f, "no availability for window [{start}, {end})")
            }
            BookingError::SlotConflict { occurrence_id } => {
                write!(f, "slot already reserved by occurrence {occurrence_id}")
            }
            BookingError::CapacityExceeded { capacity } => {
                write!(f, "group session full: capacity {capacity} reached")
            }
            BookingError::JoinWindowClosed { occurrence_id } => {
                write!(f, "group session {occurrence_id} already started")
            }
            BookingError::PartialRecurrenceConflict { index, start } => {
                write!(
                    f,
                    "recurring package rolled back: occurrence {index} at {start} conflicts"
                )
            }
            BookingError::PaymentFailed(reason) => write!(f, "payment failed: {reason}"),
            BookingError::InvalidTransition { from, to } => {
                write!(f, "invalid transition: {from} -> {to}")
            }
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for BookingError {}
