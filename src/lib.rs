//! mentorbook: booking and scheduling engine for a mentoring platform.
//!
//! The engine owns mentor calendars, resolves availability from weekly
//! rules and blackouts, expands recurring packages, prices bookings in
//! integer cents, and coordinates reservations against a payment gateway
//! so that no mentor slot is ever double-booked and no seat oversold.
//!
//! Calendars are the unit of concurrency: each sits behind its own lock,
//! requests for different mentors run in parallel, and every admission
//! decision for one mentor happens under that mentor's write lock.

pub mod engine;
pub mod gateway;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod pricing;
pub mod reaper;
pub mod recurrence;
pub mod store;

pub use engine::{ActorRole, BookingError, BookingResult, CancellationResult, Engine, JoinResult};
pub use gateway::{GatewayError, GatewayRef, MockGateway, PaymentGateway};
pub use model::{
    AvailabilityRule, BookingEvent, BookingKind, BookingRequest, Frequency, MentorCalendar, Ms,
    Occurrence, OccurrenceStatus, Payment, PaymentStatus, RecurringPackage, SessionType, Span,
};
pub use notify::NotifyHub;
pub use policy::BookingPolicy;
pub use pricing::Quote;
