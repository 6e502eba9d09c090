use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type inside the engine core.
pub type Ms = i64;

pub type MentorId = Ulid;
pub type LearnerId = Ulid;
pub type SessionTypeId = Ulid;
pub type OccurrenceId = Ulid;
pub type PackageId = Ulid;
pub type PaymentId = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// How a recurring package steps from one occurrence to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
    /// Same day-of-month next month; clamped to the last day of shorter months.
    Monthly,
}

/// The booking option combinations, closed so pricing and reservation
/// branch exhaustively instead of checking flag pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingKind {
    Plain,
    Group { size: u32 },
    Recurring { frequency: Frequency, count: u32 },
    GroupRecurring { size: u32, frequency: Frequency, count: u32 },
}

impl BookingKind {
    pub fn group_size(&self) -> Option<u32> {
        match self {
            BookingKind::Group { size } | BookingKind::GroupRecurring { size, .. } => Some(*size),
            _ => None,
        }
    }

    pub fn recurrence(&self) -> Option<(Frequency, u32)> {
        match self {
            BookingKind::Recurring { frequency, count }
            | BookingKind::GroupRecurring { frequency, count, .. } => Some((*frequency, *count)),
            _ => None,
        }
    }

    pub fn occurrence_count(&self) -> u32 {
        self.recurrence().map_or(1, |(_, count)| count)
    }
}

/// One weekly availability rule, interpreted in the calendar's timezone.
/// Minutes are minutes-of-day local wall time: 9:00 = 540.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Ulid,
    pub weekday: Weekday,
    pub start_minute: u16,
    pub end_minute: u16,
    pub active: bool,
}

/// What a mentor offers: a bookable session shape with a fixed price.
/// Immutable once a confirmed occurrence references it — the occurrence
/// carries its own copy of the charged price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionType {
    pub id: SessionTypeId,
    pub mentor_id: MentorId,
    pub duration_minutes: u32,
    /// Base price per occurrence in minor currency units (cents).
    pub base_price_cents: i64,
    pub supports_group: bool,
    /// Meaningful only when `supports_group`.
    pub max_group_capacity: u32,
}

/// Booking lifecycle status. `Completed`, `Cancelled`, and `NoShow` are
/// terminal; terminal occurrences are retained for audit but ignored by
/// conflict and availability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OccurrenceStatus {
    PendingPayment { hold_expires_at: Ms },
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl OccurrenceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OccurrenceStatus::Completed | OccurrenceStatus::Cancelled | OccurrenceStatus::NoShow
        )
    }

    /// Whether this occurrence still holds its calendar slot at `now`.
    /// A pending occurrence whose hold expired no longer blocks anything.
    pub fn is_active(&self, now: Ms) -> bool {
        match self {
            OccurrenceStatus::PendingPayment { hold_expires_at } => *hold_expires_at > now,
            OccurrenceStatus::Confirmed => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OccurrenceStatus::PendingPayment { .. } => "pending_payment",
            OccurrenceStatus::Confirmed => "confirmed",
            OccurrenceStatus::Completed => "completed",
            OccurrenceStatus::Cancelled => "cancelled",
            OccurrenceStatus::NoShow => "no_show",
        }
    }
}

/// One concrete reserved block of mentor time. Capacity 1 for 1:1 sessions;
/// capacity > 1 makes this a group session whose fill count is
/// `participants.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub mentor_id: MentorId,
    pub session_type_id: SessionTypeId,
    pub span: Span,
    pub capacity: u32,
    pub participants: Vec<LearnerId>,
    pub status: OccurrenceStatus,
    /// Price charged per participant, fixed at reservation time.
    pub price_per_participant_cents: i64,
    pub package_id: Option<PackageId>,
    pub meeting_link: Option<String>,
}

impl Occurrence {
    pub fn is_group(&self) -> bool {
        self.capacity > 1
    }

    pub fn remaining_seats(&self) -> u32 {
        self.capacity.saturating_sub(self.participants.len() as u32)
    }
}

/// A learner-owned grouping of occurrences generated from one recurring
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringPackage {
    pub id: PackageId,
    pub learner_id: LearnerId,
    pub mentor_id: MentorId,
    pub occurrence_ids: Vec<OccurrenceId>,
    pub frequency: Frequency,
    pub count: u32,
    /// Recurring discount applied, in basis points.
    pub discount_bps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Captured,
    Failed,
    Refunded,
}

/// One charge record per booking transaction — a single occurrence or a
/// whole package charged together. Immutable once captured, except the
/// refund transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub learner_id: LearnerId,
    pub amount_cents: i64,
    pub platform_fee_cents: i64,
    pub currency: String,
    pub gateway_ref: Option<String>,
    pub status: PaymentStatus,
    pub occurrence_ids: Vec<OccurrenceId>,
    pub refunded_cents: i64,
}

/// Transient booking intent. Never persisted after processing completes
/// or fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub learner_id: LearnerId,
    pub mentor_id: MentorId,
    pub session_type_id: SessionTypeId,
    pub anchor_start: Ms,
    pub kind: BookingKind,
    pub notes: Option<String>,
    pub payment_method_ref: String,
}

/// A mentor's calendar: the shared mutable resource. Rules and blackouts
/// shape availability; occurrences (sorted by `span.start`) consume it.
#[derive(Debug, Clone)]
pub struct MentorCalendar {
    pub mentor_id: MentorId,
    pub timezone: Tz,
    pub rules: Vec<AvailabilityRule>,
    pub blackouts: Vec<Span>,
    pub occurrences: Vec<Occurrence>,
}

impl MentorCalendar {
    pub fn new(mentor_id: MentorId, timezone: Tz) -> Self {
        Self {
            mentor_id,
            timezone,
            rules: Vec::new(),
            blackouts: Vec::new(),
            occurrences: Vec::new(),
        }
    }

    /// Insert an occurrence maintaining sort order by span.start.
    pub fn insert_occurrence(&mut self, occ: Occurrence) {
        let pos = self
            .occurrences
            .binary_search_by_key(&occ.span.start, |o| o.span.start)
            .unwrap_or_else(|e| e);
        self.occurrences.insert(pos, occ);
    }

    pub fn occurrence(&self, id: OccurrenceId) -> Option<&Occurrence> {
        self.occurrences.iter().find(|o| o.id == id)
    }

    pub fn occurrence_mut(&mut self, id: OccurrenceId) -> Option<&mut Occurrence> {
        self.occurrences.iter_mut().find(|o| o.id == id)
    }

    /// Remove an occurrence outright. Only the reservation rollback path
    /// uses this — every other exit goes through a lifecycle transition.
    pub fn remove_occurrence(&mut self, id: OccurrenceId) -> Option<Occurrence> {
        if let Some(pos) = self.occurrences.iter().position(|o| o.id == id) {
            Some(self.occurrences.remove(pos))
        } else {
            None
        }
    }

    /// Occurrences whose span overlaps the query window. Binary search
    /// skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Occurrence> {
        let right_bound = self
            .occurrences
            .partition_point(|o| o.span.start < query.end);
        self.occurrences[..right_bound]
            .iter()
            .filter(move |o| o.span.end > query.start)
    }
}

/// Lifecycle events published to the notification hub, keyed by mentor.
/// Fire-and-forget: the engine never blocks on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    OccurrencesReserved {
        occurrence_ids: Vec<OccurrenceId>,
        learner_id: LearnerId,
    },
    BookingConfirmed {
        occurrence_id: OccurrenceId,
        learner_id: LearnerId,
        span: Span,
    },
    BookingCancelled {
        occurrence_id: OccurrenceId,
        refund_cents: i64,
    },
    BookingCompleted {
        occurrence_id: OccurrenceId,
    },
    NoShowRecorded {
        occurrence_id: OccurrenceId,
    },
    ParticipantJoined {
        occurrence_id: OccurrenceId,
        learner_id: LearnerId,
        remaining_seats: u32,
    },
    ParticipantLeft {
        occurrence_id: OccurrenceId,
        learner_id: LearnerId,
        remaining_seats: u32,
    },
    HoldExpired {
        occurrence_id: OccurrenceId,
    },
    RefundIssued {
        payment_id: PaymentId,
        amount_cents: i64,
    },
}

impl BookingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BookingEvent::OccurrencesReserved { .. } => "occurrences_reserved",
            BookingEvent::BookingConfirmed { .. } => "booking_confirmed",
            BookingEvent::BookingCancelled { .. } => "booking_cancelled",
            BookingEvent::BookingCompleted { .. } => "booking_completed",
            BookingEvent::NoShowRecorded { .. } => "no_show_recorded",
            BookingEvent::ParticipantJoined { .. } => "participant_joined",
            BookingEvent::ParticipantLeft { .. } => "participant_left",
            BookingEvent::HoldExpired { .. } => "hold_expired",
            BookingEvent::RefundIssued { .. } => "refund_issued",
        }
    }

    /// JSON payload for external consumers.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
