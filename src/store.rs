//! In-memory store the engine depends on. Keeps every map behind one
//! struct so tests (and an eventual transactional backend) assemble the
//! engine without touching its internals.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::{
    MentorCalendar, MentorId, OccurrenceId, PackageId, Payment, PaymentId, RecurringPackage,
    SessionType, SessionTypeId,
};

pub type SharedCalendar = Arc<RwLock<MentorCalendar>>;

pub struct BookingStore {
    calendars: DashMap<MentorId, SharedCalendar>,
    /// Reverse lookup: occurrence id → owning mentor.
    occurrence_to_mentor: DashMap<OccurrenceId, MentorId>,
    session_types: DashMap<SessionTypeId, SessionType>,
    packages: DashMap<PackageId, RecurringPackage>,
    payments: DashMap<PaymentId, Payment>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            calendars: DashMap::new(),
            occurrence_to_mentor: DashMap::new(),
            session_types: DashMap::new(),
            packages: DashMap::new(),
            payments: DashMap::new(),
        }
    }

    // ── Calendars ────────────────────────────────────────────

    pub fn contains_calendar(&self, id: &MentorId) -> bool {
        self.calendars.contains_key(id)
    }

    pub fn calendar(&self, id: &MentorId) -> Option<SharedCalendar> {
        self.calendars.get(id).map(|e| e.value().clone())
    }

    pub fn insert_calendar(&self, id: MentorId, calendar: SharedCalendar) {
        self.calendars.insert(id, calendar);
    }

    pub fn mentor_ids(&self) -> Vec<MentorId> {
        self.calendars.iter().map(|e| *e.key()).collect()
    }

    // ── Occurrence index ─────────────────────────────────────

    pub fn mentor_for_occurrence(&self, id: &OccurrenceId) -> Option<MentorId> {
        self.occurrence_to_mentor.get(id).map(|e| *e.value())
    }

    pub fn index_occurrence(&self, id: OccurrenceId, mentor: MentorId) {
        self.occurrence_to_mentor.insert(id, mentor);
    }

    pub fn unindex_occurrence(&self, id: &OccurrenceId) {
        self.occurrence_to_mentor.remove(id);
    }

    // ── Session types ────────────────────────────────────────

    pub fn session_type(&self, id: &SessionTypeId) -> Option<SessionType> {
        self.session_types.get(id).map(|e| e.value().clone())
    }

    pub fn insert_session_type(&self, st: SessionType) {
        self.session_types.insert(st.id, st);
    }

    // ── Packages ─────────────────────────────────────────────

    pub fn package(&self, id: &PackageId) -> Option<RecurringPackage> {
        self.packages.get(id).map(|e| e.value().clone())
    }

    pub fn insert_package(&self, pkg: RecurringPackage) {
        self.packages.insert(pkg.id, pkg);
    }

    pub fn remove_package(&self, id: &PackageId) -> Option<RecurringPackage> {
        self.packages.remove(id).map(|(_, pkg)| pkg)
    }

    // ── Payments ─────────────────────────────────────────────

    pub fn payment(&self, id: &PaymentId) -> Option<Payment> {
        self.payments.get(id).map(|e| e.value().clone())
    }

    pub fn insert_payment(&self, payment: Payment) {
        self.payments.insert(payment.id, payment);
    }

    pub fn update_payment(&self, payment: Payment) {
        self.payments.insert(payment.id, payment);
    }

    /// The captured payment covering an occurrence, if any.
    pub fn payment_for_occurrence(&self, id: &OccurrenceId) -> Option<Payment> {
        self.payments
            .iter()
            .find(|e| e.value().occurrence_ids.contains(id))
            .map(|e| e.value().clone())
    }

    /// Every payment covering an occurrence. Group sessions have one per
    /// participant.
    pub fn payments_for_occurrence(&self, id: &OccurrenceId) -> Vec<Payment> {
        self.payments
            .iter()
            .filter(|e| e.value().occurrence_ids.contains(id))
            .map(|e| e.value().clone())
            .collect()
    }

}
