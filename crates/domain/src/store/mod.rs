//! Persistence seams for slots, bookings and patients.
//!
//! The booking transaction only relies on two properties of an implementation:
//! reads made through [`SlotStore::find_slot`] and [`BookingStore::find_booking`]
//! are strongly consistent, and [`BookingStore::create_booking`] commits the
//! counter increment and the booking record together, failing with
//! [`StoreError::Conflict`] when the slot moved since it was read or the
//! (idNumber, specialty) pair is already taken.

use async_trait::async_trait;
use thiserror::Error;

use crate::clinic::{Booking, BookingStatus, NewBooking, Patient, Slot, SlotIdAssignment};

/// DynamoDB adapter
pub mod dynamo;

/// In-memory adapter with the same commit semantics
pub mod memory;

pub use dynamo::{DynamoStore, Tables};
pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency failure; the caller may retry from a fresh read.
    #[error("Conflicting concurrent write")]
    Conflict,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// A single field change applied by staff to an existing booking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingUpdate {
    Notes(String),
    Prescription(String),
    Status(BookingStatus),
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Strongly consistent lookup by the lazily assigned `slotId`.
    async fn find_slot(&self, slot_id: &str) -> Result<Option<Slot>, StoreError>;

    /// Every slot, in ascending `docId` order.
    async fn list_slots(&self) -> Result<Vec<Slot>, StoreError>;

    /// Persists the assignments in batches. An assignment targeting a slot that
    /// already carries an id fails the batch with [`StoreError::Conflict`].
    async fn assign_slot_ids(&self, assignments: &[SlotIdAssignment]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_booking(
        &self,
        id_number: &str,
        specialty: &str,
    ) -> Result<Option<Booking>, StoreError>;

    /// Atomically increments `slot.booked` and records the booking. The store
    /// assigns the booking id and creation timestamp.
    async fn create_booking(&self, slot: &Slot, booking: NewBooking) -> Result<Booking, StoreError>;

    async fn bookings_by_specialty(&self, specialty: &str) -> Result<Vec<Booking>, StoreError>;

    async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError>;

    /// Applies `update` to the booking for (`id_number`, `specialty`), or to the
    /// patient's first booking when no specialty is given. Returns `false` when
    /// no such booking exists.
    async fn update_booking(
        &self,
        id_number: &str,
        specialty: Option<&str>,
        update: BookingUpdate,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn get_patient(&self, id_number: &str) -> Result<Option<Patient>, StoreError>;
}
