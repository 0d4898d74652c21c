use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use ulid::Ulid;

use crate::clinic::{Booking, NewBooking, Patient, Slot, SlotIdAssignment};

use super::{BookingStore, BookingUpdate, PatientStore, SlotStore, StoreError};

/// Process-local store for tests. Every operation runs under one lock, and
/// commits apply the same conditions as the DynamoDB adapter.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    slots: BTreeMap<String, Slot>,
    bookings: BTreeMap<(String, String), Booking>,
    patients: HashMap<String, Patient>,
    injected_conflicts: usize,
}

impl State {
    fn take_injected_conflict(&mut self) -> bool {
        if self.injected_conflicts > 0 {
            self.injected_conflicts -= 1;
            return true;
        }
        false
    }
}

impl MemoryStore {
    pub fn with_slots(slots: Vec<Slot>) -> Self {
        let store = Self::default();
        {
            let mut state = store.lock();
            for slot in slots {
                state.slots.insert(slot.doc_id.clone(), slot);
            }
        }
        store
    }

    pub fn insert_patient(&self, patient: Patient) {
        self.lock().patients.insert(patient.id_number.clone(), patient);
    }

    /// The next `count` conditional writes fail with [`StoreError::Conflict`].
    pub fn inject_conflicts(&self, count: usize) {
        self.lock().injected_conflicts = count;
    }

    pub fn slot(&self, doc_id: &str) -> Option<Slot> {
        self.lock().slots.get(doc_id).cloned()
    }

    pub fn all_slots(&self) -> Vec<Slot> {
        self.lock().slots.values().cloned().collect()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.lock().bookings.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind, still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn find_slot(&self, slot_id: &str) -> Result<Option<Slot>, StoreError> {
        Ok(self
            .lock()
            .slots
            .values()
            .find(|slot| slot.slot_id.as_deref() == Some(slot_id))
            .cloned())
    }

    async fn list_slots(&self) -> Result<Vec<Slot>, StoreError> {
        Ok(self.all_slots())
    }

    async fn assign_slot_ids(&self, assignments: &[SlotIdAssignment]) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.take_injected_conflict() {
            return Err(StoreError::Conflict);
        }

        let unassigned = assignments.iter().all(|a| {
            state
                .slots
                .get(&a.doc_id)
                .is_some_and(|slot| slot.slot_id.is_none())
        });
        if !unassigned {
            return Err(StoreError::Conflict);
        }

        for assignment in assignments {
            if let Some(slot) = state.slots.get_mut(&assignment.doc_id) {
                slot.slot_id = Some(assignment.slot_id.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_booking(
        &self,
        id_number: &str,
        specialty: &str,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .lock()
            .bookings
            .get(&(id_number.to_string(), specialty.to_string()))
            .cloned())
    }

    async fn create_booking(&self, slot: &Slot, booking: NewBooking) -> Result<Booking, StoreError> {
        let mut state = self.lock();
        if state.take_injected_conflict() {
            return Err(StoreError::Conflict);
        }

        let key = (booking.id_number.clone(), booking.specialty.clone());
        if state.bookings.contains_key(&key) {
            return Err(StoreError::Conflict);
        }

        let current = state
            .slots
            .get_mut(&slot.doc_id)
            .ok_or(StoreError::Conflict)?;
        if current.booked != slot.booked || current.booked >= current.capacity {
            return Err(StoreError::Conflict);
        }
        current.booked += 1;

        let booking = booking.into_booking(Ulid::new().to_string(), Utc::now());
        state.bookings.insert(key, booking.clone());
        Ok(booking)
    }

    async fn bookings_by_specialty(&self, specialty: &str) -> Result<Vec<Booking>, StoreError> {
        Ok(self
            .bookings()
            .into_iter()
            .filter(|booking| booking.specialty == specialty)
            .collect())
    }

    async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self.bookings())
    }

    async fn update_booking(
        &self,
        id_number: &str,
        specialty: Option<&str>,
        update: BookingUpdate,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let booking = state
            .bookings
            .values_mut()
            .find(|b| b.id_number == id_number && specialty.map_or(true, |s| b.specialty == s));

        let Some(booking) = booking else {
            return Ok(false);
        };

        match update {
            BookingUpdate::Notes(notes) => booking.notes = notes,
            BookingUpdate::Prescription(prescription) => booking.prescription = prescription,
            BookingUpdate::Status(status) => booking.status = status,
        }
        Ok(true)
    }
}

#[async_trait]
impl PatientStore for MemoryStore {
    async fn get_patient(&self, id_number: &str) -> Result<Option<Patient>, StoreError> {
        Ok(self.lock().patients.get(id_number).cloned())
    }
}
