use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clinical status of a booking
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub enum BookingStatus {
    /// Booked, not yet seen by staff
    #[default]
    Pending,
    /// Patient has been seen
    Checked,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Checked => "Checked",
        }
    }
}

/// A patient's reservation against a slot
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub booking_id: String,
    pub id_number: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub name: String,
    pub specialty: String,
    pub slot_id: String,
    pub slot_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Object key of an uploaded attachment; `file_url` is re-signed from it on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_key: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub prescription: String,
    #[serde(default)]
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

/// Booking fields decided by the booking transaction, before the store
/// assigns an id and a creation timestamp.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewBooking {
    pub id_number: String,
    pub phone: String,
    pub name: String,
    pub specialty: String,
    pub slot_id: String,
    pub slot_label: String,
    pub file_url: Option<String>,
    pub file_key: Option<String>,
    pub notes: String,
}

impl NewBooking {
    pub fn into_booking(self, booking_id: String, created_at: DateTime<Utc>) -> Booking {
        Booking {
            booking_id,
            id_number: self.id_number,
            phone: self.phone,
            name: self.name,
            specialty: self.specialty,
            slot_id: self.slot_id,
            slot_label: self.slot_label,
            file_url: self.file_url,
            file_key: self.file_key,
            notes: self.notes,
            prescription: String::new(),
            status: BookingStatus::Pending,
            created_at,
        }
    }
}

/// Why a booking attempt was turned down. These are normal outcomes, not errors.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum RejectionReason {
    SlotFull,
    DuplicateBooking,
}

impl RejectionReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectionReason::SlotFull => "Slot already full.",
            RejectionReason::DuplicateBooking => "You already booked a slot for this specialty.",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BookingOutcome {
    Booked {
        slot_label: String,
        file_url: Option<String>,
    },
    Rejected {
        reason: RejectionReason,
    },
}
