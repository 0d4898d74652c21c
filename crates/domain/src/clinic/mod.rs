/// Slot model and listing views
pub mod slot;

/// Booking model and outcomes
pub mod booking;

/// Patient model
pub mod patient;

/// Input DTOs
pub mod inputs;

/// Conflict retry policy
pub mod retry;

/// The booking transaction
pub mod service;

/// Slot identifier maintenance
pub mod slot_ids;

/// Wiring
pub mod setup;

pub use booking::{Booking, BookingOutcome, BookingStatus, NewBooking, RejectionReason};
pub use inputs::BookingRequest;
pub use patient::Patient;
pub use retry::RetryPolicy;
pub use service::SlotBookingService;
pub use setup::Clinic;
pub use slot::{slot_views, specialties_of, Slot, SlotIdAssignment, SlotView};
pub use slot_ids::{ensure_slot_ids, EnsuredSlots};
