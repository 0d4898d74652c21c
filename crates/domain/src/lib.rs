//! Clinic Booking Domain

/// Slots, bookings, patients and the booking transaction
pub mod clinic;

/// Persistence seams and adapters
pub mod store;

/// Attachment storage
pub mod blob;

/// Environment settings
pub mod config;

/// Domain errors
pub mod errors;

pub use config::Settings;
pub use errors::Error;
