use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{entity} not found")]
    NotFound { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Booking gave up after {attempts} conflicting attempts")]
    Contention { attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound { entity: entity.into() }
    }
}
