use std::{env, str::FromStr, time::Duration};

use crate::{clinic::RetryPolicy, store::Tables};

/// S3 SigV4 presigned URLs cannot outlive seven days.
pub const MAX_ATTACHMENT_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Runtime settings, read from the environment with defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub slots_table: String,
    pub bookings_table: String,
    pub patients_table: String,
    pub attachments_bucket: String,
    pub attachments_prefix: String,
    pub attachments_public_base_url: Option<String>,
    pub attachment_url_ttl: Duration,
    pub booking_max_attempts: u32,
    pub booking_retry_backoff: Duration,
    pub cors_allowed_origins: Vec<String>,
    pub max_request_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default.to_string())
        };

        let ttl_secs: u64 = number(&lookup, "ATTACHMENT_URL_TTL_SECS", MAX_ATTACHMENT_URL_TTL.as_secs());

        Self {
            slots_table: text("DYNAMODB_SLOTS_TABLE", "clinic-slots"),
            bookings_table: text("DYNAMODB_BOOKINGS_TABLE", "clinic-bookings"),
            patients_table: text("DYNAMODB_PATIENTS_TABLE", "clinic-patients"),
            attachments_bucket: text("ATTACHMENTS_BUCKET", "clinic-attachments"),
            attachments_prefix: text("ATTACHMENTS_PREFIX", "attachments"),
            attachments_public_base_url: lookup("ATTACHMENTS_PUBLIC_BASE_URL")
                .filter(|v| !v.trim().is_empty()),
            attachment_url_ttl: Duration::from_secs(ttl_secs).min(MAX_ATTACHMENT_URL_TTL),
            booking_max_attempts: number(&lookup, "BOOKING_MAX_ATTEMPTS", 5),
            booking_retry_backoff: Duration::from_millis(number(&lookup, "BOOKING_RETRY_BACKOFF_MS", 50)),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            max_request_bytes: number(&lookup, "MAX_REQUEST_BYTES", 6 * 1024 * 1024),
        }
    }

    pub fn tables(&self) -> Tables {
        Tables {
            slots: self.slots_table.clone(),
            bookings: self.bookings_table.clone(),
            patients: self.patients_table.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.booking_max_attempts, self.booking_retry_backoff)
    }
}

fn number<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
    }
}
