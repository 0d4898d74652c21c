use std::sync::Arc;

use crate::{
    blob::{BlobError, BlobStore, S3BlobStore},
    config::Settings,
    store::{BookingStore, DynamoStore, PatientStore, SlotStore},
};

use super::{RetryPolicy, SlotBookingService};

/// Store handles and the booking service, built once per process and shared
/// by every handler.
#[derive(Clone)]
pub struct Clinic {
    pub slots: Arc<dyn SlotStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub patients: Arc<dyn PatientStore>,
    pub booking_service: Arc<SlotBookingService>,
    pub retry: RetryPolicy,
}

impl Clinic {
    pub fn new<S>(store: Arc<S>, blobs: Arc<dyn BlobStore>, retry: RetryPolicy) -> Self
    where
        S: SlotStore + BookingStore + PatientStore + 'static,
    {
        let booking_service = SlotBookingService::new(store.clone(), store.clone(), blobs, retry);

        Self {
            slots: store.clone(),
            bookings: store.clone(),
            patients: store,
            booking_service: Arc::new(booking_service),
            retry,
        }
    }
}

pub fn init(
    dynamodb_client: aws_sdk_dynamodb::Client,
    s3_client: aws_sdk_s3::Client,
    settings: &Settings,
) -> Result<Clinic, BlobError> {
    let store = Arc::new(DynamoStore::new(dynamodb_client, settings.tables()));
    let blobs = Arc::new(S3BlobStore::new(s3_client, settings)?);

    Ok(Clinic::new(store, blobs, settings.retry_policy()))
}
