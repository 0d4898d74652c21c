use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    blob::{BlobStore, StoredAttachment},
    errors::Error,
    store::{BookingStore, SlotStore, StoreError},
};

use super::{Booking, BookingOutcome, BookingRequest, NewBooking, RejectionReason, RetryPolicy};

/// Owns the slot-booking transaction.
///
/// A booking is committed by [`BookingStore::create_booking`], which increments
/// the slot counter and writes the booking as one conditional unit. The checks
/// made here against the snapshot only decide between a rejection and an
/// attempt to commit; the commit itself re-verifies capacity and uniqueness, and
/// a failed commit sends the whole attempt back to a fresh read.
pub struct SlotBookingService {
    slots: Arc<dyn SlotStore>,
    bookings: Arc<dyn BookingStore>,
    blobs: Arc<dyn BlobStore>,
    retry: RetryPolicy,
}

/// Upload state carried across retries so an attachment is sent at most once.
enum Upload {
    Pending,
    Done(Option<StoredAttachment>),
}

impl SlotBookingService {
    pub fn new(
        slots: Arc<dyn SlotStore>,
        bookings: Arc<dyn BookingStore>,
        blobs: Arc<dyn BlobStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            slots,
            bookings,
            blobs,
            retry,
        }
    }

    pub async fn book_slot(&self, request: BookingRequest) -> Result<BookingOutcome, Error> {
        let mut upload = match request.attachment {
            Some(_) => Upload::Pending,
            None => Upload::Done(None),
        };

        for attempt in self.retry.attempts() {
            match self.attempt(&request, &mut upload).await {
                Err(Error::Store(StoreError::Conflict)) => {
                    warn!(
                        "Booking conflict on slot {} (attempt {}/{})",
                        request.slot_id, attempt, self.retry.max_attempts
                    );
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    }
                }
                outcome => return outcome,
            }
        }

        Err(Error::Contention {
            attempts: self.retry.max_attempts.max(1),
        })
    }

    async fn attempt(
        &self,
        request: &BookingRequest,
        upload: &mut Upload,
    ) -> Result<BookingOutcome, Error> {
        let slot = self
            .slots
            .find_slot(&request.slot_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Slot {}", request.slot_id)))?;

        // A patient re-submitting for a full slot hears about their booking,
        // not about the capacity.
        if self
            .bookings
            .find_booking(&request.id_number, &request.specialty)
            .await?
            .is_some()
        {
            return Ok(BookingOutcome::Rejected {
                reason: RejectionReason::DuplicateBooking,
            });
        }

        if slot.available() <= 0 {
            return Ok(BookingOutcome::Rejected {
                reason: RejectionReason::SlotFull,
            });
        }

        if matches!(upload, Upload::Pending) {
            *upload = Upload::Done(self.upload_attachment(request).await);
        }
        let (file_url, file_key) = match upload {
            Upload::Done(Some(stored)) => (Some(stored.url.clone()), Some(stored.key.clone())),
            Upload::Done(None) | Upload::Pending => (request.file_url.clone(), None),
        };

        let slot_label = slot.booking_label();
        let booking = NewBooking {
            id_number: request.id_number.clone(),
            phone: request.phone.clone(),
            name: request.name.clone(),
            specialty: request.specialty.clone(),
            slot_id: request.slot_id.clone(),
            slot_label: slot_label.clone(),
            file_url: file_url.clone(),
            file_key,
            notes: request.notes.clone(),
        };

        let booking = self.bookings.create_booking(&slot, booking).await?;
        info!(
            "Booked {} for {} ({}) on slot {}",
            booking.booking_id, booking.id_number, booking.specialty, booking.slot_id
        );

        Ok(BookingOutcome::Booked {
            slot_label,
            file_url,
        })
    }

    /// Re-signs `file_url` for bookings whose attachment this service stored.
    /// A booking keeps its stored URL when signing fails.
    pub async fn refresh_file_urls(&self, bookings: &mut [Booking]) {
        for booking in bookings.iter_mut() {
            let Some(key) = booking.file_key.as_deref() else {
                continue;
            };
            match self.blobs.download_url(key).await {
                Ok(url) => booking.file_url = Some(url),
                Err(err) => warn!(
                    "Could not refresh attachment URL for booking {}: {}",
                    booking.booking_id, err
                ),
            }
        }
    }

    async fn upload_attachment(&self, request: &BookingRequest) -> Option<StoredAttachment> {
        let attachment = request.attachment.as_ref()?;
        match self.blobs.upload(attachment).await {
            Ok(stored) => Some(stored),
            Err(err) => {
                warn!(
                    "Attachment {} for {} not stored, booking without it: {}",
                    attachment.filename, request.id_number, err
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        blob::{Attachment, BlobError, MockBlobStore, StoredAttachment},
        clinic::{BookingStatus, Slot},
        store::MemoryStore,
    };
    use pretty_assertions::assert_eq;

    fn slot(slot_id: &str, capacity: u32) -> Slot {
        Slot {
            doc_id: format!("doc-{slot_id}"),
            slot_id: Some(slot_id.to_string()),
            specialty: "Cardio".to_string(),
            date: "2025-10-06".to_string(),
            time_range: "09:00-10:00".to_string(),
            capacity,
            booked: 0,
        }
    }

    fn request(slot_id: &str, id_number: &str) -> BookingRequest {
        BookingRequest {
            slot_id: slot_id.to_string(),
            id_number: id_number.to_string(),
            specialty: "Cardio".to_string(),
            phone: "0400 000 000".to_string(),
            name: "Amal".to_string(),
            notes: String::new(),
            file_url: None,
            attachment: None,
        }
    }

    fn attachment() -> Attachment {
        Attachment {
            bytes: b"scan".to_vec(),
            mime_type: "image/png".to_string(),
            filename: "scan.png".to_string(),
        }
    }

    fn service(store: &Arc<MemoryStore>, blobs: MockBlobStore, max_attempts: u32) -> SlotBookingService {
        SlotBookingService::new(
            store.clone(),
            store.clone(),
            Arc::new(blobs),
            RetryPolicy::new(max_attempts, Duration::ZERO),
        )
    }

    fn booked(label: &str, file_url: Option<&str>) -> BookingOutcome {
        BookingOutcome::Booked {
            slot_label: label.to_string(),
            file_url: file_url.map(str::to_string),
        }
    }

    fn rejected(reason: RejectionReason) -> BookingOutcome {
        BookingOutcome::Rejected { reason }
    }

    #[tokio::test]
    async fn books_then_rejects_duplicate_then_full() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 1)]));
        let service = service(&store, MockBlobStore::new(), 3);

        let first = service.book_slot(request("S1", "123")).await.unwrap();
        let again = service.book_slot(request("S1", "123")).await.unwrap();
        let other = service.book_slot(request("S1", "456")).await.unwrap();

        assert_eq!(first, booked("Mon, 06 Oct 2025 | 09:00-10:00", None));
        assert_eq!(again, rejected(RejectionReason::DuplicateBooking));
        assert_eq!(other, rejected(RejectionReason::SlotFull));
        assert_eq!(store.slot("doc-S1").unwrap().booked, 1);

        let bookings = store.bookings();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].status, BookingStatus::Pending);
        assert_eq!(bookings[0].prescription, "");
        assert_eq!(bookings[0].slot_label, "Mon, 06 Oct 2025 | 09:00-10:00");
    }

    #[tokio::test]
    async fn duplicate_rule_spans_slots_but_not_specialties() {
        let mut neuro = slot("N1", 5);
        neuro.specialty = "Neuro".to_string();
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 5), slot("S2", 5), neuro]));
        let service = service(&store, MockBlobStore::new(), 3);

        service.book_slot(request("S1", "123")).await.unwrap();
        let other_slot = service.book_slot(request("S2", "123")).await.unwrap();
        let mut other_specialty = request("N1", "123");
        other_specialty.specialty = "Neuro".to_string();
        let other_specialty = service.book_slot(other_specialty).await.unwrap();

        assert_eq!(other_slot, rejected(RejectionReason::DuplicateBooking));
        assert!(matches!(other_specialty, BookingOutcome::Booked { .. }));
        assert_eq!(store.slot("doc-S2").unwrap().booked, 0);
    }

    #[tokio::test]
    async fn missing_slot_is_not_found_and_writes_nothing() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 1)]));
        let service = service(&store, MockBlobStore::new(), 3);

        let err = service.book_slot(request("NOPE", "123")).await.unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
        assert!(store.bookings().is_empty());
        assert_eq!(store.slot("doc-S1").unwrap().booked, 0);
    }

    #[tokio::test]
    async fn failed_upload_still_books_without_file() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 2)]));
        let mut blobs = MockBlobStore::new();
        blobs
            .expect_upload()
            .times(1)
            .returning(|_| Err(BlobError::Upload("bucket unreachable".to_string())));
        let service = service(&store, blobs, 3);

        let mut with_file = request("S1", "123");
        with_file.attachment = Some(attachment());
        let outcome = service.book_slot(with_file).await.unwrap();

        assert_eq!(outcome, booked("Mon, 06 Oct 2025 | 09:00-10:00", None));
        assert_eq!(store.bookings()[0].file_url, None);
    }

    #[tokio::test]
    async fn uploaded_url_is_recorded() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 2)]));
        let mut blobs = MockBlobStore::new();
        blobs.expect_upload().times(1).returning(|a| {
            Ok(StoredAttachment {
                key: format!("attachments/{}", a.filename),
                url: "https://files.example/scan.png".to_string(),
            })
        });
        let service = service(&store, blobs, 3);

        let mut with_file = request("S1", "123");
        with_file.attachment = Some(attachment());
        let outcome = service.book_slot(with_file).await.unwrap();

        assert_eq!(
            outcome,
            booked("Mon, 06 Oct 2025 | 09:00-10:00", Some("https://files.example/scan.png"))
        );
        assert_eq!(
            store.bookings()[0].file_url.as_deref(),
            Some("https://files.example/scan.png")
        );
    }

    #[tokio::test]
    async fn rejected_bookings_skip_the_upload() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 0)]));
        let mut blobs = MockBlobStore::new();
        blobs.expect_upload().never();
        let service = service(&store, blobs, 3);

        let mut with_file = request("S1", "123");
        with_file.attachment = Some(attachment());

        assert_eq!(
            service.book_slot(with_file).await.unwrap(),
            rejected(RejectionReason::SlotFull)
        );
    }

    #[tokio::test]
    async fn conflicts_are_retried_and_upload_happens_once() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 1)]));
        store.inject_conflicts(2);
        let mut blobs = MockBlobStore::new();
        blobs.expect_upload().times(1).returning(|_| {
            Ok(StoredAttachment {
                key: "k".to_string(),
                url: "https://files.example/k".to_string(),
            })
        });
        let service = service(&store, blobs, 3);

        let mut with_file = request("S1", "123");
        with_file.attachment = Some(attachment());
        let outcome = service.book_slot(with_file).await.unwrap();

        assert!(matches!(outcome, BookingOutcome::Booked { .. }));
        assert_eq!(store.slot("doc-S1").unwrap().booked, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_contention() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 1)]));
        store.inject_conflicts(3);
        let service = service(&store, MockBlobStore::new(), 3);

        let err = service.book_slot(request("S1", "123")).await.unwrap_err();

        assert!(matches!(err, Error::Contention { attempts: 3 }), "{err:?}");
        assert!(store.bookings().is_empty());
        assert_eq!(store.slot("doc-S1").unwrap().booked, 0);
    }

    #[tokio::test]
    async fn caller_supplied_file_url_is_kept_without_attachment() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 1)]));
        let service = service(&store, MockBlobStore::new(), 3);

        let mut with_url = request("S1", "123");
        with_url.file_url = Some("https://drive.example/x".to_string());
        service.book_slot(with_url).await.unwrap();

        assert_eq!(store.bookings()[0].file_url.as_deref(), Some("https://drive.example/x"));
    }

    #[tokio::test]
    async fn duplicate_is_reported_before_a_full_slot() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 1), slot("S2", 1)]));
        let service = service(&store, MockBlobStore::new(), 3);
        service.book_slot(request("S1", "123")).await.unwrap();
        service.book_slot(request("S2", "456")).await.unwrap();

        let same_slot = service.book_slot(request("S1", "123")).await.unwrap();
        let other_full_slot = service.book_slot(request("S2", "123")).await.unwrap();

        assert_eq!(same_slot, rejected(RejectionReason::DuplicateBooking));
        assert_eq!(other_full_slot, rejected(RejectionReason::DuplicateBooking));
        assert_eq!(store.bookings().len(), 2);
    }

    #[tokio::test]
    async fn stored_attachments_get_fresh_urls_on_read() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 3)]));
        let mut blobs = MockBlobStore::new();
        blobs.expect_upload().times(1).returning(|_| {
            Ok(StoredAttachment {
                key: "attachments/scan.png".to_string(),
                url: "https://files.example/scan.png?v=1".to_string(),
            })
        });
        blobs
            .expect_download_url()
            .withf(|key| key.starts_with("attachments/scan.png"))
            .times(1)
            .returning(|_| Ok("https://files.example/scan.png?v=2".to_string()));
        let service = service(&store, blobs, 3);

        let mut with_file = request("S1", "123");
        with_file.attachment = Some(attachment());
        service.book_slot(with_file).await.unwrap();
        let mut with_url = request("S1", "456");
        with_url.file_url = Some("https://drive.example/x".to_string());
        service.book_slot(with_url).await.unwrap();

        let mut bookings = store.bookings();
        service.refresh_file_urls(&mut bookings).await;

        let urls: Vec<_> = bookings.iter().map(|b| b.file_url.as_deref()).collect();
        assert_eq!(
            urls,
            vec![
                Some("https://files.example/scan.png?v=2"),
                Some("https://drive.example/x"),
            ]
        );
        assert_eq!(bookings[0].file_key.as_deref(), Some("attachments/scan.png"));
        assert_eq!(bookings[1].file_key, None);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_stored_url() {
        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 3)]));
        let mut blobs = MockBlobStore::new();
        blobs.expect_upload().returning(|_| {
            Ok(StoredAttachment {
                key: "k".to_string(),
                url: "https://files.example/k?v=1".to_string(),
            })
        });
        blobs
            .expect_download_url()
            .returning(|_| Err(BlobError::Url("credentials expired".to_string())));
        let service = service(&store, blobs, 3);

        let mut with_file = request("S1", "123");
        with_file.attachment = Some(attachment());
        service.book_slot(with_file).await.unwrap();

        let mut bookings = store.bookings();
        service.refresh_file_urls(&mut bookings).await;

        assert_eq!(bookings[0].file_url.as_deref(), Some("https://files.example/k?v=1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bookings_never_exceed_capacity() {
        const CAPACITY: u32 = 5;
        const PATIENTS: usize = 24;

        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", CAPACITY)]));
        // Every failed commit is caused by a successful one, so CAPACITY + 1
        // attempts are always enough to reach a definite outcome.
        let service = Arc::new(service(&store, MockBlobStore::new(), CAPACITY + 1));

        let tasks: Vec<_> = (0..PATIENTS)
            .map(|n| {
                let service = service.clone();
                tokio::spawn(async move { service.book_slot(request("S1", &format!("P{n}"))).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap().unwrap());
        }

        let booked = outcomes
            .iter()
            .filter(|o| matches!(o, BookingOutcome::Booked { .. }))
            .count();
        let full = outcomes
            .iter()
            .filter(|o| **o == rejected(RejectionReason::SlotFull))
            .count();

        assert_eq!(booked, CAPACITY as usize);
        assert_eq!(full, PATIENTS - CAPACITY as usize);
        assert_eq!(store.slot("doc-S1").unwrap().booked, CAPACITY);
        assert_eq!(store.bookings().len(), CAPACITY as usize);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_commit_once() {
        const ATTEMPTS: usize = 12;

        let store = Arc::new(MemoryStore::with_slots(vec![slot("S1", 20), slot("S2", 20)]));
        let service = Arc::new(service(&store, MockBlobStore::new(), 3));

        let tasks: Vec<_> = (0..ATTEMPTS)
            .map(|n| {
                let service = service.clone();
                let slot_id = if n % 2 == 0 { "S1" } else { "S2" };
                tokio::spawn(async move { service.book_slot(request(slot_id, "123")).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap().unwrap());
        }

        let booked = outcomes
            .iter()
            .filter(|o| matches!(o, BookingOutcome::Booked { .. }))
            .count();
        let slots_booked = store.slot("doc-S1").unwrap().booked + store.slot("doc-S2").unwrap().booked;

        assert_eq!(booked, 1);
        assert_eq!(slots_booked, 1);
        assert_eq!(store.bookings().len(), 1);
    }
}
