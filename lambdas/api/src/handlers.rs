use axum::{
    extract::{FromRequest, Path, Query, State},
    Json,
};
use domain::{
    clinic::{
        ensure_slot_ids,
        inputs::{required, BookSlotInput, MarkCheckedInput, SaveNotesInput, SavePrescriptionInput},
        slot_views, specialties_of, Booking, BookingOutcome, BookingRequest, BookingStatus, Clinic,
        Patient, SlotView,
    },
    store::BookingUpdate,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;

/// `Json` whose rejections use the `{success:false,message}` envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct CommandJson<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct SpecialtyQuery {
    pub specialty: Option<String>,
}

impl SpecialtyQuery {
    fn required(&self) -> Result<String, ApiError> {
        required("specialty", self.specialty.as_deref().unwrap_or_default()).map_err(ApiError::query)
    }
}

/// Body of every write endpoint.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl CommandResponse {
    fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

// Specialties offered by slots
pub async fn list_specialties(State(clinic): State<Clinic>) -> Result<Json<Vec<String>>, ApiError> {
    let ensured = ensure_slot_ids(clinic.slots.as_ref(), &clinic.retry)
        .await
        .map_err(ApiError::query)?;

    Ok(Json(specialties_of(
        ensured.slots.iter().map(|s| s.specialty.as_str()),
    )))
}

// Specialties that have at least one booking
pub async fn list_booked_specialties(
    State(clinic): State<Clinic>,
) -> Result<Json<Vec<String>>, ApiError> {
    let bookings = clinic.bookings.list_bookings().await.map_err(ApiError::query)?;

    Ok(Json(specialties_of(bookings.iter().map(|b| b.specialty.as_str()))))
}

pub async fn list_slots(
    State(clinic): State<Clinic>,
    Query(query): Query<SpecialtyQuery>,
) -> Result<Json<Vec<SlotView>>, ApiError> {
    let specialty = query.required()?;

    let ensured = ensure_slot_ids(clinic.slots.as_ref(), &clinic.retry)
        .await
        .map_err(ApiError::query)?;

    let slots: Vec<_> = ensured
        .slots
        .into_iter()
        .filter(|slot| slot.specialty.trim() == specialty)
        .collect();

    Ok(Json(slot_views(&slots)))
}

pub async fn book_slot(
    State(clinic): State<Clinic>,
    CommandJson(input): CommandJson<BookSlotInput>,
) -> Result<Json<CommandResponse>, ApiError> {
    let request = BookingRequest::try_from(input).map_err(ApiError::command)?;

    let outcome = clinic
        .booking_service
        .book_slot(request)
        .await
        .map_err(ApiError::command)?;

    Ok(Json(match outcome {
        BookingOutcome::Booked {
            slot_label,
            file_url,
        } => CommandResponse {
            success: true,
            message: Some("Booked".to_string()),
            slot_label: Some(slot_label),
            file_url,
        },
        BookingOutcome::Rejected { reason } => CommandResponse::failed(reason.message()),
    }))
}

pub async fn get_patient(
    State(clinic): State<Clinic>,
    Path(id_number): Path<String>,
) -> Result<Json<Option<Patient>>, ApiError> {
    let id_number = required("id", &id_number).map_err(ApiError::query)?;

    let patient = clinic
        .patients
        .get_patient(&id_number)
        .await
        .map_err(ApiError::query)?;

    Ok(Json(patient))
}

// Bookings for a specialty, i.e. the patients staff will see
pub async fn list_patients(
    State(clinic): State<Clinic>,
    Query(query): Query<SpecialtyQuery>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let specialty = query.required()?;

    let mut bookings = clinic
        .bookings
        .bookings_by_specialty(&specialty)
        .await
        .map_err(ApiError::query)?;

    clinic.booking_service.refresh_file_urls(&mut bookings).await;

    Ok(Json(bookings))
}

pub async fn save_notes(
    State(clinic): State<Clinic>,
    Path(id_number): Path<String>,
    CommandJson(input): CommandJson<SaveNotesInput>,
) -> Result<Json<CommandResponse>, ApiError> {
    update_booking(
        &clinic,
        &id_number,
        input.specialty,
        BookingUpdate::Notes(input.notes),
    )
    .await
}

pub async fn save_prescription(
    State(clinic): State<Clinic>,
    Path(id_number): Path<String>,
    CommandJson(input): CommandJson<SavePrescriptionInput>,
) -> Result<Json<CommandResponse>, ApiError> {
    update_booking(
        &clinic,
        &id_number,
        input.specialty,
        BookingUpdate::Prescription(input.prescription),
    )
    .await
}

pub async fn mark_checked(
    State(clinic): State<Clinic>,
    Path(id_number): Path<String>,
    input: Option<CommandJson<MarkCheckedInput>>,
) -> Result<Json<CommandResponse>, ApiError> {
    let specialty = input.and_then(|CommandJson(input)| input.specialty);

    update_booking(
        &clinic,
        &id_number,
        specialty,
        BookingUpdate::Status(BookingStatus::Checked),
    )
    .await
}

pub async fn assign_slot_ids(State(clinic): State<Clinic>) -> Result<Json<Value>, ApiError> {
    let ensured = ensure_slot_ids(clinic.slots.as_ref(), &clinic.retry)
        .await
        .map_err(ApiError::query)?;

    Ok(Json(json!({ "assigned": ensured.assigned })))
}

async fn update_booking(
    clinic: &Clinic,
    id_number: &str,
    specialty: Option<String>,
    update: BookingUpdate,
) -> Result<Json<CommandResponse>, ApiError> {
    let id_number = required("id", id_number).map_err(ApiError::command)?;
    let specialty = specialty.filter(|s| !s.trim().is_empty());

    let updated = clinic
        .bookings
        .update_booking(&id_number, specialty.as_deref().map(str::trim), update)
        .await
        .map_err(ApiError::command)?;

    if !updated {
        return Ok(Json(CommandResponse::failed("Patient not found")));
    }
    Ok(Json(CommandResponse::ok()))
}
