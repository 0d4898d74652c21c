use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::{blob::Attachment, errors::Error};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSlotInput {
    #[serde(default)]
    pub slot_id: String,
    #[serde(default)]
    pub id_number: String,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub phone: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub file_url: Option<String>,
    pub file: Option<FileInput>,
}

/// Attachment sent inline as base64.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInput {
    pub data: String,
    pub mime_type: String,
    pub filename: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SaveNotesInput {
    #[serde(default)]
    pub notes: String,
    pub specialty: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SavePrescriptionInput {
    #[serde(default)]
    pub prescription: String,
    pub specialty: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarkCheckedInput {
    pub specialty: Option<String>,
}

/// A validated booking request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingRequest {
    pub slot_id: String,
    pub id_number: String,
    pub specialty: String,
    pub phone: String,
    pub name: String,
    pub notes: String,
    pub file_url: Option<String>,
    pub attachment: Option<Attachment>,
}

impl TryFrom<BookSlotInput> for BookingRequest {
    type Error = Error;

    fn try_from(input: BookSlotInput) -> Result<Self, Self::Error> {
        let slot_id = required("slotId", &input.slot_id)?;
        let id_number = required("idNumber", &input.id_number)?;
        let specialty = required("specialty", &input.specialty)?;

        let attachment = input.file.map(Attachment::try_from).transpose()?;

        Ok(BookingRequest {
            slot_id,
            id_number,
            specialty,
            phone: input.phone.trim().to_string(),
            name: input.name.unwrap_or_default(),
            notes: input.notes.unwrap_or_default(),
            file_url: input.file_url.filter(|url| !url.trim().is_empty()),
            attachment,
        })
    }
}

impl TryFrom<FileInput> for Attachment {
    type Error = Error;

    fn try_from(file: FileInput) -> Result<Self, Self::Error> {
        let bytes = STANDARD
            .decode(file.data.trim())
            .map_err(|e| Error::validation(format!("file data is not valid base64: {e}")))?;

        Ok(Attachment {
            bytes,
            mime_type: file.mime_type,
            filename: file.filename,
        })
    }
}

/// Trims `value`, rejecting it when nothing is left.
pub fn required(field: &str, value: &str) -> Result<String, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}
