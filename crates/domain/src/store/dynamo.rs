//! DynamoDB layout:
//!
//! - slots: key `docId`; sparse GSI `slotId-index`
//! - bookings: key `(idNumber, specialty)`; GSI `specialty-index`
//! - patients: key `idNumber`
//!
//! Keying bookings by (idNumber, specialty) lets a conditional put enforce the
//! one-booking-per-specialty rule inside the booking transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::DisplayErrorContext,
    operation::{transact_write_items::TransactWriteItemsError, update_item::UpdateItemError},
    types::{AttributeValue, Put, TransactWriteItem, Update},
    Client,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use ulid::Ulid;

use crate::clinic::{Booking, NewBooking, Patient, Slot, SlotIdAssignment};

use super::{BookingStore, BookingUpdate, PatientStore, SlotStore, StoreError};

pub const SLOT_ID_INDEX: &str = "slotId-index";
pub const SPECIALTY_INDEX: &str = "specialty-index";

/// DynamoDB caps a transaction at 100 items.
const TRANSACTION_LIMIT: usize = 100;

type Item = HashMap<String, AttributeValue>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tables {
    pub slots: String,
    pub bookings: String,
    pub patients: String,
}

#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
    tables: Tables,
}

impl DynamoStore {
    pub fn new(client: Client, tables: Tables) -> Self {
        Self { client, tables }
    }

    async fn get_slot(&self, doc_id: String) -> Result<Option<Slot>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.tables.slots)
            .key("docId", AttributeValue::S(doc_id))
            .consistent_read(true)
            .send()
            .await
            .map_err(unavailable)?;

        output.item.map(decode).transpose()
    }

    async fn query_index<T: DeserializeOwned>(
        &self,
        table: &str,
        index: &str,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<T>, StoreError> {
        let items: Vec<Item> = self
            .client
            .query()
            .table_name(table)
            .index_name(index)
            .key_condition_expression("#key = :value")
            .expression_attribute_names("#key", attribute)
            .expression_attribute_values(":value", AttributeValue::S(value.to_string()))
            .into_paginator()
            .items()
            .send()
            .collect::<Result<Vec<_>, _>>()
            .await
            .map_err(unavailable)?;

        items.into_iter().map(decode).collect()
    }

    async fn scan<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, StoreError> {
        let items: Vec<Item> = self
            .client
            .scan()
            .table_name(table)
            .consistent_read(true)
            .into_paginator()
            .items()
            .send()
            .collect::<Result<Vec<_>, _>>()
            .await
            .map_err(unavailable)?;

        items.into_iter().map(decode).collect()
    }

    async fn first_booked_specialty(&self, id_number: &str) -> Result<Option<String>, StoreError> {
        let output = self
            .client
            .query()
            .table_name(&self.tables.bookings)
            .key_condition_expression("#idNumber = :idNumber")
            .expression_attribute_names("#idNumber", "idNumber")
            .expression_attribute_values(":idNumber", AttributeValue::S(id_number.to_string()))
            .consistent_read(true)
            .limit(1)
            .send()
            .await
            .map_err(unavailable)?;

        Ok(output
            .items
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|item| string_attribute(&item, "specialty")))
    }

    async fn transact(&self, items: Vec<TransactWriteItem>) -> Result<(), StoreError> {
        let result = self
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => match err.into_service_error() {
                TransactWriteItemsError::TransactionCanceledException(cancelled)
                    if cancelled.cancellation_reasons().iter().any(|reason| {
                        matches!(reason.code(), Some("ConditionalCheckFailed" | "TransactionConflict"))
                    }) =>
                {
                    Err(StoreError::Conflict)
                }
                other => Err(unavailable(other)),
            },
        }
    }
}

#[async_trait]
impl SlotStore for DynamoStore {
    async fn find_slot(&self, slot_id: &str) -> Result<Option<Slot>, StoreError> {
        let output = self
            .client
            .query()
            .table_name(&self.tables.slots)
            .index_name(SLOT_ID_INDEX)
            .key_condition_expression("#slotId = :slotId")
            .expression_attribute_names("#slotId", "slotId")
            .expression_attribute_values(":slotId", AttributeValue::S(slot_id.to_string()))
            .limit(1)
            .send()
            .await
            .map_err(unavailable)?;

        let doc_id = output
            .items
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|item| string_attribute(&item, "docId"));

        // The index is eventually consistent; the counter must come from the table.
        match doc_id {
            Some(doc_id) => self.get_slot(doc_id).await,
            None => Ok(None),
        }
    }

    async fn list_slots(&self) -> Result<Vec<Slot>, StoreError> {
        let mut slots: Vec<Slot> = self.scan(&self.tables.slots).await?;
        slots.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        Ok(slots)
    }

    async fn assign_slot_ids(&self, assignments: &[SlotIdAssignment]) -> Result<(), StoreError> {
        for chunk in assignments.chunks(TRANSACTION_LIMIT) {
            let items = chunk
                .iter()
                .map(|assignment| {
                    let update = Update::builder()
                        .table_name(&self.tables.slots)
                        .key("docId", AttributeValue::S(assignment.doc_id.clone()))
                        .update_expression("SET #slotId = :slotId")
                        .condition_expression("attribute_exists(#docId) AND attribute_not_exists(#slotId)")
                        .expression_attribute_names("#docId", "docId")
                        .expression_attribute_names("#slotId", "slotId")
                        .expression_attribute_values(":slotId", AttributeValue::S(assignment.slot_id.clone()))
                        .build()
                        .map_err(malformed)?;
                    Ok(TransactWriteItem::builder().update(update).build())
                })
                .collect::<Result<Vec<_>, StoreError>>()?;

            self.transact(items).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for DynamoStore {
    async fn find_booking(
        &self,
        id_number: &str,
        specialty: &str,
    ) -> Result<Option<Booking>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.tables.bookings)
            .key("idNumber", AttributeValue::S(id_number.to_string()))
            .key("specialty", AttributeValue::S(specialty.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(unavailable)?;

        output.item.map(decode).transpose()
    }

    async fn create_booking(&self, slot: &Slot, booking: NewBooking) -> Result<Booking, StoreError> {
        let booking = booking.into_booking(Ulid::new().to_string(), Utc::now());
        let item: Item = serde_dynamo::to_item(&booking).map_err(malformed)?;

        let increment = Update::builder()
            .table_name(&self.tables.slots)
            .key("docId", AttributeValue::S(slot.doc_id.clone()))
            .update_expression("SET #booked = :next")
            .condition_expression(slot_commit_condition(slot.booked))
            .expression_attribute_names("#booked", "booked")
            .expression_attribute_names("#capacity", "capacity")
            .expression_attribute_values(":seen", AttributeValue::N(slot.booked.to_string()))
            .expression_attribute_values(":next", AttributeValue::N((slot.booked + 1).to_string()))
            .build()
            .map_err(malformed)?;

        let record = Put::builder()
            .table_name(&self.tables.bookings)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#idNumber)")
            .expression_attribute_names("#idNumber", "idNumber")
            .build()
            .map_err(malformed)?;

        self.transact(vec![
            TransactWriteItem::builder().update(increment).build(),
            TransactWriteItem::builder().put(record).build(),
        ])
        .await?;

        Ok(booking)
    }

    async fn bookings_by_specialty(&self, specialty: &str) -> Result<Vec<Booking>, StoreError> {
        self.query_index(&self.tables.bookings, SPECIALTY_INDEX, "specialty", specialty)
            .await
    }

    async fn list_bookings(&self) -> Result<Vec<Booking>, StoreError> {
        self.scan(&self.tables.bookings).await
    }

    async fn update_booking(
        &self,
        id_number: &str,
        specialty: Option<&str>,
        update: BookingUpdate,
    ) -> Result<bool, StoreError> {
        let specialty = match specialty {
            Some(specialty) => specialty.to_string(),
            None => match self.first_booked_specialty(id_number).await? {
                Some(specialty) => specialty,
                None => return Ok(false),
            },
        };

        let (field, value) = match update {
            BookingUpdate::Notes(notes) => ("notes", notes),
            BookingUpdate::Prescription(prescription) => ("prescription", prescription),
            BookingUpdate::Status(status) => ("status", status.as_str().to_string()),
        };

        let result = self
            .client
            .update_item()
            .table_name(&self.tables.bookings)
            .key("idNumber", AttributeValue::S(id_number.to_string()))
            .key("specialty", AttributeValue::S(specialty))
            .update_expression("SET #field = :value")
            .condition_expression("attribute_exists(#idNumber)")
            .expression_attribute_names("#field", field)
            .expression_attribute_names("#idNumber", "idNumber")
            .expression_attribute_values(":value", AttributeValue::S(value))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => match err.into_service_error() {
                UpdateItemError::ConditionalCheckFailedException(_) => Ok(false),
                other => Err(unavailable(other)),
            },
        }
    }
}

#[async_trait]
impl PatientStore for DynamoStore {
    async fn get_patient(&self, id_number: &str) -> Result<Option<Patient>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.tables.patients)
            .key("idNumber", AttributeValue::S(id_number.to_string()))
            .send()
            .await
            .map_err(unavailable)?;

        output.item.map(decode).transpose()
    }
}

/// Condition on the slot update: the counter still holds the value read
/// (`booked` may be absent on freshly seeded slots) and there is room left.
pub fn slot_commit_condition(seen: u32) -> &'static str {
    if seen == 0 {
        "#capacity > :seen AND (attribute_not_exists(#booked) OR #booked = :seen)"
    } else {
        "#capacity > :seen AND #booked = :seen"
    }
}

fn decode<T: DeserializeOwned>(item: Item) -> Result<T, StoreError> {
    serde_dynamo::from_item(item).map_err(malformed)
}

fn string_attribute(item: &Item, name: &str) -> Option<String> {
    item.get(name).and_then(|value| value.as_s().ok()).cloned()
}

fn unavailable(err: impl std::error::Error) -> StoreError {
    StoreError::Unavailable(DisplayErrorContext(err).to_string())
}

fn malformed(err: impl std::fmt::Display) -> StoreError {
    StoreError::Malformed(err.to_string())
}
