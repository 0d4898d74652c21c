use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate};
use derive_new::new;
use serde::{Deserialize, Serialize};

/// A bookable time window for a specialty.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<String>,
    #[serde(default)]
    pub specialty: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time_range: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub booked: u32,
}

impl Slot {
    pub fn available(&self) -> i64 {
        i64::from(self.capacity) - i64::from(self.booked)
    }

    pub fn calendar_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }

    /// Snapshot label stored on a booking: `"Mon, 06 Oct 2025 | 09:00-10:00"`.
    pub fn booking_label(&self) -> String {
        format!("{} | {}", format_date_human(&self.date), self.time_range)
    }

    pub fn view(&self) -> SlotView {
        SlotView {
            slot_id: self.slot_id.clone(),
            date: self.date.clone(),
            time_range: self.time_range.clone(),
            capacity: self.capacity,
            booked: self.booked,
            available: self.available(),
            label: format!("{} ({}/{})", self.booking_label(), self.booked, self.capacity),
            doc_id: self.doc_id.clone(),
        }
    }
}

/// Read model returned by slot listing.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub slot_id: Option<String>,
    pub date: String,
    pub time_range: String,
    pub capacity: u32,
    pub booked: u32,
    pub available: i64,
    pub label: String,
    pub doc_id: String,
}

/// A pending `slotId` write produced by slot-id maintenance.
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct SlotIdAssignment {
    pub doc_id: String,
    pub slot_id: String,
}

/// Views for `slots`, ordered by calendar date. Unparseable dates sort last.
pub fn slot_views(slots: &[Slot]) -> Vec<SlotView> {
    let mut sorted: Vec<&Slot> = slots.iter().collect();
    sorted.sort_by_key(|slot| (slot.calendar_date().is_none(), slot.calendar_date()));
    sorted.into_iter().map(Slot::view).collect()
}

/// Distinct non-blank specialties, trimmed and sorted.
pub fn specialties_of<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn format_date_human(raw: &str) -> String {
    match parse_date(raw) {
        Some(date) => date.format("%a, %d %b %Y").to_string(),
        None => raw.to_string(),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}
