use crate::calendar::{slot_positions, slot_start};
use crate::schema::{date_titles, deleted_dates, slots, users};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One bookable quarter hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = slots)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub hour: i32,
    pub slot_number: i32,
    pub is_available: bool,
}

impl Slot {
    /// Key that must be unique across all stored slots.
    pub fn key(&self) -> (DateTime<Utc>, i32, i32) {
        (self.date, self.hour, self.slot_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = slots)]
pub struct NewSlot {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub hour: i32,
    pub slot_number: i32,
    pub is_available: bool,
}

impl NewSlot {
    /// The full set of available slots for `day`.
    pub fn day_schedule(day: NaiveDate) -> Vec<NewSlot> {
        slot_positions()
            .map(|(hour, slot_number)| NewSlot {
                id: Uuid::new_v4(),
                date: slot_start(day, hour, slot_number),
                hour,
                slot_number,
                is_available: true,
            })
            .collect()
    }

    pub fn key(&self) -> (DateTime<Utc>, i32, i32) {
        (self.date, self.hour, self.slot_number)
    }
}

impl From<NewSlot> for Slot {
    fn from(slot: NewSlot) -> Self {
        Self {
            id: slot.id,
            date: slot.date,
            hour: slot.hour,
            slot_number: slot.slot_number,
            is_available: slot.is_available,
        }
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable, Insertable,
)]
#[diesel(table_name = date_titles)]
pub struct DateTitle {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub date: NaiveDate,
    pub title: String,
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Selectable, Insertable,
)]
#[diesel(table_name = deleted_dates)]
pub struct DeletedDate {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub date: NaiveDate,
}

/// Result of an insert-or-overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted<T> {
    pub record: T,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// The part of an account that leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
        }
    }
}
