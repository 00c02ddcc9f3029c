use crate::types::{DateTitle, DeletedDate, NewSlot, Slot, Upserted, User};
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
}

pub trait SlotBackend: Clone + Send + Sync + 'static {
    /// Slots in `[from, to)`, ordered by hour and slot number.
    fn slots_between(&self, from: DateTime<Utc>, to: DateTime<Utc>)
        -> Result<Vec<Slot>, StoreError>;
    /// Inserts every slot whose key is not taken yet and returns how many were
    /// inserted. Duplicates are skipped, never reported as errors.
    fn insert_slots(&self, slots: &[NewSlot]) -> Result<usize, StoreError>;
    fn toggle_slot(&self, id: Uuid) -> Result<Slot, StoreError>;
}

pub trait DateTitleBackend: Clone + Send + Sync + 'static {
    fn date_titles(&self) -> Result<Vec<DateTitle>, StoreError>;
    fn upsert_date_title(
        &self,
        date: NaiveDate,
        title: String,
    ) -> Result<Upserted<DateTitle>, StoreError>;
}

pub trait DeletedDateBackend: Clone + Send + Sync + 'static {
    fn deleted_dates(&self) -> Result<Vec<DeletedDate>, StoreError>;
    fn hide_date(&self, date: NaiveDate) -> Result<DeletedDate, StoreError>;
    fn unhide_date(&self, date: NaiveDate) -> Result<(), StoreError>;
}

pub trait UserBackend: Clone + Send + Sync + 'static {
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    /// Removes any account with the same username and stores `user`.
    fn replace_user(&self, user: User) -> Result<User, StoreError>;
}

pub trait Backend: SlotBackend + DateTitleBackend + DeletedDateBackend + UserBackend {}

impl<T> Backend for T where T: SlotBackend + DateTitleBackend + DeletedDateBackend + UserBackend {}

pub(crate) fn date_already_hidden(date: NaiveDate) -> StoreError {
    StoreError::Conflict(format!("Date {date} already deleted"))
}

pub(crate) fn date_not_hidden(date: NaiveDate) -> StoreError {
    StoreError::NotFound(format!("Date {date} not found in deleted list"))
}

pub(crate) fn slot_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound(format!("Slot {id} not found"))
}
