use crate::backend::{
    date_already_hidden, date_not_hidden, slot_not_found, DateTitleBackend, DeletedDateBackend,
    SlotBackend, StoreError, UserBackend,
};
use crate::types::{DateTitle, DeletedDate, NewSlot, Slot, Upserted, User};
use chrono::{DateTime, NaiveDate, Utc};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, error};
use uuid::Uuid;

/// In-memory store, used when no database is configured. Contents are lost
/// on restart.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
    date_titles: Arc<Mutex<BTreeMap<NaiveDate, DateTitle>>>,
    deleted_dates: Arc<Mutex<BTreeMap<NaiveDate, DeletedDate>>>,
    users: Arc<Mutex<HashMap<String, User>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|err| {
        error!(%err, "Local store lock poisoned");
        StoreError::Database("Local store unavailable".into())
    })
}

impl SlotBackend for LocalStore {
    fn slots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>, StoreError> {
        let mut slots: Vec<Slot> = lock(&self.slots)?
            .values()
            .filter(|slot| slot.date >= from && slot.date < to)
            .cloned()
            .collect();
        slots.sort_unstable_by_key(|slot| (slot.hour, slot.slot_number));
        Ok(slots)
    }

    fn insert_slots(&self, new_slots: &[NewSlot]) -> Result<usize, StoreError> {
        let mut slots = lock(&self.slots)?;
        let mut taken: HashSet<_> = slots.values().map(Slot::key).collect();

        let mut inserted = 0;
        for new_slot in new_slots {
            if !taken.insert(new_slot.key()) {
                debug!(date = %new_slot.date, "Skipping duplicate slot");
                continue;
            }
            slots.insert(new_slot.id, Slot::from(new_slot.clone()));
            inserted += 1;
        }
        Ok(inserted)
    }

    fn toggle_slot(&self, id: Uuid) -> Result<Slot, StoreError> {
        let mut slots = lock(&self.slots)?;
        let slot = slots.get_mut(&id).ok_or_else(|| slot_not_found(id))?;
        slot.is_available = !slot.is_available;
        Ok(slot.clone())
    }
}

impl DateTitleBackend for LocalStore {
    fn date_titles(&self) -> Result<Vec<DateTitle>, StoreError> {
        Ok(lock(&self.date_titles)?.values().cloned().collect())
    }

    fn upsert_date_title(
        &self,
        date: NaiveDate,
        title: String,
    ) -> Result<Upserted<DateTitle>, StoreError> {
        let mut date_titles = lock(&self.date_titles)?;
        if let Some(existing) = date_titles.get_mut(&date) {
            existing.title = title;
            return Ok(Upserted {
                record: existing.clone(),
                created: false,
            });
        }

        let record = DateTitle {
            id: Uuid::new_v4(),
            date,
            title,
        };
        date_titles.insert(date, record.clone());
        Ok(Upserted {
            record,
            created: true,
        })
    }
}

impl DeletedDateBackend for LocalStore {
    fn deleted_dates(&self) -> Result<Vec<DeletedDate>, StoreError> {
        Ok(lock(&self.deleted_dates)?.values().cloned().collect())
    }

    fn hide_date(&self, date: NaiveDate) -> Result<DeletedDate, StoreError> {
        let mut deleted_dates = lock(&self.deleted_dates)?;
        if deleted_dates.contains_key(&date) {
            return Err(date_already_hidden(date));
        }
        let record = DeletedDate {
            id: Uuid::new_v4(),
            date,
        };
        deleted_dates.insert(date, record.clone());
        Ok(record)
    }

    fn unhide_date(&self, date: NaiveDate) -> Result<(), StoreError> {
        lock(&self.deleted_dates)?
            .remove(&date)
            .map(|_| ())
            .ok_or_else(|| date_not_hidden(date))
    }
}

impl UserBackend for LocalStore {
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users)?.get(username).cloned())
    }

    fn replace_user(&self, user: User) -> Result<User, StoreError> {
        lock(&self.users)?.insert(user.username.clone(), user.clone());
        Ok(user)
    }
}
