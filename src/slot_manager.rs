//! Week lookup with lazy initialization, on top of any [`SlotBackend`].
//!
//! The first request for a week inserts its 32 slots; concurrent first
//! requests both insert, the store skips the duplicate half, and every caller
//! re-reads the canonical set. No lock spans the lookup and the insert.

use crate::backend::{SlotBackend, StoreError};
use crate::calendar::{day_bounds, sunday_of_week};
use crate::types::{NewSlot, Slot};
use chrono::NaiveDate;
use tracing::{debug, info};

/// All slots of the week containing `date`, creating them on first access.
pub fn week_slots<T: SlotBackend>(backend: &T, date: NaiveDate) -> Result<Vec<Slot>, StoreError> {
    let sunday = sunday_of_week(date);
    let (start, end) = day_bounds(sunday);

    let slots = backend.slots_between(start, end)?;
    if !slots.is_empty() {
        return Ok(slots);
    }

    let created = backend.insert_slots(&NewSlot::day_schedule(sunday))?;
    info!(%sunday, created, "Initialized slots for week");
    backend.slots_between(start, end)
}

/// Slots stored for exactly `day`. Never creates anything.
pub fn day_slots<T: SlotBackend>(backend: &T, day: NaiveDate) -> Result<Vec<Slot>, StoreError> {
    let (start, end) = day_bounds(day);
    backend.slots_between(start, end)
}

/// Creates the slots of `day` that do not exist yet and returns how many were
/// created. Fails with a conflict when the day was already complete.
pub fn initialize_day<T: SlotBackend>(backend: &T, day: NaiveDate) -> Result<usize, StoreError> {
    let created = backend.insert_slots(&NewSlot::day_schedule(day))?;
    debug!(%day, created, "Initialize day requested");
    if created == 0 {
        return Err(StoreError::Conflict(
            "Slots already exist for this week".into(),
        ));
    }
    Ok(created)
}

pub fn toggle_slot<T: SlotBackend>(backend: &T, id: uuid::Uuid) -> Result<Slot, StoreError> {
    let slot = backend.toggle_slot(id)?;
    info!(%id, is_available = slot.is_available, "Toggled slot availability");
    Ok(slot)
}
