use crate::backend::{
    date_already_hidden, date_not_hidden, slot_not_found, DateTitleBackend, DeletedDateBackend,
    SlotBackend, StoreError, UserBackend,
};
use crate::schema::{date_titles, deleted_dates, slots, users};
use crate::types::{DateTitle, DeletedDate, NewSlot, Slot, Upserted, User};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::{Connection, PgConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};
use uuid::Uuid;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        error!(%err, "Database query failed");
        StoreError::Database(err.to_string())
    }
}

#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    /// Connects and applies pending migrations.
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        let mut connection = PgConnection::establish(database_url)
            .map_err(|err| StoreError::Database(err.to_string()))?;

        let applied = connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|err| StoreError::Database(format!("Migrations failed: {err}")))?;
        if !applied.is_empty() {
            info!(count = applied.len(), "Applied database migrations");
        }

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, PgConnection>, StoreError> {
        self.connection.lock().map_err(|err| {
            error!(%err, "Database connection lock poisoned");
            StoreError::Database("Database connection unavailable".into())
        })
    }
}

impl SlotBackend for DatabaseInterface {
    fn slots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>, StoreError> {
        let mut connection = self.connection()?;
        let result = slots::table
            .filter(slots::date.ge(from))
            .filter(slots::date.lt(to))
            .order((slots::hour.asc(), slots::slot_number.asc()))
            .select(Slot::as_select())
            .load(&mut *connection)?;
        Ok(result)
    }

    fn insert_slots(&self, new_slots: &[NewSlot]) -> Result<usize, StoreError> {
        let mut connection = self.connection()?;
        let inserted = diesel::insert_into(slots::table)
            .values(new_slots)
            .on_conflict_do_nothing()
            .execute(&mut *connection)?;
        Ok(inserted)
    }

    fn toggle_slot(&self, id: Uuid) -> Result<Slot, StoreError> {
        let mut connection = self.connection()?;
        diesel::update(slots::table.find(id))
            .set(slots::is_available.eq(diesel::dsl::not(slots::is_available)))
            .returning(Slot::as_returning())
            .get_result(&mut *connection)
            .optional()?
            .ok_or_else(|| slot_not_found(id))
    }
}

impl DateTitleBackend for DatabaseInterface {
    fn date_titles(&self) -> Result<Vec<DateTitle>, StoreError> {
        let mut connection = self.connection()?;
        let result = date_titles::table
            .order(date_titles::date.asc())
            .select(DateTitle::as_select())
            .load(&mut *connection)?;
        Ok(result)
    }

    fn upsert_date_title(
        &self,
        date: NaiveDate,
        title: String,
    ) -> Result<Upserted<DateTitle>, StoreError> {
        let mut connection = self.connection()?;
        let upserted = connection.transaction::<_, diesel::result::Error, _>(|connection| {
            // A concurrent insert of the same date makes this one a no-op, so
            // exactly one writer reports the record as created.
            let inserted = diesel::insert_into(date_titles::table)
                .values(&DateTitle {
                    id: Uuid::new_v4(),
                    date,
                    title: title.clone(),
                })
                .on_conflict_do_nothing()
                .returning(DateTitle::as_returning())
                .get_result(connection)
                .optional()?;
            if let Some(record) = inserted {
                return Ok(Upserted {
                    record,
                    created: true,
                });
            }

            let record = diesel::update(date_titles::table.filter(date_titles::date.eq(date)))
                .set(date_titles::title.eq(&title))
                .returning(DateTitle::as_returning())
                .get_result(connection)?;
            Ok(Upserted {
                record,
                created: false,
            })
        })?;
        Ok(upserted)
    }
}

impl DeletedDateBackend for DatabaseInterface {
    fn deleted_dates(&self) -> Result<Vec<DeletedDate>, StoreError> {
        let mut connection = self.connection()?;
        let result = deleted_dates::table
            .order(deleted_dates::date.asc())
            .select(DeletedDate::as_select())
            .load(&mut *connection)?;
        Ok(result)
    }

    fn hide_date(&self, date: NaiveDate) -> Result<DeletedDate, StoreError> {
        let mut connection = self.connection()?;
        diesel::insert_into(deleted_dates::table)
            .values(&DeletedDate {
                id: Uuid::new_v4(),
                date,
            })
            .on_conflict_do_nothing()
            .returning(DeletedDate::as_returning())
            .get_result(&mut *connection)
            .optional()?
            .ok_or_else(|| date_already_hidden(date))
    }

    fn unhide_date(&self, date: NaiveDate) -> Result<(), StoreError> {
        let mut connection = self.connection()?;
        let removed = diesel::delete(deleted_dates::table.filter(deleted_dates::date.eq(date)))
            .execute(&mut *connection)?;

        match removed {
            0 => Err(date_not_hidden(date)),
            _ => Ok(()),
        }
    }
}

impl UserBackend for DatabaseInterface {
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let mut connection = self.connection()?;
        let user = users::table
            .filter(users::username.eq(username))
            .select(User::as_select())
            .first(&mut *connection)
            .optional()?;
        Ok(user)
    }

    fn replace_user(&self, user: User) -> Result<User, StoreError> {
        let mut connection = self.connection()?;
        let stored = connection.transaction::<_, diesel::result::Error, _>(|connection| {
            diesel::delete(users::table.filter(users::username.eq(&user.username)))
                .execute(connection)?;
            diesel::insert_into(users::table)
                .values(&user)
                .returning(User::as_returning())
                .get_result(connection)
        })?;
        Ok(stored)
    }
}
