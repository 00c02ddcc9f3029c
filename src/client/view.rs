use super::retry::{retrying_fetch, CancelToken, RetryError, RetryPolicy};
use super::session::{Session, SessionError, SessionStore};
use super::{ApiClient, FetchError};
use crate::calendar::{date_key, slot_label, sunday_of_week, upcoming_sundays};
use crate::types::{DateTitle, DeletedDate, PublicUser, Slot};
use chrono::NaiveDate;
use std::fmt::Write;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Could not load calendar after {attempts} attempts: {last}")]
    LoadFailed { attempts: u32, last: FetchError },
    #[error("Session expired, please log in again")]
    ReauthenticationRequired,
    #[error("Cancelled")]
    Cancelled,
    #[error("Not logged in")]
    NotLoggedIn,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// One Sunday as the client shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekView {
    pub sunday: NaiveDate,
    pub title: Option<String>,
    pub hidden: bool,
    pub slots: Vec<Slot>,
}

impl WeekView {
    /// Replaces the slot with the server's copy. Returns false when the slot
    /// is not part of this week.
    pub fn apply_update(&mut self, slot: Slot) -> bool {
        match self.slots.iter_mut().find(|existing| existing.id == slot.id) {
            Some(existing) => {
                *existing = slot;
                true
            }
            None => false,
        }
    }

    pub fn render(&self, show_ids: bool) -> String {
        let mut out = format!("Sunday {}", date_key(self.sunday));
        if let Some(title) = &self.title {
            let _ = write!(out, ": {title}");
        }
        if self.hidden {
            out.push_str(" [hidden]");
        }
        out.push('\n');

        for slot in &self.slots {
            let state = match slot.is_available {
                true => "Available",
                false => "Unavailable",
            };
            let _ = write!(out, "{}  {state}", slot_label(slot.hour, slot.slot_number));
            if show_ids {
                let _ = write!(out, "  {}", slot.id);
            }
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingSunday {
    pub date: NaiveDate,
    pub title: Option<String>,
    pub hidden: bool,
}

/// Calendar as seen by a visitor or, with a session store, by the admin.
pub struct CalendarView {
    client: ApiClient,
    policy: RetryPolicy,
    sessions: Option<SessionStore>,
}

impl CalendarView {
    pub fn public(client: ApiClient) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            sessions: None,
        }
    }

    pub fn admin(client: ApiClient, sessions: SessionStore) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            sessions: Some(sessions),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<PublicUser, ViewError> {
        let sessions = self.sessions.as_ref().ok_or(ViewError::NotLoggedIn)?;
        let response = self.client.login(username, password).await?;
        sessions.save(&Session {
            token: response.token,
            user: response.user.clone(),
        })?;
        info!(username = %response.user.username, "Logged in");
        Ok(response.user)
    }

    pub fn logout(&self) -> Result<(), ViewError> {
        if let Some(sessions) = &self.sessions {
            sessions.clear()?;
        }
        Ok(())
    }

    /// Token for admin calls. Public views send none.
    fn token(&self) -> Result<Option<String>, ViewError> {
        match &self.sessions {
            None => Ok(None),
            Some(sessions) => match sessions.load()? {
                Some(session) => Ok(Some(session.token)),
                None => Err(ViewError::NotLoggedIn),
            },
        }
    }

    fn admin_token(&self) -> Result<String, ViewError> {
        self.token()?.ok_or(ViewError::NotLoggedIn)
    }

    /// A rejected credential ends the session.
    fn settle(&self, err: FetchError) -> ViewError {
        match (err, &self.sessions) {
            (FetchError::Unauthorized, Some(sessions)) => {
                warn!("Server rejected the session, clearing it");
                if let Err(err) = sessions.clear() {
                    return err.into();
                }
                ViewError::ReauthenticationRequired
            }
            (err, _) => err.into(),
        }
    }

    fn settle_retry(&self, err: RetryError<FetchError>) -> ViewError {
        match err {
            RetryError::Exhausted { attempts, last } => ViewError::LoadFailed { attempts, last },
            RetryError::Aborted(err) => self.settle(err),
            RetryError::Cancelled => ViewError::Cancelled,
        }
    }

    /// Loads the week containing `day` together with its title and
    /// visibility, retrying the whole read as one unit.
    pub async fn load_week(
        &self,
        day: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<WeekView, ViewError> {
        let sunday = sunday_of_week(day);
        let token = self.token()?;
        let token = token.as_deref();
        let client = &self.client;

        let fetched = retrying_fetch(self.policy, cancel, move || async move {
            futures::try_join!(
                client.week_slots(sunday, token),
                client.date_titles(token),
                client.deleted_dates(token),
            )
        })
        .await;
        let (slots, titles, hidden) = fetched.map_err(|err| self.settle_retry(err))?;

        Ok(WeekView {
            sunday,
            title: title_for(&titles, sunday),
            hidden: hidden.contains(&sunday),
            slots,
        })
    }

    /// The next `count` Sundays from `from`. Hidden dates are only listed for
    /// the admin.
    pub async fn upcoming(
        &self,
        from: NaiveDate,
        count: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<UpcomingSunday>, ViewError> {
        let token = self.token()?;
        let token = token.as_deref();
        let client = &self.client;

        let fetched = retrying_fetch(self.policy, cancel, move || async move {
            futures::try_join!(client.date_titles(token), client.deleted_dates(token))
        })
        .await;
        let (titles, hidden) = fetched.map_err(|err| self.settle_retry(err))?;

        let show_hidden = self.sessions.is_some();
        Ok(upcoming_sundays(from, count)
            .into_iter()
            .map(|date| UpcomingSunday {
                date,
                title: title_for(&titles, date),
                hidden: hidden.contains(&date),
            })
            .filter(|sunday| show_hidden || !sunday.hidden)
            .collect())
    }

    /// Flips one slot and puts the server's record into `week`.
    pub async fn toggle(&self, week: &mut WeekView, id: Uuid) -> Result<Slot, ViewError> {
        let slot = self.toggle_slot(id).await?;
        if !week.apply_update(slot.clone()) {
            warn!(%id, sunday = %week.sunday, "Toggled slot is not part of the shown week");
        }
        Ok(slot)
    }

    pub async fn toggle_slot(&self, id: Uuid) -> Result<Slot, ViewError> {
        let token = self.admin_token()?;
        self.client
            .toggle_slot(id, &token)
            .await
            .map_err(|err| self.settle(err))
    }

    pub async fn set_title(&self, day: NaiveDate, title: &str) -> Result<DateTitle, ViewError> {
        let token = self.admin_token()?;
        self.client
            .set_date_title(day, title, &token)
            .await
            .map_err(|err| self.settle(err))
    }

    pub async fn hide(&self, day: NaiveDate) -> Result<DeletedDate, ViewError> {
        let token = self.admin_token()?;
        self.client
            .hide_date(day, &token)
            .await
            .map_err(|err| self.settle(err))
    }

    pub async fn restore(&self, day: NaiveDate) -> Result<(), ViewError> {
        let token = self.admin_token()?;
        self.client
            .restore_date(day, &token)
            .await
            .map_err(|err| self.settle(err))
    }
}

fn title_for(titles: &[DateTitle], day: NaiveDate) -> Option<String> {
    titles
        .iter()
        .find(|title| title.date == day)
        .map(|title| title.title.clone())
}
