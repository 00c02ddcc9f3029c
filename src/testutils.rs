use crate::auth::TokenIssuer;
use crate::backend::{
    Backend, DateTitleBackend, DeletedDateBackend, SlotBackend, StoreError, UserBackend,
};
use crate::configuration::Configuration;
use crate::http::create_app;
use crate::types::{DateTitle, DeletedDate, NewSlot, Slot, Upserted, User};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret";

#[derive(Clone)]
pub struct TestConfiguration {
    pub frontend_path: PathBuf,
}

impl Default for TestConfiguration {
    fn default() -> Self {
        Self {
            frontend_path: PathBuf::from("does/not/exist/index.html"),
        }
    }
}

impl Configuration for TestConfiguration {
    fn port(&self) -> String {
        "0".into()
    }

    fn database_url(&self) -> Option<String> {
        None
    }

    fn jwt_secret(&self) -> String {
        TEST_SECRET.into()
    }

    fn allowed_origins(&self) -> Vec<String> {
        vec![]
    }

    fn frontend_path(&self) -> PathBuf {
        self.frontend_path.clone()
    }

    fn admin_username(&self) -> String {
        "admin".into()
    }

    fn admin_password(&self) -> Option<String> {
        None
    }

    fn api_url(&self) -> String {
        "http://127.0.0.1:0".into()
    }

    fn session_file(&self) -> PathBuf {
        PathBuf::from("does/not/exist/session.json")
    }
}

/// Serves the API on an ephemeral port and returns its base URL.
pub async fn spawn_app<T: Backend>(backend: T) -> (String, JoinHandle<()>) {
    spawn_app_with(backend, &TestConfiguration::default()).await
}

pub async fn spawn_app_with<T: Backend>(
    backend: T,
    configuration: &TestConfiguration,
) -> (String, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    let app = create_app(backend, configuration);
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (address, server)
}

fn token_for<T: UserBackend>(backend: &T, username: &str, is_admin: bool) -> String {
    // Tokens are issued directly, so no password hash is needed.
    let user = backend
        .replace_user(User {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: String::new(),
            is_admin,
        })
        .unwrap();
    TokenIssuer::new(TEST_SECRET).issue(&user).unwrap()
}

pub fn admin_token<T: UserBackend>(backend: &T) -> String {
    token_for(backend, "test-admin", true)
}

pub fn user_token<T: UserBackend>(backend: &T) -> String {
    token_for(backend, "test-user", false)
}

/// Backend whose every operation fails like an unreachable database.
#[derive(Clone)]
pub struct FailingBackend;

fn failure<T>() -> Result<T, StoreError> {
    Err(StoreError::Database("Supposed to fail".into()))
}

impl SlotBackend for FailingBackend {
    fn slots_between(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Slot>, StoreError> {
        failure()
    }

    fn insert_slots(&self, _slots: &[NewSlot]) -> Result<usize, StoreError> {
        failure()
    }

    fn toggle_slot(&self, _id: Uuid) -> Result<Slot, StoreError> {
        failure()
    }
}

impl DateTitleBackend for FailingBackend {
    fn date_titles(&self) -> Result<Vec<DateTitle>, StoreError> {
        failure()
    }

    fn upsert_date_title(
        &self,
        _date: NaiveDate,
        _title: String,
    ) -> Result<Upserted<DateTitle>, StoreError> {
        failure()
    }
}

impl DeletedDateBackend for FailingBackend {
    fn deleted_dates(&self) -> Result<Vec<DeletedDate>, StoreError> {
        failure()
    }

    fn hide_date(&self, _date: NaiveDate) -> Result<DeletedDate, StoreError> {
        failure()
    }

    fn unhide_date(&self, _date: NaiveDate) -> Result<(), StoreError> {
        failure()
    }
}

impl UserBackend for FailingBackend {
    fn user_by_username(&self, _username: &str) -> Result<Option<User>, StoreError> {
        failure()
    }

    fn replace_user(&self, _user: User) -> Result<User, StoreError> {
        failure()
    }
}
