//! Typed client for the calendar API.

pub mod retry;
pub mod session;
pub mod view;

use crate::auth::LoginResponse;
use crate::calendar::date_key;
use crate::types::{DateTitle, DeletedDate, Slot};
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, StatusCode};
use retry::Retryable;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Request failed with {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Unauthorized)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, FetchError> {
        let request = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }));
        send(request).await
    }

    /// The 32 slots of the week containing `day`. Passing a token is optional,
    /// the route is public.
    pub async fn week_slots(
        &self,
        day: NaiveDate,
        token: Option<&str>,
    ) -> Result<Vec<Slot>, FetchError> {
        let request = self
            .http
            .get(self.url(&format!("/api/slots/week/{}", date_key(day))));
        send(authorized(request, token)).await
    }

    pub async fn date_titles(&self, token: Option<&str>) -> Result<Vec<DateTitle>, FetchError> {
        send(authorized(self.http.get(self.url("/api/date-titles")), token)).await
    }

    pub async fn deleted_dates(&self, token: Option<&str>) -> Result<Vec<NaiveDate>, FetchError> {
        send(authorized(self.http.get(self.url("/api/deleted-dates")), token)).await
    }

    pub async fn toggle_slot(&self, id: Uuid, token: &str) -> Result<Slot, FetchError> {
        let request = self
            .http
            .patch(self.url(&format!("/api/slots/{id}")))
            .bearer_auth(token);
        send(request).await
    }

    pub async fn set_date_title(
        &self,
        day: NaiveDate,
        title: &str,
        token: &str,
    ) -> Result<DateTitle, FetchError> {
        let request = self
            .http
            .post(self.url("/api/date-titles"))
            .bearer_auth(token)
            .json(&json!({ "date": date_key(day), "title": title }));
        send(request).await
    }

    pub async fn hide_date(&self, day: NaiveDate, token: &str) -> Result<DeletedDate, FetchError> {
        let request = self
            .http
            .post(self.url("/api/deleted-dates"))
            .bearer_auth(token)
            .json(&json!({ "date": date_key(day) }));
        send(request).await
    }

    pub async fn restore_date(&self, day: NaiveDate, token: &str) -> Result<(), FetchError> {
        let request = self
            .http
            .delete(self.url(&format!("/api/deleted-dates/{}", date_key(day))))
            .bearer_auth(token);
        send::<serde_json::Value>(request).await?;
        Ok(())
    }
}

fn authorized(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, FetchError> {
    let response = request.send().await?;
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(FetchError::Unauthorized);
    }
    if !status.is_success() {
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
        };
        return Err(FetchError::Status { status, message });
    }
    Ok(response.json().await?)
}
