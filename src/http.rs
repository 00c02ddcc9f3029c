use crate::auth::{authenticate, require_admin, LoginResponse, TokenIssuer};
use crate::backend::Backend;
use crate::calendar::parse_day;
use crate::configuration::Configuration;
use crate::error::AppError;
use crate::slot_manager;
use crate::types::{DateTitle, DeletedDate, Slot};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::{header, request::Parts, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::{
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref DATE_KEY: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
}

#[derive(Clone)]
pub struct AppState<T: Backend> {
    pub backend: T,
    pub tokens: TokenIssuer,
    pub frontend_path: Arc<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DateTitleRequest {
    #[validate(regex(path = *DATE_KEY, message = "date must be YYYY-MM-DD"))]
    pub date: String,
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DateRequest {
    #[validate(regex(path = *DATE_KEY, message = "date must be YYYY-MM-DD"))]
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    #[validate(regex(path = *DATE_KEY, message = "startDate must be YYYY-MM-DD"))]
    pub start_date: String,
}

#[derive(Debug, Deserialize)]
struct DayQuery {
    date: Option<String>,
}

/// JSON body that has passed its `Validate` rules. Malformed or invalid bodies
/// are rejected with 400.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        value
            .validate()
            .map_err(|errors| AppError::Validation(errors.to_string()))?;
        Ok(Self(value))
    }
}

/// Path parameters that failed to parse are rejected with 400 and the usual
/// error body.
pub struct ValidPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub fn create_app<T: Backend, C: Configuration>(backend: T, configuration: &C) -> Router {
    let state = AppState {
        backend,
        tokens: TokenIssuer::new(&configuration.jwt_secret()),
        frontend_path: Arc::new(configuration.frontend_path()),
    };

    let public = Router::new()
        .route("/", get(get_frontend::<T>))
        .route("/frontend", get(get_frontend::<T>))
        .route("/health", get(health))
        .route("/api/auth/login", post(login::<T>))
        .route("/api/slots", get(get_day_slots::<T>))
        .route("/api/slots/week/{date}", get(get_week_slots::<T>))
        .route("/api/date-titles", get(get_date_titles::<T>))
        .route("/api/deleted-dates", get(get_deleted_dates::<T>));

    let admin = Router::new()
        .route("/api/slots/initialize", post(initialize_slots::<T>))
        .route("/api/slots/{id}", patch(toggle_slot::<T>))
        .route("/api/date-titles", post(upsert_date_title::<T>))
        .route("/api/deleted-dates", post(hide_date::<T>))
        .route("/api/deleted-dates/{date}", delete(restore_date::<T>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth::<T>,
        ));

    Router::new()
        .merge(public)
        .merge(admin)
        .fallback(get_frontend::<T>)
        .with_state(state)
        .layer(cors_layer(&configuration.allowed_origins()))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(%origin, %err, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Admits requests carrying a valid bearer token of an admin account.
async fn admin_auth<T: Backend>(
    State(state): State<AppState<T>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    let claims = state.tokens.verify(token)?;
    require_admin(&claims)?;
    Ok(next.run(request).await)
}

async fn login<T: Backend>(
    State(state): State<AppState<T>>,
    ValidJson(credentials): ValidJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let response = authenticate(
        &state.backend,
        &state.tokens,
        &credentials.username,
        &credentials.password,
    )?;
    Ok(Json(response))
}

async fn get_week_slots<T: Backend>(
    State(state): State<AppState<T>>,
    ValidPath(date): ValidPath<String>,
) -> Result<Json<Vec<Slot>>, AppError> {
    let day = parse_day(&date)?;
    Ok(Json(slot_manager::week_slots(&state.backend, day)?))
}

async fn get_day_slots<T: Backend>(
    State(state): State<AppState<T>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Slot>>, AppError> {
    let date = query
        .date
        .filter(|date| !date.is_empty())
        .ok_or_else(|| AppError::Validation("Missing date parameter".into()))?;
    let day = parse_day(&date)?;
    Ok(Json(slot_manager::day_slots(&state.backend, day)?))
}

async fn toggle_slot<T: Backend>(
    State(state): State<AppState<T>>,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Slot>, AppError> {
    Ok(Json(slot_manager::toggle_slot(&state.backend, id)?))
}

async fn initialize_slots<T: Backend>(
    State(state): State<AppState<T>>,
    ValidJson(request): ValidJson<InitializeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let day = parse_day(&request.start_date)?;
    let created = slot_manager::initialize_day(&state.backend, day)?;
    Ok(Json(json!({
        "message": "Slots initialized successfully",
        "created": created,
    })))
}

async fn get_date_titles<T: Backend>(
    State(state): State<AppState<T>>,
) -> Result<Json<Vec<DateTitle>>, AppError> {
    Ok(Json(state.backend.date_titles()?))
}

async fn upsert_date_title<T: Backend>(
    State(state): State<AppState<T>>,
    ValidJson(request): ValidJson<DateTitleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let date = parse_day(&request.date)?;
    let upserted = state.backend.upsert_date_title(date, request.title)?;
    info!(%date, created = upserted.created, "Saved date title");

    let status = match upserted.created {
        true => StatusCode::CREATED,
        false => StatusCode::OK,
    };
    Ok((status, Json(upserted.record)))
}

async fn get_deleted_dates<T: Backend>(
    State(state): State<AppState<T>>,
) -> Result<Json<Vec<NaiveDate>>, AppError> {
    let dates = state
        .backend
        .deleted_dates()?
        .into_iter()
        .map(|deleted| deleted.date)
        .collect();
    Ok(Json(dates))
}

async fn hide_date<T: Backend>(
    State(state): State<AppState<T>>,
    ValidJson(request): ValidJson<DateRequest>,
) -> Result<(StatusCode, Json<DeletedDate>), AppError> {
    let date = parse_day(&request.date)?;
    let deleted = state.backend.hide_date(date)?;
    info!(%date, "Hid date");
    Ok((StatusCode::CREATED, Json(deleted)))
}

async fn restore_date<T: Backend>(
    State(state): State<AppState<T>>,
    ValidPath(date): ValidPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let date = parse_day(&date)?;
    state.backend.unhide_date(date)?;
    info!(%date, "Restored date");
    Ok(Json(json!({ "msg": "Date restored successfully" })))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn get_frontend<T: Backend>(
    State(state): State<AppState<T>>,
) -> Result<Html<String>, AppError> {
    match fs::read_to_string(state.frontend_path.as_ref()).await {
        Ok(contents) => Ok(Html(contents)),
        Err(err) => {
            warn!(path = %state.frontend_path.display(), %err, "Frontend not available");
            Err(AppError::NotFound("Frontend not available".into()))
        }
    }
}
