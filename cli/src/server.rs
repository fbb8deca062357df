use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{
        Path, Query, Request, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::llm::{MealGenerator, generate_meal};
use macrolog_core::auth::{SESSION_TTL_DAYS, hash_password, verify_password};
use macrolog_core::models::{
    DailyLog, MacroNeeds, MealEntry, NewMeal, NewUserGoal, UpdateMeal, User, parse_entry_time,
    parse_log_date, validate_credentials, validate_goal, validate_macro_needs,
    validate_meal_entry, validate_meal_update, validate_new_meal,
};
use macrolog_core::service::{MAX_STATS_DAYS, MacroService, SaveAiMeal};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB
const SESSION_COOKIE: &str = "macrolog_session";
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<MacroService>>,
    generators: Arc<Vec<Box<dyn MealGenerator>>>,
}

impl AppState {
    fn new(service: MacroService, generators: Vec<Box<dyn MealGenerator>>) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            generators: Arc::new(generators),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MacroService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The authenticated caller, attached by `require_auth`.
#[derive(Clone)]
struct Session {
    user: User,
    token: String,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct SessionResponse {
    #[serde(flatten)]
    user: User,
    token: String,
}

#[derive(Deserialize)]
struct MealQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyLogQuery {
    date: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveDailyLogRequest {
    date: String,
    #[serde(default)]
    meal_entries: Vec<MealEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogMealRequest {
    date: Option<String>,
    meal_id: i64,
    time: Option<String>,
    servings: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMealRequest {
    meal_id: Option<i64>,
    time: Option<String>,
    servings: Option<f64>,
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeeklyStatsQuery {
    end_date: Option<String>,
    days: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiMealRequestBody {
    prompt: Option<String>,
    macro_needs: Option<MacroNeeds>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[allow(clippy::needless_pass_by_value)]
fn bad_request(err: anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

fn parse_date_param(date: Option<&str>) -> Result<NaiveDate, ApiError> {
    match date {
        None => Ok(Local::now().date_naive()),
        Some(d) => parse_log_date(d).map_err(bad_request),
    }
}

// --- Middleware ---

fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(token) = session_token(request.headers()) else {
        return ApiError::Unauthorized("Not authenticated".to_string()).into_response();
    };
    let lookup = {
        let svc = state.lock();
        svc.session_user(&token)
    };
    match lookup {
        Ok(Some(user)) => {
            request.extensions_mut().insert(Session { user, token });
            next.run(request).await
        }
        Ok(None) => {
            ApiError::Unauthorized("Session expired or invalid".to_string()).into_response()
        }
        Err(e) => ApiError::Internal(e).into_response(),
    }
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

fn session_cookie(token: &str, max_age: i64) -> Result<HeaderValue, ApiError> {
    let value =
        format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    Ok(HeaderValue::from_str(&value).context("invalid session cookie")?)
}

fn session_response(status: StatusCode, user: User, token: String) -> Result<Response, ApiError> {
    let cookie = session_cookie(&token, SESSION_TTL_DAYS * 24 * 60 * 60)?;
    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse { user, token }),
    )
        .into_response())
}

async fn hash_off_thread(password: String) -> Result<String, ApiError> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("password hashing task failed")??;
    Ok(hash)
}

// --- Auth handlers ---

async fn register(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let username = validate_credentials(&req.username, &req.password).map_err(bad_request)?;
    if state.lock().user_by_name(&username)?.is_some() {
        return Err(ApiError::Conflict("Username already exists".to_string()));
    }

    let hash = hash_off_thread(req.password).await?;

    let (user, token) = {
        let svc = state.lock();
        let Some(user) = svc.create_user(&username, &hash)? else {
            return Err(ApiError::Conflict("Username already exists".to_string()));
        };
        let token = svc.start_session(user.id)?;
        (user, token)
    };
    info!(user = %user.username, "Registered user");
    session_response(StatusCode::CREATED, user, token)
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let username = validate_credentials(&req.username, &req.password).map_err(bad_request)?;
    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());

    let user = state.lock().user_by_name(&username)?.ok_or_else(invalid)?;
    let stored = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&req.password, &stored))
        .await
        .context("password verification task failed")?;
    if !matches {
        warn!(user = %username, "Failed login");
        return Err(invalid());
    }

    let token = state.lock().start_session(user.id)?;
    session_response(StatusCode::OK, user, token)
}

async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, ApiError> {
    state.lock().end_session(&session.token)?;
    let cookie = session_cookie("", 0)?;
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "message": "Logged out" })),
    )
        .into_response())
}

async fn current_user(Extension(session): Extension<Session>) -> Json<User> {
    Json(session.user)
}

/// Account creation without starting a session.
async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = body?;
    let username = validate_credentials(&req.username, &req.password).map_err(bad_request)?;
    if state.lock().user_by_name(&username)?.is_some() {
        return Err(ApiError::Conflict("Username already exists".to_string()));
    }
    let hash = hash_off_thread(req.password).await?;
    let user = state
        .lock()
        .create_user(&username, &hash)?
        .ok_or_else(|| ApiError::Conflict("Username already exists".to_string()))?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": user.id, "username": user.username })),
    ))
}

// --- Goals ---

async fn get_goals(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let goals = state.lock().db().get_user_goals(session.user.id)?;
    let goals = goals.ok_or_else(|| ApiError::NotFound("No goals set".to_string()))?;
    Ok(Json(
        serde_json::to_value(goals).context("failed to serialize goals")?,
    ))
}

async fn set_goals(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<NewUserGoal>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = body?;
    validate_goal(req.protein_goal, req.carbs_goal, req.fat_goal).map_err(bad_request)?;
    let (goal, created) = state.lock().db().upsert_user_goals(session.user.id, &req)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let value = serde_json::to_value(goal).context("failed to serialize goals")?;
    Ok((status, Json(value)))
}

// --- Meals ---

async fn list_meals(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    query: Result<Query<MealQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query?;
    let svc = state.lock();
    let meals = match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => svc.db().search_meals(session.user.id, q)?,
        _ => svc.db().get_meals_by_user(session.user.id)?,
    };
    Ok(Json(
        serde_json::to_value(meals).context("failed to serialize meals")?,
    ))
}

async fn favorite_meals(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let meals = state.lock().db().get_favorite_meals(session.user.id)?;
    Ok(Json(
        serde_json::to_value(meals).context("failed to serialize meals")?,
    ))
}

fn meal_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Meal {id} not found"))
}

async fn get_meal(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = path?;
    let meal = state
        .lock()
        .db()
        .get_meal(session.user.id, id)?
        .ok_or_else(|| meal_not_found(id))?;
    Ok(Json(
        serde_json::to_value(meal).context("failed to serialize meal")?,
    ))
}

async fn create_meal(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<NewMeal>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = body?;
    validate_new_meal(&req).map_err(bad_request)?;
    let meal = state.lock().db().create_meal(session.user.id, &req)?;
    let value = serde_json::to_value(meal).context("failed to serialize meal")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn update_meal(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateMeal>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    if req.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }
    validate_meal_update(&req).map_err(bad_request)?;
    let meal = state
        .lock()
        .db()
        .update_meal(session.user.id, id, &req)?
        .ok_or_else(|| meal_not_found(id))?;
    Ok(Json(
        serde_json::to_value(meal).context("failed to serialize meal")?,
    ))
}

async fn delete_meal(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = path?;
    if state.lock().db().delete_meal(session.user.id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(meal_not_found(id))
    }
}

async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = path?;
    let meal = state
        .lock()
        .db()
        .toggle_favorite(session.user.id, id)?
        .ok_or_else(|| meal_not_found(id))?;
    Ok(Json(
        serde_json::to_value(meal).context("failed to serialize meal")?,
    ))
}

// --- Daily logs ---

fn log_json(log: &DailyLog) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(
        serde_json::to_value(log).context("failed to serialize daily log")?,
    ))
}

fn log_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Daily log {id} not found"))
}

fn entry_time(time: Option<&str>) -> Result<String, ApiError> {
    match time {
        Some(t) => {
            parse_entry_time(t).map_err(bad_request)?;
            Ok(t.to_string())
        }
        None => Ok(Local::now().format("%H:%M").to_string()),
    }
}

async fn get_daily_logs(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    query: Result<Query<DailyLogQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query?;
    let user_id = session.user.id;

    if let Some(date) = query.date.as_deref() {
        let date = parse_log_date(date).map_err(bad_request)?;
        let log = state.lock().db().get_daily_log(user_id, date)?;
        return Ok(Json(
            serde_json::to_value(log).context("failed to serialize daily log")?,
        ));
    }

    match (query.start_date.as_deref(), query.end_date.as_deref()) {
        (Some(start), Some(end)) => {
            let start = parse_log_date(start).map_err(bad_request)?;
            let end = parse_log_date(end).map_err(bad_request)?;
            if start > end {
                return Err(ApiError::BadRequest(
                    "startDate must not be after endDate".to_string(),
                ));
            }
            let logs = state
                .lock()
                .db()
                .get_daily_logs_by_date_range(user_id, start, end)?;
            Ok(Json(
                serde_json::to_value(logs).context("failed to serialize daily logs")?,
            ))
        }
        _ => Err(ApiError::BadRequest(
            "Provide either date or startDate and endDate".to_string(),
        )),
    }
}

/// Create the log for a date or replace its entries. Totals in the body are
/// ignored and recomputed.
async fn save_daily_log(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<SaveDailyLogRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = body?;
    let date = parse_log_date(&req.date).map_err(bad_request)?;
    for entry in &req.meal_entries {
        validate_meal_entry(entry).map_err(bad_request)?;
    }
    let (log, created) = state
        .lock()
        .db()
        .upsert_daily_log(session.user.id, date, &req.meal_entries)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, log_json(&log)?))
}

async fn log_meal_entry(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<LogMealRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = body?;
    let date = parse_date_param(req.date.as_deref())?;
    let time = entry_time(req.time.as_deref())?;
    let servings = req.servings.unwrap_or(1.0);
    if !servings.is_finite() || servings <= 0.0 {
        return Err(ApiError::BadRequest(
            "servings must be greater than 0".to_string(),
        ));
    }
    let log = state
        .lock()
        .log_meal(session.user.id, req.meal_id, date, &time, servings)?
        .ok_or_else(|| meal_not_found(req.meal_id))?;
    log_json(&log)
}

/// The entry's macros always come from the stored meal scaled by servings.
async fn add_meal_to_log(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<AddMealRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let meal_id = req
        .meal_id
        .ok_or_else(|| ApiError::BadRequest("mealId is required".to_string()))?;
    let time = entry_time(req.time.as_deref())?;
    let servings = req.servings.unwrap_or(1.0);

    let user_id = session.user.id;
    let svc = state.lock();
    if svc.db().get_daily_log_by_id(user_id, id)?.is_none() {
        return Err(log_not_found(id));
    }
    let meal = svc
        .db()
        .get_meal(user_id, meal_id)?
        .ok_or_else(|| meal_not_found(meal_id))?;
    let entry = MealEntry::from_meal(&meal, &time, servings);
    validate_meal_entry(&entry).map_err(bad_request)?;
    let log = svc
        .db()
        .add_meal_to_daily_log(user_id, id, entry)?
        .ok_or_else(|| log_not_found(id))?;
    log_json(&log)
}

async fn remove_meal_from_log(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path((id, index)) = path?;
    let user_id = session.user.id;
    let svc = state.lock();
    if svc.db().get_daily_log_by_id(user_id, id)?.is_none() {
        return Err(log_not_found(id));
    }
    let no_entry = || ApiError::NotFound(format!("No meal entry at index {index}"));
    let position = usize::try_from(index).map_err(|_| no_entry())?;
    let log = svc
        .db()
        .remove_meal_from_daily_log(user_id, id, position)?
        .ok_or_else(no_entry)?;
    log_json(&log)
}

// --- Progress ---

async fn get_progress(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query?;
    let date = parse_date_param(query.date.as_deref())?;
    let progress = state.lock().goal_progress(session.user.id, date)?;
    Ok(Json(
        serde_json::to_value(progress).context("failed to serialize progress")?,
    ))
}

async fn get_weekly_stats(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    query: Result<Query<WeeklyStatsQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query?;
    let end = parse_date_param(query.end_date.as_deref())?;
    let days = query.days.unwrap_or(7);
    if days == 0 || days > MAX_STATS_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_STATS_DAYS}"
        )));
    }
    let stats = state.lock().weekly_stats(session.user.id, end, days)?;
    Ok(Json(
        serde_json::to_value(stats).context("failed to serialize stats")?,
    ))
}

// --- AI meals ---

async fn create_ai_meal(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<AiMealRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(req) = body?;
    let prompt = req.prompt.as_deref().map(str::trim).unwrap_or_default();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("prompt is required".to_string()));
    }
    if let Some(needs) = &req.macro_needs {
        validate_macro_needs(needs).map_err(bad_request)?;
    }

    let (result, provider) =
        generate_meal(state.generators.as_slice(), prompt, req.macro_needs.as_ref()).await;

    let request = state
        .lock()
        .record_ai_meal(session.user.id, prompt, &result, provider)?;
    let value = serde_json::to_value(request).context("failed to serialize AI meal request")?;
    Ok((StatusCode::CREATED, Json(value)))
}

async fn list_ai_meals(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let requests = state
        .lock()
        .db()
        .get_ai_meal_requests_by_user(session.user.id)?;
    Ok(Json(
        serde_json::to_value(requests).context("failed to serialize AI meal requests")?,
    ))
}

async fn save_ai_meal(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Path(id) = path?;
    let outcome = state.lock().save_ai_meal(session.user.id, id)?;
    match outcome {
        SaveAiMeal::Saved(meal) => {
            let value = serde_json::to_value(meal).context("failed to serialize meal")?;
            Ok((StatusCode::CREATED, Json(value)))
        }
        SaveAiMeal::NotFound => Err(ApiError::NotFound(format!(
            "AI meal request {id} not found"
        ))),
        SaveAiMeal::AlreadySaved => Err(ApiError::Conflict(format!(
            "AI meal request {id} is already saved"
        ))),
        SaveAiMeal::NoResult => Err(ApiError::Conflict(format!(
            "AI meal request {id} has no result to save"
        ))),
    }
}

// --- Router ---

fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/users", post(create_user));

    let protected = Router::new()
        .route("/api/logout", post(logout))
        .route("/api/user", get(current_user))
        .route("/api/user-goals", get(get_goals).post(set_goals))
        .route("/api/meals", get(list_meals).post(create_meal))
        .route("/api/meals/favorites", get(favorite_meals))
        .route(
            "/api/meals/{id}",
            get(get_meal).put(update_meal).delete(delete_meal),
        )
        .route("/api/meals/{id}/toggle-favorite", post(toggle_favorite))
        .route("/api/daily-logs", get(get_daily_logs).post(save_daily_log))
        .route("/api/daily-logs/entries", post(log_meal_entry))
        .route("/api/daily-logs/{id}/add-meal", post(add_meal_to_log))
        .route(
            "/api/daily-logs/{id}/remove-meal/{index}",
            post(remove_meal_from_log),
        )
        .route("/api/progress", get(get_progress))
        .route("/api/stats/weekly", get(get_weekly_stats))
        .route("/api/ai-meals", get(list_ai_meals).post(create_ai_meal))
        .route("/api/ai-meals/{id}/save", post(save_ai_meal))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn spawn_session_purger(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = {
                let svc = state.lock();
                svc.purge_expired_sessions()
            };
            match purged {
                Ok(0) => {}
                Ok(n) => info!(count = n, "Purged expired sessions"),
                Err(e) => warn!(error = %format!("{e:#}"), "Failed to purge sessions"),
            }
        }
    });
}

pub async fn start_server(
    service: MacroService,
    generators: Vec<Box<dyn MealGenerator>>,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    let providers: Vec<&str> = generators.iter().map(|g| g.provider().as_str()).collect();
    let state = AppState::new(service, generators);
    spawn_session_purger(state.clone());

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(providers = ?providers, "Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(MacroService::new_in_memory().unwrap(), Vec::new())
    }

    // Users created here skip argon2 so the suite stays fast.
    fn login_as(state: &AppState, username: &str) -> String {
        let svc = state.lock();
        let user = svc.create_user(username, "not-a-real-hash").unwrap().unwrap();
        svc.start_session(user.id).unwrap()
    }

    fn get(uri: &str, token: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri)
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(
        uri: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::post(uri).header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn put_json(uri: &str, token: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::put(uri)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(
        app: &Router,
        request: axum::http::Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    async fn create_meal_via_api(app: &Router, token: &str, name: &str) -> i64 {
        let (status, meal) = send(
            app,
            post_json(
                "/api/meals",
                Some(token),
                &serde_json::json!({
                    "name": name, "protein": 30, "carbs": 20, "fat": 10, "mealType": "lunch"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        meal["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn missing_session_returns_401() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                axum::http::Request::get("/api/meals")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Not authenticated");
    }

    #[tokio::test]
    async fn unknown_token_returns_401() {
        let app = build_router(test_state());
        let (status, json) = send(&app, get("/api/meals", "bogus")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Session expired or invalid");
    }

    #[tokio::test]
    async fn bearer_and_cookie_sessions_work() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);

        let (status, user) = send(&app, get("/api/user", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["username"], "alice");
        assert!(user.get("passwordHash").is_none());

        let request = axum::http::Request::get("/api/user")
            .header("Cookie", format!("theme=dark; {SESSION_COOKIE}={token}"))
            .body(Body::empty())
            .unwrap();
        let (status, user) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["username"], "alice");
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                axum::http::Request::get("/api/meals")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn register_login_logout_flow() {
        let app = build_router(test_state());
        let creds = serde_json::json!({ "username": "bob", "password": "s3cret" });

        let response = app
            .clone()
            .oneshot(post_json("/api/register", None, &creds))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("macrolog_session="));
        assert!(cookie.contains("HttpOnly"));

        let (status, json) = send(&app, post_json("/api/register", None, &creds)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "Username already exists");

        let wrong = serde_json::json!({ "username": "bob", "password": "nope" });
        let (status, _) = send(&app, post_json("/api/login", None, &wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let unknown = serde_json::json!({ "username": "carol", "password": "x" });
        let (status, _) = send(&app, post_json("/api/login", None, &unknown)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = send(&app, post_json("/api/login", None, &creds)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["username"], "bob");
        let token = json["token"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            post_json("/api/logout", Some(token.as_str()), &serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, get("/api/user", &token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_rejects_blank_credentials() {
        let app = build_router(test_state());
        let (status, json) = send(
            &app,
            post_json(
                "/api/register",
                None,
                &serde_json::json!({ "username": " ", "password": "x" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Username"));
    }

    #[tokio::test]
    async fn create_user_endpoint() {
        let app = build_router(test_state());
        let body = serde_json::json!({ "username": "dave", "password": "pw" });
        let (status, json) = send(&app, post_json("/api/users", None, &body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["username"], "dave");
        assert!(json["id"].is_i64());

        let (status, _) = send(&app, post_json("/api/users", None, &body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_json_is_400_with_json_body() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);
        let request = axum::http::Request::post("/api/meals")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::from("{not json"))
            .unwrap();
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn goals_lifecycle() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);

        let (status, _) = send(&app, get("/api/user-goals", &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let body = serde_json::json!({ "proteinGoal": 160, "carbsGoal": 240, "fatGoal": 53 });
        let (status, json) = send(
            &app,
            post_json("/api/user-goals", Some(token.as_str()), &body),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["caloriesGoal"], 2077);

        let body = serde_json::json!({ "proteinGoal": 170, "carbsGoal": 240, "fatGoal": 53 });
        let (status, json) = send(
            &app,
            post_json("/api/user-goals", Some(token.as_str()), &body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["proteinGoal"], 170);

        let (status, json) = send(&app, get("/api/user-goals", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["proteinGoal"], 170);

        let bad = serde_json::json!({ "proteinGoal": -1, "carbsGoal": 0, "fatGoal": 0 });
        let (status, _) = send(
            &app,
            post_json("/api/user-goals", Some(token.as_str()), &bad),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn meal_crud() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);

        let id = create_meal_via_api(&app, &token, "Chicken Wrap").await;

        let (status, meal) = send(&app, get(&format!("/api/meals/{id}"), &token)).await;
        assert_eq!(status, StatusCode::OK);
        // 30*4 + 20*4 + 10*9
        assert_eq!(meal["calories"], 290.0);
        assert_eq!(meal["isAIGenerated"], false);

        let (_, found) = send(&app, get("/api/meals?q=wrap", &token)).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        let (_, none) = send(&app, get("/api/meals?q=pizza", &token)).await;
        assert!(none.as_array().unwrap().is_empty());

        let (status, toggled) = send(
            &app,
            post_json(
                &format!("/api/meals/{id}/toggle-favorite"),
                Some(token.as_str()),
                &serde_json::json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggled["isFavorite"], true);
        let (_, favorites) = send(&app, get("/api/meals/favorites", &token)).await;
        assert_eq!(favorites.as_array().unwrap().len(), 1);

        let (status, updated) = send(
            &app,
            put_json(
                &format!("/api/meals/{id}"),
                &token,
                &serde_json::json!({ "name": "Turkey Wrap" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], "Turkey Wrap");
        assert_eq!(updated["id"], id);

        let (status, _) = send(
            &app,
            put_json(&format!("/api/meals/{id}"), &token, &serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let delete = axum::http::Request::delete(format!("/api/meals/{id}"))
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_null());

        let (status, _) = send(&app, get(&format!("/api/meals/{id}"), &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_meal_is_400() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);
        let body = serde_json::json!({
            "name": "Mystery", "protein": 1, "carbs": 1, "fat": 1, "mealType": "brunch"
        });
        let (status, json) = send(&app, post_json("/api/meals", Some(token.as_str()), &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Invalid meal type"));
    }

    #[tokio::test]
    async fn other_users_meals_are_not_found() {
        let state = test_state();
        let alice = login_as(&state, "alice");
        let bob = login_as(&state, "bob");
        let app = build_router(state);

        let id = create_meal_via_api(&app, &alice, "Private").await;
        let (status, _) = send(&app, get(&format!("/api/meals/{id}"), &bob)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, list) = send(&app, get("/api/meals", &bob)).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn daily_log_totals_follow_entries() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);
        let meal_id = create_meal_via_api(&app, &token, "Chicken Wrap").await;

        let (status, json) = send(&app, get("/api/daily-logs?date=2024-06-15", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.is_null());

        // Client-sent totals are ignored
        let body = serde_json::json!({
            "date": "2024-06-15",
            "mealEntries": [{
                "mealId": meal_id, "time": "08:00", "servings": 1,
                "protein": 10, "carbs": 10, "fat": 10, "calories": 170
            }],
            "totalProtein": 999, "totalCalories": 99999
        });
        let (status, log) = send(
            &app,
            post_json("/api/daily-logs", Some(token.as_str()), &body),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(log["totalProtein"], 10.0);
        assert_eq!(log["totalCalories"], 170.0);
        let log_id = log["id"].as_i64().unwrap();

        let (status, log) = send(
            &app,
            post_json(
                &format!("/api/daily-logs/{log_id}/add-meal"),
                Some(token.as_str()),
                &serde_json::json!({ "mealId": meal_id, "time": "12:30", "servings": 2 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(log["mealEntries"].as_array().unwrap().len(), 2);
        // 10 + 2 * 30
        assert_eq!(log["totalProtein"], 70.0);
        assert_eq!(log["totalCalories"], 750.0);

        let (status, log) = send(
            &app,
            post_json(
                &format!("/api/daily-logs/{log_id}/remove-meal/0"),
                Some(token.as_str()),
                &serde_json::json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(log["mealEntries"].as_array().unwrap().len(), 1);
        assert_eq!(log["totalProtein"], 60.0);
        assert_eq!(log["totalCalories"], 580.0);

        let (status, _) = send(
            &app,
            post_json(
                &format!("/api/daily-logs/{log_id}/remove-meal/5"),
                Some(token.as_str()),
                &serde_json::json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = send(
            &app,
            post_json(
                &format!("/api/daily-logs/{log_id}/remove-meal/-1"),
                Some(token.as_str()),
                &serde_json::json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "No meal entry at index -1");

        // Upsert replaces the entries of the same date
        let body = serde_json::json!({ "date": "2024-06-15", "mealEntries": [] });
        let (status, log) = send(
            &app,
            post_json("/api/daily-logs", Some(token.as_str()), &body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(log["id"], log_id);
        assert_eq!(log["totalCalories"], 0.0);
    }

    #[tokio::test]
    async fn add_meal_validation() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);
        let meal_id = create_meal_via_api(&app, &token, "Chicken Wrap").await;

        let (status, json) = send(
            &app,
            post_json(
                "/api/daily-logs/1/add-meal",
                Some(token.as_str()),
                &serde_json::json!({ "time": "08:00" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "mealId is required");

        let (status, _) = send(
            &app,
            post_json(
                "/api/daily-logs/42/add-meal",
                Some(token.as_str()),
                &serde_json::json!({ "mealId": meal_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            post_json(
                "/api/daily-logs/42/remove-meal/0",
                Some(token.as_str()),
                &serde_json::json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn daily_log_queries() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);
        for date in ["2024-06-10", "2024-06-12", "2024-06-20"] {
            let body = serde_json::json!({ "date": date });
            let (status, _) = send(
                &app,
                post_json("/api/daily-logs", Some(token.as_str()), &body),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, logs) = send(
            &app,
            get("/api/daily-logs?startDate=2024-06-10&endDate=2024-06-12", &token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let dates: Vec<&str> = logs
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["date"].as_str().unwrap())
            .collect();
        assert_eq!(dates, vec!["2024-06-10", "2024-06-12"]);

        let (status, _) = send(&app, get("/api/daily-logs", &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, get("/api/daily-logs?startDate=2024-06-10", &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, get("/api/daily-logs?date=June", &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(
            &app,
            get("/api/daily-logs?startDate=2024-06-12&endDate=2024-06-10", &token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn log_entry_by_date_and_progress() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);
        let meal_id = create_meal_via_api(&app, &token, "Chicken Wrap").await;
        let goals = serde_json::json!({ "proteinGoal": 120, "carbsGoal": 200, "fatGoal": 50 });
        send(&app, post_json("/api/user-goals", Some(token.as_str()), &goals)).await;

        let entry = serde_json::json!({ "date": "2024-06-15", "mealId": meal_id, "time": "12:00" });
        let (status, log) = send(
            &app,
            post_json("/api/daily-logs/entries", Some(token.as_str()), &entry),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let log_id = log["id"].clone();
        let (_, log) = send(
            &app,
            post_json("/api/daily-logs/entries", Some(token.as_str()), &entry),
        )
        .await;
        assert_eq!(log["id"], log_id);
        assert_eq!(log["totalProtein"], 60.0);

        let missing = serde_json::json!({ "date": "2024-06-15", "mealId": 999 });
        let (status, _) = send(
            &app,
            post_json("/api/daily-logs/entries", Some(token.as_str()), &missing),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, progress) = send(&app, get("/api/progress?date=2024-06-15", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress["percent"]["protein"], 50);
        assert_eq!(progress["remaining"]["protein"], 60.0);
        assert_eq!(progress["remaining"]["carbs"], 160.0);

        let (status, stats) = send(
            &app,
            get("/api/stats/weekly?endDate=2024-06-16&days=7", &token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["days"].as_array().unwrap().len(), 7);
        assert_eq!(stats["loggedDays"], 1);
        assert_eq!(stats["totalCalories"], 580.0);

        let (status, _) = send(&app, get("/api/stats/weekly?days=0", &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            get("/api/stats/weekly?endDate=-262143-01-03&days=7", &token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ai_meal_flow_uses_fallback_without_providers() {
        let state = test_state();
        let token = login_as(&state, "alice");
        let app = build_router(state);

        let (status, json) = send(
            &app,
            post_json("/api/ai-meals", Some(token.as_str()), &serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "prompt is required");

        let negative = serde_json::json!({
            "prompt": "salad",
            "macroNeeds": { "protein": -5, "carbs": 40, "fat": 20 }
        });
        let (status, json) = send(
            &app,
            post_json("/api/ai-meals", Some(token.as_str()), &negative),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "protein must be a non-negative number");

        let body = serde_json::json!({
            "prompt": "a big chicken dinner",
            "macroNeeds": { "protein": 50, "carbs": 40, "fat": 20 }
        });
        let (status, request) = send(
            &app,
            post_json("/api/ai-meals", Some(token.as_str()), &body),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(request["provider"], "fallback");
        assert_eq!(request["saved"], false);
        assert_eq!(request["result"]["protein"], 50.0);
        assert_eq!(request["result"]["mealType"], "dinner");
        let id = request["id"].as_i64().unwrap();

        let (_, list) = send(&app, get("/api/ai-meals", &token)).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let save_uri = format!("/api/ai-meals/{id}/save");
        let (status, meal) = send(
            &app,
            post_json(&save_uri, Some(token.as_str()), &serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(meal["isAIGenerated"], true);
        assert_eq!(meal["isFavorite"], false);
        assert_eq!(meal["name"], "Grilled chicken with vegetables");

        let (status, _) = send(
            &app,
            post_json(&save_uri, Some(token.as_str()), &serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            post_json("/api/ai-meals/999/save", Some(token.as_str()), &serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, meals) = send(&app, get("/api/meals", &token)).await;
        assert_eq!(meals.as_array().unwrap().len(), 1);
    }
}
