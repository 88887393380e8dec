use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use platelog_core::analyzer::{ImagePayload, MealAnalyzer, MealInput};
use platelog_core::error::{ConfigError, IngestionError};
use platelog_core::models::{
    DATE_FORMAT, Dashboard, DailySummary, FoodEntry, GoalTargets, HistoryDay, MealFields,
    MealSlot, Profile, WaterEntry, WeightEntry,
};
use platelog_core::pipeline::SessionContext;
use platelog_core::service::NutritionService;
use platelog_core::user::UserId;

use crate::config::API_KEY_VAR;

const BODY_LIMIT: usize = 20 * 1024 * 1024; // 20 MB, room for a phone photo in base64
const MAX_HISTORY_DAYS: u32 = 366;

type SharedSession = Arc<Mutex<SessionContext>>;

#[derive(Clone)]
struct AppState {
    service: Arc<NutritionService>,
    analyzer: Option<Arc<dyn MealAnalyzer>>,
    /// One session per user. Holding a user's session lock also serializes that user's writes.
    sessions: Arc<Mutex<HashMap<UserId, SharedSession>>>,
    api_key: Option<String>,
}

impl AppState {
    fn session(&self, user: &UserId) -> SharedSession {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SessionContext::new(user.clone()))))
            .clone()
    }
}

fn lock_session(session: &SharedSession) -> std::sync::MutexGuard<'_, SessionContext> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateUserRequest {
    name: String,
}

#[derive(Serialize)]
struct UserResponse {
    name: String,
    user_id: UserId,
}

#[derive(Deserialize)]
struct AnalyzeMealRequest {
    description: Option<String>,
    image_base64: Option<String>,
    image_mime_type: Option<String>,
}

#[derive(Deserialize)]
struct ManualMealRequest {
    name: String,
    calories: f64,
    #[serde(default)]
    protein_g: f64,
    #[serde(default)]
    carbs_g: f64,
    #[serde(default)]
    fat_g: f64,
    meal_slot: Option<String>,
}

#[derive(Deserialize)]
struct CreateWaterRequest {
    volume_ml: f64,
    date: Option<String>,
}

#[derive(Deserialize)]
struct CreateWeightRequest {
    weight_kg: f64,
    date: Option<String>,
}

#[derive(Deserialize)]
struct BurnRequest {
    kcal: i64,
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    days: Option<u32>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct WaterDay {
    date: NaiveDate,
    total_ml: f64,
    entries: Vec<WaterEntry>,
}

#[derive(Serialize)]
struct BurnResponse {
    burned_kcal: i64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// The AI service (or its credential) is not available.
    Unavailable(String),
    /// The AI service answered with something unusable.
    BadGateway(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "internal server error");
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

impl From<IngestionError> for ApiError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::ServiceUnavailable(e) => Self::Unavailable(e.to_string()),
            IngestionError::InvalidResponse(e) => Self::BadGateway(e.to_string()),
            IngestionError::Storage(e) => Self::Internal(e),
            e @ IngestionError::WrongUser { .. } => Self::Internal(anyhow::Error::new(e)),
        }
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
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

// --- Helpers ---

/// Map a path segment (display name or identifier) to a registered user.
fn resolve_user(state: &AppState, name: &str) -> Result<UserId, ApiError> {
    let id = UserId::from_display_name(name).map_err(|e| bad_request(&e))?;
    let known = state
        .service
        .list_users()
        .iter()
        .any(|n| UserId::from_display_name(n).is_ok_and(|other| other == id));
    if known {
        Ok(id)
    } else {
        Err(ApiError::NotFound(format!("Unknown user '{name}'")))
    }
}

fn parse_date(state: &AppState, raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    match raw {
        None => Ok(state.service.today()),
        Some(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map_err(|_| ApiError::BadRequest(format!("Invalid date '{s}'. Use YYYY-MM-DD"))),
    }
}

// --- User handlers ---

async fn list_users(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.service.list_users())
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user_id = state
        .service
        .register_user(&req.name)
        .map_err(|e| bad_request(&e))?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            name: req.name.trim().to_string(),
            user_id,
        }),
    ))
}

// --- Profile handlers ---

async fn get_profile(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    let user = resolve_user(&state, &user)?;
    Ok(Json(state.service.get_profile(&user)?))
}

async fn put_profile(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(profile): Json<Profile>,
) -> Result<Json<Profile>, ApiError> {
    let user = resolve_user(&state, &user)?;
    profile.validate().map_err(|e| bad_request(&e))?;
    let session = state.session(&user);
    let _guard = lock_session(&session);
    state
        .service
        .save_profile(&user, &profile)
        .context("failed to save profile")?;
    Ok(Json(profile))
}

async fn get_targets(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<GoalTargets>, ApiError> {
    let user = resolve_user(&state, &user)?;
    Ok(Json(state.service.get_targets(&user)?))
}

// --- Meal handlers ---

async fn analyze_meal(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<AnalyzeMealRequest>,
) -> Result<(StatusCode, Json<FoodEntry>), ApiError> {
    let user = resolve_user(&state, &user)?;
    let analyzer = state.analyzer.clone().ok_or_else(|| {
        ApiError::Unavailable(ConfigError::MissingCredential { var: API_KEY_VAR }.to_string())
    })?;

    let description = req
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    let image = match req.image_base64 {
        Some(data) => {
            let bytes = STANDARD
                .decode(data.trim())
                .map_err(|_| ApiError::BadRequest("image_base64 is not valid base64".to_string()))?;
            Some(ImagePayload {
                mime_type: req
                    .image_mime_type
                    .unwrap_or_else(|| "image/jpeg".to_string()),
                bytes,
            })
        }
        None => None,
    };
    let input = match (description, image) {
        (Some(text), Some(image)) => MealInput::TextAndImage(text, image),
        (Some(text), None) => MealInput::Text(text),
        (None, Some(image)) => MealInput::Image(image),
        (None, None) => {
            return Err(ApiError::BadRequest(
                "Provide a description, an image, or both".to_string(),
            ));
        }
    };

    let session = state.session(&user);
    let service = state.service.clone();
    // The analyzer blocks on its own HTTP call, so keep it off the async workers. The
    // session lock is taken only for the append, never across the AI round trip.
    let entry = tokio::task::spawn_blocking(move || {
        let fields = service.analyze_meal(analyzer.as_ref(), &user, &input)?;
        let mut session = lock_session(&session);
        service.record_analyzed_meal(&mut session, fields)
    })
    .await
    .context("meal analysis task failed")??;

    Ok((StatusCode::CREATED, Json(entry)))
}

async fn create_manual_meal(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<ManualMealRequest>,
) -> Result<(StatusCode, Json<FoodEntry>), ApiError> {
    let user = resolve_user(&state, &user)?;
    let slot = req
        .meal_slot
        .as_deref()
        .map(str::parse::<MealSlot>)
        .transpose()
        .map_err(|e| bad_request(&e))?;
    let fields = MealFields {
        name: req.name.trim().to_string(),
        calories: req.calories,
        protein_g: req.protein_g,
        carbs_g: req.carbs_g,
        fat_g: req.fat_g,
    };
    platelog_core::models::validate_meal_fields(&fields).map_err(|e| bad_request(&e))?;

    let session = state.session(&user);
    let mut session = lock_session(&session);
    let entry = state
        .service
        .log_manual_meal(&mut session, fields, slot)
        .context("failed to log meal")?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_food(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(q): Query<DateQuery>,
) -> Result<Json<Vec<FoodEntry>>, ApiError> {
    let user = resolve_user(&state, &user)?;
    let date = q.date.as_deref().map(|d| parse_date(&state, Some(d))).transpose()?;
    Ok(Json(state.service.list_food(&user, date)?))
}

async fn undo_last_meal(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(q): Query<DateQuery>,
) -> Result<Json<FoodEntry>, ApiError> {
    let user = resolve_user(&state, &user)?;
    let date = parse_date(&state, q.date.as_deref())?;
    let session = state.session(&user);
    let _guard = lock_session(&session);
    state
        .service
        .undo_last_meal(&user, Some(date))
        .context("failed to remove meal")?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No meals logged on {date}")))
}

// --- Water / weight handlers ---

async fn create_water(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<CreateWaterRequest>,
) -> Result<(StatusCode, Json<WaterEntry>), ApiError> {
    let user = resolve_user(&state, &user)?;
    let date = parse_date(&state, req.date.as_deref())?;
    platelog_core::models::validate_water_volume(req.volume_ml).map_err(|e| bad_request(&e))?;
    let session = state.session(&user);
    let _guard = lock_session(&session);
    let entry = state
        .service
        .log_water(&user, req.volume_ml, Some(date))
        .context("failed to log water")?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_water(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(q): Query<DateQuery>,
) -> Result<Json<WaterDay>, ApiError> {
    let user = resolve_user(&state, &user)?;
    let date = parse_date(&state, q.date.as_deref())?;
    let entries = state.service.store(&user)?.list_water(Some(date));
    Ok(Json(WaterDay {
        date,
        total_ml: entries.iter().map(|w| w.volume_ml).sum(),
        entries,
    }))
}

async fn create_weight(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<CreateWeightRequest>,
) -> Result<(StatusCode, Json<WeightEntry>), ApiError> {
    let user = resolve_user(&state, &user)?;
    let date = parse_date(&state, req.date.as_deref())?;
    platelog_core::models::validate_weight(req.weight_kg).map_err(|e| bad_request(&e))?;
    let session = state.session(&user);
    let _guard = lock_session(&session);
    let entry = state
        .service
        .log_weight(&user, req.weight_kg, Some(date))
        .context("failed to upsert weight")?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn get_weight_history(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<WeightEntry>>, ApiError> {
    let user = resolve_user(&state, &user)?;
    Ok(Json(state.service.weight_history(&user, q.limit)?))
}

// --- Aggregate handlers ---

async fn get_daily_summary(
    State(state): State<AppState>,
    Path((user, date_str)): Path<(String, String)>,
) -> Result<Json<DailySummary>, ApiError> {
    let user = resolve_user(&state, &user)?;
    let date = parse_date(&state, Some(&date_str))?;
    Ok(Json(state.service.get_daily_summary(&user, date)?))
}

async fn get_dashboard(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(q): Query<DateQuery>,
) -> Result<Json<Dashboard>, ApiError> {
    let user = resolve_user(&state, &user)?;
    let date = parse_date(&state, q.date.as_deref())?;
    let session = state.session(&user);
    let session = lock_session(&session);
    Ok(Json(state.service.get_dashboard(&session, date)?))
}

async fn get_history(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryDay>>, ApiError> {
    let user = resolve_user(&state, &user)?;
    let days = q.days.unwrap_or(7);
    if days == 0 || days > MAX_HISTORY_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_HISTORY_DAYS}"
        )));
    }
    Ok(Json(state.service.get_history(&user, days)?))
}

// --- Session burn handlers ---

async fn add_burn(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<BurnRequest>,
) -> Result<Json<BurnResponse>, ApiError> {
    let user = resolve_user(&state, &user)?;
    let session = state.session(&user);
    let burned_kcal = lock_session(&session)
        .add_burn(req.kcal)
        .map_err(|e| bad_request(&e))?;
    Ok(Json(BurnResponse { burned_kcal }))
}

async fn reset_burn(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<BurnResponse>, ApiError> {
    let user = resolve_user(&state, &user)?;
    let session = state.session(&user);
    lock_session(&session).reset_burn();
    Ok(Json(BurnResponse { burned_kcal: 0 }))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/{user}/profile",
            get(get_profile).put(put_profile),
        )
        .route("/api/users/{user}/targets", get(get_targets))
        .route("/api/users/{user}/meals", post(analyze_meal))
        .route("/api/users/{user}/meals/last", delete(undo_last_meal))
        .route(
            "/api/users/{user}/food",
            get(list_food).post(create_manual_meal),
        )
        .route("/api/users/{user}/water", get(get_water).post(create_water))
        .route(
            "/api/users/{user}/weight",
            get(get_weight_history).post(create_weight),
        )
        .route("/api/users/{user}/summary/{date}", get(get_daily_summary))
        .route("/api/users/{user}/dashboard", get(get_dashboard))
        .route("/api/users/{user}/history", get(get_history))
        .route(
            "/api/users/{user}/burn",
            post(add_burn).delete(reset_burn),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of the key, or nothing for short keys.
fn key_preview(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "[hidden]".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    service: NutritionService,
    analyzer: Option<Arc<dyn MealAnalyzer>>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    if analyzer.is_none() {
        warn!("{API_KEY_VAR} is not set; AI meal analysis endpoints will return 503");
    }

    let state = AppState {
        service: Arc::new(service),
        analyzer,
        sessions: Arc::new(Mutex::new(HashMap::new())),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            key_preview(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(bind, port, "server listening");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
