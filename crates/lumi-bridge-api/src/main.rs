//! Lumi Bridge - RGB effect control API server

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dashmap::DashMap;
use lumi_core::{
    controller::{self, PreparedUpdate},
    family::{self, FAMILIES},
    sequencer::Step,
    EffectController, EffectError, LumiDevice, PacingPolicy, StateStore,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod dry_run;

use dry_run::{DryRunEndpoint, SentFrame};

type Device = LumiDevice<DryRunEndpoint>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<EffectController>,
    /// Registered devices (keyed by id)
    pub devices: Arc<DashMap<String, Arc<Device>>>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// HTTP status for an effect error
fn error_status(err: &EffectError) -> StatusCode {
    match err {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        EffectError::UnknownModel(_) => StatusCode::BAD_REQUEST,
        EffectError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
        EffectError::DeviceWriteFailure { .. } => StatusCode::BAD_GATEWAY,
        EffectError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: &EffectError) -> (StatusCode, Json<ApiResponse>) {
    (error_status(err), Json(ApiResponse::error(err.to_string())))
}

/// Register device request
#[derive(Deserialize)]
struct RegisterRequest {
    id: String,
    model: String,
}

/// Device summary with its cached state
#[derive(Serialize)]
struct DeviceInfo {
    id: String,
    model: String,
    family: &'static str,
    state: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    frames: Vec<SentFrame>,
}

impl DeviceInfo {
    fn new(device: &Device, store: &StateStore, with_frames: bool) -> Self {
        Self {
            id: device.id.clone(),
            model: device.model.clone(),
            family: device.family.name,
            state: store.snapshot(&device.id),
            frames: if with_frames {
                device.endpoint.history()
            } else {
                Vec::new()
            },
        }
    }
}

/// Encode preview request
#[derive(Deserialize)]
struct EncodeRequest {
    model: String,
    command: Map<String, Value>,
    /// Cached state to resolve against
    #[serde(default)]
    state: Map<String, Value>,
}

/// One attribute write in a preview
#[derive(Serialize)]
struct PreviewWrite {
    step: String,
    cluster: u16,
    attribute: u16,
    value: String,
    summary: String,
}

/// Encode preview response
#[derive(Serialize)]
struct EncodePreview {
    family: &'static str,
    power_on: bool,
    writes: Vec<PreviewWrite>,
    patch: Map<String, Value>,
}

impl EncodePreview {
    fn new(family: &'static lumi_core::FamilyProfile, update: &PreparedUpdate) -> Self {
        let mut writes: Vec<PreviewWrite> = update
            .settings
            .iter()
            .map(|(setting, value, _)| PreviewWrite {
                step: format!("writing {}", setting.key),
                cluster: setting.cluster,
                attribute: setting.attribute,
                value: dry_run::value_hex(value),
                summary: format!("{value:?}"),
            })
            .collect();

        let mut power_on = false;
        if let Some((_, plan)) = &update.effect {
            power_on = plan.powers_on;
            writes.extend(plan.steps.iter().filter_map(|step| match step {
                Step::Write { phase, packet } => Some(PreviewWrite {
                    step: phase.to_string(),
                    cluster: lumi_protocol::clusters::MANU_SPECIFIC_LUMI,
                    attribute: packet.attribute,
                    value: dry_run::value_hex(&packet.value),
                    summary: packet.describe(),
                }),
                _ => None,
            }));
        }

        Self {
            family: family.name,
            power_on,
            writes,
            patch: update.patch(family),
        }
    }
}

/// List supported device families
async fn list_families() -> impl IntoResponse {
    Json(ApiResponse::success(FAMILIES))
}

/// Register a device
async fn register_device(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let endpoint = DryRunEndpoint::new(req.id.clone());
    match LumiDevice::new(req.id.clone(), &req.model, endpoint) {
        Ok(device) => {
            tracing::info!("Registered {} as {} ({})", device.id, device.model, device.family.name);
            let info = DeviceInfo::new(&device, state.controller.store(), false);
            state.devices.insert(req.id, Arc::new(device));
            (StatusCode::CREATED, Json(ApiResponse::success(info)))
        }
        Err(e) => failure(&e),
    }
}

/// List all devices
async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    let mut devices: Vec<DeviceInfo> = state
        .devices
        .iter()
        .map(|d| DeviceInfo::new(d.value(), state.controller.store(), false))
        .collect();
    devices.sort_by(|a, b| a.id.cmp(&b.id));
    Json(ApiResponse::success(devices))
}

fn find_device(state: &AppState, id: &str) -> Result<Arc<Device>, EffectError> {
    state
        .devices
        .get(id)
        .map(|d| d.value().clone())
        .ok_or_else(|| EffectError::DeviceNotFound(id.to_string()))
}

/// Get a specific device
async fn get_device(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match find_device(&state, &id) {
        Ok(device) => (
            StatusCode::OK,
            Json(ApiResponse::success(DeviceInfo::new(
                &device,
                state.controller.store(),
                true,
            ))),
        ),
        Err(e) => failure(&e),
    }
}

/// Unregister a device and drop its cached state
async fn remove_device(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.devices.remove(&id) {
        Some(_) => {
            let last_state = state.controller.forget(&id).unwrap_or_default();
            (StatusCode::OK, Json(ApiResponse::success(last_state)))
        }
        None => failure(&EffectError::DeviceNotFound(id)),
    }
}

/// Apply a property-set message
async fn set_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(message): Json<Map<String, Value>>,
) -> impl IntoResponse {
    let device = match find_device(&state, &id) {
        Ok(device) => device,
        Err(e) => return failure(&e),
    };

    match state.controller.handle_set(&*device, &message).await {
        Ok(patch) => (StatusCode::OK, Json(ApiResponse::success(patch))),
        Err(e) => failure(&e),
    }
}

/// Read device settings into the cache
async fn configure_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let device = match find_device(&state, &id) {
        Ok(device) => device,
        Err(e) => return failure(&e),
    };

    match state.controller.configure(&*device).await {
        Ok(patch) => (StatusCode::OK, Json(ApiResponse::success(patch))),
        Err(e) => failure(&e),
    }
}

/// Preview the writes a command would produce, without sending anything
async fn encode_preview(Json(req): Json<EncodeRequest>) -> impl IntoResponse {
    let Some(family) = family::lookup(&req.model) else {
        return failure(&EffectError::UnknownModel(req.model));
    };

    match controller::prepare(family, &req.command, &req.state) {
        Ok(update) => (
            StatusCode::OK,
            Json(ApiResponse::success(EncodePreview::new(family, &update))),
        ),
        Err(e) => failure(&e),
    }
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/families", get(list_families))
        .route("/api/v1/devices", get(list_devices).post(register_device))
        .route("/api/v1/devices/:id", get(get_device).delete(remove_device))
        .route("/api/v1/devices/:id/set", post(set_device))
        .route("/api/v1/devices/:id/configure", post(configure_device))
        .route("/api/v1/encode", post(encode_preview))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Resolve once ctrl-c is received, cancelling in-flight pacing
async fn shutdown_signal(controller: Arc<EffectController>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        return;
    }
    controller.shutdown();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumi_bridge_api=debug,lumi_core=debug,info".into()),
        )
        .init();

    tracing::info!("Starting Lumi Bridge API server");

    // Get data directory from env or use default
    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
    tokio::fs::create_dir_all(&data_dir).await?;
    let state_path = data_dir.join("device-state.json");
    tracing::info!("Using state file {}", state_path.display());

    let store = StateStore::with_persistence(state_path).await;
    tracing::info!("Loaded cached state for {} devices", store.device_ids().len());

    let pacing = PacingPolicy::from_env();
    tracing::info!(
        "Pacing: settle {:?}, spacing {:?}, write timeout {:?}",
        pacing.power_on_settle,
        pacing.packet_spacing,
        pacing.write_timeout
    );

    let controller = Arc::new(EffectController::new(Arc::new(store), pacing));
    let state = AppState {
        controller: controller.clone(),
        devices: Arc::new(DashMap::new()),
    };

    let bind = std::env::var("LUMI_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let addr: std::net::SocketAddr = bind.parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(controller))
        .await?;

    Ok(())
}
