use axum::{
    Extension, Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    middleware,
    routing::{delete, get, post, put},
};
use bedrock_process::{
    AllowlistRecord, PermissionLevel, PermissionRecord, WorldEdit, WorldSettings, WorldStatus,
};
use bedrock_supervisor::config::validate_world_name;
use serde::{Deserialize, Serialize};

use crate::{
    auth::{self, AuthUser},
    error::ApiError,
    request_meta,
    state::AppState,
    worlds::{self, WorldDetail, WorldSummary},
};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct Ack {
    pub world: String,
    pub message: String,
}

impl Ack {
    fn new(world: impl Into<String>, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            world: world.into(),
            message: message.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub name: String,
    pub world_id: i32,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub cmd: String,
}

#[derive(Debug, Deserialize)]
pub struct PermissionRequest {
    pub xuid: String,
    pub permission: PermissionLevel,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub world: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthzResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub running_worlds: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthzResponse> {
    Json(HealthzResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        running_worlds: state.supervisor.list_running().await.len(),
    })
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(v)| v).map_err(ApiError::from)
}

fn require_creator(row_creator: Option<i32>, user: &AuthUser) -> Result<(), ApiError> {
    if row_creator != Some(user.user_id) {
        return Err(ApiError::forbidden("only the world creator may change it"));
    }
    Ok(())
}

async fn create_world(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<WorldSettings>, JsonRejection>,
) -> ApiResult<WorldDetail> {
    let settings = body(payload)?;
    validate_world_name(&settings.name)?;
    if settings.port == 0 {
        return Err(ApiError::bad_request("port is required"));
    }
    if worlds::find_by_name(&state.db, &settings.name).await?.is_some() {
        return Err(ApiError::conflict(format!("world {} already exists", settings.name)));
    }
    if worlds::port_taken(&state.db, i32::from(settings.port), None).await? {
        return Err(ApiError::conflict(format!("port {} is already in use", settings.port)));
    }

    let row = worlds::insert_world(&state.db, user.user_id, &settings).await?;
    if let Err(err) = state.supervisor.create_world(&settings).await {
        // Keep the table and the data root in agreement.
        if let Err(rollback) = worlds::delete_world(&state.db, row).await {
            tracing::warn!(world = %settings.name, error = %rollback, "failed to roll back world row");
        }
        return Err(err.into());
    }

    tracing::info!(world = %settings.name, user_id = user.user_id, "world created");
    let detail = worlds::world_with_players(&state.db, &settings.name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("world {}", settings.name)))?;
    Ok(Json(detail))
}

async fn delete_world(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(world): Path<String>,
) -> ApiResult<Ack> {
    let row = worlds::find_by_name(&state.db, &world)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("world {world} not found")))?;
    require_creator(row.creator_id, &user)?;

    state.supervisor.delete_world(&world).await?;
    worlds::delete_world(&state.db, row).await?;
    Ok(Ack::new(world, "deleted"))
}

async fn update_world(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((world, id)): Path<(String, i32)>,
    payload: Result<Json<WorldEdit>, JsonRejection>,
) -> ApiResult<WorldDetail> {
    let edit = body(payload)?;
    let target = edit.target_name(&world).to_string();
    validate_world_name(&target)?;
    let row = worlds::find_by_id(&state.db, id)
        .await?
        .filter(|row| row.name == world)
        .ok_or_else(|| ApiError::not_found(format!("world {world} not found")))?;
    require_creator(row.creator_id, &user)?;

    if target != row.name && worlds::find_by_name(&state.db, &target).await?.is_some() {
        return Err(ApiError::conflict(format!("world {target} already exists")));
    }
    if edit.port != 0 && worlds::port_taken(&state.db, i32::from(edit.port), Some(row.id)).await? {
        return Err(ApiError::conflict(format!("port {} is already in use", edit.port)));
    }

    state.supervisor.edit_world(&world, &edit).await?;
    let updated = worlds::update_world(&state.db, row, &edit).await?;
    let detail = worlds::world_with_players(&state.db, &updated.name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("world {} not found", updated.name)))?;
    Ok(Json(detail))
}

async fn start_world(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult<WorldStatus> {
    let req = body(payload)?;
    let status = state
        .supervisor
        .start_world(&req.name, req.port, req.world_id)
        .await?;
    Ok(Json(status))
}

async fn stop_world(State(state): State<AppState>, Path(world): Path<String>) -> ApiResult<Ack> {
    state.supervisor.stop_world(&world).await?;
    Ok(Ack::new(world, "stopped"))
}

async fn world_status(
    State(state): State<AppState>,
    Path(world): Path<String>,
) -> ApiResult<WorldStatus> {
    Ok(Json(state.supervisor.status(&world).await?))
}

async fn send_command(
    State(state): State<AppState>,
    Path(world): Path<String>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> ApiResult<Ack> {
    let req = body(payload)?;
    let cmd = req.cmd.trim();
    if cmd.is_empty() {
        return Err(ApiError::bad_request("cmd must not be empty"));
    }
    state.supervisor.send_command(&world, cmd).await?;
    Ok(Ack::new(world, "command sent"))
}

async fn ban_player(
    State(state): State<AppState>,
    Path((world, name)): Path<(String, String)>,
) -> ApiResult<Ack> {
    state.supervisor.ban_player(&world, &name).await?;
    Ok(Ack::new(world, format!("banned {name}")))
}

async fn kick_player(
    State(state): State<AppState>,
    Path((world, name)): Path<(String, String)>,
) -> ApiResult<Ack> {
    state.supervisor.kick_player(&world, &name).await?;
    Ok(Ack::new(world, format!("kicked {name}")))
}

async fn get_worlds(State(state): State<AppState>) -> ApiResult<Vec<WorldSummary>> {
    let running: Vec<String> = state
        .supervisor
        .list_running()
        .await
        .into_iter()
        .map(|s| s.name)
        .collect();
    Ok(Json(worlds::list_worlds(&state.db, &running).await?))
}

async fn get_world_players(
    State(state): State<AppState>,
    Path(world): Path<String>,
) -> ApiResult<WorldDetail> {
    let detail = worlds::world_with_players(&state.db, &world)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("world {world} not found")))?;
    Ok(Json(detail))
}

async fn world_logs(State(state): State<AppState>, Path(world): Path<String>) -> ApiResult<LogsResponse> {
    let lines = state.supervisor.get_logs(&world).await?;
    Ok(Json(LogsResponse { world, lines }))
}

async fn list_permissions(
    State(state): State<AppState>,
    Path(world): Path<String>,
) -> ApiResult<Vec<PermissionRecord>> {
    Ok(Json(state.supervisor.list_permissions(&world).await?))
}

async fn upsert_permission(
    State(state): State<AppState>,
    Path(world): Path<String>,
    payload: Result<Json<PermissionRequest>, JsonRejection>,
) -> ApiResult<Ack> {
    let req = body(payload)?;
    let xuid = req.xuid.trim();
    if xuid.is_empty() {
        return Err(ApiError::bad_request("xuid must not be empty"));
    }
    state
        .supervisor
        .upsert_permission(&world, xuid, req.permission)
        .await?;
    Ok(Ack::new(world, format!("{xuid} is now {}", req.permission.as_str())))
}

async fn remove_permission(
    State(state): State<AppState>,
    Path((world, xuid)): Path<(String, String)>,
) -> ApiResult<Ack> {
    state.supervisor.remove_permission(&world, &xuid).await?;
    Ok(Ack::new(world, format!("removed permission of {xuid}")))
}

async fn list_allowlist(
    State(state): State<AppState>,
    Path(world): Path<String>,
) -> ApiResult<Vec<AllowlistRecord>> {
    Ok(Json(state.supervisor.list_allowlist(&world).await?))
}

async fn upsert_allowlist(
    State(state): State<AppState>,
    Path(world): Path<String>,
    payload: Result<Json<AllowlistRecord>, JsonRejection>,
) -> ApiResult<Ack> {
    let mut record = body(payload)?;
    record.xuid = record.xuid.trim().to_string();
    if record.xuid.is_empty() {
        return Err(ApiError::bad_request("xuid must not be empty"));
    }
    let message = format!("{} added to allowlist", record.xuid);
    state.supervisor.upsert_allowlist(&world, record).await?;
    Ok(Ack::new(world, message))
}

async fn remove_allowlist(
    State(state): State<AppState>,
    Path((world, xuid)): Path<(String, String)>,
) -> ApiResult<Ack> {
    state.supervisor.remove_allowlist(&world, &xuid).await?;
    Ok(Ack::new(world, format!("removed {xuid} from allowlist")))
}

pub fn router(state: AppState) -> Router {
    let bedrock = Router::new()
        .route("/create", post(create_world))
        .route("/start", post(start_world))
        .route("/get-worlds", get(get_worlds))
        .route("/:world/delete", delete(delete_world))
        .route("/:world/:id/update", put(update_world))
        .route("/:world/stop", post(stop_world))
        .route("/:world/status", get(world_status))
        .route("/:world/command", post(send_command))
        .route("/:world/command/ban/:name", post(ban_player))
        .route("/:world/command/kick/:name", post(kick_player))
        .route("/:world/get-world-players", get(get_world_players))
        .route("/:world/logs", get(world_logs))
        .route("/:world/get-permission-players", get(list_permissions))
        .route("/:world/create-or-update-permission", post(upsert_permission))
        .route("/:world/delete-permission/:xuid", delete(remove_permission))
        .route("/:world/get-priority", get(list_allowlist))
        .route("/:world/create-priority", post(upsert_allowlist))
        .route("/:world/delete-priority/:xuid", delete(remove_allowlist))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/bedrock", bedrock)
        .layer(middleware::from_fn(request_meta::request_id))
        .with_state(state)
}
