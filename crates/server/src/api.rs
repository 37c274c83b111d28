//! HTTP API: model registry, simulations, run history

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use engine::{
    run_simulation_job, simulate_with_deadline, SimulationConfig, SimulationProgress,
    SimulationRequest, SimulationResponse,
};
use persistence::repository::{ModelBackupRecord, ModelRepository, SimulationRunRepository};
use persistence::Database;
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{ApiError, ApiResult};
use crate::records::{compute_params_hash, record_to_response, response_to_record};
use crate::APP_VERSION;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<AppConfig>,
    pub progress: Arc<SimulationProgress>,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
            progress: Arc::new(SimulationProgress::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/models", get(api_list_models).post(api_create_model))
        .route("/models/:id", get(api_get_model).delete(api_delete_model))
        .route("/models/:id/activate", post(api_activate_model))
        .route("/simulate", post(api_simulate))
        .route("/simulate/start", post(api_start_simulation))
        .route("/simulate/status", get(api_simulation_status))
        .route("/simulate/cancel", post(api_cancel_simulation))
        .route("/history", get(api_history))
        .route("/history/stats", get(api_history_stats))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Look up the model a request refers to
async fn resolve_model(db: &Database, id: i64) -> ApiResult<ModelBackupRecord> {
    ModelRepository::new(db.pool())
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Model {id} not found")))
}

/// Store a finished run; history is best-effort and never fails the request
async fn record_run(
    db: &Database,
    hash: &str,
    model: &ModelBackupRecord,
    config: &SimulationConfig,
    response: &SimulationResponse,
) {
    let record = match response_to_record(hash, model, config, response) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Failed to serialize simulation run");
            return;
        }
    };
    if let Err(e) = SimulationRunRepository::new(db.pool()).save(&record).await {
        warn!(error = %e, "Failed to store simulation run");
    }
}

// ============================================================================
// API Handlers: Health & Models
// ============================================================================

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "trade-sim",
        "version": APP_VERSION,
    }))
}

#[derive(Deserialize)]
struct ModelFilter {
    pair: Option<String>,
}

/// GET /api/models: registered models, optionally filtered by pair
async fn api_list_models(
    State(state): State<AppState>,
    Query(filter): Query<ModelFilter>,
) -> ApiResult<Json<serde_json::Value>> {
    let models = ModelRepository::new(state.db.pool())
        .list(filter.pair.as_deref())
        .await?;
    let data: Vec<serde_json::Value> = models
        .iter()
        .map(|m| {
            serde_json::json!({
                "model": m,
                "base_win_rate": m.base_win_rate(),
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "data": data,
        "total": data.len(),
    })))
}

/// GET /api/models/:id
async fn api_get_model(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let model = resolve_model(&state.db, id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "base_win_rate": model.base_win_rate(),
        "model": model,
    })))
}

#[derive(Deserialize)]
struct NewModel {
    model_name: String,
    pair: String,
    #[serde(default = "default_timeframe")]
    timeframe: String,
    win_rate_pct: Option<f64>,
    positive_rate: Option<f64>,
    metrics: Option<serde_json::Value>,
    description: Option<String>,
    #[serde(default)]
    activate: bool,
}

fn default_timeframe() -> String {
    "1h".to_string()
}

/// POST /api/models: register a model
async fn api_create_model(
    State(state): State<AppState>,
    payload: Result<Json<NewModel>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(body) = payload?;
    if body.model_name.trim().is_empty() || body.pair.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "model_name and pair are required".to_string(),
        ));
    }
    if let Some(pct) = body.win_rate_pct {
        if !(0.0..=100.0).contains(&pct) {
            return Err(ApiError::BadRequest(
                "win_rate_pct must be between 0 and 100".to_string(),
            ));
        }
    }

    let record = ModelBackupRecord {
        win_rate_pct: body.win_rate_pct,
        positive_rate: body.positive_rate,
        metrics_json: body.metrics.map(|m| m.to_string()),
        description: body.description,
        ..ModelBackupRecord::new(&body.model_name, &body.pair, &body.timeframe)
    };

    let repo = ModelRepository::new(state.db.pool());
    let id = repo.save(&record).await?;
    if body.activate {
        repo.activate(id).await?;
    }
    info!(id, model = %record.model_name, pair = %record.pair, "Model registered");

    Ok(Json(serde_json::json!({
        "success": true,
        "id": id,
    })))
}

/// POST /api/models/:id/activate
async fn api_activate_model(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    if !ModelRepository::new(state.db.pool()).activate(id).await? {
        return Err(ApiError::NotFound(format!("Model {id} not found")));
    }
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Model {id} activated"),
    })))
}

/// DELETE /api/models/:id
async fn api_delete_model(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    if !ModelRepository::new(state.db.pool()).delete(id).await? {
        return Err(ApiError::NotFound(format!("Model {id} not found")));
    }
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Model {id} deleted"),
    })))
}

// ============================================================================
// API Handlers: Simulation
// ============================================================================

/// POST /api/simulate: run synchronously and return the full response
async fn api_simulate(
    State(state): State<AppState>,
    payload: Result<Json<SimulationRequest>, JsonRejection>,
) -> ApiResult<Json<SimulationResponse>> {
    let Json(request) = payload?;
    let model = resolve_model(&state.db, request.model_identifier).await?;
    let model_id = request.model_identifier;
    let requested_seed = request.seed.is_some();
    let config = request
        .into_config(model.base_win_rate())
        .with_resolved_seed();
    let limits = state.config.limits();
    config.validate(&limits)?;

    let hash = compute_params_hash(model_id, &config);
    if requested_seed {
        let cached = SimulationRunRepository::new(state.db.pool())
            .get_by_hash(&hash)
            .await?;
        if let Some(record) = cached {
            info!(model_id, hash = %hash, "Serving seeded simulation from history");
            return Ok(Json(record_to_response(&record)?));
        }
    }

    info!(
        model_id,
        pair = %model.pair,
        simulations = config.num_simulations,
        days = config.trading_days,
        "Running simulation"
    );

    let response =
        simulate_with_deadline(config.clone(), limits, model.pair.clone(), state.config.deadline())
            .await?;

    record_run(&state.db, &hash, &model, &config, &response).await;
    Ok(Json(response))
}

/// POST /api/simulate/start: run in the background
async fn api_start_simulation(
    State(state): State<AppState>,
    payload: Result<Json<SimulationRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(request) = payload?;
    let model = resolve_model(&state.db, request.model_identifier).await?;
    let config = request
        .into_config(model.base_win_rate())
        .with_resolved_seed();
    let limits = state.config.limits();
    config.validate(&limits)?;

    if !state
        .progress
        .try_begin(config.num_simulations, state.config.deadline(), &model.pair)
    {
        let pct = state.progress.progress_pct();
        return Ok(Json(serde_json::json!({
            "success": false,
            "message": format!("Simulation already running ({:.0}% complete)", pct),
        })));
    }

    info!(
        pair = %model.pair,
        simulations = config.num_simulations,
        "Starting background simulation"
    );

    let progress = state.progress.clone();
    let db = state.db.clone();
    let total = config.num_simulations;
    tokio::spawn(async move {
        let hash = model
            .id
            .map(|id| compute_params_hash(id, &config))
            .unwrap_or_default();
        run_simulation_job(config.clone(), limits, model.pair.clone(), progress.clone()).await;
        if let Some(response) = progress.response() {
            record_run(&db, &hash, &model, &config, &response).await;
        }
    });

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Simulation started ({} runs)", total),
        "total": total,
    })))
}

/// GET /api/simulate/status: poll background progress
async fn api_simulation_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let progress = &state.progress;
    Json(serde_json::json!({
        "status": progress.status(),
        "running": progress.is_running(),
        "subject": progress.subject(),
        "progress_pct": progress.progress_pct(),
        "completed": progress.completed.load(Ordering::Relaxed),
        "total": progress.total_simulations.load(Ordering::Relaxed),
        "results": progress.response(),
        "error": progress.error_message(),
        "started_at": progress.started_at(),
    }))
}

/// POST /api/simulate/cancel
async fn api_cancel_simulation(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.progress.cancel();
    info!("Simulation cancel requested via API");
    Json(serde_json::json!({
        "success": true,
        "message": "Cancel requested"
    }))
}

// ============================================================================
// API Handlers: History
// ============================================================================

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default = "default_history_limit")]
    limit: i64,
    model_id: Option<i64>,
}

fn default_history_limit() -> i64 {
    20
}

/// GET /api/history: recent runs (summary columns only)
async fn api_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = params.limit.clamp(1, 500);
    let records = SimulationRunRepository::new(state.db.pool())
        .recent(limit, params.model_id)
        .await
        .map_err(|e| {
            error!("History query failed: {}", e);
            ApiError::from(e)
        })?;

    let data: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "params_hash": r.params_hash,
                "model_id": r.model_id,
                "pair": r.pair,
                "mode": r.mode,
                "seed": r.seed,
                "num_simulations": r.num_simulations,
                "trading_days": r.trading_days,
                "initial_capital": r.initial_capital,
                "mean_profit_abs": r.mean_profit_abs,
                "mean_profit_pct": r.mean_profit_pct,
                "success_rate": r.success_rate,
                "profit_factor": r.profit_factor,
                "max_drawdown_mean": r.max_drawdown_mean,
                "risk_level": r.risk_level,
                "created_at": r.created_at,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "data": data,
        "total": data.len(),
        "limit": limit,
    })))
}

/// GET /api/history/stats
async fn api_history_stats(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let stats = SimulationRunRepository::new(state.db.pool()).stats().await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "stats": stats,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let db = Database::in_memory().await.unwrap();
        AppState::new(db, AppConfig::default())
    }

    async fn seed_model(state: &AppState, win_rate_pct: f64) -> i64 {
        let record = ModelBackupRecord {
            win_rate_pct: Some(win_rate_pct),
            ..ModelBackupRecord::new("xgb-btc", "BTC/USDT", "1h")
        };
        ModelRepository::new(state.db.pool()).save(&record).await.unwrap()
    }

    async fn send(state: &AppState, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state().await;
        let (status, body) = send(&state, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_simulate_returns_results_and_analysis() {
        let state = test_state().await;
        let id = seed_model(&state, 55.0).await;

        let (status, body) = send(
            &state,
            "POST",
            "/api/simulate",
            Some(serde_json::json!({ "model_id": id, "simulations": 200, "trading_days": 10 })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["results"]["percentiles"]["p50"].as_array().unwrap().len(), 11);
        assert!(body["results"]["final_distribution"].as_array().unwrap().len() <= 1000);
        assert!(body["ai_analysis"]["risk_assessment"]
            .as_str()
            .unwrap()
            .contains("BTC/USDT"));

        let (_, history) = send(&state, "GET", "/api/history", None).await;
        assert_eq!(history["total"], 1);
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_found() {
        let state = test_state().await;
        let (status, body) = send(
            &state,
            "POST",
            "/api/simulate",
            Some(serde_json::json!({ "model_id": 404 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_missing_model_id_is_bad_request() {
        let state = test_state().await;
        let (status, body) = send(
            &state,
            "POST",
            "/api/simulate",
            Some(serde_json::json!({ "simulations": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_parameters_are_bad_request() {
        let state = test_state().await;
        let id = seed_model(&state, 55.0).await;
        let (status, body) = send(
            &state,
            "POST",
            "/api/simulate",
            Some(serde_json::json!({ "model_id": id, "trading_days": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("trading_days"));
    }

    #[tokio::test]
    async fn test_seeded_simulation_is_served_from_history() {
        let state = test_state().await;
        let id = seed_model(&state, 60.0).await;
        let request = serde_json::json!({
            "model_id": id,
            "simulations": 100,
            "trading_days": 5,
            "seed": 42,
        });

        let (_, first) = send(&state, "POST", "/api/simulate", Some(request.clone())).await;
        let (_, second) = send(&state, "POST", "/api/simulate", Some(request)).await;
        assert_eq!(first["ai_analysis"], second["ai_analysis"]);
        assert_eq!(
            first["results"]["final_distribution"].as_array().unwrap().len(),
            second["results"]["final_distribution"].as_array().unwrap().len()
        );

        let (_, stats) = send(&state, "GET", "/api/history/stats", None).await;
        assert_eq!(stats["stats"]["total_runs"], 1);
    }

    #[tokio::test]
    async fn test_unseeded_runs_are_each_recorded_with_their_seed() {
        let state = test_state().await;
        let id = seed_model(&state, 55.0).await;
        let request = serde_json::json!({ "model_id": id, "simulations": 100, "trading_days": 5 });

        let (_, first) = send(&state, "POST", "/api/simulate", Some(request.clone())).await;
        let (_, second) = send(&state, "POST", "/api/simulate", Some(request)).await;
        let first_seed = first["results"]["parameters"]["seed"].as_u64().unwrap();
        let second_seed = second["results"]["parameters"]["seed"].as_u64().unwrap();
        assert_ne!(first_seed, second_seed);

        let (_, history) = send(&state, "GET", "/api/history", None).await;
        assert_eq!(history["total"], 2);
        let stored: Vec<u64> = history["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["seed"].as_i64().unwrap() as u64)
            .collect();
        assert!(stored.contains(&first_seed));
        assert!(stored.contains(&second_seed));

        let (_, stats) = send(&state, "GET", "/api/history/stats", None).await;
        assert_eq!(stats["stats"]["total_runs"], 2);
    }

    #[tokio::test]
    async fn test_start_is_refused_while_a_run_is_active() {
        let state = test_state().await;
        let id = seed_model(&state, 52.0).await;
        assert!(state.progress.try_begin(10, None, "ETH/USDT"));

        let (status, body) = send(
            &state,
            "POST",
            "/api/simulate/start",
            Some(serde_json::json!({ "model_id": id, "simulations": 100, "trading_days": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(state.progress.subject(), "ETH/USDT");
    }

    #[tokio::test]
    async fn test_model_lifecycle() {
        let state = test_state().await;
        let (status, created) = send(
            &state,
            "POST",
            "/api/models",
            Some(serde_json::json!({
                "model_name": "lgbm-eth",
                "pair": "ETH/USDT",
                "win_rate_pct": 61.5,
                "activate": true,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_i64().unwrap();

        let (_, fetched) = send(&state, "GET", &format!("/api/models/{id}"), None).await;
        assert_eq!(fetched["model"]["is_active"], true);
        assert_eq!(fetched["base_win_rate"], 0.615);

        let (_, listed) = send(&state, "GET", "/api/models?pair=ETH/USDT", None).await;
        assert_eq!(listed["total"], 1);

        let (status, _) = send(&state, "DELETE", &format!("/api/models/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&state, "POST", &format!("/api/models/{id}/activate"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_background_simulation_completes() {
        let state = test_state().await;
        let id = seed_model(&state, 52.0).await;

        let (status, started) = send(
            &state,
            "POST",
            "/api/simulate/start",
            Some(serde_json::json!({ "model_id": id, "simulations": 100, "trading_days": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started["success"], true);

        let mut body = serde_json::Value::Null;
        for _ in 0..200 {
            let (_, polled) = send(&state, "GET", "/api/simulate/status", None).await;
            if polled["status"] == "complete" {
                body = polled;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        assert_eq!(body["status"], "complete");
        assert_eq!(body["completed"], 100);
        assert_eq!(body["results"]["success"], true);
    }
}
