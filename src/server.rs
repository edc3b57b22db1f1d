//! ==============================================================================
//! server.rs - web server for the dashboard
//! ==============================================================================
//!
//! routes:
//!     GET  /                                            dashboard page
//!     GET  /api/devices                                 device model as json
//!     POST /api/devices/:device/sensors/:sensor/toggle  open / close a card
//!     POST /api/reload                                  re-run the pipeline
//!
//! shared state:
//!     the controller sits behind arc<rwlock<>>. the lock is never held while
//!     a gateway call is in flight; a toggle takes it once to place the panel
//!     and once more to apply the fetched history.
//!
//! ==============================================================================

use crate::card::{CardKey, CardState, ChartData};
use crate::controller::{self, DashboardController, HistoryApplied, ToggleOutcome};
use crate::domain::DeviceMap;
use crate::gateway::LookupGateway;
use crate::grid::{GridPlacement, LayoutMetrics};
use crate::pipeline::Aggregator;
use crate::render;
use crate::rules::RuleTable;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

// ==============================================================================
// shared state
// ==============================================================================

#[derive(Default)]
pub struct AppState {
    /// `None` until a pipeline run succeeds, and again after a failed one
    pub controller: Option<DashboardController>,
    /// banner text of the last failed run
    pub error: Option<String>,
    /// unix timestamp (ms) of last successful run
    pub last_update: u64,
}

#[derive(Clone)]
pub struct ServerContext {
    pub state: Arc<RwLock<AppState>>,
    pub gateway: Arc<dyn LookupGateway>,
    pub rules: Arc<RuleTable>,
    pub show_sensor_data: bool,
}

impl ServerContext {
    pub fn new(gateway: Arc<dyn LookupGateway>, rules: RuleTable, show_sensor_data: bool) -> Self {
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            gateway,
            rules: Arc::new(rules),
            show_sensor_data,
        }
    }
}

/// run the whole pipeline and swap the result in, replacing every card
pub async fn refresh(ctx: &ServerContext) -> bool {
    let result = Aggregator::new(ctx.gateway.as_ref(), ctx.rules.as_ref()).run().await;

    let mut state = ctx.state.write().await;
    match result {
        Ok(dashboard) => {
            tracing::info!(
                devices = dashboard.devices.len(),
                sensors = dashboard.sensor_count(),
                "dashboard model ready"
            );
            let controller = DashboardController::new(dashboard);
            if ctx.show_sensor_data {
                for card in controller.cards() {
                    tracing::info!(
                        device = card.device_name(),
                        sensor = card.heading(),
                        value = %card.display_value(),
                        units = card.units(),
                        "sensor"
                    );
                }
            }
            state.controller = Some(controller);
            state.error = None;
            state.last_update = now_ms();
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "pipeline run failed");
            state.controller = None;
            state.error = Some(e.banner_message().to_string());
            false
        }
    }
}

pub fn router(ctx: ServerContext) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api/devices", get(devices_handler))
        .route("/api/devices/:device/sensors/:sensor/toggle", post(toggle_handler))
        .route("/api/reload", post(reload_handler))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

pub async fn run(ctx: ServerContext, bind_address: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "dashboard listening");
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

// ==============================================================================
// handlers
// ==============================================================================

async fn dashboard_handler(State(ctx): State<ServerContext>) -> Html<String> {
    let state = ctx.state.read().await;
    Html(render::page(state.controller.as_ref(), state.error.as_deref()))
}

#[derive(Serialize)]
struct DevicesResponse {
    devices: DeviceMap,
    /// card currently owning the detail panel
    open: Option<CardKey>,
    last_update: u64,
    error: Option<String>,
}

async fn devices_handler(State(ctx): State<ServerContext>) -> Json<DevicesResponse> {
    let state = ctx.state.read().await;
    let controller = state.controller.as_ref();
    Json(DevicesResponse {
        devices: controller.map(|c| c.devices().clone()).unwrap_or_default(),
        open: controller.and_then(|c| c.open_card()).map(|card| card.key().clone()),
        last_update: state.last_update,
        error: state.error.clone(),
    })
}

#[derive(Serialize, Default)]
struct ToggleResponse {
    #[serde(flatten)]
    state: Option<CardState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    placement: Option<GridPlacement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail_slot: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chart: Option<ChartData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bulb_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn toggle_handler(
    State(ctx): State<ServerContext>,
    Path((device, sensor)): Path<(String, String)>,
    Json(metrics): Json<LayoutMetrics>,
) -> Response {
    let key = CardKey { device, sensor };

    let outcome = {
        let mut state = ctx.state.write().await;
        let error = state.error.clone();
        match state.controller.as_mut().map(|c| c.toggle(&key, metrics)) {
            Some(Some(outcome)) => outcome,
            Some(None) => return StatusCode::NOT_FOUND.into_response(),
            None => {
                let body = ToggleResponse { error, ..Default::default() };
                return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
            }
        }
    };

    let mut response = ToggleResponse::default();
    match outcome {
        ToggleOutcome::BulbSwitched { on } => {
            response.bulb_on = Some(on);
        }
        ToggleOutcome::Closed => {}
        ToggleOutcome::Opened { placement, detail_slot } => {
            response.placement = Some(placement);
            response.detail_slot = Some(detail_slot);
        }
        ToggleOutcome::Opening { placement, detail_slot, request } => {
            response.placement = Some(placement);
            response.detail_slot = Some(detail_slot);

            let result = controller::fetch_history(ctx.gateway.as_ref(), &request).await;

            let mut state = ctx.state.write().await;
            if let Some(controller) = state.controller.as_mut() {
                match controller.apply_history(&request, result) {
                    Ok(HistoryApplied::Rendered(_)) | Ok(HistoryApplied::Stale) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "history fetch failed");
                        response.error = Some(e.banner_message().to_string());
                    }
                }
            }
        }
    }

    let state = ctx.state.read().await;
    if let Some(controller) = state.controller.as_ref() {
        if let Some(card) = controller.card(&key) {
            response.state = Some(card.state());
        }
        if response.detail_slot.is_some() {
            response.detail_slot = controller.grid().detail_slot();
            response.chart = controller
                .detail()
                .filter(|panel| panel.owner == key)
                .and_then(|panel| panel.chart.clone());
        }
    }
    Json(response).into_response()
}

async fn reload_handler(State(ctx): State<ServerContext>) -> Response {
    if refresh(&ctx).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        let state = ctx.state.read().await;
        (StatusCode::BAD_GATEWAY, Json(serde_json::json!({ "error": state.error }))).into_response()
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SensorValue;
    use crate::gateway::scripted::ScriptedGateway;
    use serde_json::{json, Value};

    fn scripted() -> ScriptedGateway {
        ScriptedGateway::with_devices(&["node-1"])
            .sensors("node-1", &[".3303.0", ".1024.0"])
            .value("node-1", ".3303.0.5700", SensorValue::Number(21.5))
            .value("node-1", ".1024.0.1", SensorValue::Text("OFF".into()))
            .history("node-1", ".3303.0.5700", &[(1_000_000, 21.5)])
    }

    async fn serve(gateway: ScriptedGateway) -> (ServerContext, String) {
        serve_shared(Arc::new(gateway)).await
    }

    // keeps a handle on the gateway so a test can change its answers
    async fn serve_shared(gateway: Arc<ScriptedGateway>) -> (ServerContext, String) {
        let ctx = ServerContext::new(gateway, RuleTable::builtin(), false);
        refresh(&ctx).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(ctx.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (ctx, format!("http://{}", addr))
    }

    async fn toggle(base: &str, sensor: &str) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}/api/devices/node-1/sensors/{}/toggle", base, sensor))
            .json(&json!({"container_width": 1200.0, "card_width": 300.0}))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn toggle_opens_with_chart_then_closes() {
        let (ctx, base) = serve(scripted()).await;

        let (status, body) = toggle(&base, ".3303.0").await;
        assert_eq!(status, 200);
        assert_eq!(body["state"], "open");
        assert_eq!(body["detail_slot"], 2);
        assert_eq!(body["chart"]["series"], json!([[1_000_000, 21.5]]));

        let (_, body) = toggle(&base, ".3303.0").await;
        assert_eq!(body["state"], "closed");
        assert!(ctx.state.read().await.controller.as_ref().unwrap().detail().is_none());
    }

    #[tokio::test]
    async fn bulb_toggle_reports_switch_state() {
        let (_, base) = serve(scripted()).await;
        let (_, body) = toggle(&base, ".1024.0").await;
        assert_eq!(body["bulb_on"], true);
        assert!(body.get("detail_slot").is_none());
    }

    #[tokio::test]
    async fn unknown_card_is_404() {
        let (_, base) = serve(scripted()).await;
        let (status, _) = toggle(&base, ".3304.9").await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn missing_history_reports_the_banner() {
        let gateway = ScriptedGateway::with_devices(&["node-1"])
            .sensors("node-1", &[".3304.0"])
            .value("node-1", ".3304.0.5700", SensorValue::Number(40.0));
        let (_, base) = serve(gateway).await;

        let (status, body) = toggle(&base, ".3304.0").await;
        assert_eq!(status, 200);
        assert_eq!(body["state"], "open");
        assert_eq!(body["error"], "Error when loading sensor statistics!");
        assert!(body.get("chart").is_none());
    }

    #[tokio::test]
    async fn failed_run_serves_banner_and_no_devices() {
        let (_, base) = serve(ScriptedGateway::with_devices(&[])).await;

        let devices: Value = reqwest::get(format!("{}/api/devices", base)).await.unwrap().json().await.unwrap();
        assert_eq!(devices["devices"], json!({}));
        assert_eq!(devices["error"], "Error when loading device list!");

        let page = reqwest::get(format!("{}/", base)).await.unwrap().text().await.unwrap();
        assert!(page.contains("Error when loading device list!"));

        let (status, _) = toggle(&base, ".3303.0").await;
        assert_eq!(status, 503);
    }

    #[tokio::test]
    async fn devices_endpoint_lists_the_model() {
        let (_, base) = serve(scripted()).await;
        let devices: Value = reqwest::get(format!("{}/api/devices", base)).await.unwrap().json().await.unwrap();
        assert_eq!(devices["devices"]["node-1"]["sensors"][0]["id"], ".3303.0");
        assert_eq!(devices["devices"]["node-1"]["sensors"][0]["type"], "temperature");
        assert_eq!(devices["devices"]["node-1"]["sensors"][1]["value"], "OFF");
        assert!(devices["error"].is_null());
        assert!(devices["open"].is_null());

        toggle(&base, ".3303.0").await;
        let devices: Value = reqwest::get(format!("{}/api/devices", base)).await.unwrap().json().await.unwrap();
        assert_eq!(devices["open"], json!({"device": "node-1", "sensor": ".3303.0"}));
    }

    async fn reload(base: &str) -> (u16, Value) {
        let response = reqwest::Client::new().post(format!("{}/api/reload", base)).send().await.unwrap();
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn reload_replaces_the_model_or_reports_the_banner() {
        let gateway = Arc::new(scripted());
        let (_, base) = serve_shared(gateway.clone()).await;
        toggle(&base, ".3303.0").await;

        // a good run starts over with every card closed
        let (status, _) = reload(&base).await;
        assert_eq!(status, 204);
        let devices: Value = reqwest::get(format!("{}/api/devices", base)).await.unwrap().json().await.unwrap();
        assert_eq!(devices["devices"]["node-1"]["sensors"].as_array().unwrap().len(), 2);
        assert!(devices["open"].is_null());
        assert_eq!(gateway.count("devices/list"), 2);

        gateway.set_devices(None);
        let (status, body) = reload(&base).await;
        assert_eq!(status, 502);
        assert_eq!(body["error"], "Error when loading device list!");

        let devices: Value = reqwest::get(format!("{}/api/devices", base)).await.unwrap().json().await.unwrap();
        assert_eq!(devices["devices"], json!({}));
        assert_eq!(devices["error"], "Error when loading device list!");
        let (status, _) = toggle(&base, ".3303.0").await;
        assert_eq!(status, 503);

        // the server recovers on the next good run
        gateway.set_devices(Some(&["node-1"][..]));
        let (status, _) = reload(&base).await;
        assert_eq!(status, 204);
        let devices: Value = reqwest::get(format!("{}/api/devices", base)).await.unwrap().json().await.unwrap();
        assert!(devices["error"].is_null());
    }

    #[tokio::test]
    async fn history_arriving_after_a_reload_is_stale() {
        let gateway = Arc::new(scripted());
        let (ctx, base) = serve_shared(gateway.clone()).await;

        let request = {
            let mut state = ctx.state.write().await;
            let key = CardKey::new("node-1", ".3303.0");
            match state.controller.as_mut().unwrap().toggle(&key, LayoutMetrics::default()).unwrap() {
                ToggleOutcome::Opening { request, .. } => request,
                other => panic!("unexpected {:?}", other),
            }
        };

        assert_eq!(reload(&base).await.0, 204);

        let late = controller::fetch_history(gateway.as_ref(), &request).await;
        let mut state = ctx.state.write().await;
        let fresh = state.controller.as_mut().unwrap();
        assert_eq!(fresh.apply_history(&request, late).unwrap(), HistoryApplied::Stale);
        assert!(fresh.detail().is_none());
        assert!(fresh.open_card().is_none());
    }
}
