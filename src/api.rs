use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Local;
use rayon::prelude::*;
use serde_json::Value;
use std::{sync::atomic::Ordering, time::Duration};
use tokio::task::JoinError;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::{EngineError, EngineResult};
use crate::logic::presets;
use crate::models::*;

// --- 1. 路由 ---

pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));
    Router::new()
        .route("/api/break_even", post(handle_break_even))
        .route("/api/break_even/batch", post(handle_batch))
        .route("/api/presets", get(get_presets))
        .route("/api/presets/{name}", get(get_preset))
        .route("/api/metrics", get(get_metrics))
        .route("/api/config", get(get_config))
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
        .with_state(state)
}

// --- 2. 带缓存的计算 ---

/// 双重检查：读锁命中直接返回，未命中在锁外计算后写入
fn cached_evaluate(state: &AppState, req: &BreakEvenRequest) -> EngineResult<BreakEvenResponse> {
    state.metrics.total_calculations.fetch_add(1, Ordering::Relaxed);
    let key = req.parameters.cache_key(req.resolved_horizon());

    if let Some(hit) = state.result_cache.read().get(&key) {
        state.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
        return Ok(hit.clone());
    }

    let response = state.calculator.evaluate(req)?;

    let capacity = state.config.cache_capacity;
    if capacity > 0 {
        let mut cache = state.result_cache.write();
        if cache.len() >= capacity {
            cache.clear();
        }
        cache.insert(key, response.clone());
    }

    Ok(response)
}

// --- 3. 计算接口 ---

/// 请求体不是合法 JSON (或 Content-Type 不符) 时整体视为参数错误
fn rejection_error(rejection: JsonRejection) -> EngineError {
    EngineError::invalid("body", rejection.body_text())
}

/// 解码 + 计算；所有参数错误在此统一计数
fn evaluate_value(state: &AppState, value: Value) -> EngineResult<BreakEvenResponse> {
    BreakEvenRequest::from_json(value)
        .and_then(|req| cached_evaluate(state, &req))
        .inspect_err(|e| note_rejection(state, e))
}

fn note_rejection(state: &AppState, err: &EngineError) {
    state.metrics.rejected_requests.fetch_add(1, Ordering::Relaxed);
    warn!("⚠️ 参数校验失败: {}", err);
}

pub async fn handle_break_even(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BreakEvenResponse>, EngineError> {
    let Json(value) = payload
        .map_err(rejection_error)
        .inspect_err(|e| note_rejection(&state, e))?;
    evaluate_value(&state, value).map(Json)
}

pub async fn handle_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, EngineError> {
    let Json(batch) = payload
        .map_err(rejection_error)
        .inspect_err(|e| note_rejection(&state, e))?;
    let worker_state = state.clone();

    // 卸载 CPU 计算到阻塞线程池，内部并行
    let joined = tokio::task::spawn_blocking(move || {
        batch
            .requests
            .into_par_iter()
            .map(|value| match evaluate_value(&worker_state, value) {
                Ok(response) => BatchEntry { response: Some(response), error: None },
                Err(e) => BatchEntry { response: None, error: Some(e.to_error_body()) },
            })
            .collect::<Vec<BatchEntry>>()
    })
    .await;

    batch_outcome(joined).map(Json)
}

/// 工作线程异常时返回 500，不以空结果冒充成功
fn batch_outcome(joined: Result<Vec<BatchEntry>, JoinError>) -> EngineResult<BatchResponse> {
    match joined {
        Ok(results) => {
            info!("📊 批量计算完成 ({} scenarios)", results.len());
            Ok(BatchResponse { results })
        }
        Err(e) => {
            error!("❌ 批量计算任务异常: {:?}", e);
            Err(EngineError::Internal("batch computation failed".into()))
        }
    }
}

// --- 4. 预设与监控接口 ---

pub async fn get_presets() -> impl IntoResponse {
    Json(presets::presets())
}

pub async fn get_preset(Path(name): Path<String>) -> Result<Json<Preset>, EngineError> {
    presets::preset(&name).map(Json)
}

pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = Local::now().timestamp() - state.metrics.start_time;
    Json(serde_json::json!({
        "total_calculations": state.metrics.total_calculations.load(Ordering::Relaxed),
        "cache_hits": state.metrics.cache_hits.load(Ordering::Relaxed),
        "rejected_requests": state.metrics.rejected_requests.load(Ordering::Relaxed),
        "uptime_sec": uptime,
        "cache_usage": state.result_cache.read().len(),
    }))
}

pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.as_ref().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorBody;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const SCENARIO: &str = r#"{
        "hourlyWage": 23, "devHours": 100,
        "maintenanceHoursH1": 25, "maintenanceHoursH2": 15,
        "maintenanceHoursFromYear2": 5, "salesHoursPerMonth": 20,
        "ticketPrice": 15, "feePercent": 0.04, "feeFixed": 0.5,
        "ticketsPerMonthByYear": [500, 1000, 1500]
    }"#;

    fn post_json(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn break_even_route_returns_result_summary_and_chart() {
        let app = build_router(AppState::new(AppConfig::default()));
        let response = app
            .oneshot(post_json("/api/break_even", SCENARIO.to_string()))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body: BreakEvenResponse = read_json(response).await;
        assert_eq!(body.result.break_even_month, Some(24));
        assert_eq!(body.result.cumulative_cost_series.len(), 36);
        assert!(body.summary.break_even_reached);
        assert_eq!(body.chart.months.len(), 36);
    }

    #[tokio::test]
    async fn invalid_parameter_is_surfaced_as_bad_request() {
        let app = build_router(AppState::new(AppConfig::default()));
        let body = SCENARIO.replace("\"feePercent\": 0.04", "\"feePercent\": 4");
        let response = app.oneshot(post_json("/api/break_even", body)).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorBody = read_json(response).await;
        assert_eq!(err.code, "invalid_parameter");
        assert_eq!(err.field.as_deref(), Some("fee_percent"));
    }

    #[tokio::test]
    async fn negative_ticket_count_is_a_bad_request_naming_the_field() {
        let state = AppState::new(AppConfig::default());
        let app = build_router(state.clone());
        let body = SCENARIO.replace("[500, 1000, 1500]", "[-1, 1000, 1500]");
        let response = app.oneshot(post_json("/api/break_even", body)).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorBody = read_json(response).await;
        assert_eq!(err.code, "invalid_parameter");
        assert_eq!(err.field.as_deref(), Some("tickets_per_month_by_year[0]"));
        assert_eq!(state.metrics.rejected_requests.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn missing_field_and_broken_json_are_bad_requests() {
        let app = build_router(AppState::new(AppConfig::default()));

        let body = SCENARIO.replace("\"ticketPrice\": 15,", "");
        let response = app.clone().oneshot(post_json("/api/break_even", body)).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorBody = read_json(response).await;
        assert_eq!(err.field.as_deref(), Some("ticket_price"));

        let response = app
            .oneshot(post_json("/api/break_even", "{ \"hourlyWage\": 1e400 }".to_string()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorBody = read_json(response).await;
        assert_eq!(err.code, "invalid_parameter");
        assert_eq!(err.field.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn overflowing_parameters_are_rejected_by_the_route() {
        let app = build_router(AppState::new(AppConfig::default()));
        let body = SCENARIO.replace("\"hourlyWage\": 23", "\"hourlyWage\": 1e308");
        let response = app.oneshot(post_json("/api/break_even", body)).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err: ErrorBody = read_json(response).await;
        assert_eq!(err.field.as_deref(), Some("hourly_wage"));
    }

    #[tokio::test]
    async fn failed_batch_worker_is_a_server_error() {
        let joined = tokio::task::spawn_blocking(|| -> Vec<BatchEntry> { panic!("worker died") }).await;
        let err = batch_outcome(joined).expect_err("join failure");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "internal_error");
    }

    #[tokio::test]
    async fn repeated_request_is_served_from_cache() {
        let state = AppState::new(AppConfig::default());
        let app = build_router(state.clone());

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(post_json("/api/break_even", SCENARIO.to_string()))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(state.metrics.total_calculations.load(Ordering::Relaxed), 2);
        assert_eq!(state.metrics.cache_hits.load(Ordering::Relaxed), 1);
        assert_eq!(state.result_cache.read().len(), 1);
    }

    #[tokio::test]
    async fn batch_keeps_request_order_and_reports_errors_inline() {
        let app = build_router(AppState::new(AppConfig::default()));
        let bad = SCENARIO.replace("\"hourlyWage\": 23", "\"hourlyWage\": 0");
        let with_processor = SCENARIO.replace(
            "\"feeFixed\": 0.5,",
            "\"feeFixed\": 0.5, \"paymentProcessorEnabled\": true,",
        );
        let malformed = SCENARIO.replace("[500, 1000, 1500]", "[500, -1000, 1500]");
        let body = format!(r#"{{"requests": [{SCENARIO}, {bad}, {with_processor}, {malformed}]}}"#);

        let response = app
            .oneshot(post_json("/api/break_even/batch", body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let batch: BatchResponse = read_json(response).await;
        assert_eq!(batch.results.len(), 4);
        assert!(batch.results[0].response.is_some());
        assert_eq!(
            batch.results[1].error.as_ref().and_then(|e| e.field.as_deref()),
            Some("hourly_wage")
        );
        let fees_on = batch.results[2].response.as_ref().expect("processor scenario");
        assert_eq!(
            fees_on.summary.processor_fee_line,
            "Payment processor fees per ticket: €0.43"
        );
        assert_eq!(
            batch.results[3].error.as_ref().and_then(|e| e.field.as_deref()),
            Some("tickets_per_month_by_year[1]")
        );
    }

    #[tokio::test]
    async fn batch_with_non_json_body_is_a_bad_request() {
        let app = build_router(AppState::new(AppConfig::default()));
        let response = app
            .oneshot(post_json("/api/break_even/batch", "not json".to_string()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn presets_are_listed_and_unknown_preset_is_not_found() {
        let app = build_router(AppState::new(AppConfig::default()));

        let response = app.clone().oneshot(get("/api/presets")).await.expect("response");
        let list: Vec<Preset> = read_json(response).await;
        assert_eq!(list.len(), 2);

        let response = app.clone().oneshot(get("/api/presets/four_year")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let preset: Preset = read_json(response).await;
        assert_eq!(preset.horizon_years, 4);

        let response = app.oneshot(get("/api/presets/ten_year")).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn config_route_exposes_active_config() {
        let config = AppConfig { enforce_preset_bounds: true, ..AppConfig::default() };
        let app = build_router(AppState::new(config.clone()));
        let response = app.oneshot(get("/api/config")).await.expect("response");
        let body: AppConfig = read_json(response).await;
        assert_eq!(body, config);
    }
}
