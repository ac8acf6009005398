//! # 探测控制处理器
//!
//! 触发/停止/查询探测，以及进度 SSE 订阅。

use crate::app::AppState;
use crate::detection::progress::ProgressEvent;
use crate::detection::service::QueueStatus;
use crate::error::GatewayError;
use crate::management::response::ApiResponse;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

/// 心跳间隔；规范要求订阅者至少每 30 秒收到一次
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// 触发请求体
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub channel_id: Option<i32>,
    pub model_id: Option<i32>,
    pub model_ids: Option<Vec<i32>>,
    #[serde(default)]
    pub with_sync: bool,
}

/// `POST /api/detect`
///
/// 无渠道参数时触发全量探测；带 `channelId` 时只探测该渠道，
/// 可用 `modelId` / `modelIds` 进一步圈定模型。
pub async fn trigger_detection(
    State(state): State<AppState>,
    body: Option<Json<TriggerRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let result = if let Some(channel_id) = request.channel_id {
        let model_ids = match (request.model_ids, request.model_id) {
            (Some(ids), _) if !ids.is_empty() => Some(ids),
            (_, Some(id)) => Some(vec![id]),
            _ => None,
        };
        state
            .detection
            .trigger_channel_detection(channel_id, model_ids)
            .await
    } else {
        state.detection.trigger_full_detection(request.with_sync).await
    };

    match result {
        Ok(summary) => ApiResponse::Success(summary).into_response(),
        Err(e @ GatewayError::ConflictDetectionRunning { .. }) => {
            conflict_with_snapshot(&state, &e).await
        }
        Err(e) => ApiResponse::<Value>::from_error(&e).into_response(),
    }
}

/// 409 响应附带当前进度快照
async fn conflict_with_snapshot(state: &AppState, error: &GatewayError) -> Response {
    let snapshot: Option<QueueStatus> = state.detection.queue_status().await.ok();
    (
        StatusCode::CONFLICT,
        Json(json!({
            "success": false,
            "error": {
                "code": "detection_running",
                "message": error.to_string(),
            },
            "data": snapshot,
        })),
    )
        .into_response()
}

/// `DELETE /api/detect` — 暂停并排空
pub async fn stop_detection(State(state): State<AppState>) -> Response {
    match state.detection.stop_detection().await {
        Ok(cleared) => {
            ApiResponse::Success(json!({"cleared": cleared})).into_response()
        }
        Err(e) => ApiResponse::<Value>::from_error(&e).into_response(),
    }
}

/// `GET /api/detect` — 队列状态
pub async fn detection_status(State(state): State<AppState>) -> Response {
    match state.detection.queue_status().await {
        Ok(status) => ApiResponse::Success(status).into_response(),
        Err(e) => ApiResponse::<Value>::from_error(&e).into_response(),
    }
}

/// `GET /api/sse/progress` — 进度订阅
///
/// 首条为 `connected` 事件，空闲期发送 `heartbeat`；
/// 慢消费者滞后时事件被丢弃（Lagged 转为 `error` 事件）。
pub async fn progress_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let connected = tokio_stream::once(sse_event(&ProgressEvent::Connected));

    let events = BroadcastStream::new(state.progress.subscribe()).map(|item| match item {
        Ok(event) => sse_event(&event),
        Err(_lagged) => sse_event(&ProgressEvent::Error {
            message: "事件滞后，部分进度已丢弃".to_string(),
        }),
    });

    let heartbeats = IntervalStream::new(tokio::time::interval(HEARTBEAT_INTERVAL))
        .map(|_| sse_event(&ProgressEvent::Heartbeat));

    let stream = connected.chain(events.merge(heartbeats));
    Sse::new(stream)
}

fn sse_event(event: &ProgressEvent) -> std::result::Result<Event, Infallible> {
    let data = match event {
        ProgressEvent::Progress(payload) => {
            serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string())
        }
        ProgressEvent::Error { message } => json!({"message": message}).to_string(),
        ProgressEvent::Connected | ProgressEvent::Heartbeat => "{}".to_string(),
    };
    Ok(Event::default().event(event.kind()).data(data))
}
