//! # 探测执行器
//!
//! 执行单次探测：协议适配器构造请求 → 统一传输发送 → 结果归类。

use super::endpoint::{self, EndpointKind};
use super::extract;
use super::job::ProbeJob;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::proxy::transport::ProxyFetchClient;
use crate::{ldebug, lwarn};
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// 单次探测结果
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub success: bool,
    pub latency_ms: i32,
    pub upstream_status: Option<i32>,
    pub error_message: Option<String>,
    pub response_preview: Option<String>,
}

impl ProbeOutcome {
    fn success(latency_ms: i32, status: u16, preview: Option<String>) -> Self {
        Self {
            success: true,
            latency_ms,
            upstream_status: Some(i32::from(status)),
            error_message: None,
            response_preview: preview,
        }
    }

    fn failure(latency_ms: i32, status: Option<u16>, message: String) -> Self {
        Self {
            success: false,
            latency_ms,
            upstream_status: status.map(i32::from),
            error_message: Some(extract::truncate_preview(&message)),
            response_preview: None,
        }
    }
}

/// 执行一次探测
///
/// 传输层错误（超时/连接/TLS/取消）以 `Err` 返回，由任务重试策略
/// 决定是否重试；HTTP 交换完成后的成败归类以 `Ok` 返回。
pub async fn run_probe(
    transport: &Arc<ProxyFetchClient>,
    job: &ProbeJob,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<ProbeOutcome> {
    let url = endpoint::probe_url(&job.base_url, job.endpoint, &job.model_name);
    let headers = endpoint::probe_headers(job.endpoint, &job.api_key);
    let body = endpoint::probe_body(job.endpoint, &job.model_name, prompt);

    ldebug!(
        job.job_id,
        LogStage::Detection,
        LogComponent::Detector,
        "probe_start",
        &format!("开始探测 {} {}", job.endpoint, url),
        model = %job.model_name,
        attempt = job.attempt
    );

    let started = Instant::now();
    let response = transport
        .fetch_json(
            Method::POST,
            &url,
            &headers,
            Some(&body),
            job.proxy.as_deref(),
            cancel,
        )
        .await?;
    let latency_ms = i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX);

    Ok(classify_response(job, latency_ms, &response))
}

fn classify_response(
    job: &ProbeJob,
    latency_ms: i32,
    response: &crate::proxy::transport::JsonResponse,
) -> ProbeOutcome {
    let status = response.status;

    let Some(body) = &response.body else {
        // 响应体不是 JSON，一律视为失败
        let message = if response.raw_preview.is_empty() {
            format!("HTTP {status}: non-JSON response")
        } else {
            format!("HTTP {status}: {}", response.raw_preview)
        };
        return ProbeOutcome::failure(latency_ms, Some(status), message);
    };

    // 即使 HTTP 200，响应体内报告的错误同样判失败
    if let Some(message) = extract::detect_body_error(body) {
        lwarn!(
            job.job_id,
            LogStage::Detection,
            LogComponent::Detector,
            "probe_body_error",
            &format!("上游响应体报告失败: {message}"),
            upstream_status = status
        );
        return ProbeOutcome::failure(latency_ms, Some(status), message);
    }

    if !(200..300).contains(&status) {
        let message = format!("HTTP {status}: {}", response.raw_preview);
        return ProbeOutcome::failure(latency_ms, Some(status), message);
    }

    if job.endpoint == EndpointKind::Image && !extract::image_probe_succeeded(body) {
        return ProbeOutcome::failure(
            latency_ms,
            Some(status),
            "missing data[0].url or data[0].b64_json in response".to_string(),
        );
    }

    let preview = extract::extract_preview(job.endpoint, body);
    ProbeOutcome::success(latency_ms, status, preview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::transport::JsonResponse;
    use serde_json::json;

    fn chat_job() -> ProbeJob {
        ProbeJob {
            job_id: "1-2-CHAT-0-1".into(),
            channel_id: 1,
            channel_name: "openai".into(),
            base_url: "https://u.example".into(),
            api_key: "K".into(),
            proxy: None,
            model_id: 2,
            model_name: "gpt-4o".into(),
            endpoint: EndpointKind::Chat,
            attempt: 1,
        }
    }

    fn response(status: u16, body: serde_json::Value) -> JsonResponse {
        JsonResponse {
            status,
            raw_preview: body.to_string(),
            body: Some(body),
        }
    }

    #[test]
    fn test_successful_chat_probe() {
        let outcome = classify_response(
            &chat_job(),
            42,
            &response(200, json!({"choices": [{"message": {"content": "yes"}}]})),
        );
        assert!(outcome.success);
        assert_eq!(outcome.latency_ms, 42);
        assert_eq!(outcome.upstream_status, Some(200));
        assert_eq!(outcome.response_preview.as_deref(), Some("yes"));
    }

    #[test]
    fn test_http_200_with_body_error_downgrades_to_fail() {
        let outcome = classify_response(
            &chat_job(),
            10,
            &response(200, json!({"error": {"message": "quota exceeded"}})),
        );
        assert!(!outcome.success);
        assert_eq!(outcome.upstream_status, Some(200));
        assert_eq!(outcome.error_message.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_non_2xx_fails() {
        let outcome = classify_response(
            &chat_job(),
            10,
            &response(503, json!({"detail": "overloaded"})),
        );
        assert!(!outcome.success);
        assert_eq!(outcome.upstream_status, Some(503));
    }

    #[test]
    fn test_non_json_body_fails() {
        let outcome = classify_response(
            &chat_job(),
            10,
            &JsonResponse {
                status: 200,
                body: None,
                raw_preview: "<html>gateway</html>".into(),
            },
        );
        assert!(!outcome.success);
        assert!(outcome.error_message.as_deref().unwrap().contains("non-JSON") || outcome
            .error_message
            .as_deref()
            .unwrap()
            .contains("<html>"));
    }

    #[test]
    fn test_image_probe_requires_payload() {
        let mut job = chat_job();
        job.endpoint = EndpointKind::Image;
        let ok = classify_response(&job, 5, &response(200, json!({"data": [{"url": "https://i"}]})));
        assert!(ok.success);

        let missing = classify_response(&job, 5, &response(200, json!({"created": 1})));
        assert!(!missing.success);
    }
}
