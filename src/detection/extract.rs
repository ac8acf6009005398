//! # 探测响应内容提取
//!
//! 按端点类型从上游响应体中提取可读文本预览，并识别
//! 「HTTP 200 但响应体内报告失败」的情况。

use super::endpoint::EndpointKind;
use serde_json::Value;

/// 预览与错误消息的最大长度（字符数）
pub const PREVIEW_MAX_CHARS: usize = 500;

/// 截断到预览上限，保持字符边界
#[must_use]
pub fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    text.chars().take(PREVIEW_MAX_CHARS).collect()
}

/// 去除思考过程标记 `<think>…</think>` 包裹的内容
#[must_use]
pub fn strip_think(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        result.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end_rel) => {
                rest = &rest[start + end_rel + "</think>".len()..];
            }
            None => {
                // 未闭合的思考块：丢弃其后全部内容
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result.trim().to_string()
}

fn as_clean_text(value: &Value) -> Option<String> {
    let text = value.as_str()?;
    let cleaned = strip_think(text);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// 按端点类型提取响应内容预览
#[must_use]
pub fn extract_preview(endpoint: EndpointKind, body: &Value) -> Option<String> {
    let text = match endpoint {
        EndpointKind::Chat => extract_chat(body),
        EndpointKind::Claude => extract_claude(body),
        EndpointKind::Gemini => extract_gemini(body),
        EndpointKind::Codex => extract_codex(body),
        EndpointKind::Image => extract_image(body),
    };
    text.map(|t| truncate_preview(&t))
}

/// CHAT：message.content → reasoning_content → refusal → delta.content → text
fn extract_chat(body: &Value) -> Option<String> {
    let choice = body.get("choices")?.get(0)?;
    if let Some(message) = choice.get("message") {
        for field in ["content", "reasoning_content", "refusal"] {
            if let Some(text) = message.get(field).and_then(as_clean_text) {
                return Some(text);
            }
        }
    }
    if let Some(text) = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(as_clean_text)
    {
        return Some(text);
    }
    choice.get("text").and_then(as_clean_text)
}

/// CLAUDE：content[] 中第一个 type == "text" 的块
fn extract_claude(body: &Value) -> Option<String> {
    let blocks = body.get("content")?.as_array()?;
    blocks
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .and_then(|block| block.get("text"))
        .and_then(as_clean_text)
}

/// GEMINI：优先取 thought != true 的文本 part，否则退回第一个文本 part
fn extract_gemini(body: &Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let non_thought = parts.iter().find(|part| {
        part.get("text").is_some() && part.get("thought").and_then(Value::as_bool) != Some(true)
    });
    let chosen = non_thought.or_else(|| parts.iter().find(|part| part.get("text").is_some()))?;
    chosen.get("text").and_then(as_clean_text)
}

/// CODEX：output[].content[] 中第一个 type == "output_text"，否则 output[].text
fn extract_codex(body: &Value) -> Option<String> {
    let outputs = body.get("output")?.as_array()?;
    for output in outputs {
        if let Some(contents) = output.get("content").and_then(Value::as_array) {
            for content in contents {
                if content.get("type").and_then(Value::as_str) == Some("output_text") {
                    if let Some(text) = content.get("text").and_then(as_clean_text) {
                        return Some(text);
                    }
                }
            }
        }
    }
    outputs
        .iter()
        .find_map(|output| output.get("text").and_then(as_clean_text))
}

/// IMAGE：从 data[0] 合成人类可读描述
fn extract_image(body: &Value) -> Option<String> {
    let first = body.get("data")?.get(0)?;
    if let Some(url) = first.get("url").and_then(Value::as_str) {
        return Some(format!("image url: {url}"));
    }
    if first.get("b64_json").and_then(Value::as_str).is_some() {
        let revised = first
            .get("revised_prompt")
            .and_then(Value::as_str)
            .unwrap_or("generated");
        return Some(format!("image b64 ({revised})"));
    }
    None
}

/// IMAGE 端点的成功判定：存在 `data[0].url` 或 `data[0].b64_json`
#[must_use]
pub fn image_probe_succeeded(body: &Value) -> bool {
    body.get("data")
        .and_then(|d| d.get(0))
        .is_some_and(|first| {
            first.get("url").and_then(Value::as_str).is_some()
                || first.get("b64_json").and_then(Value::as_str).is_some()
        })
}

/// 识别响应体内报告的失败（对任意 JSON 响应应用，包括 HTTP 200）
///
/// 命中任意规则即判定为失败，返回提取出的错误消息：
/// 1. `error` 为非空字符串，或带 `message` 的对象（任意形状）
/// 2. `success == false` 且带 `message`
/// 3. `code` 为非 0 数字且带 `message`（格式 `[code] message`）
/// 4. `status` ∈ {"error","fail","failed"}
#[must_use]
pub fn detect_body_error(body: &Value) -> Option<String> {
    if let Some(error) = body.get("error") {
        match error {
            Value::String(s) if !s.trim().is_empty() => {
                return Some(truncate_preview(s));
            }
            Value::Object(map) if !map.is_empty() => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Some(truncate_preview(&message));
            }
            _ => {}
        }
    }

    if body.get("success") == Some(&Value::Bool(false)) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("success=false");
        return Some(truncate_preview(message));
    }

    if let Some(code) = body.get("code").and_then(Value::as_i64) {
        if code != 0 {
            if let Some(message) = body.get("message").and_then(Value::as_str) {
                return Some(truncate_preview(&format!("[{code}] {message}")));
            }
        }
    }

    if let Some(status) = body.get("status").and_then(Value::as_str) {
        if matches!(status, "error" | "fail" | "failed") {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(status);
            return Some(truncate_preview(message));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_think() {
        assert_eq!(strip_think("<think>hmm</think>yes"), "yes");
        assert_eq!(strip_think("a<think>x</think>b<think>y</think>c"), "abc");
        assert_eq!(strip_think("no think"), "no think");
        assert_eq!(strip_think("<think>unclosed"), "");
    }

    #[test]
    fn test_extract_chat_content() {
        let body = json!({"choices": [{"message": {"content": "yes"}}]});
        assert_eq!(extract_preview(EndpointKind::Chat, &body), Some("yes".into()));

        let reasoning = json!({"choices": [{"message": {"content": null, "reasoning_content": "thinking"}}]});
        assert_eq!(
            extract_preview(EndpointKind::Chat, &reasoning),
            Some("thinking".into())
        );

        let delta = json!({"choices": [{"delta": {"content": "partial"}}]});
        assert_eq!(
            extract_preview(EndpointKind::Chat, &delta),
            Some("partial".into())
        );
    }

    #[test]
    fn test_extract_claude_first_text_block() {
        let body = json!({"content": [
            {"type": "thinking", "thinking": "..."},
            {"type": "text", "text": "no"},
        ]});
        assert_eq!(extract_preview(EndpointKind::Claude, &body), Some("no".into()));
    }

    #[test]
    fn test_extract_gemini_skips_thought_parts() {
        let body = json!({"candidates": [{"content": {"parts": [
            {"text": "internal", "thought": true},
            {"text": "visible"},
        ]}}]});
        assert_eq!(
            extract_preview(EndpointKind::Gemini, &body),
            Some("visible".into())
        );

        let only_thought = json!({"candidates": [{"content": {"parts": [
            {"text": "internal", "thought": true},
        ]}}]});
        assert_eq!(
            extract_preview(EndpointKind::Gemini, &only_thought),
            Some("internal".into())
        );
    }

    #[test]
    fn test_extract_codex_output_text() {
        let body = json!({"output": [
            {"type": "reasoning", "content": []},
            {"type": "message", "content": [{"type": "output_text", "text": "yes"}]},
        ]});
        assert_eq!(extract_preview(EndpointKind::Codex, &body), Some("yes".into()));
    }

    #[test]
    fn test_image_probe_success() {
        assert!(image_probe_succeeded(&json!({"data": [{"url": "https://img"}]})));
        assert!(image_probe_succeeded(&json!({"data": [{"b64_json": "aGk="}]})));
        assert!(!image_probe_succeeded(&json!({"data": []})));
        assert!(!image_probe_succeeded(&json!({"created": 0})));
    }

    #[test]
    fn test_detect_body_error_rules() {
        assert_eq!(
            detect_body_error(&json!({"error": {"message": "quota exceeded"}})),
            Some("quota exceeded".into())
        );
        assert_eq!(
            detect_body_error(&json!({"error": "boom"})),
            Some("boom".into())
        );
        assert_eq!(
            detect_body_error(&json!({"success": false, "message": "denied"})),
            Some("denied".into())
        );
        assert_eq!(
            detect_body_error(&json!({"code": 429, "message": "rate limited"})),
            Some("[429] rate limited".into())
        );
        assert_eq!(
            detect_body_error(&json!({"status": "failed", "message": "bad"})),
            Some("bad".into())
        );
        assert_eq!(detect_body_error(&json!({"code": 0, "message": "ok"})), None);
        assert_eq!(
            detect_body_error(&json!({"choices": [{"message": {"content": "yes"}}]})),
            None
        );
    }

    #[test]
    fn test_truncate_preview_at_char_boundary() {
        let long = "好".repeat(600);
        let truncated = truncate_preview(&long);
        assert_eq!(truncated.chars().count(), PREVIEW_MAX_CHARS);
    }
}
