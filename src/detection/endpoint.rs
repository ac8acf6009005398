//! # 协议适配器
//!
//! 为五类上游端点构造探测请求：完整URL、认证头与最小请求体。
//! 同时负责根据模型名推断应探测的端点集合。

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::OnceLock;

/// Anthropic 协议版本头的取值
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// 端点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointKind {
    /// OpenAI Chat Completions
    Chat,
    /// Anthropic Messages
    Claude,
    /// Google Gemini generateContent
    Gemini,
    /// OpenAI Responses
    Codex,
    /// OpenAI Images
    Image,
}

impl EndpointKind {
    /// 端点标签（持久化与进度事件使用的对外形式）
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "CHAT",
            Self::Claude => "CLAUDE",
            Self::Gemini => "GEMINI",
            Self::Codex => "CODEX",
            Self::Image => "IMAGE",
        }
    }

}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 归一化渠道基础地址：去掉尾部 `/` 与尾部 `/v1`
#[must_use]
pub fn normalize_base_url(base_url: &str) -> String {
    let mut base = base_url.trim().trim_end_matches('/').to_string();
    if base.to_ascii_lowercase().ends_with("/v1") {
        base.truncate(base.len() - 3);
        base = base.trim_end_matches('/').to_string();
    }
    base
}

/// 探测请求的完整 URL
#[must_use]
pub fn probe_url(base_url: &str, endpoint: EndpointKind, model_name: &str) -> String {
    let base = normalize_base_url(base_url);
    match endpoint {
        EndpointKind::Chat => format!("{base}/v1/chat/completions"),
        EndpointKind::Claude => format!("{base}/v1/messages"),
        EndpointKind::Gemini => format!("{base}/v1beta/models/{model_name}:generateContent"),
        EndpointKind::Codex => format!("{base}/v1/responses"),
        EndpointKind::Image => format!("{base}/v1/images/generations"),
    }
}

/// 探测请求的认证头集合
#[must_use]
pub fn probe_headers(endpoint: EndpointKind, api_key: &str) -> Vec<(&'static str, String)> {
    match endpoint {
        EndpointKind::Chat | EndpointKind::Codex | EndpointKind::Image => {
            vec![("authorization", format!("Bearer {api_key}"))]
        }
        EndpointKind::Claude => vec![
            ("x-api-key", api_key.to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ],
        EndpointKind::Gemini => vec![("x-goog-api-key", api_key.to_string())],
    }
}

/// 探测请求体
#[must_use]
pub fn probe_body(endpoint: EndpointKind, model_name: &str, prompt: &str) -> Value {
    match endpoint {
        EndpointKind::Chat => json!({
            "model": model_name,
            "max_tokens": 50,
            "stream": false,
            "messages": [{"role": "user", "content": prompt}],
        }),
        EndpointKind::Claude => json!({
            "model": model_name,
            "max_tokens": 50,
            "stream": false,
            "messages": [{"role": "user", "content": prompt}],
        }),
        EndpointKind::Gemini => json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"maxOutputTokens": 10},
        }),
        EndpointKind::Codex => json!({
            "model": model_name,
            "stream": false,
            "input": [{"role": "user", "content": [{"type": "input_text", "text": prompt}]}],
        }),
        EndpointKind::Image => json!({
            "model": model_name,
            "prompt": prompt,
            "n": 1,
        }),
    }
}

/// 模型列表接口 URL
#[must_use]
pub fn models_list_url(base_url: &str) -> String {
    format!("{}/v1/models", normalize_base_url(base_url))
}

fn codex_model_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"gpt-4o|gpt-5|^o[134](-|$)").expect("内置正则必定合法"))
}

/// 根据模型名推断应探测的端点集合
///
/// CHAT 对任何模型都会探测；其余按名称特征追加。
#[must_use]
pub fn endpoints_for_model(model_name: &str) -> Vec<EndpointKind> {
    let lower = model_name.to_ascii_lowercase();
    let mut endpoints = vec![EndpointKind::Chat];
    if lower.starts_with("claude") {
        endpoints.push(EndpointKind::Claude);
    } else if lower.starts_with("gemini") {
        endpoints.push(EndpointKind::Gemini);
    } else if codex_model_regex().is_match(&lower) {
        endpoints.push(EndpointKind::Codex);
    }
    endpoints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://u.example/"), "https://u.example");
        assert_eq!(normalize_base_url("https://u.example/v1"), "https://u.example");
        assert_eq!(normalize_base_url("https://u.example/v1/"), "https://u.example");
        assert_eq!(
            normalize_base_url("https://u.example/openai/v1"),
            "https://u.example/openai"
        );
        assert_eq!(
            normalize_base_url("https://u.example/v1beta"),
            "https://u.example/v1beta"
        );
    }

    #[test]
    fn test_probe_url_per_endpoint() {
        assert_eq!(
            probe_url("https://u.example/v1", EndpointKind::Chat, "gpt-4o"),
            "https://u.example/v1/chat/completions"
        );
        assert_eq!(
            probe_url("https://u.example", EndpointKind::Gemini, "gemini-2.0-flash"),
            "https://u.example/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(
            probe_url("https://u.example/", EndpointKind::Codex, "o3-mini"),
            "https://u.example/v1/responses"
        );
    }

    #[test]
    fn test_endpoints_for_model() {
        assert_eq!(
            endpoints_for_model("claude-sonnet-4"),
            vec![EndpointKind::Chat, EndpointKind::Claude]
        );
        assert_eq!(
            endpoints_for_model("GEMINI-2.0-flash"),
            vec![EndpointKind::Chat, EndpointKind::Gemini]
        );
        assert_eq!(
            endpoints_for_model("gpt-4o-mini"),
            vec![EndpointKind::Chat, EndpointKind::Codex]
        );
        assert_eq!(
            endpoints_for_model("o3-mini"),
            vec![EndpointKind::Chat, EndpointKind::Codex]
        );
        assert_eq!(endpoints_for_model("o3"), vec![EndpointKind::Chat, EndpointKind::Codex]);
        // o2 不在 Responses 名单中
        assert_eq!(endpoints_for_model("o2-mini"), vec![EndpointKind::Chat]);
        assert_eq!(endpoints_for_model("deepseek-chat"), vec![EndpointKind::Chat]);
    }

    #[test]
    fn test_probe_headers() {
        let claude = probe_headers(EndpointKind::Claude, "sk-test");
        assert!(claude.contains(&("x-api-key", "sk-test".to_string())));
        assert!(claude.contains(&("anthropic-version", ANTHROPIC_VERSION.to_string())));

        let chat = probe_headers(EndpointKind::Chat, "sk-test");
        assert_eq!(chat, vec![("authorization", "Bearer sk-test".to_string())]);
    }

    #[test]
    fn test_probe_body_shapes() {
        let body = probe_body(EndpointKind::Chat, "gpt-4o", "1+1=2? yes or no");
        assert_eq!(body["max_tokens"], 50);
        assert_eq!(body["stream"], false);

        let gemini = probe_body(EndpointKind::Gemini, "gemini-2.0-flash", "hi");
        assert_eq!(gemini["generationConfig"]["maxOutputTokens"], 10);
        assert!(gemini.get("model").is_none());

        let codex = probe_body(EndpointKind::Codex, "o3", "hi");
        assert_eq!(codex["input"][0]["content"][0]["type"], "input_text");
    }
}
