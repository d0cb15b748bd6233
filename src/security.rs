use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{collections::HashMap, convert::Infallible, env, sync::Arc};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AuthState {
    records: Arc<HashMap<String, CallerRecord>>,
}

#[derive(Clone, Debug)]
pub struct AuthContext {
    pub caller_id: String,
    pub api_key_id: String,
}

#[derive(Clone)]
struct CallerRecord {
    caller_id: String,
    api_key_id: String,
}

impl AuthState {
    pub fn from_env() -> Self {
        let raw = env::var("RETRACE_API_KEYS").unwrap_or_else(|_| "local:local-key".to_string());
        let records = parse_keys(&raw);
        if records.is_empty() {
            warn!(
                target = "retrace.api",
                "RETRACE_API_KEYS produced no keys; falling back to local credentials"
            );
            let mut fallback = HashMap::new();
            fallback.insert(
                "local-key".to_string(),
                CallerRecord {
                    caller_id: "local".to_string(),
                    api_key_id: "key-01".to_string(),
                },
            );
            return Self {
                records: Arc::new(fallback),
            };
        }
        info!(
            target = "retrace.api",
            key_count = records.len(),
            "loaded API keys from env"
        );
        Self {
            records: Arc::new(records),
        }
    }

    fn authenticate(&self, presented: &str) -> Option<AuthContext> {
        self.records.get(presented).map(|record| AuthContext {
            caller_id: record.caller_id.clone(),
            api_key_id: record.api_key_id.clone(),
        })
    }
}

pub async fn require_api_auth(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_api_key(request.headers()) else {
        let response =
            unauthorized_response("missing_api_key", "Provide X-Retrace-Key or Bearer token");
        return Ok(response);
    };

    let Some(context) = state.authenticate(&presented) else {
        let response = unauthorized_response("invalid_api_key", "Key not recognized");
        return Ok(response);
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn extract_api_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get("X-Retrace-Key")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn unauthorized_response(code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

fn parse_keys(raw: &str) -> HashMap<String, CallerRecord> {
    let mut entries = HashMap::new();
    for (idx, token) in raw.split(',').enumerate() {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ':');
        let caller_id = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let key = parts.next().map(str::trim).filter(|s| !s.is_empty());
        match (caller_id, key) {
            (Some(caller), Some(secret)) => {
                let record = CallerRecord {
                    caller_id: caller.to_string(),
                    api_key_id: format!("key-{:02}", idx + 1),
                };
                entries.insert(secret.to_string(), record);
            }
            _ => warn!(
                target = "retrace.api",
                "ignored malformed RETRACE_API_KEYS entry: {trimmed}"
            ),
        }
    }
    entries
}
