use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use maxwell_common::openai::RELAY_ENDPOINT_PATH;
use serde_json::Value;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, RelayError};

#[derive(Clone)]
pub struct RelayState {
    http: reqwest::Client,
    upstream_url: Arc<str>,
    api_key: Arc<str>,
}

impl RelayState {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent("maxwell/relay")
            .build()?;
        Ok(Self {
            http,
            upstream_url: Arc::from(config.upstream_url.as_str()),
            api_key: Arc::from(config.api_key.as_str()),
        })
    }
}

pub fn router(state: RelayState, config: &Config) -> Result<Router, AppError> {
    Ok(Router::new()
        .route("/health", get(health_check))
        .route(RELAY_ENDPOINT_PATH, post(analyze_circuit))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(cors_layer(config.cors_origin.as_deref())?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, AppError> {
    let allow_origin = match origin {
        None => AllowOrigin::any(),
        Some(o) => AllowOrigin::exact(
            HeaderValue::from_str(o)
                .map_err(|_| AppError::Config(format!("invalid CORS_ORIGIN: {o}")))?,
        ),
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

async fn health_check() -> &'static str {
    "OK"
}

/// Forward a chat-completion body to the upstream model API with the server-side
/// credential attached. Single shot: no retries, nothing cached.
async fn analyze_circuit(
    State(state): State<RelayState>,
    Json(body): Json<Value>,
) -> Result<Response, RelayError> {
    let model = body.get("model").and_then(|v| v.as_str()).unwrap_or("<unset>");
    info!(model, "received request to analyze circuit");

    let resp = state
        .http
        .post(&*state.upstream_url)
        .bearer_auth(&*state.api_key)
        .json(&body)
        .send()
        .await
        .inspect_err(|e| error!(error = %e, "upstream request failed"))?;

    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    info!(status = %status, "upstream responded");

    if !status.is_success() {
        let text = resp.text().await?;
        warn!(status = %status, body = %text, "upstream returned error");
        return Err(RelayError::Upstream { status, body: text });
    }

    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let bytes: Bytes = resp
        .bytes()
        .await
        .inspect_err(|e| error!(error = %e, "failed to read upstream body"))?;

    Ok((status, [(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{body::Body, http::Request};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::config::DEFAULT_BODY_LIMIT_BYTES;

    async fn spawn_upstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn config(upstream_url: String) -> Config {
        Config {
            upstream_url,
            api_key: "secret-key".to_string(),
            cors_origin: None,
            port: 0,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }

    fn relay(config: &Config) -> Router {
        router(RelayState::new(config).unwrap(), config).unwrap()
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(RELAY_ENDPOINT_PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn forwards_body_with_bearer_credential() {
        let upstream = Router::new().route(
            "/v1/chat/completions",
            post(|headers: axum::http::HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "auth": auth,
                    "echo": body,
                    "choices": [{"message": {"content": "ok"}}]
                }))
            }),
        );
        let cfg = config(spawn_upstream(upstream).await);
        let request_body = json!({
            "model": "nvidia/nemotron-nano-12b-v2-vl",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 16,
            "temperature": 0.2,
            "stream": false
        });

        let resp = relay(&cfg).oneshot(post_json(request_body.clone())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_json(resp).await;
        assert_eq!(body["auth"], "Bearer secret-key");
        assert_eq!(body["echo"], request_body);
        assert_eq!(body["choices"][0]["message"]["content"], "ok");
    }

    #[tokio::test]
    async fn mirrors_upstream_error_status_and_text() {
        let upstream = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let cfg = config(spawn_upstream(upstream).await);

        let resp = relay(&cfg).oneshot(post_json(json!({"model": "m"}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(read_json(resp).await, json!({"error": "slow down"}));
    }

    #[tokio::test]
    async fn transport_failure_is_internal_error_with_stack() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let cfg = config(format!("http://{addr}/v1/chat/completions"));

        let resp = relay(&cfg).oneshot(post_json(json!({"model": "m"}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(resp).await;
        assert!(body["error"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(body["stack"].as_str().is_some());
    }

    #[tokio::test]
    async fn health_check_answers_ok() {
        let cfg = config("http://127.0.0.1:9/unused".to_string());
        let resp = relay(&cfg)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_forwarding() {
        let mut cfg = config("http://127.0.0.1:9/unused".to_string());
        cfg.body_limit_bytes = 64;
        let body = json!({"model": "m", "messages": [{"role": "user", "content": "x".repeat(256)}]});

        let resp = relay(&cfg).oneshot(post_json(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn rejects_unrepresentable_cors_origin() {
        assert!(cors_layer(Some("bad\norigin")).is_err());
        assert!(cors_layer(Some("http://localhost:5173")).is_ok());
        assert!(cors_layer(None).is_ok());
    }
}
