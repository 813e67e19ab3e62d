//! reqwest-backed implementation of the detection backend contract.
//!
//! Attaches the bearer credential to every request, maps 401 to the
//! distinct irrecoverable-auth error, and retries idempotent reads once on
//! transport failure. Commands (start/stop/delete) are sent exactly once.

use std::time::Duration;

use async_trait::async_trait;
use rand::{thread_rng, Rng};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use platewatch_core::types::{
    Ack, AiStats, Detection, Envelope, PlateImage, PlateProcessReport, PlateSearch, StreamStatus,
};
use platewatch_core::{ApiError, DetectionApi, StartRequest};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct ApiOptions {
    /// Versioned API base, e.g. `http://localhost:8000/api/v1`.
    pub base_url: String,
    /// Bearer credential; requests go out unauthenticated when unset.
    pub token: Option<String>,
    pub timeout_ms: u64,
    /// Single jittered retry on transport failure, idempotent reads only.
    pub retry: bool,
    pub user_agent: String,
}

impl Default for ApiOptions {
    fn default() -> Self {
        ApiOptions {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry: true,
            user_agent: format!("platewatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub struct HttpApi {
    client: Client,
    base: String,
    token: Option<String>,
    retry: bool,
}

impl HttpApi {
    pub fn new(opts: ApiOptions) -> Result<Self, ApiError> {
        // Fail on an unusable base before the first call goes out.
        Url::parse(&opts.base_url).map_err(|e| ApiError::Transport {
            message: format!("invalid base url {}: {}", opts.base_url, e),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_millis(opts.timeout_ms))
            .user_agent(opts.user_agent)
            .build()
            .map_err(|e| ApiError::Transport {
                message: e.to_string(),
            })?;
        Ok(HttpApi {
            client,
            base: opts.base_url.trim_end_matches('/').to_string(),
            token: opts.token,
            retry: opts.retry,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    /// Send an idempotent read, retrying once on connect/timeout failure.
    async fn send_read(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let second = if self.retry { builder.try_clone() } else { None };
        match builder.send().await {
            Ok(resp) => check(resp).await,
            Err(first) => match second {
                Some(again) if retryable(&first) => {
                    let delay = thread_rng().gen_range(100..400);
                    tracing::debug!("transport error, retrying in {delay}ms: {first}");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    match again.send().await {
                        Ok(resp) => check(resp).await,
                        Err(e) => Err(transport(e)),
                    }
                }
                _ => Err(transport(first)),
            },
        }
    }

    /// Send a command exactly once.
    async fn send_command(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        match builder.send().await {
            Ok(resp) => check(resp).await,
            Err(e) => Err(transport(e)),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.send_read(self.auth(self.client.get(self.endpoint(path)))).await?;
        decode(resp).await
    }
}

fn retryable(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport {
        message: err.to_string(),
    }
}

/// Non-string `detail` (request validation errors) just yields no message.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let message = resp
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.detail.or(b.message));
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let bytes = resp.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode {
        message: e.to_string(),
    })
}

/// `data` missing or not an array degrades to an empty list rather than a
/// decode error; the list views just render empty for that fetch.
fn lenient_list<T: DeserializeOwned>(env: Envelope<serde_json::Value>) -> Vec<T> {
    match env.data {
        Some(value) => match serde_json::from_value::<Vec<T>>(value) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!("list payload was not an array: {e}");
                Vec::new()
            }
        },
        None => Vec::new(),
    }
}

#[async_trait]
impl DetectionApi for HttpApi {
    async fn livestream_status(&self) -> Result<StreamStatus, ApiError> {
        self.get_json("ai/livestream/status").await
    }

    async fn start_livestream(&self, req: &StartRequest) -> Result<Ack, ApiError> {
        let builder = self
            .auth(self.client.post(self.endpoint("ai/livestream/start")))
            .json(req);
        decode(self.send_command(builder).await?).await
    }

    async fn stop_livestream(&self) -> Result<Ack, ApiError> {
        let builder = self.auth(self.client.post(self.endpoint("ai/livestream/stop")));
        decode(self.send_command(builder).await?).await
    }

    async fn recent_detections(&self, limit: Option<u32>) -> Result<Vec<Detection>, ApiError> {
        let mut builder = self.auth(self.client.get(self.endpoint("ai/detections/recent")));
        if let Some(n) = limit {
            builder = builder.query(&[("limit", n)]);
        }
        let env: Envelope<serde_json::Value> = decode(self.send_read(builder).await?).await?;
        Ok(lenient_list(env))
    }

    async fn plate_images(&self) -> Result<Vec<PlateImage>, ApiError> {
        let env: Envelope<serde_json::Value> = self.get_json("ai/plates/images").await?;
        Ok(lenient_list(env))
    }

    async fn delete_plate_image(&self, filename: &str) -> Result<Ack, ApiError> {
        let path = format!("ai/plates/images/{filename}");
        let builder = self.auth(self.client.delete(self.endpoint(&path)));
        decode(self.send_command(builder).await?).await
    }

    async fn search_plate(&self, plate: &str) -> Result<PlateSearch, ApiError> {
        self.get_json(&format!("ai/plate/search/{plate}")).await
    }

    async fn process_plate(&self, plate: &str) -> Result<PlateProcessReport, ApiError> {
        let builder = self
            .auth(self.client.post(self.endpoint("ai/plate/detect")))
            .query(&[("license_plate", plate)]);
        let env: Envelope<PlateProcessReport> = decode(self.send_command(builder).await?).await?;
        env.data.ok_or_else(|| ApiError::Decode {
            message: "processing response had no data".to_string(),
        })
    }

    async fn ai_stats(&self) -> Result<AiStats, ApiError> {
        let env: Envelope<AiStats> = self.get_json("ai/stats").await?;
        env.data.ok_or_else(|| ApiError::Decode {
            message: "stats response had no data".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn api(base: &str) -> HttpApi {
        HttpApi::new(ApiOptions {
            base_url: base.to_string(),
            token: Some("testtoken".to_string()),
            retry: false,
            ..ApiOptions::default()
        })
        .unwrap()
    }

    /// Serve one canned HTTP response on a loopback listener, returning the
    /// base URL and a handle resolving to the raw request bytes received.
    async fn serve_once(
        status_line: &str,
        body: &str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = sock.read(&mut buf).await.unwrap_or(0);
            sock.write_all(response.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{addr}/api/v1"), handle)
    }

    #[test]
    fn endpoint_join_tolerates_slashes() {
        let api = api("http://localhost:8000/api/v1/");
        assert_eq!(
            api.endpoint("/ai/livestream/status"),
            "http://localhost:8000/api/v1/ai/livestream/status"
        );
    }

    #[test]
    fn rejects_garbage_base_url() {
        assert!(HttpApi::new(ApiOptions {
            base_url: "not a url".to_string(),
            ..ApiOptions::default()
        })
        .is_err());
    }

    #[test]
    fn lenient_list_swallows_non_array_data() {
        let env: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"status": "success", "data": {"oops": 1}}"#).unwrap();
        let list: Vec<Detection> = lenient_list(env);
        assert!(list.is_empty());

        let env: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"status": "success"}"#).unwrap();
        let list: Vec<Detection> = lenient_list(env);
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn status_fetch_carries_bearer_token() {
        let (base, request) = serve_once(
            "200 OK",
            r#"{"is_streaming": false, "is_task_running": true, "status": "active"}"#,
        )
        .await;
        let status = api(&base).livestream_status().await.unwrap();
        assert!(status.is_task_running);
        let raw = request.await.unwrap();
        assert!(raw.starts_with("GET /api/v1/ai/livestream/status"));
        assert!(raw.contains("authorization: Bearer testtoken") || raw.contains("Authorization: Bearer testtoken"));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_distinct_error() {
        let (base, _request) = serve_once("401 Unauthorized", r#"{"detail": "Not authenticated"}"#).await;
        let err = api(&base).livestream_status().await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn server_error_carries_backend_detail() {
        let (base, _request) =
            serve_once("500 Internal Server Error", r#"{"detail": "Errore nell'avvio monitoraggio"}"#).await;
        let err = api(&base).stop_livestream().await.unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message.as_deref(), Some("Errore nell'avvio monitoraggio"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
