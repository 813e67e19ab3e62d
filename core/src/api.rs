//! The backend capability consumed by the poller, run control and search.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ApiError;
use crate::types::{
    Ack, AiStats, Detection, PlateImage, PlateProcessReport, PlateSearch, StreamStatus,
};

/// Out-of-the-box source consumed by the detection task. Deployments may
/// override it, but this exact default is preserved.
pub const DEFAULT_STREAM_URL: &str = "rtsp://127.0.0.1:8554/webcam";

/// Body of `POST /ai/livestream/start`. Processing flags default to on.
#[derive(Debug, Clone, Serialize)]
pub struct StartRequest {
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    pub enable_face_blur: bool,
    pub enable_plate_blur: bool,
    pub save_plate_images: bool,
}

impl Default for StartRequest {
    fn default() -> Self {
        StartRequest {
            stream_url: DEFAULT_STREAM_URL.to_string(),
            output_url: None,
            enable_face_blur: true,
            enable_plate_blur: true,
            save_plate_images: true,
        }
    }
}

/// Typed surface over the detection backend's HTTP contract.
///
/// Implementations attach credentials and map failures into [`ApiError`];
/// a 401 anywhere must surface as `ApiError::Unauthorized` so the embedding
/// application can invalidate its session. `start_livestream` and
/// `stop_livestream` command the singleton remote task; every other
/// operation is idempotent. Non-2xx means failure, never partial success.
#[async_trait]
pub trait DetectionApi: Send + Sync {
    async fn livestream_status(&self) -> Result<StreamStatus, ApiError>;
    async fn start_livestream(&self, req: &StartRequest) -> Result<Ack, ApiError>;
    async fn stop_livestream(&self) -> Result<Ack, ApiError>;
    async fn recent_detections(&self, limit: Option<u32>) -> Result<Vec<Detection>, ApiError>;
    async fn plate_images(&self) -> Result<Vec<PlateImage>, ApiError>;
    async fn delete_plate_image(&self, filename: &str) -> Result<Ack, ApiError>;
    async fn search_plate(&self, plate: &str) -> Result<PlateSearch, ApiError>;
    async fn process_plate(&self, plate: &str) -> Result<PlateProcessReport, ApiError>;
    async fn ai_stats(&self) -> Result<AiStats, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_defaults() {
        let req = StartRequest::default();
        assert_eq!(req.stream_url, DEFAULT_STREAM_URL);
        assert!(req.enable_face_blur && req.enable_plate_blur && req.save_plate_images);
        let body = serde_json::to_value(&req).unwrap();
        // output_url is omitted entirely when unset
        assert!(body.get("output_url").is_none());
        assert_eq!(body["stream_url"], "rtsp://127.0.0.1:8554/webcam");
    }
}
