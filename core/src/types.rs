//! Wire types for the detection backend's HTTP contract.
//!
//! Every entity here is owned by the backend; clients hold read-only copies
//! that live for one poll round or one command's duration.

use serde::{Deserialize, Serialize};

/// Remote stream/task state as reported by `GET /ai/livestream/status`.
///
/// Always re-fetched; never inferred from the client's own last command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStatus {
    pub is_streaming: bool,
    pub is_task_running: bool,
    pub status: StreamState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Active,
    Inactive,
}

/// One plate detection emitted by the backend task. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: i64,
    pub license_plate: String,
    /// Normalized to [0, 1] by the backend.
    pub confidence_score: f64,
    /// Opaque backend payload (matched vehicle, appointments, ...). Carried
    /// through untouched.
    #[serde(default)]
    pub detection_data: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_automatic: bool,
    pub created_at: String,
}

/// Saved plate crop artifact. Only metadata crosses the wire; image bytes
/// are never fetched by this client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateImage {
    pub filename: String,
    pub license_plate: String,
    /// Compact `YYYYMMDD_HHMMSS` form extracted from the filename.
    pub timestamp: String,
    pub filepath: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

/// Command acknowledgment for start/stop and image deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub output_url: Option<String>,
}

/// Generic `{status, data, ...}` wrapper used by the list endpoints.
///
/// `data` stays a raw value so a missing or non-array payload can degrade to
/// an empty list instead of a decode error.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::Deserialize<'de>"))]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Response of `GET /ai/plate/search/{plate}`. `status` distinguishes a
/// plate the backend knows nothing about from one with records attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateSearch {
    pub status: SearchStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<PlateSearchResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Found,
    NotFound,
}

/// Join produced by the backend at query time: the vehicle carrying the
/// plate, its owner, and same-day appointments. Each part is independently
/// optional; all-absent is a valid outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateSearchResult {
    pub license_plate: String,
    #[serde(default)]
    pub vehicle: Option<Vehicle>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default, alias = "appointments_today")]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub has_appointment_today: Option<bool>,
}

impl PlateSearchResult {
    /// True when no vehicle, no customer and no appointment came back.
    pub fn is_empty(&self) -> bool {
        self.vehicle.is_none() && self.customer.is_none() && self.appointments.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub fuel_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Same-day appointment attached to a search or processing result.
///
/// The search endpoint emits a flat `service_name`; the processing endpoint
/// nests `service: {id, name}`. Both are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub appointment_date: String,
    #[serde(default)]
    pub service: Option<ServiceRef>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Appointment {
    pub fn service_display(&self) -> Option<&str> {
        self.service
            .as_ref()
            .map(|s| s.name.as_str())
            .or(self.service_name.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRef {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
}

/// Result of manually processing a plate via `POST /ai/plate/detect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateProcessReport {
    pub license_plate: String,
    #[serde(default)]
    pub detected_at: Option<String>,
    #[serde(default)]
    pub vehicle_found: bool,
    #[serde(default, alias = "vehicle_info")]
    pub vehicle: Option<Vehicle>,
    #[serde(default, alias = "customer_info")]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Aggregate counters from `GET /ai/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiStats {
    pub total_detections: u64,
    pub total_vehicles: u64,
    pub today_detections: u64,
    pub today_appointments: u64,
    pub detections_with_appointments: u64,
    pub accuracy_rate: f64,
}

fn default_true() -> bool {
    true
}
