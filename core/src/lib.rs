//! Shared types and the backend capability contract for platewatch.

pub mod api;
pub mod error;
pub mod timefmt;
pub mod types;

pub use api::{DetectionApi, StartRequest, DEFAULT_STREAM_URL};
pub use error::ApiError;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
