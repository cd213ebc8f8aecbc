pub mod charts;
pub mod clear;
pub mod health;
pub mod index;
pub mod reports;
pub mod upload;

use serde::Serialize;
use utoipa::ToSchema;

/// Body of every error response
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Always "error"
    pub status: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    /// Always "success"
    pub status: String,
    pub message: String,
}

impl MessageResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}
