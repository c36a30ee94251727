// src/error.rs
use crate::access::TopoAction;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopoError {
    /// Zero-sized or undecodable image. Nothing was mutated.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The crop step could not be prepared; callers fall back to the original file.
    #[error("crop tool unavailable: {0}")]
    CropUnavailable(String),

    #[error("annotation document is corrupt: {0}")]
    DocumentCorrupt(String),

    #[error("you are not allowed to {0}")]
    CapabilityDenied(TopoAction),

    #[error("could not fetch the topo image for offline use: {0}")]
    OfflineFetchFailed(String),

    #[error("offline storage failed: {0}")]
    Storage(String),
}

impl TopoError {
    /// Whether the caller may carry on with a degraded result.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TopoError::CropUnavailable(_) | TopoError::DocumentCorrupt(_)
        )
    }
}

impl From<serde_json::Error> for TopoError {
    fn from(err: serde_json::Error) -> Self {
        TopoError::DocumentCorrupt(err.to_string())
    }
}
