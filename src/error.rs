//! Error types shared by the navigation engine.

/// Errors returned by path construction, rerouting and input adapters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavError {
    #[error("path has no points")]
    InvalidPath,

    #[error("invalid reroute range: anchor {anchor}, target {target}")]
    InvalidRange { anchor: usize, target: usize },

    #[error("no position fix available")]
    NoPosition,

    #[error("unknown companion: {0}")]
    UnknownCompanion(String),

    #[error("no companion is requesting help")]
    NoHelpRequest,

    #[error("GPX parse error: {0}")]
    Gpx(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(String),
}
