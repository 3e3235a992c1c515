use crate::registry::RegistryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Erreurs qui rejettent la requête de probe avant toute mutation d'état.
/// Les échecs côté nsqd ne sont PAS des erreurs : ils donnent `scrape_success 0`.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Instance target parameter is missing")]
    MissingTarget,
    #[error("Failed to parse timeout from Prometheus header: {0}")]
    InvalidTimeout(String),
    #[error("metrics registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

impl ProbeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProbeError::MissingTarget => StatusCode::BAD_REQUEST,
            ProbeError::InvalidTimeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProbeError::Registry(_) | ProbeError::Prometheus(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProbeError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
