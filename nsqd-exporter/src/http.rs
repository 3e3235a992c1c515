/**
 * API HTTP - Surface exposée à Prometheus
 *
 * ROUTES :
 * - GET /stats?target=<adresse> : un probe complet, exposition texte de la cible
 *   (400 si `target` manque, 500 si le header de timeout est illisible,
 *   200 sinon, y compris quand le nsqd est injoignable)
 * - GET /metrics : méta-métriques du process exporter
 * - GET /targets : cibles suivies (JSON)
 * - GET /health  : liveness
 */

use crate::collector::TargetView;
use crate::error::ProbeError;
use crate::health::ExporterHealth;
use crate::probe::{PROMETHEUS_TIMEOUT_HEADER, TIMEOUT_HEADER};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

/// Content-Type de l'exposition texte Prometheus
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Deserialize)]
struct StatsParams {
    target: Option<String>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/health/details", get(get_health))
        .route("/metrics", get(get_metrics))
        .route("/stats", get(get_stats))
        .route("/targets", get(get_targets))
        .with_state(app_state)
}

// GET /stats?target=nsqd:4151
async fn get_stats(
    State(app): State<AppState>,
    Query(params): Query<StatsParams>,
    headers: HeaderMap,
) -> Result<Response, ProbeError> {
    let hint = timeout_hint(&headers)?;
    let deadline = app.prober.timeouts().deadline(hint.as_deref())?;

    let target = params
        .target
        .filter(|t| !t.trim().is_empty())
        .ok_or(ProbeError::MissingTarget)?;

    let outcome = app.prober.probe(&target, deadline).await?;
    Ok(exposition(outcome.body))
}

// GET /metrics (process exporter uniquement)
async fn get_metrics(State(app): State<AppState>) -> Response {
    app.health.set_tracked_targets(app.prober.collectors().len());
    match app.health.encode() {
        Ok(body) => exposition(body),
        Err(e) => {
            tracing::error!("[http] failed to encode exporter metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// GET /targets
async fn get_targets(State(app): State<AppState>) -> Json<Vec<TargetView>> {
    Json(app.prober.collectors().views())
}

// GET /health/details
async fn get_health(State(app): State<AppState>) -> Json<ExporterHealth> {
    app.health.set_tracked_targets(app.prober.collectors().len());
    Json(app.health.get_health())
}

/// Valeur du header de timeout; le header dédié prime sur celui de Prometheus
fn timeout_hint(headers: &HeaderMap) -> Result<Option<String>, ProbeError> {
    for name in [TIMEOUT_HEADER, PROMETHEUS_TIMEOUT_HEADER] {
        if let Some(value) = headers.get(name) {
            let text = value
                .to_str()
                .map_err(|e| ProbeError::InvalidTimeout(format!("{name}: {e}")))?;
            return Ok(Some(text.to_string()));
        }
    }
    Ok(None)
}

fn exposition(body: String) -> Response {
    ([(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn name(raw: &str) -> HeaderName {
        HeaderName::from_bytes(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_timeout_hint_prefers_probe_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(timeout_hint(&headers).unwrap(), None);

        headers.insert(name(PROMETHEUS_TIMEOUT_HEADER), HeaderValue::from_static("10"));
        assert_eq!(timeout_hint(&headers).unwrap().as_deref(), Some("10"));

        headers.insert(name(TIMEOUT_HEADER), HeaderValue::from_static("3"));
        assert_eq!(timeout_hint(&headers).unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn test_timeout_hint_rejects_opaque_bytes() {
        let mut headers = HeaderMap::new();
        headers.insert(name(TIMEOUT_HEADER), HeaderValue::from_bytes(b"\xff\xfe").unwrap());
        assert!(matches!(timeout_hint(&headers), Err(ProbeError::InvalidTimeout(_))));
    }
}
