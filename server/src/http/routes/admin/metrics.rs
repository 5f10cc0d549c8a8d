use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rescue_executors::metrics::encode_metrics;

use crate::http::server::RescueServerState;

/// Prometheus metrics endpoint
///
/// Returns rescue, ingestion and lock metrics in Prometheus text format
pub async fn get_metrics(State(state): State<RescueServerState>) -> Result<Response, MetricsError> {
    let metrics_output = encode_metrics(&state.metrics_registry)
        .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics_output,
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to encode metrics: {0}")]
    EncodingFailed(String),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        let error_message = self.to_string();
        tracing::error!("Metrics error: {}", error_message);

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Metrics export failed: {}", error_message),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_failure_is_a_plain_text_500() {
        let response = MetricsError::EncodingFailed("bad family".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain"
        );
    }
}
