use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Path, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::request::Parts,
};
use rescue_executors::rescue::RescueError;

use crate::http::error::ApiRescueError;

/// JSON body extractor whose rejections come back as validation errors.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiRescueError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(data)) => Ok(ApiJson(data)),
            Err(rejection) => {
                let message = match rejection {
                    JsonRejection::JsonDataError(err) => format!("Invalid JSON data: {}", err),
                    JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
                    JsonRejection::MissingJsonContentType(_) => {
                        "Missing or invalid Content-Type header. Expected application/json"
                            .to_string()
                    }
                    JsonRejection::BytesRejection(err) => {
                        format!("Failed to read request body: {}", err)
                    }
                    _ => "Invalid JSON request".to_string(),
                };

                Err(ApiRescueError(RescueError::validation(message)))
            }
        }
    }
}

/// Path parameter extractor whose rejections come back as validation errors.
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: serde::de::DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiRescueError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(params)) => Ok(ApiPath(params)),
            Err(rejection) => {
                let message = match rejection {
                    PathRejection::FailedToDeserializePathParams(err) => {
                        format!("Invalid path parameter: {}", err.body_text())
                    }
                    PathRejection::MissingPathParams(err) => err.body_text(),
                    _ => "Invalid path parameters".to_string(),
                };

                Err(ApiRescueError(RescueError::validation(message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, body::to_bytes, http::StatusCode, routing::get};
    use tower::ServiceExt;

    async fn echo(ApiPath((chain_id, address)): ApiPath<(u64, String)>) -> String {
        format!("{chain_id}:{address}")
    }

    async fn call(uri: &str) -> (StatusCode, Vec<u8>) {
        let app = Router::new().route("/ledger/{chainId}/{address}", get(echo));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn extracts_typed_path_params() {
        let (status, body) = call("/ledger/8453/0xabc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"8453:0xabc");
    }

    #[tokio::test]
    async fn non_numeric_chain_id_is_a_structured_validation_error() {
        let (status, body) = call("/ledger/base/0xabc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["details"]["type"], "VALIDATION");
        assert_eq!(json["error"]["retryable"], false);
        let message = json["error"]["message"].as_str().unwrap();
        assert!(message.contains("Invalid path parameter"), "{message}");
    }
}
