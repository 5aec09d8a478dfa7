//! axum extraction of [`RequestInput`].

use super::normalize::{RequestInput, parse_query};
use crate::envelope::{Envelope, ErrorBody, INVALID_BODY};
use axum::body::to_bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::response::{IntoResponse, Response};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Largest body read into a [`RequestInput`].
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

fn invalid_body(message: impl Into<String>) -> Response {
    Envelope::<()>::failure(ErrorBody::new(INVALID_BODY, message)).into_response()
}

impl<S> FromRequest<S> for RequestInput
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();

        // Routes without captures have no path parameters
        let path = Path::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();
        let query = parts.uri.query().map(parse_query).unwrap_or_default();

        let bytes = to_bytes(body, BODY_LIMIT)
            .await
            .map_err(|e| invalid_body(format!("Failed to read request body: {}", e)))?;
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            let value: JsonValue = serde_json::from_slice(&bytes)
                .map_err(|e| invalid_body(format!("Request body is not valid JSON: {}", e)))?;
            Some(value)
        };

        Ok(RequestInput { path, body, query })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParamValue;
    use axum::body::Body;
    use axum::http::StatusCode;

    async fn extract(req: Request) -> Result<RequestInput, Response> {
        RequestInput::from_request(req, &()).await
    }

    #[tokio::test]
    async fn test_query_and_body_are_read() {
        let req = Request::builder()
            .method("POST")
            .uri("/users?active=1&name=Ann%20Lee")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name": "Bo", "age": 30}"#))
            .unwrap();

        let input = extract(req).await.unwrap();
        assert!(input.path.is_empty());
        assert_eq!(input.query.get("name").map(String::as_str), Some("Ann Lee"));

        let bag = input.merge();
        assert_eq!(bag.get("name"), Some(&ParamValue::from("Ann Lee")));
        assert_eq!(bag.get("age"), Some(&ParamValue::Int(30)));
        assert_eq!(bag.get("active"), Some(&ParamValue::from("1")));
    }

    #[tokio::test]
    async fn test_empty_body_is_absent() {
        let req = Request::builder().uri("/users").body(Body::empty()).unwrap();
        let input = extract(req).await.unwrap();
        assert_eq!(input.body, None);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let req = Request::builder()
            .method("POST")
            .uri("/users")
            .body(Body::from("{not json"))
            .unwrap();

        let response = extract(req).await.unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
