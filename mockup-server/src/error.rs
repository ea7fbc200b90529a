use actix_web::{HttpResponse, ResponseError, error::BlockingError, http::StatusCode};
use mockup_composer::MockupError;
use serde::Serialize;

/// Failure returned by every handler, rendered as `{ "error", "details" }`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Invalid request")]
    Validation(String),
    #[error("Template not found")]
    NotFound(String),
    #[error("Mockup generation failed")]
    Internal(String),
}

impl ApiError {
    pub fn validation(details: impl Into<String>) -> Self {
        Self::Validation(details.into())
    }

    fn details(&self) -> &str {
        match self {
            ApiError::Validation(details)
            | ApiError::NotFound(details)
            | ApiError::Internal(details) => details,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(details) = self {
            tracing::error!(details = %details, "Request failed");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            details: Some(self.details()).filter(|d| !d.is_empty()),
        })
    }
}

impl From<MockupError> for ApiError {
    fn from(err: MockupError) -> Self {
        match err {
            MockupError::NotFound(id) => ApiError::NotFound(format!("no template with id '{id}'")),
            MockupError::Validation(msg) => ApiError::Validation(msg),
            MockupError::Compositing(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<BlockingError> for ApiError {
    fn from(err: BlockingError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;

    use super::*;

    #[actix_web::test]
    async fn error_kinds_map_to_status_codes() {
        let cases = [
            (MockupError::validation("bad"), StatusCode::BAD_REQUEST),
            (MockupError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
            (MockupError::compositing("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[actix_web::test]
    async fn body_is_a_json_envelope() {
        let response = ApiError::validation("quality must be between 1 and 100").error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Invalid request");
        assert_eq!(json["details"], "quality must be between 1 and 100");
    }
}
