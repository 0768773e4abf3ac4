//! HTTP routes for Loan Desk
//!
//! Handlers take a request whose body has already been collected, so they
//! can be driven directly from tests without a socket.

pub mod admin;
pub mod health;
pub mod loans;
pub mod views;

pub use admin::handle_admin_request;
pub use health::health_check;
pub use loans::handle_loans_request;

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, warn};

use crate::types::{FieldError, LoanDeskError};

pub type FullBody = Full<Bytes>;

/// Header naming the acting staff member
pub const ACTOR_HEADER: &str = "x-actor";
/// Header carrying the owning user's ID
pub const USER_HEADER: &str = "x-user-id";
/// Header carrying the admin API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Actor recorded when a request does not name one
pub const DEFAULT_ACTOR: &str = "Admin";

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

pub fn error_response(status: StatusCode, error: &str, code: Option<&str>) -> Response<FullBody> {
    json_response(
        status,
        &ErrorResponse {
            success: false,
            error: error.to_string(),
            code: code.map(|c| c.to_string()),
            fields: Vec::new(),
        },
    )
}

/// Map a lifecycle error onto its HTTP status and body
pub fn failure_response(err: &LoanDeskError) -> Response<FullBody> {
    let (status, code) = match err {
        LoanDeskError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        LoanDeskError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        LoanDeskError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        LoanDeskError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"),
        LoanDeskError::Config(_) | LoanDeskError::Io(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }

    let error = match err {
        LoanDeskError::Validation(_) => "Invalid input data".to_string(),
        _ if status.is_server_error() => "Internal server error".to_string(),
        _ => err.to_string(),
    };

    json_response(
        status,
        &ErrorResponse {
            success: false,
            error,
            code: Some(code.to_string()),
            fields: err.fields().to_vec(),
        },
    )
}

/// Parse a JSON request body
#[allow(clippy::result_large_err)]
pub fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response<FullBody>> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Invalid JSON body: {}", e);
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("Invalid JSON: {e}"),
            Some("INVALID_JSON"),
        )
    })
}

pub fn header<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Acting staff member for audit entries
pub fn actor<B>(req: &Request<B>) -> String {
    header(req, ACTOR_HEADER).unwrap_or(DEFAULT_ACTOR).to_string()
}

/// Owning user named by the request, if any
#[allow(clippy::result_large_err)]
pub fn owner<B>(req: &Request<B>) -> Result<Option<ObjectId>, Response<FullBody>> {
    match header(req, USER_HEADER) {
        None => Ok(None),
        Some(raw) => ObjectId::parse_str(raw).map(Some).map_err(|_| {
            failure_response(&LoanDeskError::invalid(
                USER_HEADER,
                format!("`{raw}` is not a valid user ID"),
            ))
        }),
    }
}

/// Split `/{id}/rest` into `("id", "/rest")`
pub(crate) fn split_id(subpath: &str) -> (&str, &str) {
    let trimmed = subpath.trim_start_matches('/');
    match trimmed.find('/') {
        Some(i) => (&trimmed[..i], &trimmed[i..]),
        None => (trimmed, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_id() {
        assert_eq!(split_id("/abc/status"), ("abc", "/status"));
        assert_eq!(split_id("/abc"), ("abc", ""));
        assert_eq!(split_id("/abc/documents/identityProof"), ("abc", "/documents/identityProof"));
        assert_eq!(split_id(""), ("", ""));
    }

    #[test]
    fn test_failure_response_status_codes() {
        let cases = [
            (LoanDeskError::invalid("text", "required"), StatusCode::BAD_REQUEST),
            (LoanDeskError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (LoanDeskError::Conflict("x".into()), StatusCode::CONFLICT),
            (LoanDeskError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(failure_response(&err).status(), status);
        }
    }

    #[test]
    fn test_actor_defaults_to_admin() {
        let req = Request::builder().body(()).unwrap();
        assert_eq!(actor(&req), "Admin");

        let req = Request::builder()
            .header("X-Actor", "Admin (a@b.com)")
            .body(())
            .unwrap();
        assert_eq!(actor(&req), "Admin (a@b.com)");
    }

    #[test]
    fn test_owner_header_must_be_an_object_id() {
        let req = Request::builder().header("X-User-Id", "nope").body(()).unwrap();
        let resp = owner(&req).unwrap_err();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let id = ObjectId::new();
        let req = Request::builder()
            .header("X-User-Id", id.to_hex())
            .body(())
            .unwrap();
        assert_eq!(owner(&req).unwrap(), Some(id));
    }
}
