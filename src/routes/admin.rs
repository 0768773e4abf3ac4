//! Admin API endpoints for application review
//!
//! ## Endpoints
//!
//! - `GET /api/admin/dashboard/stats` - Counters by status
//! - `GET /api/admin/applications` - List with pagination, search, filter, sort
//! - `GET /api/admin/applications/{id}` - Full record (ID or reference number)
//! - `PUT /api/admin/applications/{id}/status` - Change status
//! - `POST /api/admin/applications/{id}/notes` - Add a note
//! - `GET /api/admin/applications/{id}/documents/{kind}` - Resolve a document
//! - `PUT /api/admin/applications/{id}/documents/{kind}` - Set verification
//!
//! ## Authentication
//!
//! When `ADMIN_API_KEY` is configured every endpoint requires it, either as
//! `X-Api-Key` or as an `Authorization: Bearer` token. The acting admin is
//! taken from `X-Actor` and recorded in timeline entries and notes.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    header::{self, HeaderValue},
    Method, Request, Response, StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use super::views::{notes_view, ApiResponse, ApplicationView, DocumentView, PageView};
use super::{
    actor, error_response, failure_response, header as header_value, json_response, parse_body,
    split_id, FullBody, API_KEY_HEADER,
};
use crate::db::schemas::{ApplicationStatus, LoanType};
use crate::server::http::not_found_response;
use crate::server::AppState;
use crate::store::{ListQuery, SortField, SortOrder};
use crate::types::{FieldError, LoanDeskError};

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddNoteRequest {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyDocumentRequest {
    pub verification_status: Option<String>,
}

/// Build a list query from URL parameters.
///
/// Unknown filter values are rejected rather than silently ignored.
pub(crate) fn list_query_from(query: Option<&str>) -> Result<ListQuery, LoanDeskError> {
    let mut params = ListQuery::default();
    let mut errors = Vec::new();

    if let Some(q) = query {
        for pair in q.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(&value.replace('+', " "))
                .map(|v| v.into_owned())
                .unwrap_or_default();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key {
                "page" => params.page = value.parse().unwrap_or(1),
                "limit" => params.limit = value.parse().unwrap_or(params.limit),
                "search" => params.search = Some(value.to_string()),
                "status" if value != "all" => match ApplicationStatus::parse(value) {
                    Some(status) => params.status = Some(status),
                    None => errors.push(FieldError::new("status", format!("Unknown status `{value}`"))),
                },
                "loanType" | "loan_type" if value != "all" => match LoanType::parse(value) {
                    Some(loan_type) => params.loan_type = Some(loan_type),
                    None => {
                        errors.push(FieldError::new("loanType", format!("Unknown loan type `{value}`")))
                    }
                },
                "sortBy" | "sort_by" => match SortField::parse(value) {
                    Some(field) => params.sort_by = field,
                    None => errors.push(FieldError::new("sortBy", format!("Cannot sort by `{value}`"))),
                },
                "sortOrder" | "sort_order" => match value {
                    "asc" => params.sort_order = SortOrder::Asc,
                    "desc" => params.sort_order = SortOrder::Desc,
                    _ => errors.push(FieldError::new("sortOrder", "Sort order must be asc or desc")),
                },
                _ => {}
            }
        }
    }

    if errors.is_empty() {
        Ok(params)
    } else {
        Err(LoanDeskError::Validation(errors))
    }
}

// =============================================================================
// Auth
// =============================================================================

fn presented_key<B>(req: &Request<B>) -> Option<&str> {
    header_value(req, API_KEY_HEADER).or_else(|| {
        header_value(req, header::AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
    })
}

/// Compare keys without short-circuiting on the first differing byte
fn keys_match(presented: &str, expected: &str) -> bool {
    if presented.len() != expected.len() {
        return false;
    }

    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[allow(clippy::result_large_err)]
fn require_admin<B>(req: &Request<B>, state: &AppState) -> Result<(), Response<FullBody>> {
    let Some(expected) = state.args.admin_key() else {
        return Ok(());
    };

    match presented_key(req) {
        Some(key) if keys_match(key, expected) => Ok(()),
        Some(_) => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Invalid API key",
            Some("UNAUTHORIZED"),
        )),
        None => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Admin API key required",
            Some("UNAUTHORIZED"),
        )),
    }
}

// =============================================================================
// Router
// =============================================================================

pub async fn handle_admin_request(
    req: Request<Bytes>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    if let Err(resp) = require_admin(&req, &state) {
        return resp;
    }

    let method = req.method().clone();
    let subpath = path.strip_prefix("/api/admin").unwrap_or("");

    match (method, subpath) {
        (Method::GET, "/dashboard/stats") => handle_stats(state).await,

        (Method::GET, "/applications") | (Method::GET, "/applications/") => {
            handle_list(&req, state).await
        }

        (method, p) if p.starts_with("/applications/") => {
            let (id, rest) = split_id(&p["/applications".len()..]);
            let id = urlencoding::decode(id)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| id.to_string());

            match (method, rest) {
                (Method::GET, "") | (Method::GET, "/") => handle_get(state, &id).await,
                (Method::PUT, "/status") => handle_update_status(req, state, &id).await,
                (Method::POST, "/notes") => handle_add_note(req, state, &id).await,
                (Method::GET, r) if r.starts_with("/documents/") => {
                    handle_get_document(state, &id, &r["/documents/".len()..]).await
                }
                (Method::PUT, r) if r.starts_with("/documents/") => {
                    let kind = r["/documents/".len()..].to_string();
                    handle_verify_document(req, state, &id, &kind).await
                }
                _ => not_found_response(path),
            }
        }

        _ => not_found_response(path),
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_stats(state: Arc<AppState>) -> Response<FullBody> {
    match state.service.stats().await {
        Ok(stats) => json_response(StatusCode::OK, &ApiResponse::ok(stats)),
        Err(e) => failure_response(&e),
    }
}

async fn handle_list(req: &Request<Bytes>, state: Arc<AppState>) -> Response<FullBody> {
    let query = match list_query_from(req.uri().query()) {
        Ok(q) => q,
        Err(e) => return failure_response(&e),
    };

    match state.service.list(&query).await {
        Ok(page) => json_response(StatusCode::OK, &ApiResponse::ok(PageView::from(&page))),
        Err(e) => failure_response(&e),
    }
}

async fn handle_get(state: Arc<AppState>, id: &str) -> Response<FullBody> {
    match state.service.lookup(id).await {
        Ok(record) => json_response(StatusCode::OK, &ApiResponse::ok(ApplicationView::from(&record))),
        Err(e) => failure_response(&e),
    }
}

async fn handle_update_status(
    req: Request<Bytes>,
    state: Arc<AppState>,
    id: &str,
) -> Response<FullBody> {
    let request: UpdateStatusRequest = match parse_body(req.body()) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(status) = request.status else {
        return failure_response(&LoanDeskError::invalid("status", "Status is required"));
    };
    let actor = actor(&req);

    match state
        .service
        .set_status(id, &status, &actor, request.comment.as_deref())
        .await
    {
        Ok(record) => json_response(
            StatusCode::OK,
            &ApiResponse::with_message(
                ApplicationView::from(&record),
                format!("Application status updated to {}", record.status),
            ),
        ),
        Err(e) => failure_response(&e),
    }
}

async fn handle_add_note(req: Request<Bytes>, state: Arc<AppState>, id: &str) -> Response<FullBody> {
    let request: AddNoteRequest = match parse_body(req.body()) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let actor = actor(&req);
    let text = request.text.unwrap_or_default();

    match state.service.add_note(id, &actor, &text).await {
        Ok(notes) => json_response(StatusCode::OK, &ApiResponse::ok(notes_view(&notes))),
        Err(e) => failure_response(&e),
    }
}

fn is_remote_locator(locator: &str) -> bool {
    locator.starts_with("https://") || locator.starts_with("http://")
}

async fn handle_get_document(state: Arc<AppState>, id: &str, kind: &str) -> Response<FullBody> {
    let info = match state.service.document(id, kind).await {
        Ok(info) => info,
        Err(e) => return failure_response(&e),
    };

    if is_remote_locator(&info.storage_path) {
        match HeaderValue::from_str(&info.storage_path) {
            Ok(location) => {
                let mut response = Response::new(Full::new(Bytes::new()));
                *response.status_mut() = StatusCode::FOUND;
                let headers = response.headers_mut();
                headers.insert(header::LOCATION, location);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                );
                return response;
            }
            Err(_) => warn!(id = %id, kind = %kind, "Locator is not a valid Location header"),
        }
    }

    json_response(StatusCode::OK, &ApiResponse::ok(DocumentView::from(&info)))
}

async fn handle_verify_document(
    req: Request<Bytes>,
    state: Arc<AppState>,
    id: &str,
    kind: &str,
) -> Response<FullBody> {
    let request: VerifyDocumentRequest = match parse_body(req.body()) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(status) = request.verification_status else {
        return failure_response(&LoanDeskError::invalid(
            "verificationStatus",
            "Verification status is required",
        ));
    };
    let actor = actor(&req);

    match state.service.set_verification(id, kind, &status, &actor).await {
        Ok(record) => json_response(
            StatusCode::OK,
            &ApiResponse::with_message(
                ApplicationView::from(&record),
                format!("Document status updated to {}", status.trim()),
            ),
        ),
        Err(e) => failure_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_parses_filters() {
        let query = list_query_from(Some(
            "page=2&limit=25&status=under%20Review&loanType=Home+Equity&search=ada&sortBy=loanAmount&sortOrder=asc",
        ))
        .unwrap();

        assert_eq!(query.page, 2);
        assert_eq!(query.limit, 25);
        assert_eq!(query.status, Some(ApplicationStatus::UnderReview));
        assert_eq!(query.loan_type, Some(LoanType::HomeEquity));
        assert_eq!(query.search.as_deref(), Some("ada"));
        assert_eq!(query.sort_by, SortField::LoanAmount);
        assert_eq!(query.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_list_query_defaults_and_all_filter() {
        let query = list_query_from(Some("status=all&search=&page=abc")).unwrap();
        assert_eq!(query, ListQuery::default());
        assert_eq!(list_query_from(None).unwrap(), ListQuery::default());
    }

    #[test]
    fn test_list_query_rejects_unknown_values() {
        let err = list_query_from(Some("status=closed&sortBy=password")).unwrap_err();
        let fields: Vec<_> = err.fields().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["status", "sortBy"]);
    }

    #[test]
    fn test_keys_match() {
        assert!(keys_match("s3cret", "s3cret"));
        assert!(!keys_match("s3cres", "s3cret"));
        assert!(!keys_match("s3cre", "s3cret"));
        assert!(!keys_match("s3cret!", "s3cret"));
    }

    #[test]
    fn test_presented_key_accepts_header_or_bearer() {
        let req = Request::builder().header("X-Api-Key", "k1").body(()).unwrap();
        assert_eq!(presented_key(&req), Some("k1"));

        let req = Request::builder()
            .header("Authorization", "Bearer k2")
            .body(())
            .unwrap();
        assert_eq!(presented_key(&req), Some("k2"));

        let req = Request::builder().body(()).unwrap();
        assert_eq!(presented_key(&req), None);
    }

    #[test]
    fn test_remote_locator_detection() {
        assert!(is_remote_locator("https://files.example.com/a.pdf"));
        assert!(!is_remote_locator("uploads/a.pdf"));
    }
}
