//! Public loan application endpoints
//!
//! - `POST /api/loans` - Submit an application
//! - `GET /api/loans/mine` - Applications owned by the caller
//! - `GET /api/loans/{reference}` - Track one application
//! - `POST /api/loans/{id}/documents` - Register an uploaded document
//!
//! The caller is identified by `X-User-Id`. Anonymous submissions are
//! allowed; an application with an owner is only visible to that owner.

use bson::oid::ObjectId;
use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use super::admin::list_query_from;
use super::views::{ApiResponse, ApplicationView, DocumentView, PageView};
use super::{error_response, failure_response, json_response, owner, parse_body, split_id, FullBody};
use crate::db::schemas::LoanApplicationDoc;
use crate::lifecycle::{DocumentUpload, NewApplication, Text};
use crate::server::http::not_found_response;
use crate::server::AppState;
use crate::types::LoanDeskError;

/// Body of a document registration
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachDocumentRequest {
    pub document_kind: Option<Text>,
    #[serde(flatten)]
    pub upload: DocumentUpload,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmittedResponse {
    reference_number: String,
    application: ApplicationView,
}

/// Whether `requester` may see `record`
fn visible_to(record: &LoanApplicationDoc, requester: Option<ObjectId>) -> bool {
    match record.user {
        None => true,
        Some(owner) => requester == Some(owner),
    }
}

fn forbidden() -> Response<FullBody> {
    error_response(
        StatusCode::FORBIDDEN,
        "You do not have permission to view this application",
        Some("FORBIDDEN"),
    )
}

pub async fn handle_loans_request(
    req: Request<Bytes>,
    state: Arc<AppState>,
    path: &str,
) -> Response<FullBody> {
    let method = req.method().clone();
    let subpath = path.strip_prefix("/api/loans").unwrap_or("");

    match (method, subpath) {
        (Method::POST, "") | (Method::POST, "/") => handle_submit(req, state).await,

        (Method::GET, "/mine") => handle_mine(req, state).await,

        (Method::POST, p) if p.ends_with("/documents") => {
            let (id, rest) = split_id(p);
            if rest != "/documents" {
                return not_found_response(path);
            }
            handle_attach(req, state, id).await
        }

        (Method::GET, p) => {
            let (reference, rest) = split_id(p);
            if reference.is_empty() || !rest.is_empty() {
                return not_found_response(path);
            }
            handle_track(req, state, reference).await
        }

        _ => not_found_response(path),
    }
}

async fn handle_submit(req: Request<Bytes>, state: Arc<AppState>) -> Response<FullBody> {
    let requester = match owner(&req) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let input: NewApplication = match parse_body(req.body()) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match state.service.create(input, requester).await {
        Ok(record) => json_response(
            StatusCode::CREATED,
            &ApiResponse::with_message(
                SubmittedResponse {
                    reference_number: record.reference().to_string(),
                    application: ApplicationView::from(&record),
                },
                "Your loan application has been submitted successfully!",
            ),
        ),
        Err(e) => failure_response(&e),
    }
}

async fn handle_mine(req: Request<Bytes>, state: Arc<AppState>) -> Response<FullBody> {
    let requester = match owner(&req) {
        Ok(Some(o)) => o,
        Ok(None) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "X-User-Id header is required",
                Some("UNAUTHENTICATED"),
            )
        }
        Err(resp) => return resp,
    };

    let mut query = match list_query_from(req.uri().query()) {
        Ok(q) => q,
        Err(e) => return failure_response(&e),
    };
    query.user = Some(requester);

    match state.service.list(&query).await {
        Ok(page) => json_response(StatusCode::OK, &ApiResponse::ok(PageView::from(&page))),
        Err(e) => failure_response(&e),
    }
}

async fn handle_track(req: Request<Bytes>, state: Arc<AppState>, reference: &str) -> Response<FullBody> {
    let requester = match owner(&req) {
        Ok(o) => o,
        Err(resp) => return resp,
    };

    match state.service.lookup(reference).await {
        Ok(record) if visible_to(&record, requester) => {
            json_response(StatusCode::OK, &ApiResponse::ok(ApplicationView::from(&record)))
        }
        Ok(_) => forbidden(),
        Err(e) => failure_response(&e),
    }
}

async fn handle_attach(req: Request<Bytes>, state: Arc<AppState>, id: &str) -> Response<FullBody> {
    let requester = match owner(&req) {
        Ok(o) => o,
        Err(resp) => return resp,
    };
    let request: AttachDocumentRequest = match parse_body(req.body()) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let kind = match request.document_kind {
        Some(Text::Str(kind)) => kind,
        Some(Text::Mismatched(_)) => {
            return failure_response(&LoanDeskError::invalid(
                "documentKind",
                "Document kind must be a string",
            ))
        }
        None => {
            return failure_response(&LoanDeskError::invalid(
                "documentKind",
                "Document kind is required",
            ))
        }
    };

    match state.service.find_by_id(id).await {
        Ok(record) if visible_to(&record, requester) => {}
        Ok(_) => return forbidden(),
        Err(e) => return failure_response(&e),
    }

    match state.service.attach(id, &kind, request.upload).await {
        Ok(info) => json_response(StatusCode::CREATED, &ApiResponse::ok(DocumentView::from(&info))),
        Err(e) => failure_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::tests::application_doc;

    #[test]
    fn test_owned_records_are_private() {
        let owner_id = ObjectId::new();
        let mut record = application_doc("SBM-2024-0601-7777");

        assert!(visible_to(&record, None));

        record.user = Some(owner_id);
        assert!(visible_to(&record, Some(owner_id)));
        assert!(!visible_to(&record, Some(ObjectId::new())));
        assert!(!visible_to(&record, None));
    }
}
