//! Supporting document metadata
//!
//! Only metadata and a storage locator are kept here; the bytes live in an
//! external blob store or filesystem.

use bson::DateTime;
use serde::Deserialize;
use tracing::info;

use super::intake::{required, Text};
use super::{parse_id, LoanService, Numeric};
use crate::db::schemas::{
    DocumentInfo, DocumentKind, LoanApplicationDoc, VerificationStatus,
};
use crate::types::{FieldError, LoanDeskError, Result};

/// Metadata for a newly uploaded document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    pub file_name: Option<Text>,
    pub file_size: Option<Numeric>,
    pub file_type: Option<Text>,
    pub storage_path: Option<Text>,
}

/// Reject control characters in values that end up in headers or paths
fn printable(errors: &mut Vec<FieldError>, field: &str, value: Option<String>, label: &str) -> String {
    match value {
        Some(v) if v.chars().any(char::is_control) => {
            errors.push(FieldError::new(
                field,
                format!("{label} must not contain control characters"),
            ));
            String::new()
        }
        Some(v) => v,
        None => String::new(),
    }
}

impl DocumentUpload {
    fn into_info(self, now: DateTime) -> Result<DocumentInfo> {
        let mut errors = Vec::new();

        let file_name = required(&mut errors, "fileName", &self.file_name, "File name");
        let file_name = printable(&mut errors, "fileName", file_name, "File name");
        let file_type = required(&mut errors, "fileType", &self.file_type, "File type")
            .unwrap_or_default();
        let storage_path = required(&mut errors, "storagePath", &self.storage_path, "Storage path");
        let storage_path = printable(&mut errors, "storagePath", storage_path, "Storage path");

        let file_size = match self.file_size {
            Some(Numeric::Number(n)) if n >= 0.0 && n.fract() == 0.0 => n as i64,
            Some(Numeric::Text(s)) if s.trim().parse::<i64>().is_ok_and(|n| n >= 0) => {
                s.trim().parse().unwrap_or_default()
            }
            Some(_) => {
                errors.push(FieldError::new("fileSize", "File size must be a whole number of bytes"));
                0
            }
            None => {
                errors.push(FieldError::new("fileSize", "File size is required"));
                0
            }
        };

        if !errors.is_empty() {
            return Err(LoanDeskError::Validation(errors));
        }

        Ok(DocumentInfo {
            file_name,
            file_size,
            file_type,
            storage_path,
            upload_date: now,
            verification_status: VerificationStatus::Pending,
        })
    }
}

pub(crate) fn parse_kind(kind: &str) -> Result<DocumentKind> {
    DocumentKind::parse(kind.trim()).ok_or_else(|| {
        let allowed: Vec<&str> = DocumentKind::ALL.iter().map(|k| k.as_str()).collect();
        LoanDeskError::invalid(
            "documentKind",
            format!("`{kind}` is not one of {}", allowed.join(", ")),
        )
    })
}

fn parse_verification(status: &str) -> Result<VerificationStatus> {
    VerificationStatus::parse(status.trim()).ok_or_else(|| {
        LoanDeskError::invalid(
            "verificationStatus",
            format!("`{status}` is not one of pending, verified, rejected"),
        )
    })
}

impl LoanService {
    /// Store metadata in one document slot, leaving the others untouched.
    ///
    /// A re-upload replaces the slot and resets its verification to pending.
    pub async fn attach(
        &self,
        id: &str,
        kind: &str,
        upload: DocumentUpload,
    ) -> Result<DocumentInfo> {
        let kind = parse_kind(kind)?;
        let oid = parse_id(id)?;
        let info = upload.into_info(DateTime::now())?;

        let mut record = self.load(oid).await?;
        *record.documents.slot_mut(kind) = Some(info.clone());
        self.store.save(&mut record).await?;

        info!(
            reference = %record.reference(),
            kind = %kind,
            file = %info.file_name,
            size = info.file_size,
            "Document attached"
        );
        Ok(info)
    }

    /// Set one slot's verification status and note the change
    pub async fn set_verification(
        &self,
        id: &str,
        kind: &str,
        status: &str,
        actor: &str,
    ) -> Result<LoanApplicationDoc> {
        let kind = parse_kind(kind)?;
        let status = parse_verification(status)?;
        let oid = parse_id(id)?;

        let mut record = self.load(oid).await?;
        let reference = record.reference().to_string();
        let Some(document) = record.documents.slot_mut(kind).as_mut() else {
            return Err(LoanDeskError::NotFound(format!(
                "{kind} document for application {reference}"
            )));
        };
        document.verification_status = status;

        record.push_note(
            actor,
            &format!("{kind} document status updated to \"{}\"", status.as_str()),
            DateTime::now(),
        );
        self.store.save(&mut record).await?;

        info!(
            reference = %reference,
            kind = %kind,
            status = status.as_str(),
            by = %actor,
            "Document verification updated"
        );
        Ok(record)
    }

    /// Metadata of one filled document slot
    pub async fn document(&self, id: &str, kind: &str) -> Result<DocumentInfo> {
        let kind = parse_kind(kind)?;
        let record = self.lookup(id).await?;
        record.documents.get(kind).cloned().ok_or_else(|| {
            LoanDeskError::NotFound(format!(
                "{kind} document for application {}",
                record.reference()
            ))
        })
    }
}
