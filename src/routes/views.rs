//! JSON views of stored records
//!
//! Records are stored with snake_case fields and BSON dates; clients get
//! camelCase fields and RFC 3339 timestamps.

use bson::DateTime;
use chrono::SecondsFormat;
use serde::Serialize;

use crate::db::schemas::{DocumentInfo, DocumentSlots, LoanApplicationDoc, Note, TimelineEvent};
use crate::store::Page;

/// Success envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

pub fn timestamp(date: DateTime) -> String {
    date.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub storage_path: String,
    pub upload_date: String,
    pub verification_status: &'static str,
}

impl From<&DocumentInfo> for DocumentView {
    fn from(info: &DocumentInfo) -> Self {
        Self {
            file_name: info.file_name.clone(),
            file_size: info.file_size,
            file_type: info.file_type.clone(),
            storage_path: info.storage_path.clone(),
            upload_date: timestamp(info.upload_date),
            verification_status: info.verification_status.as_str(),
        }
    }
}

/// Filled slots only; empty slots are omitted
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentsView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_proof: Option<DocumentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_proof: Option<DocumentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub income_proof: Option<DocumentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_statements: Option<DocumentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_docs: Option<DocumentView>,
}

impl From<&DocumentSlots> for DocumentsView {
    fn from(slots: &DocumentSlots) -> Self {
        let view = |slot: &Option<DocumentInfo>| slot.as_ref().map(DocumentView::from);
        Self {
            identity_proof: view(&slots.identity_proof),
            address_proof: view(&slots.address_proof),
            income_proof: view(&slots.income_proof),
            bank_statements: view(&slots.bank_statements),
            property_docs: view(&slots.property_docs),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimelineView {
    pub date: String,
    pub event: String,
    pub status: &'static str,
    pub by: String,
}

impl From<&TimelineEvent> for TimelineView {
    fn from(event: &TimelineEvent) -> Self {
        Self {
            date: timestamp(event.date),
            event: event.event.clone(),
            status: event.status.as_str(),
            by: event.by.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NoteView {
    pub date: String,
    pub author: String,
    pub text: String,
}

impl From<&Note> for NoteView {
    fn from(note: &Note) -> Self {
        Self {
            date: timestamp(note.date),
            author: note.author.clone(),
            text: note.text.clone(),
        }
    }
}

pub fn notes_view(notes: &[Note]) -> Vec<NoteView> {
    notes.iter().map(NoteView::from).collect()
}

/// Full application record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    pub id: String,
    pub reference_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    pub employment_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employer: Option<String>,
    pub monthly_income: f64,
    pub loan_type: &'static str,
    pub loan_amount: f64,
    pub loan_term: u8,
    pub status: &'static str,
    pub application_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub documents: DocumentsView,
    pub timeline: Vec<TimelineView>,
    pub notes: Vec<NoteView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub version: i64,
}

impl From<&LoanApplicationDoc> for ApplicationView {
    fn from(record: &LoanApplicationDoc) -> Self {
        Self {
            id: record.id_hex(),
            reference_number: record.reference().to_string(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            email: record.email.clone(),
            phone: record.phone.clone(),
            address: record.address.clone(),
            city: record.city.clone(),
            state: record.state.clone(),
            zip_code: record.zip_code.clone(),
            employment_status: record.employment_status.as_str(),
            employer: record.employer.clone(),
            monthly_income: record.monthly_income,
            loan_type: record.loan_type.as_str(),
            loan_amount: record.loan_amount,
            loan_term: record.loan_term.years(),
            status: record.status.as_str(),
            application_date: timestamp(record.application_date),
            user: record.user.map(|u| u.to_hex()),
            documents: DocumentsView::from(&record.documents),
            timeline: record.timeline.iter().map(TimelineView::from).collect(),
            notes: notes_view(&record.notes),
            updated_at: record.metadata.updated_at.map(timestamp),
            version: record.version,
        }
    }
}

/// Row in an application list
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    pub id: String,
    pub reference_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub loan_type: &'static str,
    pub loan_amount: f64,
    pub loan_term: u8,
    pub status: &'static str,
    pub application_date: String,
}

impl From<&LoanApplicationDoc> for ApplicationSummary {
    fn from(record: &LoanApplicationDoc) -> Self {
        Self {
            id: record.id_hex(),
            reference_number: record.reference().to_string(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            email: record.email.clone(),
            loan_type: record.loan_type.as_str(),
            loan_amount: record.loan_amount,
            loan_term: record.loan_term.years(),
            status: record.status.as_str(),
            application_date: timestamp(record.application_date),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub applications: Vec<ApplicationSummary>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl From<&Page> for PageView {
    fn from(page: &Page) -> Self {
        Self {
            applications: page.items.iter().map(ApplicationSummary::from).collect(),
            total: page.total,
            page: page.page,
            limit: page.limit,
            total_pages: page.total_pages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{DocumentKind, VerificationStatus};
    use crate::lifecycle::tests::application_doc;

    #[test]
    fn test_application_view_uses_wire_names() {
        let mut record = application_doc("SBM-2024-0601-5555");
        record.status = crate::db::schemas::ApplicationStatus::UnderReview;
        *record.documents.slot_mut(DocumentKind::IncomeProof) = Some(DocumentInfo {
            file_name: "payslip.pdf".into(),
            file_size: 10,
            file_type: "application/pdf".into(),
            storage_path: "uploads/payslip.pdf".into(),
            upload_date: DateTime::from_millis(0),
            verification_status: VerificationStatus::Verified,
        });

        let json = serde_json::to_value(ApplicationView::from(&record)).unwrap();

        assert_eq!(json["referenceNumber"], "SBM-2024-0601-5555");
        assert_eq!(json["status"], "under review");
        assert_eq!(json["loanType"], "Home Loan");
        assert_eq!(json["loanTerm"], 30);
        assert_eq!(json["documents"]["incomeProof"]["verificationStatus"], "verified");
        assert_eq!(
            json["documents"]["incomeProof"]["uploadDate"],
            "1970-01-01T00:00:00.000Z"
        );
        assert!(json["documents"].get("identityProof").is_none());
        assert!(json.get("address").is_none());
    }
}
