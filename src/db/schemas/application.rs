//! Loan application document schema
//!
//! One document per submitted application. Owns the applicant's personal and
//! loan details, the review status, the per-kind document metadata slots and
//! the append-only timeline and notes trails.

use bson::{doc, oid::ObjectId, DateTime, Document};
use chrono::Utc;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for loan applications
pub const APPLICATION_COLLECTION: &str = "loan_applications";

/// Timeline event recorded when an application is first persisted
pub const SUBMISSION_EVENT: &str = "Application submitted";

/// Actor recorded for events the service itself produces
pub const SYSTEM_ACTOR: &str = "System";

// =============================================================================
// Enumerations
// =============================================================================

/// Review status of an application
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ApplicationStatus {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "under review", alias = "under Review")]
    UnderReview,
    #[serde(rename = "approved")]
    Approved,
    #[serde(rename = "rejected")]
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 4] = [
        ApplicationStatus::Pending,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::UnderReview => "under review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Parse a status, accepting the legacy `under Review` spelling
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(ApplicationStatus::Pending),
            "under review" | "under_review" => Some(ApplicationStatus::UnderReview),
            "approved" => Some(ApplicationStatus::Approved),
            "rejected" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applicant employment status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmploymentStatus {
    #[serde(rename = "Full-time")]
    FullTime,
    #[serde(rename = "Part-time")]
    PartTime,
    #[serde(rename = "Self-employed")]
    SelfEmployed,
    #[serde(rename = "Unemployed")]
    Unemployed,
    #[serde(rename = "Retired")]
    Retired,
}

impl EmploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentStatus::FullTime => "Full-time",
            EmploymentStatus::PartTime => "Part-time",
            EmploymentStatus::SelfEmployed => "Self-employed",
            EmploymentStatus::Unemployed => "Unemployed",
            EmploymentStatus::Retired => "Retired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Full-time" => Some(EmploymentStatus::FullTime),
            "Part-time" => Some(EmploymentStatus::PartTime),
            "Self-employed" => Some(EmploymentStatus::SelfEmployed),
            "Unemployed" => Some(EmploymentStatus::Unemployed),
            "Retired" => Some(EmploymentStatus::Retired),
            _ => None,
        }
    }
}

/// Product the applicant is applying for
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoanType {
    #[serde(rename = "Home Loan")]
    HomeLoan,
    #[serde(rename = "Refinance")]
    Refinance,
    #[serde(rename = "Home Equity")]
    HomeEquity,
    #[serde(rename = "Investment Property")]
    InvestmentProperty,
}

impl LoanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanType::HomeLoan => "Home Loan",
            LoanType::Refinance => "Refinance",
            LoanType::HomeEquity => "Home Equity",
            LoanType::InvestmentProperty => "Investment Property",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Home Loan" => Some(LoanType::HomeLoan),
            "Refinance" => Some(LoanType::Refinance),
            "Home Equity" => Some(LoanType::HomeEquity),
            "Investment Property" => Some(LoanType::InvestmentProperty),
            _ => None,
        }
    }
}

/// Loan term in years, restricted to the offered products
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "i32", into = "i32")]
pub struct LoanTerm(u8);

impl LoanTerm {
    pub const ALLOWED_YEARS: [u8; 4] = [10, 15, 20, 30];

    pub fn new(years: i64) -> Option<Self> {
        Self::ALLOWED_YEARS
            .iter()
            .find(|allowed| i64::from(**allowed) == years)
            .map(|allowed| LoanTerm(*allowed))
    }

    pub fn years(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for LoanTerm {
    type Error = String;

    fn try_from(years: i32) -> Result<Self, Self::Error> {
        LoanTerm::new(i64::from(years)).ok_or_else(|| format!("unsupported loan term: {years}"))
    }
}

impl From<LoanTerm> for i32 {
    fn from(term: LoanTerm) -> Self {
        i32::from(term.0)
    }
}

/// Review outcome of a single supporting document
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VerificationStatus::Pending),
            "verified" => Some(VerificationStatus::Verified),
            "rejected" => Some(VerificationStatus::Rejected),
            _ => None,
        }
    }
}

/// Progress marker on a timeline entry
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimelineStatus {
    #[default]
    Completed,
    Current,
    Upcoming,
}

impl TimelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineStatus::Completed => "completed",
            TimelineStatus::Current => "current",
            TimelineStatus::Upcoming => "upcoming",
        }
    }
}

/// The fixed supporting-document categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    IdentityProof,
    AddressProof,
    IncomeProof,
    BankStatements,
    PropertyDocs,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::IdentityProof,
        DocumentKind::AddressProof,
        DocumentKind::IncomeProof,
        DocumentKind::BankStatements,
        DocumentKind::PropertyDocs,
    ];

    /// Wire name used by clients
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::IdentityProof => "identityProof",
            DocumentKind::AddressProof => "addressProof",
            DocumentKind::IncomeProof => "incomeProof",
            DocumentKind::BankStatements => "bankStatements",
            DocumentKind::PropertyDocs => "propertyDocs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Embedded documents
// =============================================================================

/// Metadata for an uploaded supporting document (the bytes live elsewhere)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DocumentInfo {
    /// Client-side file name
    pub file_name: String,

    /// Size in bytes
    pub file_size: i64,

    /// MIME type
    pub file_type: String,

    /// Locator in the blob store or filesystem
    pub storage_path: String,

    pub upload_date: DateTime,

    #[serde(default)]
    pub verification_status: VerificationStatus,
}

/// One optional metadata record per document kind
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DocumentSlots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_proof: Option<DocumentInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_proof: Option<DocumentInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_proof: Option<DocumentInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_statements: Option<DocumentInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_docs: Option<DocumentInfo>,
}

impl DocumentSlots {
    pub fn get(&self, kind: DocumentKind) -> Option<&DocumentInfo> {
        match kind {
            DocumentKind::IdentityProof => self.identity_proof.as_ref(),
            DocumentKind::AddressProof => self.address_proof.as_ref(),
            DocumentKind::IncomeProof => self.income_proof.as_ref(),
            DocumentKind::BankStatements => self.bank_statements.as_ref(),
            DocumentKind::PropertyDocs => self.property_docs.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, kind: DocumentKind) -> &mut Option<DocumentInfo> {
        match kind {
            DocumentKind::IdentityProof => &mut self.identity_proof,
            DocumentKind::AddressProof => &mut self.address_proof,
            DocumentKind::IncomeProof => &mut self.income_proof,
            DocumentKind::BankStatements => &mut self.bank_statements,
            DocumentKind::PropertyDocs => &mut self.property_docs,
        }
    }

    /// Filled slots in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (DocumentKind, &DocumentInfo)> {
        DocumentKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|info| (kind, info)))
    }
}

/// Audit entry for a status-affecting event
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TimelineEvent {
    pub date: DateTime,
    pub event: String,
    #[serde(default)]
    pub status: TimelineStatus,
    pub by: String,
}

/// Free-text staff annotation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Note {
    pub date: DateTime,
    pub author: String,
    pub text: String,
}

// =============================================================================
// Application document
// =============================================================================

/// Loan application document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LoanApplicationDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Write counter used to detect lost updates
    #[serde(default)]
    pub version: i64,

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

    pub employment_status: EmploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employer: Option<String>,
    pub monthly_income: f64,

    pub loan_type: LoanType,
    pub loan_amount: f64,
    pub loan_term: LoanTerm,

    #[serde(default)]
    pub documents: DocumentSlots,

    #[serde(default)]
    pub status: ApplicationStatus,

    pub application_date: DateTime,

    /// Owning user, absent for anonymous submissions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ObjectId>,

    /// Human-readable identifier, assigned once at first persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,

    #[serde(default)]
    pub timeline: Vec<TimelineEvent>,

    #[serde(default)]
    pub notes: Vec<Note>,
}

impl LoanApplicationDoc {
    /// Hex form of the document ID, empty before first persistence
    pub fn id_hex(&self) -> String {
        self._id.map(|id| id.to_hex()).unwrap_or_default()
    }

    pub fn reference(&self) -> &str {
        self.reference_number.as_deref().unwrap_or("")
    }

    /// Assign a reference number from the application date unless one is
    /// already present. Returns the (possibly pre-existing) reference.
    pub fn ensure_reference<F>(&mut self, generate: F) -> &str
    where
        F: FnOnce(chrono::DateTime<Utc>) -> String,
    {
        let application_date = self.application_date.to_chrono();
        self.reference_number
            .get_or_insert_with(|| generate(application_date))
            .as_str()
    }

    /// Seed the timeline with the submission event when it is empty
    pub fn ensure_submission_event(&mut self) {
        if !self.timeline.is_empty() {
            return;
        }
        let date = self.metadata.created_at.unwrap_or(self.application_date);
        self.timeline.push(TimelineEvent {
            date,
            event: SUBMISSION_EVENT.to_string(),
            status: TimelineStatus::Completed,
            by: SYSTEM_ACTOR.to_string(),
        });
    }

    /// Set the status and append its audit entry (plus an optional note)
    pub fn record_status_change(
        &mut self,
        status: ApplicationStatus,
        actor: &str,
        comment: Option<&str>,
        now: DateTime,
    ) {
        self.status = status;
        self.timeline.push(TimelineEvent {
            date: now,
            event: format!("Application {status}"),
            status: TimelineStatus::Completed,
            by: actor.to_string(),
        });

        if let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) {
            self.push_note(actor, comment, now);
        }
    }

    pub fn push_note(&mut self, author: &str, text: &str, now: DateTime) {
        self.notes.push(Note {
            date: now,
            author: author.to_string(),
            text: text.to_string(),
        });
    }
}

impl IntoIndexes for LoanApplicationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on reference number
            (
                doc! { "reference_number": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("reference_number_unique".to_string())
                        .build(),
                ),
            ),
            // Admin list filters
            (
                doc! { "status": 1, "application_date": -1 },
                Some(
                    IndexOptions::builder()
                        .name("status_application_date_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "application_date": -1 },
                Some(
                    IndexOptions::builder()
                        .name("application_date_index".to_string())
                        .build(),
                ),
            ),
            // Owner lookups
            (
                doc! { "user": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_index".to_string())
                        .sparse(true)
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for LoanApplicationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> LoanApplicationDoc {
        LoanApplicationDoc {
            _id: None,
            metadata: Metadata::default(),
            version: 0,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "555-0100".to_string(),
            address: None,
            city: None,
            state: None,
            zip_code: None,
            employment_status: EmploymentStatus::FullTime,
            employer: Some("Analytical Engines".to_string()),
            monthly_income: 12_000.0,
            loan_type: LoanType::HomeLoan,
            loan_amount: 500_000.0,
            loan_term: LoanTerm::new(20).unwrap(),
            documents: DocumentSlots::default(),
            status: ApplicationStatus::Pending,
            application_date: DateTime::from_millis(1_717_200_000_000),
            user: None,
            reference_number: None,
            timeline: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn sample_info(name: &str) -> DocumentInfo {
        DocumentInfo {
            file_name: name.to_string(),
            file_size: 2048,
            file_type: "application/pdf".to_string(),
            storage_path: format!("uploads/{name}"),
            upload_date: DateTime::now(),
            verification_status: VerificationStatus::Pending,
        }
    }

    #[test]
    fn test_status_parse_accepts_legacy_spelling() {
        assert_eq!(
            ApplicationStatus::parse("under Review"),
            Some(ApplicationStatus::UnderReview)
        );
        assert_eq!(
            ApplicationStatus::parse("approved"),
            Some(ApplicationStatus::Approved)
        );
        assert_eq!(ApplicationStatus::parse("done"), None);
        assert_eq!(ApplicationStatus::UnderReview.to_string(), "under review");
    }

    #[test]
    fn test_loan_term_only_allows_offered_years() {
        assert_eq!(LoanTerm::new(15).map(|t| t.years()), Some(15));
        assert!(LoanTerm::new(25).is_none());
        assert!(LoanTerm::try_from(7).is_err());
    }

    #[test]
    fn test_document_kind_round_trips_wire_names() {
        for kind in DocumentKind::ALL {
            assert_eq!(DocumentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DocumentKind::parse("passport"), None);
    }

    #[test]
    fn test_slot_update_leaves_siblings_untouched() {
        let mut slots = DocumentSlots::default();
        *slots.slot_mut(DocumentKind::AddressProof) = Some(sample_info("lease.pdf"));
        let before = slots.clone();

        *slots.slot_mut(DocumentKind::IdentityProof) = Some(sample_info("passport.pdf"));

        assert_eq!(slots.address_proof, before.address_proof);
        assert!(slots.income_proof.is_none());
        assert_eq!(
            slots.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec![DocumentKind::IdentityProof, DocumentKind::AddressProof]
        );
    }

    #[test]
    fn test_ensure_reference_is_assigned_once() {
        let mut doc = sample_doc();
        let first = doc.ensure_reference(|_| "SBM-2024-0601-1234".to_string()).to_string();
        let second = doc.ensure_reference(|_| "SBM-2024-0601-9999".to_string()).to_string();

        assert_eq!(first, "SBM-2024-0601-1234");
        assert_eq!(second, first);
    }

    #[test]
    fn test_submission_event_is_seeded_once() {
        let mut doc = sample_doc();
        doc.ensure_submission_event();
        doc.ensure_submission_event();

        assert_eq!(doc.timeline.len(), 1);
        assert_eq!(doc.timeline[0].event, SUBMISSION_EVENT);
        assert_eq!(doc.timeline[0].by, SYSTEM_ACTOR);
        assert_eq!(doc.timeline[0].date, doc.application_date);
    }

    #[test]
    fn test_status_change_ignores_blank_comment() {
        let mut doc = sample_doc();
        let now = DateTime::now();
        doc.record_status_change(ApplicationStatus::Rejected, "Admin", Some("   "), now);

        assert_eq!(doc.status, ApplicationStatus::Rejected);
        assert_eq!(doc.timeline.last().unwrap().event, "Application rejected");
        assert!(doc.notes.is_empty());
    }

    #[test]
    fn test_bson_round_trip_keeps_enum_wire_values() {
        let mut doc = sample_doc();
        doc.status = ApplicationStatus::UnderReview;
        let bson_doc = bson::to_document(&doc).unwrap();

        assert_eq!(bson_doc.get_str("status").unwrap(), "under review");
        assert_eq!(bson_doc.get_str("loan_type").unwrap(), "Home Loan");
        assert_eq!(bson_doc.get_i32("loan_term").unwrap(), 20);

        let back: LoanApplicationDoc = bson::from_document(bson_doc).unwrap();
        assert_eq!(back, doc);
    }
}
