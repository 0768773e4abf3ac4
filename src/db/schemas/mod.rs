//! Database schemas for Loan Desk
//!
//! Defines MongoDB document structures for loan applications.

mod application;
mod metadata;

pub use application::{
    ApplicationStatus, DocumentInfo, DocumentKind, DocumentSlots, EmploymentStatus,
    LoanApplicationDoc, LoanTerm, LoanType, Note, TimelineEvent, TimelineStatus,
    VerificationStatus, APPLICATION_COLLECTION, SUBMISSION_EVENT, SYSTEM_ACTOR,
};
pub use metadata::Metadata;
