//! Application record store
//!
//! The [`ApplicationStore`] trait is the persistence seam for the loan
//! lifecycle. `MongoApplicationStore` is the production backend;
//! `MemoryApplicationStore` backs dev mode (no database) and the tests.
//!
//! Every `save` is a single-record atomic replace guarded by the record's
//! `version`, so a writer that read a stale copy gets `Conflict` instead of
//! silently discarding someone else's timeline entries.

mod memory;
mod mongo;

pub use memory::MemoryApplicationStore;
pub use mongo::MongoApplicationStore;

use async_trait::async_trait;
use bson::oid::ObjectId;
use serde::Serialize;

use crate::db::schemas::{ApplicationStatus, LoanApplicationDoc, LoanType};
use crate::types::Result;

/// Default number of applications per page
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Sortable columns for the application list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    ApplicationDate,
    LoanAmount,
    LastName,
    Status,
}

impl SortField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applicationDate" | "createdAt" => Some(SortField::ApplicationDate),
            "loanAmount" => Some(SortField::LoanAmount),
            "lastName" => Some(SortField::LastName),
            "status" => Some(SortField::Status),
            _ => None,
        }
    }

    /// Stored field name
    pub fn db_field(&self) -> &'static str {
        match self {
            SortField::ApplicationDate => "application_date",
            SortField::LoanAmount => "loan_amount",
            SortField::LastName => "last_name",
            SortField::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter, sort and pagination for listing applications
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
    pub status: Option<ApplicationStatus>,
    pub loan_type: Option<LoanType>,
    pub user: Option<ObjectId>,
    /// Case-insensitive substring over names, email and reference number
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            status: None,
            loan_type: None,
            user: None,
            search: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ListQuery {
    /// Number of records before the requested page
    pub fn skip(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit)
    }

    /// Search term, ignoring blank input
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }
}

/// One page of applications
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<LoanApplicationDoc>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub fn total_pages(&self) -> u32 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit)) as u32
    }
}

/// Counters for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_applications: u64,
    pub pending_review: u64,
    pub under_review: u64,
    pub approved: u64,
    pub rejected: u64,
    /// Sum of loan amounts over approved applications
    pub total_approved_amount: f64,
}

impl DashboardStats {
    /// Bump the counter for one application
    pub fn count(&mut self, status: ApplicationStatus, loan_amount: f64) {
        self.total_applications += 1;
        match status {
            ApplicationStatus::Pending => self.pending_review += 1,
            ApplicationStatus::UnderReview => self.under_review += 1,
            ApplicationStatus::Approved => {
                self.approved += 1;
                self.total_approved_amount += loan_amount;
            }
            ApplicationStatus::Rejected => self.rejected += 1,
        }
    }
}

/// Persistence for loan application records
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Persist a new record; fills in `_id` and metadata on success.
    /// A reference number collision fails with `Conflict`.
    async fn insert(&self, record: &mut LoanApplicationDoc) -> Result<()>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<LoanApplicationDoc>>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<LoanApplicationDoc>>;

    async fn list(&self, query: &ListQuery) -> Result<Page>;

    /// Atomically replace a previously loaded record.
    ///
    /// Fails with `Conflict` when the stored version no longer matches the
    /// record's version or the reference number differs, and with `NotFound`
    /// when the record does not exist. Bumps `version` on success.
    async fn save(&self, record: &mut LoanApplicationDoc) -> Result<()>;

    async fn stats(&self) -> Result<DashboardStats>;

    /// Release backend resources
    async fn close(&self) -> Result<()>;

    /// Backend name for health reporting
    fn backend(&self) -> &'static str;
}

/// Whether a record matches a lowercased search needle
pub(crate) fn matches_search(record: &LoanApplicationDoc, needle: &str) -> bool {
    [
        record.first_name.as_str(),
        record.last_name.as_str(),
        record.email.as_str(),
        record.reference(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_is_zero_based_from_page_one() {
        let mut query = ListQuery::default();
        assert_eq!(query.skip(), 0);

        query.page = 3;
        query.limit = 25;
        assert_eq!(query.skip(), 50);

        query.page = 0;
        assert_eq!(query.skip(), 0);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let page = Page {
            items: Vec::new(),
            total: 21,
            page: 1,
            limit: 10,
        };
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn test_blank_search_is_ignored() {
        let query = ListQuery {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(query.search_term(), None);
    }

    #[test]
    fn test_stats_sum_only_approved_amounts() {
        let mut stats = DashboardStats::default();
        stats.count(ApplicationStatus::Approved, 100.0);
        stats.count(ApplicationStatus::Rejected, 50.0);
        stats.count(ApplicationStatus::UnderReview, 10.0);

        assert_eq!(stats.total_applications, 3);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.total_approved_amount, 100.0);
    }
}
