//! Loan application lifecycle
//!
//! [`LoanService`] owns the rules that sit on top of the record store:
//! intake validation, reference stamping, status changes with their audit
//! trail, and document attachment/verification. Every mutation is one
//! load-modify-save against the store, so a status and its timeline entry
//! are always committed together.

mod documents;
mod intake;
pub mod reference;
mod status;

pub use documents::DocumentUpload;
pub use intake::{NewApplication, Numeric, Text};
pub use reference::{ReferenceGenerator, DEFAULT_REFERENCE_PREFIX};

use bson::{oid::ObjectId, DateTime};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::schemas::LoanApplicationDoc;
use crate::store::{ApplicationStore, DashboardStats, ListQuery, Page};
use crate::types::{LoanDeskError, Result};

/// Upper bound applied to list page sizes
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Parse a hex document ID
pub fn parse_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id.trim())
        .map_err(|_| LoanDeskError::invalid("id", format!("`{id}` is not a valid application ID")))
}

/// Lifecycle operations over an injected store
#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn ApplicationStore>,
    references: ReferenceGenerator,
    max_page_size: u32,
}

impl LoanService {
    pub fn new(store: Arc<dyn ApplicationStore>, references: ReferenceGenerator) -> Self {
        Self {
            store,
            references,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn ApplicationStore> {
        &self.store
    }

    /// Validate a submission and persist it as a new pending application.
    ///
    /// The record leaves here with its reference number and the initial
    /// submission event. A reference collision is reported as `Conflict`.
    pub async fn create(
        &self,
        input: NewApplication,
        owner: Option<ObjectId>,
    ) -> Result<LoanApplicationDoc> {
        let mut record = input.into_record(owner, DateTime::now())?;
        record.ensure_reference(|created_at| self.references.generate(created_at));
        record.ensure_submission_event();

        self.store.insert(&mut record).await?;

        info!(
            id = %record.id_hex(),
            reference = %record.reference(),
            loan_type = record.loan_type.as_str(),
            amount = record.loan_amount,
            "Application submitted"
        );
        Ok(record)
    }

    /// Load by document ID
    pub async fn find_by_id(&self, id: &str) -> Result<LoanApplicationDoc> {
        let oid = parse_id(id)?;
        self.load(oid).await
    }

    /// Load by reference number
    pub async fn find_by_reference(&self, reference: &str) -> Result<LoanApplicationDoc> {
        self.store
            .find_by_reference(reference.trim())
            .await?
            .ok_or_else(|| LoanDeskError::NotFound(format!("application {}", reference.trim())))
    }

    /// Load by reference number, falling back to the document ID
    pub async fn lookup(&self, reference_or_id: &str) -> Result<LoanApplicationDoc> {
        let key = reference_or_id.trim();
        if let Some(record) = self.store.find_by_reference(key).await? {
            return Ok(record);
        }

        debug!(key = %key, "No reference match, trying document ID");
        match ObjectId::parse_str(key) {
            Ok(oid) => self.load(oid).await,
            Err(_) => Err(LoanDeskError::NotFound(format!("application {key}"))),
        }
    }

    /// List applications, clamping the page size
    pub async fn list(&self, query: &ListQuery) -> Result<Page> {
        let mut query = query.clone();
        query.page = query.page.max(1);
        query.limit = query.limit.clamp(1, self.max_page_size);
        self.store.list(&query).await
    }

    pub async fn stats(&self) -> Result<DashboardStats> {
        self.store.stats().await
    }

    async fn load(&self, id: ObjectId) -> Result<LoanApplicationDoc> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| LoanDeskError::NotFound(format!("application {id}")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::schemas::{
        ApplicationStatus, DocumentSlots, EmploymentStatus, LoanTerm, LoanType, Metadata,
        SUBMISSION_EVENT,
    };
    use crate::store::MemoryApplicationStore;

    /// A valid, unsaved record carrying the given reference
    pub(crate) fn application_doc(reference: &str) -> LoanApplicationDoc {
        let now = DateTime::now();
        LoanApplicationDoc {
            _id: None,
            metadata: Metadata::at(now),
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
            employer: Some("Analytical Engines Ltd".to_string()),
            monthly_income: 9000.0,
            loan_type: LoanType::HomeLoan,
            loan_amount: 350_000.0,
            loan_term: LoanTerm::new(30).expect("30 is an allowed term"),
            documents: DocumentSlots::default(),
            status: ApplicationStatus::Pending,
            application_date: now,
            user: None,
            reference_number: Some(reference.to_string()),
            timeline: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub(crate) fn submission() -> NewApplication {
        NewApplication {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            email: Some("ada@example.com".into()),
            phone: Some("555-0100".into()),
            employment_status: Some("Full-time".into()),
            monthly_income: Some(9000.0.into()),
            loan_type: Some("Home Loan".into()),
            loan_amount: Some(500_000.0.into()),
            loan_term: Some(20.0.into()),
            ..Default::default()
        }
    }

    pub(crate) fn service() -> LoanService {
        LoanService::new(
            Arc::new(MemoryApplicationStore::new()),
            ReferenceGenerator::default(),
        )
    }

    #[tokio::test]
    async fn test_create_stamps_reference_and_submission_event() {
        let service = service();
        let record = service.create(submission(), None).await.unwrap();

        assert!(record._id.is_some());
        assert!(record.reference().starts_with("SBM-"));
        assert_eq!(record.status, ApplicationStatus::Pending);
        assert_eq!(record.timeline.len(), 1);
        assert_eq!(record.timeline[0].event, SUBMISSION_EVENT);
        assert_eq!(record.timeline[0].by, "System");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_without_persisting() {
        let service = service();
        let err = service
            .create(NewApplication::default(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, LoanDeskError::Validation(_)));
        assert_eq!(service.stats().await.unwrap().total_applications, 0);
    }

    #[tokio::test]
    async fn test_lookup_accepts_reference_or_id() {
        let service = service();
        let record = service.create(submission(), None).await.unwrap();

        let by_reference = service.lookup(record.reference()).await.unwrap();
        let exact = service.find_by_reference(record.reference()).await.unwrap();
        let by_id = service.lookup(&record.id_hex()).await.unwrap();

        assert_eq!(by_reference._id, record._id);
        assert_eq!(exact._id, record._id);
        assert_eq!(by_id._id, record._id);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids_are_distinct_errors() {
        let service = service();

        let missing = service.find_by_id(&ObjectId::new().to_hex()).await.unwrap_err();
        assert!(matches!(missing, LoanDeskError::NotFound(_)));

        let malformed = service.find_by_id("not-an-id").await.unwrap_err();
        assert_eq!(malformed.fields()[0].field, "id");

        let unknown = service.lookup("SBM-1999-0101-1234").await.unwrap_err();
        assert!(matches!(unknown, LoanDeskError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_clamps_page_size() {
        let service = service().with_max_page_size(2);
        for _ in 0..3 {
            service.create(submission(), None).await.unwrap();
        }

        let page = service
            .list(&ListQuery {
                limit: 50,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.limit, 2);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_create_reports_reference_collision_as_conflict() {
        use rand::{rngs::StdRng, SeedableRng};

        let store = Arc::new(MemoryApplicationStore::new());
        let service = LoanService::new(
            store.clone(),
            ReferenceGenerator::default().with_seed(11),
        );
        let taken = ReferenceGenerator::default()
            .generate_with(chrono::Utc::now(), &mut StdRng::seed_from_u64(11));
        store.insert(&mut application_doc(&taken)).await.unwrap();

        let err = service.create(submission(), None).await.unwrap_err();

        assert!(matches!(err, LoanDeskError::Conflict(_)), "{err:?}");
        assert_eq!(service.stats().await.unwrap().total_applications, 1);
    }
}
