//! In-memory application store
//!
//! Used when running without MongoDB (dev mode) and by the test suites.
//! Mirrors the Mongo backend's guarantees: unique reference numbers and
//! version-checked saves.

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::cmp::Ordering;
use tracing::debug;

use super::{matches_search, ApplicationStore, DashboardStats, ListQuery, Page, SortField, SortOrder};
use crate::db::schemas::LoanApplicationDoc;
use crate::types::{LoanDeskError, Result};

/// Concurrent in-memory store
#[derive(Default)]
pub struct MemoryApplicationStore {
    /// Records by document ID
    records: DashMap<ObjectId, LoanApplicationDoc>,
    /// Unique index: reference number -> document ID
    references: DashMap<String, ObjectId>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn compare(a: &LoanApplicationDoc, b: &LoanApplicationDoc, field: SortField) -> Ordering {
    match field {
        SortField::ApplicationDate => a.application_date.cmp(&b.application_date),
        SortField::LoanAmount => a.loan_amount.total_cmp(&b.loan_amount),
        SortField::LastName => a.last_name.cmp(&b.last_name),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn insert(&self, record: &mut LoanApplicationDoc) -> Result<()> {
        let reference = record
            .reference_number
            .clone()
            .ok_or_else(|| LoanDeskError::invalid("referenceNumber", "Reference number is required"))?;

        let id = record._id.unwrap_or_else(ObjectId::new);
        if self.records.contains_key(&id) {
            return Err(LoanDeskError::Conflict(format!("duplicate key: _id {id}")));
        }

        match self.references.entry(reference) {
            Entry::Occupied(entry) => {
                return Err(LoanDeskError::Conflict(format!(
                    "duplicate key: reference_number {}",
                    entry.key()
                )));
            }
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }

        record._id = Some(id);
        record.metadata.touch(DateTime::now());
        self.records.insert(id, record.clone());

        debug!(id = %id, reference = %record.reference(), "Inserted application in memory");
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<LoanApplicationDoc>> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<LoanApplicationDoc>> {
        let id = match self.references.get(reference) {
            Some(id) => *id.value(),
            None => return Ok(None),
        };
        self.find_by_id(id).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Page> {
        let needle = query.search_term().map(str::to_lowercase);

        let mut matching: Vec<LoanApplicationDoc> = self
            .records
            .iter()
            .map(|r| r.value().clone())
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .filter(|r| query.loan_type.map_or(true, |t| r.loan_type == t))
            .filter(|r| query.user.map_or(true, |u| r.user == Some(u)))
            .filter(|r| needle.as_deref().map_or(true, |n| matches_search(r, n)))
            .collect();

        matching.sort_by(|a, b| {
            let ordering = compare(a, b, query.sort_by).then_with(|| a._id.cmp(&b._id));
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.skip() as usize)
            .take(query.limit as usize)
            .collect();

        Ok(Page {
            items,
            total,
            page: query.page.max(1),
            limit: query.limit,
        })
    }

    async fn save(&self, record: &mut LoanApplicationDoc) -> Result<()> {
        let id = record
            ._id
            .ok_or_else(|| LoanDeskError::NotFound("application has not been persisted".into()))?;

        let mut stored = self
            .records
            .get_mut(&id)
            .ok_or_else(|| LoanDeskError::NotFound(format!("application {id}")))?;

        if stored.version != record.version {
            return Err(LoanDeskError::Conflict(format!(
                "application {} was modified concurrently",
                stored.reference()
            )));
        }
        if stored.reference_number != record.reference_number {
            return Err(LoanDeskError::Conflict(format!(
                "reference number of application {} cannot change",
                stored.reference()
            )));
        }

        record.version += 1;
        record.metadata.touch(DateTime::now());
        *stored = record.clone();

        Ok(())
    }

    async fn stats(&self) -> Result<DashboardStats> {
        let mut stats = DashboardStats::default();
        for record in self.records.iter() {
            stats.count(record.status, record.loan_amount);
        }
        Ok(stats)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ApplicationStatus, LoanType};
    use crate::lifecycle::tests::application_doc;

    async fn stored(
        store: &MemoryApplicationStore,
        reference: &str,
        last_name: &str,
        amount: f64,
    ) -> LoanApplicationDoc {
        let mut doc = application_doc(reference);
        doc.last_name = last_name.to_string();
        doc.loan_amount = amount;
        store.insert(&mut doc).await.unwrap();
        doc
    }

    #[tokio::test]
    async fn test_duplicate_reference_is_a_conflict() {
        let store = MemoryApplicationStore::new();
        stored(&store, "SBM-2024-0601-1111", "Hopper", 1.0).await;

        let mut clash = application_doc("SBM-2024-0601-1111");
        let err = store.insert(&mut clash).await.unwrap_err();

        assert!(matches!(err, LoanDeskError::Conflict(_)), "{err}");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_save_is_rejected() {
        let store = MemoryApplicationStore::new();
        let original = stored(&store, "SBM-2024-0601-2222", "Hopper", 1.0).await;

        let mut first = original.clone();
        let mut second = original.clone();

        first.status = ApplicationStatus::Approved;
        store.save(&mut first).await.unwrap();
        assert_eq!(first.version, 1);

        second.status = ApplicationStatus::Rejected;
        let err = store.save(&mut second).await.unwrap_err();
        assert!(matches!(err, LoanDeskError::Conflict(_)), "{err}");

        let current = store.find_by_id(original._id.unwrap()).await.unwrap().unwrap();
        assert_eq!(current.status, ApplicationStatus::Approved);
    }

    #[tokio::test]
    async fn test_save_cannot_rewrite_reference() {
        let store = MemoryApplicationStore::new();
        let mut doc = stored(&store, "SBM-2024-0601-3333", "Hopper", 1.0).await;

        doc.reference_number = Some("SBM-2024-0601-4444".into());
        let err = store.save(&mut doc).await.unwrap_err();

        assert!(matches!(err, LoanDeskError::Conflict(_)));
        assert!(store.find_by_reference("SBM-2024-0601-3333").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_pages() {
        let store = MemoryApplicationStore::new();
        stored(&store, "SBM-2024-0601-1001", "Babbage", 300.0).await;
        stored(&store, "SBM-2024-0601-1002", "Curie", 100.0).await;
        let mut refi = stored(&store, "SBM-2024-0601-1003", "Turing", 200.0).await;
        refi.loan_type = LoanType::Refinance;
        store.save(&mut refi).await.unwrap();

        let query = ListQuery {
            limit: 2,
            sort_by: SortField::LoanAmount,
            sort_order: SortOrder::Asc,
            ..Default::default()
        };
        let page = store.list(&query).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages(), 2);
        let names: Vec<_> = page.items.iter().map(|r| r.last_name.as_str()).collect();
        assert_eq!(names, vec!["Curie", "Turing"]);

        let second = store.list(&ListQuery { page: 2, ..query.clone() }).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].last_name, "Babbage");

        let refinances = store
            .list(&ListQuery {
                loan_type: Some(LoanType::Refinance),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(refinances.total, 1);

        let searched = store
            .list(&ListQuery {
                search: Some("cUrI".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(searched.items.len(), 1);
        assert_eq!(searched.items[0].last_name, "Curie");
    }
}
