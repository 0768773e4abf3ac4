//! MongoDB-backed application store

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use tracing::{debug, info};

use super::{ApplicationStore, DashboardStats, ListQuery, Page, SortOrder};
use crate::db::schemas::{ApplicationStatus, LoanApplicationDoc, APPLICATION_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{LoanDeskError, Result};

pub struct MongoApplicationStore {
    client: MongoClient,
    collection: MongoCollection<LoanApplicationDoc>,
}

impl MongoApplicationStore {
    /// Open the applications collection, creating its indexes
    pub async fn open(client: MongoClient) -> Result<Self> {
        let collection = client
            .collection::<LoanApplicationDoc>(APPLICATION_COLLECTION)
            .await?;

        info!(
            "Application store ready ({}.{})",
            client.db_name(),
            APPLICATION_COLLECTION
        );

        Ok(Self { client, collection })
    }
}

/// Build the list filter for a query
fn list_filter(query: &ListQuery) -> Document {
    let mut filter = Document::new();

    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    if let Some(loan_type) = query.loan_type {
        filter.insert("loan_type", loan_type.as_str());
    }
    if let Some(user) = query.user {
        filter.insert("user", user);
    }
    if let Some(term) = query.search_term() {
        let pattern = regex::escape(term);
        let clauses: Vec<Bson> = ["first_name", "last_name", "email", "reference_number"]
            .iter()
            .map(|field| Bson::Document(doc! { *field: { "$regex": pattern.as_str(), "$options": "i" } }))
            .collect();
        filter.insert("$or", clauses);
    }

    filter
}

fn sort_document(query: &ListQuery) -> Document {
    let direction = match query.sort_order {
        SortOrder::Asc => 1,
        SortOrder::Desc => -1,
    };
    doc! { query.sort_by.db_field(): direction, "_id": direction }
}

fn read_number(doc: &Document, key: &str) -> f64 {
    match doc.get(key) {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        _ => 0.0,
    }
}

#[async_trait]
impl ApplicationStore for MongoApplicationStore {
    async fn insert(&self, record: &mut LoanApplicationDoc) -> Result<()> {
        let id = self.collection.insert_one(record).await?;
        record._id = Some(id);
        debug!(id = %id, reference = %record.reference(), "Inserted application");
        Ok(())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<LoanApplicationDoc>> {
        self.collection.find_one(doc! { "_id": id }).await
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<LoanApplicationDoc>> {
        self.collection
            .find_one(doc! { "reference_number": reference })
            .await
    }

    async fn list(&self, query: &ListQuery) -> Result<Page> {
        let filter = list_filter(query);
        let total = self.collection.count(filter.clone()).await?;
        let items = self
            .collection
            .find_page(filter, sort_document(query), query.skip(), i64::from(query.limit))
            .await?;

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
        let reference = record
            .reference_number
            .clone()
            .ok_or_else(|| LoanDeskError::invalid("referenceNumber", "Reference number is required"))?;

        let expected_version = record.version;
        let filter = doc! {
            "_id": id,
            "version": expected_version,
            "reference_number": reference,
        };

        record.version = expected_version + 1;
        let replaced = self.collection.replace_where(filter, record).await;
        if !matches!(replaced, Ok(true)) {
            record.version = expected_version;
        }
        if replaced? {
            return Ok(());
        }

        // Nothing matched: tell a missing record apart from a stale one
        match self.find_by_id(id).await? {
            None => Err(LoanDeskError::NotFound(format!("application {id}"))),
            Some(current) if current.reference_number != record.reference_number => {
                Err(LoanDeskError::Conflict(format!(
                    "reference number of application {} cannot change",
                    current.reference()
                )))
            }
            Some(current) => Err(LoanDeskError::Conflict(format!(
                "application {} was modified concurrently",
                current.reference()
            ))),
        }
    }

    async fn stats(&self) -> Result<DashboardStats> {
        let pipeline = vec![doc! {
            "$group": {
                "_id": "$status",
                "count": { "$sum": 1 },
                "amount": { "$sum": "$loan_amount" },
            }
        }];

        let mut stats = DashboardStats::default();
        for group in self.collection.aggregate(pipeline).await? {
            let Some(status) = group.get_str("_id").ok().and_then(ApplicationStatus::parse) else {
                continue;
            };
            let count = read_number(&group, "count") as u64;
            stats.total_applications += count;
            match status {
                ApplicationStatus::Pending => stats.pending_review += count,
                ApplicationStatus::UnderReview => stats.under_review += count,
                ApplicationStatus::Approved => {
                    stats.approved += count;
                    stats.total_approved_amount += read_number(&group, "amount");
                }
                ApplicationStatus::Rejected => stats.rejected += count,
            }
        }

        Ok(stats)
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().close().await;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::LoanType;
    use crate::store::SortField;

    #[test]
    fn test_list_filter_escapes_search_and_combines_filters() {
        let query = ListQuery {
            status: Some(ApplicationStatus::UnderReview),
            loan_type: Some(LoanType::HomeEquity),
            search: Some(" a.b ".into()),
            ..Default::default()
        };

        let filter = list_filter(&query);

        assert_eq!(filter.get_str("status").unwrap(), "under review");
        assert_eq!(filter.get_str("loan_type").unwrap(), "Home Equity");
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 4);
        let first = clauses[0].as_document().unwrap();
        let regex = first.get_document("first_name").unwrap();
        assert_eq!(regex.get_str("$regex").unwrap(), r"a\.b");
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(list_filter(&ListQuery::default()).is_empty());
    }

    #[test]
    fn test_sort_document_uses_stored_field_names() {
        let query = ListQuery {
            sort_by: SortField::LoanAmount,
            sort_order: SortOrder::Asc,
            ..Default::default()
        };
        let sort = sort_document(&query);
        assert_eq!(sort.get_i32("loan_amount").unwrap(), 1);
        assert_eq!(sort.get_i32("_id").unwrap(), 1);
    }
}
