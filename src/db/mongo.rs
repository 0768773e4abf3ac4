//! MongoDB client and collection wrapper
//!
//! The client is opened once at startup, handed to the stores that need it
//! and closed explicitly on shutdown.

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures::stream::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::db::schemas::Metadata;
use crate::types::LoanDeskError;

/// Server error code for unique index violations
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// Whether a driver error is a unique-key violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

fn db_error(action: &str, err: mongodb::error::Error) -> LoanDeskError {
    LoanDeskError::Database(format!("{action} failed: {err}"))
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and verify the server answers a ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, LoanDeskError> {
        info!("Connecting to MongoDB at {}", uri);

        // Fail fast instead of hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| LoanDeskError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| LoanDeskError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection with its indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, LoanDeskError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Close connections and stop the driver's background tasks
    pub async fn close(self) {
        info!("Closing MongoDB connection to '{}'", self.db_name);
        self.client.shutdown().await;
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, LoanDeskError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), LoanDeskError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| db_error("Index creation", e))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps on the caller's copy.
    ///
    /// Unique index violations surface as `Conflict`.
    pub async fn insert_one(&self, item: &mut T) -> Result<ObjectId, LoanDeskError> {
        item.mut_metadata().touch(DateTime::now());

        let result = self.inner.insert_one(&*item).await.map_err(|e| {
            if is_duplicate_key(&e) {
                LoanDeskError::Conflict(format!("duplicate key: {e}"))
            } else {
                db_error("Insert", e)
            }
        })?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| LoanDeskError::Database("Failed to get inserted ID".into()))
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, LoanDeskError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| db_error("Find", e))
    }

    /// Find a sorted window of documents
    pub async fn find_page(
        &self,
        filter: Document,
        sort: Document,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<T>, LoanDeskError> {
        let options = FindOptions::builder()
            .sort(sort)
            .skip(skip)
            .limit(limit)
            .build();

        let cursor = self
            .inner
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| db_error("Find", e))?;

        cursor.try_collect().await.map_err(|e| db_error("Cursor read", e))
    }

    /// Count documents matching a filter
    pub async fn count(&self, filter: Document) -> Result<u64, LoanDeskError> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(|e| db_error("Count", e))
    }

    /// Replace a document only if `filter` still matches, stamping
    /// `updated_at`. Returns whether a document was replaced.
    pub async fn replace_where(&self, filter: Document, item: &mut T) -> Result<bool, LoanDeskError> {
        item.mut_metadata().touch(DateTime::now());

        let result = self.inner.replace_one(filter, &*item).await.map_err(|e| {
            if is_duplicate_key(&e) {
                LoanDeskError::Conflict(format!("duplicate key: {e}"))
            } else {
                db_error("Replace", e)
            }
        })?;

        debug!(
            matched = result.matched_count,
            modified = result.modified_count,
            "Replace completed"
        );

        Ok(result.matched_count > 0)
    }

    /// Run an aggregation pipeline, returning raw documents
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, LoanDeskError> {
        let cursor = self
            .inner
            .aggregate(pipeline)
            .await
            .map_err(|e| db_error("Aggregate", e))?;

        cursor.try_collect().await.map_err(|e| db_error("Cursor read", e))
    }
}
