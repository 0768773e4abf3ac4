//! Common metadata for all documents
//!
//! Tracks creation and last-update timestamps.

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Common metadata for all documents
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    /// When the document was last written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// When the document was first persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Create new metadata stamped with the given time
    pub fn at(now: DateTime) -> Self {
        Self {
            updated_at: Some(now),
            created_at: Some(now),
        }
    }

    /// Record a write
    pub fn touch(&mut self, now: DateTime) {
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        self.updated_at = Some(now);
    }
}
