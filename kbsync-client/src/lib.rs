//! # kbsync-client
//!
//! The remote knowledge base, seen through the three operations the sync
//! engine needs: create-or-update a document, delete a document, list
//! documents.
//!
//! [`KnowledgeApi`] is the seam the executor is written against;
//! [`KnowledgeClient`] is the HTTP implementation.

mod client;
mod error;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kbsync_core::DocumentId;

pub use client::{KnowledgeClient, DOCUMENTS_PATH};
pub use error::{ApiErrorClass, ClientError};
pub use retry::RetryPolicy;

/// A document as reported by the remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: DocumentId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

/// Document operations the sync engine consumes.
#[async_trait]
pub trait KnowledgeApi: Send + Sync {
    /// Create the document titled `title` in `collection`, or replace its
    /// content if it exists. `None` leaves the collection to the implementation.
    async fn upsert_document(
        &self,
        title: &str,
        content: &str,
        collection: Option<&str>,
    ) -> Result<DocumentId, ClientError>;

    /// Delete a document. A document that is already gone is not an error.
    async fn delete_document(&self, id: &DocumentId) -> Result<(), ClientError>;

    /// Every document visible to the caller, across collections.
    async fn list_documents(&self) -> Result<Vec<RemoteDocument>, ClientError>;
}
