//! Remote document-store boundary.
//!
//! The store owns the canonical copy of every record; this crate only
//! issues scoped reads and single-document mutations against it.

mod memory;
mod supabase;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

pub use memory::{MemoryDocumentStore, QueryHold, StoreOp};
pub use supabase::SupabaseDocumentStore;

/// Field map of a stored document, without its identifier.
pub type Fields = Map<String, Value>;

/// A stored document: store-assigned identifier plus fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Equality filter on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// Collection-scoped CRUD against a remote document database.
///
/// Query results carry no ordering guarantee.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    /// Inserts a new document and returns the store-assigned identifier.
    async fn insert(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Merges `fields` into an existing document.
    async fn merge_update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    async fn remove(&self, collection: &str, id: &str) -> Result<()>;
}
