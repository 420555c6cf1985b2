//! Shared shape of user-scoped records kept in a remote collection.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::{Document, Fields};

/// Field holding the owning user's identifier on every scoped document.
pub const OWNER_FIELD: &str = "user_id";

/// A document owned by exactly one user.
///
/// The identifier is assigned by the store on insert; drafts carry an
/// empty id until then.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Default collection name.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn owner_id(&self) -> &str;

    /// Sort key (Unix ms); mirrors list records newest first.
    fn timestamp(&self) -> i64;

    /// Serializes every field except the identifier.
    fn to_fields(&self) -> Result<Fields> {
        match serde_json::to_value(self)? {
            Value::Object(mut fields) => {
                fields.remove("id");
                Ok(fields)
            }
            other => Err(Error::InvalidRecord(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    fn from_document(document: Document) -> Result<Self> {
        let Document { id, mut fields } = document;
        fields.insert("id".to_string(), Value::String(id.clone()));
        serde_json::from_value(Value::Object(fields))
            .map_err(|error| Error::InvalidRecord(format!("document {id}: {error}")))
    }
}
