//! PostgREST-backed document store (Supabase `rest/v1`).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

use super::{Document, DocumentStore, Fields, Filter};
use crate::auth::SessionFeed;
use crate::error::{Error, Result};
use crate::util::{compact_text, is_http_url};

/// Document store speaking to Supabase's PostgREST endpoint.
///
/// Requests are authorized with the access token of the session currently
/// published on the feed; row-level security does the per-user scoping
/// server side, the equality filter does it client side.
#[derive(Clone)]
pub struct SupabaseDocumentStore {
    rest_url: String,
    anon_key: String,
    client: Client,
    sessions: SessionFeed,
}

impl SupabaseDocumentStore {
    pub fn new(
        url: impl AsRef<str>,
        anon_key: impl Into<String>,
        sessions: SessionFeed,
    ) -> Result<Self> {
        let rest_url = normalize_rest_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(Error::Config(
                "Supabase anon key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            rest_url,
            anon_key,
            client: Client::builder().build()?,
            sessions,
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.rest_url, urlencoding::encode(collection))
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let session = self.sessions.current().ok_or(Error::NotSignedIn)?;
        Ok(request
            .header("apikey", &self.anon_key)
            .bearer_auth(session.access_token)
            .header("Accept", "application/json"))
    }

    async fn send(request: RequestBuilder, action: &str) -> Result<Response> {
        let response = request.send().await.map_err(|error| {
            tracing::error!("{} request failed: {}", action, error);
            Error::Http(error)
        })?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = parse_api_error(status, &body);
        tracing::error!("{} failed: {}", action, message);
        Err(Error::Store(message))
    }
}

#[async_trait]
impl DocumentStore for SupabaseDocumentStore {
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        let request = self.authorized(self.client.get(self.collection_url(collection)))?;
        let request = request.query(&[
            ("select", "*".to_string()),
            (filter.field.as_str(), format!("eq.{}", filter_value(&filter.value))),
        ]);
        let rows = Self::send(request, "Query")
            .await?
            .json::<Vec<Fields>>()
            .await?;
        rows.into_iter().map(row_to_document).collect()
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<String> {
        let request = self
            .authorized(self.client.post(self.collection_url(collection)))?
            .header("Prefer", "return=representation")
            .json(&fields);
        let rows = Self::send(request, "Insert")
            .await?
            .json::<Vec<Fields>>()
            .await?;
        let row = rows.into_iter().next().ok_or_else(|| {
            Error::Store("Insert response did not include the created row".to_string())
        })?;
        Ok(row_to_document(row)?.id)
    }

    async fn merge_update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let request = self
            .authorized(self.client.patch(self.collection_url(collection)))?
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&fields);
        let rows = Self::send(request, "Update")
            .await?
            .json::<Vec<Fields>>()
            .await?;
        if rows.is_empty() {
            return Err(Error::Store(format!(
                "No document to update: {collection}/{id}"
            )));
        }
        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let request = self
            .authorized(self.client.delete(self.collection_url(collection)))?
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal");
        Self::send(request, "Delete").await?;
        Ok(())
    }
}

fn normalize_rest_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("Supabase URL must not be empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::Config(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    if trimmed.ends_with("/rest/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/rest/v1"))
    }
}

fn filter_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn row_to_document(mut row: Fields) -> Result<Document> {
    let id = match row.remove("id") {
        Some(Value::String(id)) => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => {
            return Err(Error::InvalidRecord(
                "row is missing its id column".to_string(),
            ))
        }
    };
    Ok(Document::new(id, row))
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: u16, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestError>(body) {
        if let Some(message) = payload.message {
            let detail = payload.details.or(payload.hint);
            return match detail {
                Some(detail) if !detail.trim().is_empty() => {
                    format!("{} - {} ({status})", message.trim(), detail.trim())
                }
                _ => format!("{} ({status})", message.trim()),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("{trimmed} ({status})")
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::auth::testing::session_for;

    fn signed_in_feed() -> SessionFeed {
        let feed = SessionFeed::new();
        feed.publish(Some(session_for("u1")));
        feed
    }

    #[test]
    fn normalize_rest_url_appends_rest_path() {
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert!(normalize_rest_url("demo.supabase.co").is_err());
    }

    #[test]
    fn parse_api_error_prefers_message_and_details() {
        let body = r#"{"code":"42501","message":"permission denied","details":"row level security"}"#;
        assert_eq!(
            parse_api_error(403, body),
            "permission denied - row level security (403)"
        );
        assert_eq!(parse_api_error(502, ""), "HTTP 502");
    }

    #[tokio::test]
    async fn query_requires_session() {
        let store =
            SupabaseDocumentStore::new("http://127.0.0.1:9", "anon", SessionFeed::new()).unwrap();
        let error = store
            .query("todos", &Filter::eq("user_id", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotSignedIn));
    }

    #[tokio::test]
    async fn query_sends_equality_filter_and_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/todos")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "*".into()),
                Matcher::UrlEncoded("user_id".into(), "eq.u1".into()),
            ]))
            .match_header("authorization", "Bearer access-u1")
            .match_header("apikey", "anon")
            .with_status(200)
            .with_body(r#"[{"id":"t1","task":"a","completed":false,"user_id":"u1","created_at":1}]"#)
            .create_async()
            .await;

        let store = SupabaseDocumentStore::new(server.url(), "anon", signed_in_feed()).unwrap();
        let documents = store
            .query("todos", &Filter::eq("user_id", "u1"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "t1");
        assert!(!documents[0].fields.contains_key("id"));
    }

    #[tokio::test]
    async fn insert_returns_store_assigned_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/todos")
            .match_header("prefer", "return=representation")
            .match_body(Matcher::PartialJson(json!({"task": "a"})))
            .with_status(201)
            .with_body(r#"[{"id":42,"task":"a"}]"#)
            .create_async()
            .await;

        let store = SupabaseDocumentStore::new(server.url(), "anon", signed_in_feed()).unwrap();
        let fields = json!({"task": "a"}).as_object().cloned().unwrap();
        assert_eq!(store.insert("todos", fields).await.unwrap(), "42");
    }

    #[tokio::test]
    async fn update_of_missing_row_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/rest/v1/todos")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.t9".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let store = SupabaseDocumentStore::new(server.url(), "anon", signed_in_feed()).unwrap();
        let error = store
            .merge_update("todos", "t9", Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Store(_)));
    }

    #[tokio::test]
    async fn remove_maps_permission_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/rest/v1/user_media")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.m1".into()))
            .with_status(403)
            .with_body(r#"{"message":"permission denied for table user_media"}"#)
            .create_async()
            .await;

        let store = SupabaseDocumentStore::new(server.url(), "anon", signed_in_feed()).unwrap();
        let error = store.remove("user_media", "m1").await.unwrap_err();
        assert_eq!(
            error.to_string(),
            "Store error: permission denied for table user_media (403)"
        );
    }
}
