//! Similarity-search index client (Qdrant REST API).
//!
//! Vectors are keyed by the swipe's embedding reference id and scoped to
//! their owning user through a payload filter on every search.

use anyhow::{bail, Context, Result};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ai::EMBEDDING_DIMENSIONS;
use crate::config::QdrantConfig;

/// Payload stored alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorPayload {
    pub swipe_id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub sender_email: String,
    pub received_date: String,
}

/// One similarity search result.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: VectorPayload,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

/// Client for the vector similarity store.
pub struct VectorIndex {
    http: reqwest::Client,
    config: QdrantConfig,
}

impl VectorIndex {
    pub fn new(config: QdrantConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.config.url, path));
        if let Some(api_key) = &self.config.api_key {
            builder = builder.header("api-key", api_key);
        }
        builder
    }

    /// Create the collection if it does not exist yet. Idempotent.
    pub async fn ensure_collection(&self) -> Result<()> {
        let path = format!("/collections/{}", self.config.collection_name);

        let response = self
            .request(Method::GET, &path)
            .send()
            .await
            .context("Failed to reach vector store")?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status().as_u16() != 404 {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Vector store error ({}): {}", status, body);
        }

        let create = self
            .request(Method::PUT, &path)
            .json(&json!({
                "vectors": {
                    "size": EMBEDDING_DIMENSIONS,
                    "distance": "Cosine",
                },
            }))
            .send()
            .await
            .context("Failed to create vector collection")?;

        if !create.status().is_success() {
            let status = create.status();
            let body = create.text().await.unwrap_or_default();
            bail!("Failed to create vector collection ({}): {}", status, body);
        }

        tracing::info!("Created vector collection: {}", self.config.collection_name);
        Ok(())
    }

    /// Insert or overwrite one vector.
    pub async fn upsert(&self, id: Uuid, vector: &[f32], payload: &VectorPayload) -> Result<()> {
        let path = format!("/collections/{}/points", self.config.collection_name);

        let response = self
            .request(Method::PUT, &path)
            .json(&json!({
                "points": [{
                    "id": id,
                    "vector": vector,
                    "payload": payload,
                }],
            }))
            .send()
            .await
            .context("Failed to upsert vector")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Vector upsert failed ({}): {}", status, body);
        }

        Ok(())
    }

    /// Nearest neighbours of `vector`, restricted to one user's points.
    pub async fn search(
        &self,
        vector: &[f32],
        user_id: Uuid,
        limit: u64,
    ) -> Result<Vec<SearchHit>> {
        let path = format!(
            "/collections/{}/points/search",
            self.config.collection_name
        );

        let response = self
            .request(Method::POST, &path)
            .json(&search_body(vector, user_id, limit))
            .send()
            .await
            .context("Failed to search vector store")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Vector search failed ({}): {}", status, body);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Invalid vector search response")?;

        Ok(parsed.result)
    }

    /// Remove one vector.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let path = format!(
            "/collections/{}/points/delete",
            self.config.collection_name
        );

        let response = self
            .request(Method::POST, &path)
            .json(&json!({ "points": [id] }))
            .send()
            .await
            .context("Failed to delete vector")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Vector delete failed ({}): {}", status, body);
        }

        Ok(())
    }
}

fn search_body(vector: &[f32], user_id: Uuid, limit: u64) -> Value {
    json!({
        "vector": vector,
        "limit": limit,
        "filter": {
            "must": [{
                "key": "userId",
                "match": { "value": user_id },
            }],
        },
        "with_payload": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_camel_case() {
        let payload = VectorPayload {
            swipe_id: Uuid::nil(),
            user_id: Uuid::nil(),
            subject: "Subject".to_string(),
            sender_email: "a@b.com".to_string(),
            received_date: "2025-07-01T08:52:37+00:00".to_string(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("swipeId").is_some());
        assert!(json.get("senderEmail").is_some());
        assert!(json.get("sender_email").is_none());
    }

    #[test]
    fn search_is_scoped_to_owner() {
        let user_id = Uuid::new_v4();
        let body = search_body(&[0.1, 0.2], user_id, 10);

        assert_eq!(body["limit"], 10);
        assert_eq!(body["filter"]["must"][0]["key"], "userId");
        assert_eq!(
            body["filter"]["must"][0]["match"]["value"],
            Value::String(user_id.to_string())
        );
        assert_eq!(body["with_payload"], true);
    }
}
