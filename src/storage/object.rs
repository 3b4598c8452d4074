//! S3 object storage
//!
//! Objects are addressed path-style as `{endpoint}/{bucket}/{object_key}`, with
//! conversations laid out as `conversations/{id}_history.json`. Requests are
//! presigned with SigV4 query parameters when credentials are configured and
//! sent anonymously otherwise (public buckets, local gateways).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};
use url::Url;

use crate::conversation::ConversationKey;

use super::{check_key, DocumentStore, StorageError};

/// Lifetime of a presigned URL; each one is used immediately
const PRESIGN_TTL: Duration = Duration::from_secs(300);

pub struct ObjectStore {
    client: Client,
    bucket: Bucket,
    credentials: Option<Credentials>,
}

impl ObjectStore {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        region: &str,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| StorageError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        let bucket = Bucket::new(
            endpoint,
            UrlStyle::Path,
            bucket.to_string(),
            region.to_string(),
        )
        .map_err(|e| StorageError::InvalidEndpoint(e.to_string()))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            bucket,
            credentials,
        })
    }

    /// Regional S3 endpoint
    pub fn regional_endpoint(region: &str) -> String {
        format!("https://s3.{}.amazonaws.com", region)
    }

    fn object_key(key: &str) -> Result<String, StorageError> {
        Ok(ConversationKey::for_user(check_key(key)?))
    }

    fn get_url(&self, key: &str) -> Result<Url, StorageError> {
        let object = Self::object_key(key)?;
        Ok(self
            .bucket
            .get_object(self.credentials.as_ref(), &object)
            .sign(PRESIGN_TTL))
    }

    fn put_url(&self, key: &str) -> Result<Url, StorageError> {
        let object = Self::object_key(key)?;
        Ok(self
            .bucket
            .put_object(self.credentials.as_ref(), &object)
            .sign(PRESIGN_TTL))
    }
}

async fn status_error(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StorageError::Status { status, body }
}

#[async_trait]
impl DocumentStore for ObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let response = self.client.get(self.get_url(key)?).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let response = self
            .client
            .put(self.put_url(key)?)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "object"
    }
}
