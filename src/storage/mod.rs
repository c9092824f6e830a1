//! Storage operations for media uploads

mod types;

use reqwest::{multipart, Client};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::fetch::{api_error, Fetch};

pub use types::*;

/// Client for Supabase Storage
#[derive(Clone)]
pub struct StorageClient {
    /// The base URL for the Supabase project
    url: String,

    /// The anonymous API key for the Supabase project
    key: String,

    /// User token, when set
    token: Option<String>,

    /// HTTP client used for requests
    client: Client,

    client_info: String,
    timeout: Option<Duration>,
}

/// Client for a specific storage bucket
pub struct BucketClient<'a> {
    storage: &'a StorageClient,
    bucket_id: String,
}

impl StorageClient {
    /// Create a new StorageClient
    pub(crate) fn new(url: &str, key: &str, client: Client, options: &ClientOptions) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            token: None,
            client,
            client_info: options.client_info.clone(),
            timeout: options.request_timeout,
        }
    }

    /// Authorize requests with a user access token
    pub fn with_auth(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    fn get_url(&self, path: &str) -> String {
        format!("{}/storage/v1{}", self.url, path)
    }

    fn bearer(&self) -> &str {
        self.token.as_deref().unwrap_or(&self.key)
    }

    /// Get a client for a specific bucket
    pub fn from(&self, bucket_id: &str) -> BucketClient<'_> {
        BucketClient {
            storage: self,
            bucket_id: bucket_id.to_string(),
        }
    }
}

impl<'a> BucketClient<'a> {
    /// Upload a file to the bucket
    pub async fn upload(&self, path: &str, data: Vec<u8>, options: FileOptions) -> Result<UploadResponse> {
        let url = self
            .storage
            .get_url(&format!("/object/{}/{}", self.bucket_id, path));

        let file_name = Path::new(path)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let part = multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str(&options.content_type)
            .map_err(|e| Error::storage(format!("invalid content type: {}", e)))?;
        let form = multipart::Form::new().part("file", part);

        debug!(bucket = %self.bucket_id, path, "uploading object");

        let mut request = self
            .storage
            .client
            .post(&url)
            .header("apikey", &self.storage.key)
            .header("X-Client-Info", &self.storage.client_info)
            .bearer_auth(self.storage.bearer())
            .header("Cache-Control", format!("max-age={}", options.cache_control))
            .header("x-upsert", options.upsert.to_string())
            .multipart(form);
        if let Some(timeout) = self.storage.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await?;
            return Err(match api_error(status, &text) {
                Error::Api { message, .. } => {
                    Error::storage(format!("upload failed with status {}: {}", status, message))
                }
                other => other,
            });
        }

        Ok(response.json::<UploadResponse>().await?)
    }

    /// Remove objects from the bucket
    pub async fn remove(&self, paths: &[&str]) -> Result<Vec<FileObject>> {
        let url = self.storage.get_url(&format!("/object/{}", self.bucket_id));
        let body = serde_json::json!({ "prefixes": paths });

        Fetch::delete(&self.storage.client, &url)
            .header("apikey", &self.storage.key)
            .header("X-Client-Info", &self.storage.client_info)
            .bearer_auth(self.storage.bearer())
            .timeout(self.storage.timeout)
            .json(&body)?
            .execute::<Vec<FileObject>>()
            .await
    }

    /// Get the public URL for a file
    pub fn get_public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.storage.url, self.bucket_id, path
        )
    }
}
