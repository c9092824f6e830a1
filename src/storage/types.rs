//! Types for storage operations

use serde::{Deserialize, Serialize};

/// Options for uploading a file
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Cache-Control max-age in seconds
    pub cache_control: String,

    /// MIME type of the content
    pub content_type: String,

    /// Whether to overwrite an existing object
    pub upsert: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            cache_control: "3600".to_string(),
            content_type: "application/octet-stream".to_string(),
            upsert: false,
        }
    }
}

impl FileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    /// Set whether to overwrite an existing object
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// Response to an upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// `bucket/path` of the stored object
    #[serde(rename = "Key")]
    pub key: String,
}

/// A file in a storage bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileObject {
    /// The file name
    pub name: String,

    /// The bucket ID
    #[serde(default)]
    pub bucket_id: Option<String>,

    /// The file ID
    #[serde(default)]
    pub id: Option<String>,
}
