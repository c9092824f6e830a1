//! Photo and video uploads attached to a child

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::TokenSource;
use crate::error::{Error, Result};
use crate::models::{Identity, MediaItem, NewMediaItem};
use crate::postgrest::PostgrestClient;
use crate::storage::{FileOptions, StorageClient};

/// Stores media objects in a bucket and indexes them in the `media` table
pub struct MediaService {
    storage: StorageClient,
    table: PostgrestClient,
    bucket: String,
    tokens: Arc<dyn TokenSource>,
}

impl MediaService {
    pub fn new(storage: StorageClient, table: PostgrestClient, bucket: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            storage,
            table,
            bucket: bucket.to_string(),
            tokens,
        }
    }

    async fn token(&self) -> Result<String> {
        self.tokens.access_token().await.ok_or(Error::NotAuthenticated)
    }

    /// Upload a file for a child and record it
    ///
    /// If the row cannot be written the uploaded object is removed again.
    pub async fn upload(
        &self,
        actor: &Identity,
        child_id: &str,
        file_name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<MediaItem> {
        if !actor.is_admin() {
            return Err(Error::forbidden("only admins may upload media"));
        }
        if child_id.trim().is_empty() {
            return Err(Error::validation("child is required"));
        }
        if data.is_empty() {
            return Err(Error::validation("file is empty"));
        }

        let token = self.token().await?;
        let storage = self.storage.clone().with_auth(&token);
        let bucket = storage.from(&self.bucket);

        let path = object_path(child_id, file_name, Utc::now().timestamp_millis());
        bucket
            .upload(&path, data, FileOptions::new().with_content_type(content_type))
            .await?;

        let row = NewMediaItem {
            child_id: child_id.to_string(),
            url: bucket.get_public_url(&path),
            storage_path: path.clone(),
            uploaded_by: actor.id.clone(),
        };

        let inserted = self
            .table
            .clone()
            .with_auth(&token)
            .insert(&row)
            .execute::<MediaItem>()
            .await
            .and_then(|rows| {
                rows.into_iter()
                    .next()
                    .ok_or_else(|| Error::general("insert returned no media row"))
            });

        match inserted {
            Ok(item) => {
                info!(media_id = %item.id, child_id, path = %path, "media uploaded");
                Ok(item)
            }
            Err(e) => {
                warn!(path = %path, error = %e, "media row insert failed, removing object");
                if let Err(cleanup) = bucket.remove(&[path.as_str()]).await {
                    warn!(path = %path, error = %cleanup, "orphaned media object");
                }
                Err(e)
            }
        }
    }

    /// Media for one child, newest first
    pub async fn list_for_child(&self, child_id: &str) -> Result<Vec<MediaItem>> {
        let token = self.token().await?;
        self.table
            .clone()
            .with_auth(&token)
            .select("*")
            .eq("child_id", child_id)
            .order("created_at", false)
            .execute::<MediaItem>()
            .await
    }

    /// Delete the row, then the stored object
    pub async fn delete(&self, actor: &Identity, item: &MediaItem) -> Result<()> {
        if !actor.is_admin() {
            return Err(Error::forbidden("only admins may delete media"));
        }
        let token = self.token().await?;

        self.table
            .clone()
            .with_auth(&token)
            .delete()
            .eq("id", &item.id)
            .execute::<MediaItem>()
            .await?;

        let storage = self.storage.clone().with_auth(&token);
        if let Err(e) = storage
            .from(&self.bucket)
            .remove(&[item.storage_path.as_str()])
            .await
        {
            warn!(path = %item.storage_path, error = %e, "media object not removed");
        }
        info!(media_id = %item.id, "media deleted");
        Ok(())
    }
}

/// `{child_id}/{millis}-{file_name}`, with path separators in the name replaced
fn object_path(child_id: &str, file_name: &str, millis: i64) -> String {
    let name: String = file_name
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let name = if name.is_empty() { "upload".to_string() } else { name };
    format!("{}/{}-{}", child_id, millis, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths_stay_under_the_child() {
        assert_eq!(object_path("amy", "park.jpg", 1700), "amy/1700-park.jpg");
        assert_eq!(object_path("amy", "../x/y.png", 1), "amy/1-.._x_y.png");
        assert_eq!(object_path("amy", "  ", 1), "amy/1-upload");
    }
}
