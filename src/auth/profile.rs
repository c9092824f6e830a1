//! Profile lookup for signed-in users

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Identity;
use crate::postgrest::PostgrestClient;

/// Resolves a provider user id to the app's profile row
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn fetch_profile(&self, access_token: &str, user_id: &str) -> Result<Option<Identity>>;
}

/// Profiles stored in the `profiles` table
pub struct ProfileTable {
    table: PostgrestClient,
}

impl ProfileTable {
    pub fn new(table: PostgrestClient) -> Self {
        Self { table }
    }
}

#[async_trait]
impl ProfileDirectory for ProfileTable {
    async fn fetch_profile(&self, access_token: &str, user_id: &str) -> Result<Option<Identity>> {
        self.table
            .clone()
            .with_auth(access_token)
            .select("id,role,full_name,email")
            .eq("id", user_id)
            .execute_one::<Identity>()
            .await
    }
}
