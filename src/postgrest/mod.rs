//! Database operations through the PostgREST API

mod filter;
mod query;

use reqwest::Client;
use serde::Serialize;

use crate::config::ClientOptions;

pub use filter::*;
pub use query::{DeleteBuilder, Filters, InsertBuilder, SelectBuilder, UpdateBuilder};

use query::Target;

/// Client for database operations on one table
#[derive(Clone)]
pub struct PostgrestClient {
    target: Target,
}

impl PostgrestClient {
    /// Create a new PostgrestClient
    pub(crate) fn new(
        url: &str,
        key: &str,
        table: &str,
        client: Client,
        options: &ClientOptions,
    ) -> Self {
        Self {
            target: Target {
                url: format!("{}/rest/v1/{}", url, table),
                key: key.to_string(),
                token: None,
                schema: options.db_schema.clone(),
                client_info: options.client_info.clone(),
                timeout: options.request_timeout,
                client,
            },
        }
    }

    /// Authorize requests with a user access token instead of the anon key
    pub fn with_auth(mut self, token: &str) -> Self {
        self.target.token = Some(token.to_string());
        self
    }

    /// Select specific columns from the table
    pub fn select(&self, columns: &str) -> SelectBuilder {
        SelectBuilder::new(self.target.clone(), columns)
    }

    /// Insert one row or an array of rows
    pub fn insert<T: Serialize>(&self, values: T) -> InsertBuilder<T> {
        InsertBuilder::new(self.target.clone(), values)
    }

    /// Update rows matched by the builder's filters
    pub fn update<T: Serialize>(&self, values: T) -> UpdateBuilder<T> {
        UpdateBuilder::new(self.target.clone(), values)
    }

    /// Delete rows matched by the builder's filters
    pub fn delete(&self) -> DeleteBuilder {
        DeleteBuilder::new(self.target.clone())
    }
}
