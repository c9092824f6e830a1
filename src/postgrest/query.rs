//! Query builders for PostgrestClient

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::error::Error;
use crate::fetch::{Fetch, FetchBuilder};
use crate::postgrest::filter::{in_list_value, FilterOperator};

/// Everything a builder needs to address one table
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub(crate) url: String,
    pub(crate) key: String,
    pub(crate) token: Option<String>,
    pub(crate) schema: String,
    pub(crate) client_info: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) client: Client,
}

impl Target {
    /// Apply the common headers to a request
    fn prepare<'a>(&self, fetch: FetchBuilder<'a>, read: bool) -> FetchBuilder<'a> {
        let profile_header = if read { "Accept-Profile" } else { "Content-Profile" };
        let fetch = fetch
            .header("apikey", &self.key)
            .header("X-Client-Info", &self.client_info)
            .header(profile_header, &self.schema)
            .timeout(self.timeout);

        match &self.token {
            Some(token) => fetch.bearer_auth(token),
            None => fetch.bearer_auth(&self.key),
        }
    }
}

/// Filters shared by select, update and delete
#[derive(Debug, Clone, Default)]
pub struct Filters {
    params: Vec<(String, String)>,
}

impl Filters {
    fn push(&mut self, op: FilterOperator, column: &str, value: &str) {
        self.params.push(op.pair(column, value));
    }

    /// Whether no filter has been added
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The rendered query pairs
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

macro_rules! filter_methods {
    () => {
        /// Filter rows where column equals a value
        pub fn eq<V: ToString>(mut self, column: &str, value: V) -> Self {
            self.filters.push(FilterOperator::Eq, column, &value.to_string());
            self
        }

        /// Filter rows where column does not equal a value
        pub fn neq<V: ToString>(mut self, column: &str, value: V) -> Self {
            self.filters.push(FilterOperator::Neq, column, &value.to_string());
            self
        }

        /// Filter rows where column is greater than a value
        pub fn gt<V: ToString>(mut self, column: &str, value: V) -> Self {
            self.filters.push(FilterOperator::Gt, column, &value.to_string());
            self
        }

        /// Filter rows where column is greater than or equal to a value
        pub fn gte<V: ToString>(mut self, column: &str, value: V) -> Self {
            self.filters.push(FilterOperator::Gte, column, &value.to_string());
            self
        }

        /// Filter rows where column is less than a value
        pub fn lt<V: ToString>(mut self, column: &str, value: V) -> Self {
            self.filters.push(FilterOperator::Lt, column, &value.to_string());
            self
        }

        /// Filter rows where column is less than or equal to a value
        pub fn lte<V: ToString>(mut self, column: &str, value: V) -> Self {
            self.filters.push(FilterOperator::Lte, column, &value.to_string());
            self
        }

        /// Filter rows where column is null
        pub fn is_null(mut self, column: &str) -> Self {
            self.filters.push(FilterOperator::Is, column, "null");
            self
        }

        /// Filter rows where column is in a list of values
        pub fn in_list<V: ToString>(mut self, column: &str, values: &[V]) -> Self {
            self.filters.push(FilterOperator::In, column, &in_list_value(values));
            self
        }
    };
}

/// Builder for SELECT queries
pub struct SelectBuilder {
    target: Target,
    columns: String,
    filters: Filters,
    order: Vec<String>,
    limit: Option<usize>,
}

impl SelectBuilder {
    pub(crate) fn new(target: Target, columns: &str) -> Self {
        Self {
            target,
            columns: columns.to_string(),
            filters: Filters::default(),
            order: Vec::new(),
            limit: None,
        }
    }

    filter_methods!();

    /// Order the results by a column
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.order.push(format!("{}.{}", column, direction));
        self
    }

    /// Limit the number of rows returned
    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filters.params().iter().cloned());
        if !self.order.is_empty() {
            params.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Execute the query and return the results
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        let fetch = self
            .target
            .prepare(Fetch::get(&self.target.client, &self.target.url), true)
            .query(self.params());

        fetch.execute::<Vec<T>>().await
    }

    /// Execute the query and return the first row
    pub async fn execute_one<T: DeserializeOwned>(self) -> Result<Option<T>, Error> {
        let results = self.limit(1).execute::<T>().await?;
        Ok(results.into_iter().next())
    }

    /// Count the matching rows exactly
    pub async fn count(&self) -> Result<u64, Error> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filters.params().iter().cloned());
        params.push(("limit".to_string(), "0".to_string()));

        let response = self
            .target
            .prepare(Fetch::get(&self.target.client, &self.target.url), true)
            .header("Prefer", "count=exact")
            .query(params)
            .execute_raw()
            .await?;

        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::general("count response carried no Content-Range header"))?;

        parse_content_range_total(range)
            .ok_or_else(|| Error::general(format!("unparseable Content-Range: {}", range)))
    }
}

/// Read the total out of `0-9/42` or `*/42`
fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

/// Builder for INSERT queries
pub struct InsertBuilder<T: Serialize> {
    target: Target,
    values: T,
}

impl<T: Serialize> InsertBuilder<T> {
    pub(crate) fn new(target: Target, values: T) -> Self {
        Self { target, values }
    }

    /// Execute the insert and return the inserted rows
    pub async fn execute<R: DeserializeOwned>(&self) -> Result<Vec<R>, Error> {
        let fetch = self
            .target
            .prepare(Fetch::post(&self.target.client, &self.target.url), false)
            .header("Prefer", "return=representation")
            .json(&self.values)?;

        fetch.execute::<Vec<R>>().await
    }

    /// Execute the insert without returning the inserted data
    pub async fn execute_no_return(&self) -> Result<(), Error> {
        self.target
            .prepare(Fetch::post(&self.target.client, &self.target.url), false)
            .header("Prefer", "return=minimal")
            .json(&self.values)?
            .execute_raw()
            .await?;
        Ok(())
    }
}

/// Builder for UPDATE queries
pub struct UpdateBuilder<T: Serialize> {
    target: Target,
    values: T,
    filters: Filters,
}

impl<T: Serialize> UpdateBuilder<T> {
    pub(crate) fn new(target: Target, values: T) -> Self {
        Self {
            target,
            values,
            filters: Filters::default(),
        }
    }

    filter_methods!();

    /// Execute the update and return the updated rows
    pub async fn execute<R: DeserializeOwned>(&self) -> Result<Vec<R>, Error> {
        if self.filters.is_empty() {
            return Err(Error::validation("refusing to update without a filter"));
        }

        let fetch = self
            .target
            .prepare(Fetch::patch(&self.target.client, &self.target.url), false)
            .header("Prefer", "return=representation")
            .query(self.filters.params().to_vec())
            .json(&self.values)?;

        fetch.execute::<Vec<R>>().await
    }
}

/// Builder for DELETE queries
pub struct DeleteBuilder {
    target: Target,
    filters: Filters,
}

impl DeleteBuilder {
    pub(crate) fn new(target: Target) -> Self {
        Self {
            target,
            filters: Filters::default(),
        }
    }

    filter_methods!();

    /// Execute the delete and return the deleted rows
    pub async fn execute<R: DeserializeOwned>(&self) -> Result<Vec<R>, Error> {
        if self.filters.is_empty() {
            return Err(Error::validation("refusing to delete without a filter"));
        }

        let fetch = self
            .target
            .prepare(Fetch::delete(&self.target.client, &self.target.url), false)
            .header("Prefer", "return=representation")
            .query(self.filters.params().to_vec());

        fetch.execute::<Vec<R>>().await
    }
}
