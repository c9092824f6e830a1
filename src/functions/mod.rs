//! Edge Functions client

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::fetch::Fetch;

/// Client for Supabase Edge Functions
#[derive(Clone)]
pub struct FunctionsClient {
    /// The base URL for the Supabase project
    url: String,

    /// The anonymous API key for the Supabase project
    key: String,

    /// HTTP client
    client: Client,

    client_info: String,
    timeout: Option<Duration>,
}

impl FunctionsClient {
    /// Create a new FunctionsClient
    pub(crate) fn new(url: &str, key: &str, client: Client, options: &ClientOptions) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            client,
            client_info: options.client_info.clone(),
            timeout: options.request_timeout,
        }
    }

    fn get_url(&self, function_name: &str) -> String {
        format!("{}/functions/v1/{}", self.url, function_name)
    }

    /// Invoke an edge function with a JSON body and decode its JSON reply
    pub async fn invoke<T: Serialize, R: DeserializeOwned>(
        &self,
        function_name: &str,
        options: &FunctionInvokeOptions<T>,
    ) -> Result<R> {
        let url = self.get_url(function_name);

        let mut fetch = Fetch::post(&self.client, &url)
            .header("apikey", &self.key)
            .header("X-Client-Info", &self.client_info)
            .bearer_auth(options.authorization.as_deref().unwrap_or(&self.key))
            .timeout(self.timeout);

        for (key, value) in &options.headers {
            fetch = fetch.header(key, value);
        }

        if let Some(body) = &options.body {
            fetch = fetch.json(body)?;
        }

        debug!(function = function_name, "invoking function");

        match fetch.execute::<R>().await {
            Ok(data) => Ok(data),
            Err(Error::Api {
                status, message, ..
            }) => {
                warn!(function = function_name, status, "function returned an error");
                Err(Error::function(format!(
                    "{} failed with status {}: {}",
                    function_name, status, message
                )))
            }
            Err(e) => Err(e),
        }
    }
}

/// Options for invoking an edge function
#[derive(Debug, Clone)]
pub struct FunctionInvokeOptions<T> {
    /// Request body
    pub body: Option<T>,

    /// Extra request headers
    pub headers: HashMap<String, String>,

    /// User token sent instead of the anon key
    pub authorization: Option<String>,
}

impl<T> Default for FunctionInvokeOptions<T> {
    fn default() -> Self {
        Self {
            body: None,
            headers: HashMap::new(),
            authorization: None,
        }
    }
}

impl<T> FunctionInvokeOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request body
    pub fn with_body(mut self, body: T) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a request header
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Authorize as the signed-in user
    pub fn with_authorization(mut self, token: &str) -> Self {
        self.authorization = Some(token.to_string());
        self
    }
}
