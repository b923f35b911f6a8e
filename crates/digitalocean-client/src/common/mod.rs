//! Common utilities for the DigitalOcean API client
//!
//! Authenticated request helpers shared by the droplet operations.

use crate::error::ProviderError;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// HTTP client wrapper with bearer authentication
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path; absolute URLs (pagination links) pass through
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Maps a non-success response to the matching error
    async fn check_status(
        method: &str,
        path: &str,
        response: Response,
    ) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication(
                format!("{method} {path} rejected: {status} - {body}"),
            ),
            StatusCode::NOT_FOUND => ProviderError::NotFound(format!("{path} - {body}")),
            _ => ProviderError::Api {
                status: status.as_u16(),
                message: format!("{method} {path} failed: {body}"),
            },
        })
    }

    /// Decodes a JSON body, keeping a snippet of the payload on failure
    async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ProviderError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            debug!(
                "Failed to decode response (first 500 chars): {}",
                text.chars().take(500).collect::<String>()
            );
            ProviderError::Serialization(e)
        })
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ProviderError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        let response = Self::check_status("GET", path, response).await?;
        Self::decode(response).await
    }

    /// Make a POST request
    pub async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        let url = self.build_url(path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let response = Self::check_status("POST", path, response).await?;
        Self::decode(response).await
    }

    /// Make a DELETE request
    ///
    /// Returns `Ok(false)` when the resource was already gone.
    pub async fn delete(&self, path: &str) -> Result<bool, ProviderError> {
        let url = self.build_url(path);
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        match Self::check_status("DELETE", path, response).await {
            Ok(_) => Ok(true),
            Err(ProviderError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Build query string from filters
    pub fn build_query_string(&self, filters: &[(&str, &str)]) -> String {
        filters
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}
