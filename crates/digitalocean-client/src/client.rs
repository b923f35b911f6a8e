//! DigitalOcean API client
//!
//! Implements the droplet subset of the DigitalOcean REST API v2:
//! `POST /v2/droplets`, `GET /v2/droplets?tag_name=` and
//! `DELETE /v2/droplets/{id}`.

use crate::common::HttpClient;
use crate::error::ProviderError;
use crate::models::*;
use crate::provider_trait::ComputeProvider;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Default public API endpoint
pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com";

/// Page size used when listing droplets
const PAGE_SIZE: &str = "200";

/// DigitalOcean API client
#[derive(Debug, Clone)]
pub struct DigitalOceanClient {
    http: HttpClient,
}

impl DigitalOceanClient {
    /// Create a new DigitalOcean client
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "https://api.digitalocean.com")
    /// * `token` - personal access token
    pub fn new(base_url: String, token: String) -> Result<Self, ProviderError> {
        if token.is_empty() {
            return Err(ProviderError::Authentication(
                "API token is empty".to_string(),
            ));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// List every droplet carrying `tag`, following pagination links
    pub async fn list_by_tag(&self, tag: &str) -> Result<Vec<Droplet>, ProviderError> {
        let query = self
            .http
            .build_query_string(&[("tag_name", tag), ("per_page", PAGE_SIZE)]);
        let mut url = format!("/v2/droplets?{query}");
        let mut droplets = Vec::new();

        loop {
            let page: DropletListResponse = self.http.get(&url).await?;
            let next = page.next_page().map(str::to_string);
            droplets.extend(page.droplets);
            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }

        debug!("Found {} droplet(s) tagged {}", droplets.len(), tag);
        Ok(droplets)
    }

    /// The single droplet carrying `tag`
    async fn unique_by_tag(&self, tag: &str) -> Result<Option<Droplet>, ProviderError> {
        let mut droplets = self.list_by_tag(tag).await?;
        match droplets.len() {
            0 => Ok(None),
            1 => Ok(droplets.pop()),
            count => Err(ProviderError::AmbiguousTag {
                tag: tag.to_string(),
                count,
            }),
        }
    }
}

#[async_trait::async_trait]
impl ComputeProvider for DigitalOceanClient {
    async fn create(&self, request: &CreateDropletRequest) -> Result<DropletInfo, ProviderError> {
        if request.tag.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "droplet tag must not be empty".to_string(),
            ));
        }

        let response: DropletResponse = self.http.post("/v2/droplets", &request.to_body()).await?;
        info!(
            "Created droplet {} (id {}) in {} tagged {}",
            response.droplet.name, response.droplet.id, request.region, request.tag
        );
        Ok(response.droplet.to_info())
    }

    async fn find_by_tag(&self, tag: &str) -> Result<Option<DropletInfo>, ProviderError> {
        Ok(self.unique_by_tag(tag).await?.map(|d| d.to_info()))
    }

    async fn delete_by_tag(&self, tag: &str) -> Result<bool, ProviderError> {
        let Some(droplet) = self.unique_by_tag(tag).await? else {
            debug!("No droplet tagged {}, nothing to delete", tag);
            return Ok(false);
        };

        if self.http.delete(&format!("/v2/droplets/{}", droplet.id)).await? {
            info!("Deleted droplet {} (id {})", droplet.name, droplet.id);
        } else {
            debug!("Droplet {} (id {}) was already gone", droplet.name, droplet.id);
        }
        Ok(true)
    }
}
