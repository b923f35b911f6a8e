//! ComputeProvider trait for mocking
//!
//! Abstracts droplet lifecycle calls so controllers can be unit tested
//! against an in-memory provider.

use crate::error::ProviderError;
use crate::models::{CreateDropletRequest, DropletInfo};

/// Droplet lifecycle operations keyed by a unique tag
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Create a droplet carrying `request.tag`
    async fn create(&self, request: &CreateDropletRequest) -> Result<DropletInfo, ProviderError>;

    /// Find the droplet carrying `tag`
    ///
    /// `Ok(None)` when nothing carries the tag; [`ProviderError::AmbiguousTag`]
    /// when more than one droplet does.
    async fn find_by_tag(&self, tag: &str) -> Result<Option<DropletInfo>, ProviderError>;

    /// Delete the droplet carrying `tag`
    ///
    /// Returns `Ok(false)` when nothing carried the tag.
    async fn delete_by_tag(&self, tag: &str) -> Result<bool, ProviderError>;
}
