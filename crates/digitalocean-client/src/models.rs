//! DigitalOcean API models
//!
//! Only the droplet fields the controllers read are modelled; everything
//! else in the API payloads is ignored on deserialization.
//! See: https://docs.digitalocean.com/reference/api/api-reference/#tag/Droplets

use serde::{Deserialize, Serialize};

/// Droplet status reported while the VM is up
pub const DROPLET_STATUS_ACTIVE: &str = "active";

/// Droplet model matching the `droplet` object of the API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    /// "new", "active", "off" or "archive"
    pub status: String,
    #[serde(default)]
    pub networks: Networks,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub region: Option<RegionRef>,
    #[serde(default)]
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub size_slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkV4 {
    pub ip_address: String,
    /// "public" or "private"
    #[serde(rename = "type")]
    pub network_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionRef {
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageRef {
    #[serde(default)]
    pub slug: Option<String>,
}

impl Droplet {
    /// Whether the provider reports the droplet running
    pub fn is_running(&self) -> bool {
        self.status == DROPLET_STATUS_ACTIVE
    }

    fn address_of(&self, network_type: &str) -> Option<String> {
        self.networks
            .v4
            .iter()
            .find(|n| n.network_type == network_type)
            .map(|n| n.ip_address.clone())
    }

    /// First public IPv4 address, if assigned yet
    pub fn public_ipv4(&self) -> Option<String> {
        self.address_of("public")
    }

    /// First private IPv4 address, if assigned yet
    pub fn private_ipv4(&self) -> Option<String> {
        self.address_of("private")
    }

    /// Flattens the droplet into the fields the controllers track
    pub fn to_info(&self) -> DropletInfo {
        DropletInfo {
            id: self.id,
            name: self.name.clone(),
            external_ip: self.public_ipv4(),
            internal_ip: self.private_ipv4(),
            running: self.is_running(),
        }
    }
}

/// Provider-neutral view of a droplet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropletInfo {
    pub id: u64,
    pub name: String,
    pub external_ip: Option<String>,
    pub internal_ip: Option<String>,
    pub running: bool,
}

/// Parameters for creating a droplet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDropletRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    /// Unique tag identifying the droplet for later lookups
    pub tag: String,
    /// Fingerprint of an SSH key already registered with the account
    pub ssh_fingerprint: String,
}

impl CreateDropletRequest {
    /// Request body for `POST /v2/droplets`
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "name": self.name,
            "region": self.region,
            "size": self.size,
            "image": self.image,
            "tags": [self.tag],
        });
        if !self.ssh_fingerprint.is_empty() {
            body["ssh_keys"] = serde_json::json!([self.ssh_fingerprint]);
        }
        body
    }
}

/// Response wrapper for single-droplet endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropletResponse {
    pub droplet: Droplet,
}

/// Response wrapper for `GET /v2/droplets`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropletListResponse {
    #[serde(default)]
    pub droplets: Vec<Droplet>,
    #[serde(default)]
    pub links: Option<Links>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Links {
    #[serde(default)]
    pub pages: Option<Pages>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Pages {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub last: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Meta {
    pub total: u64,
}

impl DropletListResponse {
    /// URL of the next page, if any
    pub fn next_page(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|l| l.pages.as_ref())
            .and_then(|p| p.next.as_deref())
    }
}
