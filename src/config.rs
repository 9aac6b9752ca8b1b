//! Runtime configuration for the status updater.
//!
//! Everything environment-derived is resolved once into a [`StatusConfig`]
//! that each stage receives by reference. Non-secret pipeline parameters
//! live in [`Settings`], which may be overridden from a JSON file.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_DA_ADMIN_HOST: &str = "https://admin.da.live";
pub const DEFAULT_HLX_ADMIN_HOST: &str = "https://admin.hlx.page";
pub const DEFAULT_DA_COLLAB_HOST: &str = "https://collab.da.live";
pub const DEFAULT_DA_CONTENT_HOST: &str = "https://content.da.live";
pub const DEFAULT_DA_LIVE_HOST: &str = "https://da.live";
pub const DEFAULT_DA_UE_HOST: &str = "https://main--uetest--da-testautomation.ue.da.live";

pub const DEFAULT_SLACK_CHANNEL: &str = "da-status";
pub const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

pub const IMS_TOKEN_URL: &str = "https://ims-na1.adobelogin.com/ims/token/v3";
pub const IMS_SCOPE: &str =
    "openid,AdobeID,aem.frontend.all,read_organizations,additional_info.projectedProductContext";

const DEFAULT_STATUS_SOURCE_PATH: &str = "/source/da-sites/da-status/status/latest.html";
const DEFAULT_PUBLISH_PATH: &str = "/da-sites/da-status/main/status/latest";

fn default_services() -> Vec<String> {
    ["da-admin", "da-collab", "da-content", "da-live", "da-ue"]
        .iter()
        .map(|service| service.to_string())
        .collect()
}

/// Pipeline parameters that are safe to keep in a checked-in file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub schema_version: u32,
    /// Monitored services, in page order.
    pub services: Vec<String>,
    /// Also require every `Test <service>` case to pass.
    pub detailed_checks: bool,
    /// Send a chat alert for each service found down.
    pub alerts: bool,
    /// Statuses the document store may answer an upload with.
    pub upload_success_statuses: Vec<u16>,
    pub status_source_path: String,
    pub publish_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            services: default_services(),
            detailed_checks: true,
            alerts: true,
            upload_success_statuses: vec![200, 201],
            status_source_path: DEFAULT_STATUS_SOURCE_PATH.to_string(),
            publish_path: DEFAULT_PUBLISH_PATH.to_string(),
        }
    }
}

/// Load settings from a JSON file and validate them.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let bytes = fs::read(path).with_context(|| format!("read settings {}", path.display()))?;
    let settings: Settings = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse settings JSON {}", path.display()))?;
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.schema_version != SETTINGS_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported settings schema_version {}",
            settings.schema_version
        ));
    }
    if settings.services.is_empty() {
        return Err(anyhow!("services must list at least one service"));
    }
    let mut seen = BTreeSet::new();
    for service in &settings.services {
        if service.trim().is_empty() {
            return Err(anyhow!("services entries must be non-empty"));
        }
        if !seen.insert(service.as_str()) {
            return Err(anyhow!("service {service:?} is listed more than once"));
        }
    }
    if settings.upload_success_statuses.is_empty() {
        return Err(anyhow!("upload_success_statuses must be non-empty"));
    }
    for (label, path) in [
        ("status_source_path", &settings.status_source_path),
        ("publish_path", &settings.publish_path),
    ] {
        if !path.starts_with('/') {
            return Err(anyhow!("{label} must start with '/' (got {path:?})"));
        }
    }
    Ok(())
}

/// Base URLs of every service the tool talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hosts {
    pub da_admin: String,
    pub hlx_admin: String,
    pub da_collab: String,
    pub da_content: String,
    pub da_live: String,
    pub da_ue: String,
}

/// Identity-service client credentials (`CLIENT_ID` / `CLIENT_SECRET`).
#[derive(Clone, PartialEq, Eq)]
pub struct ImsCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone)]
pub struct StatusConfig {
    pub settings: Settings,
    pub hosts: Hosts,
    pub slack_token: Option<String>,
    pub slack_channel: String,
    pub skip_publish: bool,
    pub ims: Option<ImsCredentials>,
}

impl StatusConfig {
    pub fn from_env(settings: Settings) -> Result<Self> {
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(settings: Settings, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let host = |key: &str, default: &str| {
            non_empty(key)
                .unwrap_or_else(|| default.to_string())
                .trim_end_matches('/')
                .to_string()
        };

        let hosts = Hosts {
            da_admin: host("DA_ADMIN_HOST", DEFAULT_DA_ADMIN_HOST),
            hlx_admin: host("HLX_ADMIN_HOST", DEFAULT_HLX_ADMIN_HOST),
            da_collab: host("DA_COLLAB_HOST", DEFAULT_DA_COLLAB_HOST),
            da_content: host("DA_CONTENT_HOST", DEFAULT_DA_CONTENT_HOST),
            da_live: host("DA_LIVE_HOST", DEFAULT_DA_LIVE_HOST),
            da_ue: host("DA_UE_HOST", DEFAULT_DA_UE_HOST),
        };

        let ims = match (non_empty("CLIENT_ID"), non_empty("CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(ImsCredentials {
                client_id,
                client_secret,
            }),
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "CLIENT_ID and CLIENT_SECRET must be set together"
                ))
            }
        };

        Ok(Self {
            settings,
            hosts,
            slack_token: non_empty("SLACK_TOKEN"),
            slack_channel: non_empty("SLACK_CHANNEL")
                .unwrap_or_else(|| DEFAULT_SLACK_CHANNEL.to_string()),
            skip_publish: lookup("SKIP_PUBLISH").is_some(),
            ims,
        })
    }

    pub fn status_admin_url(&self) -> String {
        format!("{}{}", self.hosts.da_admin, self.settings.status_source_path)
    }

    pub fn preview_url(&self) -> String {
        format!("{}/preview{}", self.hosts.hlx_admin, self.settings.publish_path)
    }

    pub fn publish_url(&self) -> String {
        format!("{}/live{}", self.hosts.hlx_admin, self.settings.publish_path)
    }

    /// File name used for the uploaded multipart part.
    pub fn status_file_name(&self) -> &str {
        self.settings
            .status_source_path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("index.html")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
