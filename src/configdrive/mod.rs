//! Config drive construction for the `active` transition.
//!
//! Ironic 1.56 and later accept the config drive as a JSON object carrying
//! user data, metadata and network data. Older microversions only take a
//! gzipped, base64-encoded ISO-9660 image labelled `config-2`, so for those
//! the same three inputs are staged on disk and mastered into an image.

mod iso;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::ironic::ApiVersion;

/// First microversion that accepts an inline config drive.
pub const INLINE_CONFIG_DRIVE_VERSION: ApiVersion = ApiVersion::new(1, 56);

/// Raw inputs the caller supplies for a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDriveInput {
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub network_data: Map<String, Value>,
    #[serde(default)]
    pub meta_data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineConfigDrive {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub meta_data: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub network_data: Map<String, Value>,
}

/// Payload attached to the `active` request. The workflow never looks inside.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigDrivePayload {
    Inline(InlineConfigDrive),
    /// gzip + base64 of an ISO-9660 image.
    Image(String),
}

#[derive(Debug, Error)]
pub enum ConfigDriveError {
    #[error("failed to stage config drive contents: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize config drive metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("could not run ISO tool '{tool}': {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ISO tool '{tool}' exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
}

/// Picks the payload shape for the target Ironic and produces it.
#[derive(Debug, Clone)]
pub struct ConfigDriveBuilder {
    api_version: ApiVersion,
    iso_tool: PathBuf,
}

impl ConfigDriveBuilder {
    pub fn new(api_version: ApiVersion) -> Self {
        Self {
            api_version,
            iso_tool: PathBuf::from("genisoimage"),
        }
    }

    /// Use a different mastering tool, e.g. `mkisofs`. It must accept
    /// genisoimage's flags.
    pub fn with_iso_tool(mut self, tool: impl Into<PathBuf>) -> Self {
        self.iso_tool = tool.into();
        self
    }

    pub fn supports_inline(&self) -> bool {
        self.api_version >= INLINE_CONFIG_DRIVE_VERSION
    }

    pub async fn build(&self, input: ConfigDriveInput) -> Result<ConfigDrivePayload, ConfigDriveError> {
        if self.supports_inline() {
            debug!(api_version = %self.api_version, "Passing config drive inline");
            return Ok(ConfigDrivePayload::Inline(InlineConfigDrive {
                user_data: input.user_data,
                meta_data: input.meta_data,
                network_data: input.network_data,
            }));
        }

        info!(
            api_version = %self.api_version,
            tool = %self.iso_tool.display(),
            "Microversion predates inline config drives, building ISO image"
        );
        let image = iso::build_image(&self.iso_tool, &input).await?;
        Ok(ConfigDrivePayload::Image(image))
    }
}
