// ISO-9660 config drive image: openstack/latest/{meta_data.json,
// network_data.json,user_data}, volume label config-2.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::Path;
use tokio::process::Command;

use super::{ConfigDriveError, ConfigDriveInput};

const VOLUME_LABEL: &str = "config-2";

pub(super) async fn build_image(tool: &Path, input: &ConfigDriveInput) -> Result<String, ConfigDriveError> {
    let workdir = tempfile::tempdir()?;
    let tree = workdir.path().join("tree");
    stage_tree(&tree, input).await?;

    let image = workdir.path().join("configdrive.iso");
    master_image(tool, &tree, &image).await?;

    let bytes = tokio::fs::read(&image).await?;
    Ok(encode_image(&bytes)?)
}

async fn stage_tree(root: &Path, input: &ConfigDriveInput) -> Result<(), ConfigDriveError> {
    let latest = root.join("openstack").join("latest");
    tokio::fs::create_dir_all(&latest).await?;

    tokio::fs::write(latest.join("meta_data.json"), serde_json::to_vec(&input.meta_data)?).await?;
    if !input.network_data.is_empty() {
        tokio::fs::write(
            latest.join("network_data.json"),
            serde_json::to_vec(&input.network_data)?,
        )
        .await?;
    }
    if let Some(user_data) = &input.user_data {
        tokio::fs::write(latest.join("user_data"), user_data).await?;
    }
    Ok(())
}

async fn master_image(tool: &Path, source: &Path, output: &Path) -> Result<(), ConfigDriveError> {
    let tool_name = tool.display().to_string();
    let result = Command::new(tool)
        .arg("-o")
        .arg(output)
        .args([
            "-ldots",
            "-allow-lowercase",
            "-allow-multidot",
            "-l",
            "-publisher",
            "ironic-provision",
            "-quiet",
            "-J",
            "-r",
            "-V",
            VOLUME_LABEL,
        ])
        .arg(source)
        .output()
        .await
        .map_err(|source| ConfigDriveError::ToolUnavailable {
            tool: tool_name.clone(),
            source,
        })?;

    if !result.status.success() {
        return Err(ConfigDriveError::ToolFailed {
            tool: tool_name,
            status: result.status.to_string(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }
    Ok(())
}

fn encode_image(image: &[u8]) -> std::io::Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(image)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}
