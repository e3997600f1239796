// Wire types for the Ironic node API.
//
// Provision states arrive as free-form strings; they are folded into a closed
// enum here so that every consumer of the transition table is forced to
// handle each state explicitly. Anything Ironic reports that we do not know
// about lands in `Unknown` and is treated as fatal by the workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::configdrive::ConfigDrivePayload;

/// Lifecycle status of a node as reported by Ironic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProvisionState {
    Enroll,
    Verifying,
    Manageable,
    Available,
    Active,
    Deploying,
    /// `wait call-back`: the ramdisk is booting or running the deploy.
    DeployWait,
    DeployFailed,
    Cleaning,
    CleanWait,
    CleanFailed,
    Inspecting,
    InspectWait,
    InspectFailed,
    Deleting,
    Error,
    Adopting,
    AdoptFailed,
    Rescuing,
    RescueWait,
    RescueFailed,
    Rescue,
    Unknown(String),
}

impl ProvisionState {
    pub fn as_str(&self) -> &str {
        match self {
            ProvisionState::Enroll => "enroll",
            ProvisionState::Verifying => "verifying",
            ProvisionState::Manageable => "manageable",
            ProvisionState::Available => "available",
            ProvisionState::Active => "active",
            ProvisionState::Deploying => "deploying",
            ProvisionState::DeployWait => "wait call-back",
            ProvisionState::DeployFailed => "deploy failed",
            ProvisionState::Cleaning => "cleaning",
            ProvisionState::CleanWait => "clean wait",
            ProvisionState::CleanFailed => "clean failed",
            ProvisionState::Inspecting => "inspecting",
            ProvisionState::InspectWait => "inspect wait",
            ProvisionState::InspectFailed => "inspect failed",
            ProvisionState::Deleting => "deleting",
            ProvisionState::Error => "error",
            ProvisionState::Adopting => "adopting",
            ProvisionState::AdoptFailed => "adopt failed",
            ProvisionState::Rescuing => "rescuing",
            ProvisionState::RescueWait => "rescue wait",
            ProvisionState::RescueFailed => "rescue failed",
            ProvisionState::Rescue => "rescue",
            ProvisionState::Unknown(raw) => raw,
        }
    }

    /// States Ironic parks a node in after an operation it was running failed.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ProvisionState::DeployFailed
                | ProvisionState::CleanFailed
                | ProvisionState::InspectFailed
                | ProvisionState::AdoptFailed
                | ProvisionState::RescueFailed
                | ProvisionState::Error
        )
    }
}

impl From<String> for ProvisionState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "enroll" => ProvisionState::Enroll,
            "verifying" => ProvisionState::Verifying,
            "manageable" => ProvisionState::Manageable,
            // Pre-Kilo Ironic reported "available" as no state at all.
            "available" | "" | "None" => ProvisionState::Available,
            "active" => ProvisionState::Active,
            "deploying" => ProvisionState::Deploying,
            "wait call-back" => ProvisionState::DeployWait,
            "deploy failed" => ProvisionState::DeployFailed,
            "cleaning" => ProvisionState::Cleaning,
            "clean wait" => ProvisionState::CleanWait,
            "clean failed" => ProvisionState::CleanFailed,
            "inspecting" => ProvisionState::Inspecting,
            "inspect wait" => ProvisionState::InspectWait,
            "inspect failed" => ProvisionState::InspectFailed,
            "deleting" => ProvisionState::Deleting,
            "error" => ProvisionState::Error,
            "adopting" => ProvisionState::Adopting,
            "adopt failed" => ProvisionState::AdoptFailed,
            "rescuing" => ProvisionState::Rescuing,
            "rescue wait" => ProvisionState::RescueWait,
            "rescue failed" => ProvisionState::RescueFailed,
            "rescue" => ProvisionState::Rescue,
            _ => ProvisionState::Unknown(raw),
        }
    }
}

impl From<&str> for ProvisionState {
    fn from(raw: &str) -> Self {
        ProvisionState::from(raw.to_string())
    }
}

impl From<ProvisionState> for String {
    fn from(state: ProvisionState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verbs accepted by `PUT /v1/nodes/{id}/states/provision` that the workflow drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetProvisionState {
    Manage,
    Provide,
    Active,
    Deleted,
    Clean,
    Inspect,
}

impl TargetProvisionState {
    pub const ALL: [TargetProvisionState; 6] = [
        TargetProvisionState::Manage,
        TargetProvisionState::Provide,
        TargetProvisionState::Active,
        TargetProvisionState::Deleted,
        TargetProvisionState::Clean,
        TargetProvisionState::Inspect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetProvisionState::Manage => "manage",
            TargetProvisionState::Provide => "provide",
            TargetProvisionState::Active => "active",
            TargetProvisionState::Deleted => "deleted",
            TargetProvisionState::Clean => "clean",
            TargetProvisionState::Inspect => "inspect",
        }
    }
}

impl fmt::Display for TargetProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unsupported target '{0}' (expected one of manage, provide, active, deleted, clean, inspect)")]
pub struct ParseTargetError(String);

impl FromStr for TargetProvisionState {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manage" | "manageable" => Ok(TargetProvisionState::Manage),
            "provide" | "available" => Ok(TargetProvisionState::Provide),
            "active" | "deploy" => Ok(TargetProvisionState::Active),
            "deleted" | "delete" | "undeploy" => Ok(TargetProvisionState::Deleted),
            "clean" => Ok(TargetProvisionState::Clean),
            "inspect" => Ok(TargetProvisionState::Inspect),
            _ => Err(ParseTargetError(s.to_string())),
        }
    }
}

/// Observed power state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PowerState {
    On,
    Off,
    Error,
    Unknown(String),
}

impl From<String> for PowerState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "power on" => PowerState::On,
            "power off" => PowerState::Off,
            "error" => PowerState::Error,
            _ => PowerState::Unknown(raw),
        }
    }
}

impl From<PowerState> for String {
    fn from(state: PowerState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => f.write_str("power on"),
            PowerState::Off => f.write_str("power off"),
            PowerState::Error => f.write_str("error"),
            PowerState::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// Power targets accepted by `PUT /v1/nodes/{id}/states/power`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetPowerState {
    #[serde(rename = "power on")]
    PowerOn,
    #[serde(rename = "power off")]
    PowerOff,
    #[serde(rename = "rebooting")]
    Reboot,
    #[serde(rename = "soft power off")]
    SoftPowerOff,
    #[serde(rename = "soft rebooting")]
    SoftReboot,
}

impl TargetPowerState {
    /// Power state the node settles in once Ironic finishes the request.
    pub fn settled_state(&self) -> PowerState {
        match self {
            TargetPowerState::PowerOn | TargetPowerState::Reboot | TargetPowerState::SoftReboot => {
                PowerState::On
            }
            TargetPowerState::PowerOff | TargetPowerState::SoftPowerOff => PowerState::Off,
        }
    }

    /// Only the soft variants take a per-request timeout.
    pub fn accepts_timeout(&self) -> bool {
        matches!(self, TargetPowerState::SoftPowerOff | TargetPowerState::SoftReboot)
    }
}

impl fmt::Display for TargetPowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetPowerState::PowerOn => "power on",
            TargetPowerState::PowerOff => "power off",
            TargetPowerState::Reboot => "rebooting",
            TargetPowerState::SoftPowerOff => "soft power off",
            TargetPowerState::SoftReboot => "soft rebooting",
        };
        f.write_str(s)
    }
}

impl FromStr for TargetPowerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "power on" => Ok(TargetPowerState::PowerOn),
            "off" | "power off" => Ok(TargetPowerState::PowerOff),
            "reboot" | "rebooting" => Ok(TargetPowerState::Reboot),
            "soft-off" | "soft power off" => Ok(TargetPowerState::SoftPowerOff),
            "soft-reboot" | "soft rebooting" => Ok(TargetPowerState::SoftReboot),
            other => Err(format!(
                "unsupported power state '{other}' (expected on, off, reboot, soft-off, soft-reboot)"
            )),
        }
    }
}

/// Snapshot of a node as returned by `GET /v1/nodes/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    pub provision_state: ProvisionState,
    #[serde(default)]
    pub target_provision_state: Option<ProvisionState>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub power_state: Option<PowerState>,
    #[serde(default)]
    pub target_power_state: Option<PowerState>,
    #[serde(default)]
    pub provision_updated_at: Option<DateTime<Utc>>,
}

impl Node {
    pub fn new(uuid: impl Into<String>, provision_state: ProvisionState) -> Self {
        Self {
            uuid: uuid.into(),
            name: None,
            provision_state,
            target_provision_state: None,
            last_error: None,
            power_state: None,
            target_power_state: None,
            provision_updated_at: None,
        }
    }

    /// Someone (possibly us) has a provisioning transition in flight.
    pub fn is_transitioning(&self) -> bool {
        self.target_provision_state.is_some()
    }

    /// Ironic has no power change in flight.
    pub fn power_settled(&self) -> bool {
        self.target_power_state.is_none()
    }

    /// `last_error`, ignoring the empty string Ironic sometimes reports.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref().filter(|e| !e.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanStep {
    pub interface: String,
    pub step: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployStep {
    pub interface: String,
    pub step: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    pub priority: i32,
}

/// Body of a provision state change request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionStateRequest {
    pub target: TargetProvisionState,
    #[serde(rename = "configdrive", skip_serializing_if = "Option::is_none")]
    pub config_drive: Option<ConfigDrivePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_steps: Option<Vec<CleanStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy_steps: Option<Vec<DeployStep>>,
}

impl ProvisionStateRequest {
    pub fn new(target: TargetProvisionState) -> Self {
        Self {
            target,
            config_drive: None,
            clean_steps: None,
            deploy_steps: None,
        }
    }

    /// Builds the request for `target`, attaching only what that verb accepts:
    /// the config drive and deploy steps ride on `active`, clean steps on `clean`.
    pub fn for_target(
        target: TargetProvisionState,
        config_drive: Option<&ConfigDrivePayload>,
        clean_steps: &[CleanStep],
        deploy_steps: &[DeployStep],
    ) -> Self {
        let mut request = Self::new(target);
        match target {
            TargetProvisionState::Active => {
                request.config_drive = config_drive.cloned();
                if !deploy_steps.is_empty() {
                    request.deploy_steps = Some(deploy_steps.to_vec());
                }
            }
            // Ironic rejects a manual clean without a step list, even an empty one.
            TargetProvisionState::Clean => request.clean_steps = Some(clean_steps.to_vec()),
            _ => {}
        }
        request
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerStateRequest {
    pub target: TargetPowerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// One JSON-patch operation for `PATCH /v1/nodes/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }
}

/// Ironic API microversion, e.g. `1.56`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Error)]
#[error("invalid API microversion '{0}', expected <major>.<minor>")]
pub struct ParseVersionError(String);

impl FromStr for ApiVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| ParseVersionError(s.to_string()))?;
        let major = major.parse().map_err(|_| ParseVersionError(s.to_string()))?;
        let minor = minor.parse().map_err(|_| ParseVersionError(s.to_string()))?;
        Ok(ApiVersion { major, minor })
    }
}
