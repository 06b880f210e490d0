//! Identifiers, envelopes and payloads exchanged with the bridge.
//!
//! # Design
//! Bridge resources have no fixed schema, so a resource is a plain JSON object
//! map. Only the discovery record and the small request payloads the client
//! itself sends are typed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// A light, group, schedule or other bridge resource as returned by the bridge.
pub type Resource = Map<String, Value>;

/// Field injected into decoded lights carrying their numeric identifier.
pub const ID_FIELD: &str = "ID";

/// Category of bridge-managed entity, each with its own path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFamily {
    Lights,
    Groups,
    Schedules,
    Scenes,
    Sensors,
    Rules,
    Config,
}

impl ResourceFamily {
    pub fn path(&self) -> &'static str {
        match self {
            ResourceFamily::Lights => "lights",
            ResourceFamily::Groups => "groups",
            ResourceFamily::Schedules => "schedules",
            ResourceFamily::Scenes => "scenes",
            ResourceFamily::Sensors => "sensors",
            ResourceFamily::Rules => "rules",
            ResourceFamily::Config => "config",
        }
    }
}

impl fmt::Display for ResourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Resource key as accepted at the API boundary.
///
/// Lights are keyed numerically by the bridge but callers may pass either
/// form; `light_number` normalizes. Other families use the key as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Number(u32),
    Key(String),
}

impl ResourceId {
    /// Numeric form of the identifier, as required for lights.
    pub fn light_number(&self) -> Result<u32, ApiError> {
        match self {
            ResourceId::Number(n) => Ok(*n),
            ResourceId::Key(key) => key
                .trim()
                .parse()
                .map_err(|_| ApiError::KeyParse(key.clone())),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Number(n) => write!(f, "{n}"),
            ResourceId::Key(key) => f.write_str(key),
        }
    }
}

impl From<u32> for ResourceId {
    fn from(n: u32) -> Self {
        ResourceId::Number(n)
    }
}

impl From<&str> for ResourceId {
    fn from(key: &str) -> Self {
        ResourceId::Key(key.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(key: String) -> Self {
        ResourceId::Key(key)
    }
}

impl From<&String> for ResourceId {
    fn from(key: &String) -> Self {
        ResourceId::Key(key.clone())
    }
}

/// A bridge found by cloud discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bridge {
    pub id: String,
    #[serde(rename = "internalipaddress")]
    pub internal_ip_address: String,
    #[serde(rename = "macaddress", default)]
    pub mac_address: String,
}

impl Bridge {
    /// Host prefix suitable for `Credentials::new`.
    pub fn host(&self) -> String {
        format!("http://{}", self.internal_ip_address)
    }
}

/// Body of a targeted light or sensor search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchParams {
    #[serde(rename = "deviceid")]
    pub devices: Vec<String>,
}

/// Body of a user creation (pairing) request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewUser {
    pub devicetype: String,
}

/// Body of a rename request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rename {
    pub name: String,
}

/// Minimal light state write used by toggling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnState {
    pub on: bool,
}
