//! Version records, client queries and gating decisions

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::error::IngestError;

/// Platform a version record targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
    /// Fans out to every client platform
    All,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
            Platform::All => "all",
        }
    }
}

impl FromStr for Platform {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            "all" => Ok(Platform::All),
            _ => Err(IngestError::UnknownPlatform(s.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform a client reports when asking for its update disposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientPlatform {
    Android,
    Ios,
    Web,
}

impl ClientPlatform {
    pub fn as_str(&self) -> &'static str {
        Platform::from(*self).as_str()
    }
}

impl From<ClientPlatform> for Platform {
    fn from(platform: ClientPlatform) -> Self {
        match platform {
            ClientPlatform::Android => Platform::Android,
            ClientPlatform::Ios => Platform::Ios,
            ClientPlatform::Web => Platform::Web,
        }
    }
}

impl FromStr for ClientPlatform {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Platform>()? {
            Platform::Android => Ok(ClientPlatform::Android),
            Platform::Ios => Ok(ClientPlatform::Ios),
            Platform::Web => Ok(ClientPlatform::Web),
            Platform::All => Err(IngestError::UnknownPlatform(s.to_string())),
        }
    }
}

impl fmt::Display for ClientPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strongly a record asks older clients to update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Optional,
    Forced,
    Maintenance,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Optional => "optional",
            UpdateType::Forced => "forced",
            UpdateType::Maintenance => "maintenance",
        }
    }
}

impl FromStr for UpdateType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optional" => Ok(UpdateType::Optional),
            "forced" => Ok(UpdateType::Forced),
            "maintenance" => Ok(UpdateType::Maintenance),
            _ => Err(IngestError::UnknownUpdateType(s.to_string())),
        }
    }
}

/// A published app version and its rollout rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub id: i64,
    pub platform: Platform,
    /// Dotted numeric version, validated at ingestion and re-parsed at decision time
    pub version: String,
    pub build_number: Option<u64>,
    pub update_type: UpdateType,
    pub is_active: bool,
    pub is_latest: bool,
    pub priority: u8,
    pub release_date: Option<DateTime<Utc>>,
    pub force_update_date_threshold: Option<DateTime<Utc>>,
    #[serde(default)]
    pub compatibility: BTreeSet<Platform>,
    /// Informational only, never evaluated
    pub minimum_os_version: Option<String>,
    pub release_notes: Option<String>,
    pub download_url: Option<String>,
}

impl VersionRecord {
    /// Whether this record targets the given client platform, either directly
    /// or through `all` / its compatibility set.
    pub fn applies_to(&self, platform: ClientPlatform) -> bool {
        let platform = Platform::from(platform);
        self.platform == platform
            || self.platform == Platform::All
            || self.compatibility.contains(&platform)
            || self.compatibility.contains(&Platform::All)
    }

    /// Whether the record has been released as of `now`.
    ///
    /// Records without a release date are always released.
    pub fn is_released(&self, now: DateTime<Utc>) -> bool {
        self.release_date.is_none_or(|release| release <= now)
    }
}

/// A client's report of what it is currently running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientVersionQuery {
    pub platform: ClientPlatform,
    pub current_version: String,
    pub current_build_number: Option<u64>,
}

impl ClientVersionQuery {
    pub fn new(platform: ClientPlatform, current_version: impl Into<String>) -> Self {
        Self {
            platform,
            current_version: current_version.into(),
            current_build_number: None,
        }
    }

    pub fn with_build_number(mut self, build_number: u64) -> Self {
        self.current_build_number = Some(build_number);
        self
    }
}

/// Gating outcome returned to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    UpToDate,
    OptionalUpdate,
    ForcedUpdate,
    Maintenance,
}

/// Machine-readable explanation of a disposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    NoApplicableVersion,
    ClientCurrent,
    MaintenanceWindow,
    BelowMinimum,
    GracePeriodExpired,
    NewerAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDecision {
    pub disposition: Disposition,
    pub target_record: Option<VersionRecord>,
    pub reason: DecisionReason,
    /// Ids of malformed records skipped while deciding
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_records: Vec<i64>,
}
