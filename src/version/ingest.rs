//! Validation of administrator-supplied version records
//!
//! Drafts arrive loosely typed (JSON from the admin UI or a file passed to the
//! CLI). They are checked here once, so the catalog only ever stores records
//! with known platforms, parseable versions and numeric build numbers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::version::error::IngestError;
use crate::version::semver::SemanticVersion;
use crate::version::types::{Platform, UpdateType, VersionRecord};

/// Build numbers are accepted either as JSON integers or numeric strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BuildNumberInput {
    Number(u64),
    Text(String),
}

impl BuildNumberInput {
    fn parse(self) -> Result<Option<u64>, IngestError> {
        match self {
            BuildNumberInput::Number(n) => Ok(Some(n)),
            BuildNumberInput::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(IngestError::InvalidBuildNumber(text));
                }
                trimmed
                    .parse()
                    .map(Some)
                    .map_err(|_| IngestError::InvalidBuildNumber(text))
            }
        }
    }
}

fn default_active() -> bool {
    true
}

/// Unvalidated record as submitted by an administrator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub platform: String,
    pub version: String,
    #[serde(default)]
    pub build_number: Option<BuildNumberInput>,
    pub update_type: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub force_update_date_threshold: Option<DateTime<Utc>>,
    #[serde(default)]
    pub compatibility: Vec<String>,
    #[serde(default)]
    pub minimum_os_version: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// A validated record that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersionRecord {
    pub platform: Platform,
    pub version: String,
    pub build_number: Option<u64>,
    pub update_type: UpdateType,
    pub is_active: bool,
    pub is_latest: bool,
    pub priority: u8,
    pub release_date: Option<DateTime<Utc>>,
    pub force_update_date_threshold: Option<DateTime<Utc>>,
    pub compatibility: BTreeSet<Platform>,
    pub minimum_os_version: Option<String>,
    pub release_notes: Option<String>,
    pub download_url: Option<String>,
}

impl RecordDraft {
    pub fn validate(self) -> Result<NewVersionRecord, IngestError> {
        let platform = self.platform.trim().parse::<Platform>()?;
        let update_type = self.update_type.trim().parse::<UpdateType>()?;

        let version = self.version.trim().to_string();
        SemanticVersion::parse(&version)?;

        let build_number = match self.build_number {
            Some(input) => input.parse()?,
            None => None,
        };

        let priority = u8::try_from(self.priority)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or(IngestError::PriorityOutOfRange(self.priority))?;

        if let (Some(release), Some(threshold)) =
            (self.release_date, self.force_update_date_threshold)
            && threshold < release
        {
            return Err(IngestError::ThresholdBeforeRelease);
        }

        let compatibility = self
            .compatibility
            .iter()
            .map(|tag| tag.trim().parse::<Platform>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(NewVersionRecord {
            platform,
            version,
            build_number,
            update_type,
            is_active: self.is_active,
            is_latest: self.is_latest,
            priority,
            release_date: self.release_date,
            force_update_date_threshold: self.force_update_date_threshold,
            compatibility,
            minimum_os_version: non_blank(self.minimum_os_version),
            release_notes: non_blank(self.release_notes),
            download_url: non_blank(self.download_url),
        })
    }
}

impl NewVersionRecord {
    pub fn into_record(self, id: i64) -> VersionRecord {
        VersionRecord {
            id,
            platform: self.platform,
            version: self.version,
            build_number: self.build_number,
            update_type: self.update_type,
            is_active: self.is_active,
            is_latest: self.is_latest,
            priority: self.priority,
            release_date: self.release_date,
            force_update_date_threshold: self.force_update_date_threshold,
            compatibility: self.compatibility,
            minimum_os_version: self.minimum_os_version,
            release_notes: self.release_notes,
            download_url: self.download_url,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
