use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::version::error::VersionError;

/// A dotted numeric version such as `1.2.10` or `4`.
///
/// Any number of segments is accepted. Missing trailing segments compare as
/// zero, so `1.2` and `1.2.0` are equal.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    segments: Vec<u64>,
}

impl SemanticVersion {
    /// Parse a version string into its numeric segments.
    ///
    /// Every `.`-separated segment must be a non-empty run of ASCII digits.
    /// Signs, whitespace, prefixes like `v`, and pre-release suffixes are rejected.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidVersionFormat {
            input: input.to_string(),
        };

        if input.is_empty() {
            return Err(invalid());
        }

        let segments = input
            .split('.')
            .map(|segment| {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                segment.parse::<u64>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| {
                let a = self.segments.get(i).copied().unwrap_or(0);
                let b = other.segments.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality follows the zero-padded ordering, not the raw segment list.
impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

/// Compare two version strings.
///
/// Returns `Less`, `Equal` or `Greater` for `a` relative to `b`, or
/// `InvalidVersionFormat` if either string does not parse.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, VersionError> {
    let a = SemanticVersion::parse(a)?;
    let b = SemanticVersion::parse(b)?;
    Ok(a.cmp(&b))
}

/// Returns true when `a` is strictly newer than `b`.
pub fn is_newer(a: &str, b: &str) -> Result<bool, VersionError> {
    compare_versions(a, b).map(|ord| ord == Ordering::Greater)
}

/// Compare two releases, using the build number only when the versions are equal.
///
/// A missing build number counts as 0.
pub fn compare_releases(
    a: &SemanticVersion,
    a_build: Option<u64>,
    b: &SemanticVersion,
    b_build: Option<u64>,
) -> Ordering {
    a.cmp(b)
        .then_with(|| a_build.unwrap_or(0).cmp(&b_build.unwrap_or(0)))
}
