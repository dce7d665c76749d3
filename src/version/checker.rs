//! Update checks against the stored catalog

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::version::catalog::CatalogStore;
use crate::version::error::{CatalogError, CheckError};
use crate::version::gate::VersionGate;
use crate::version::semver::{SemanticVersion, compare_releases};
use crate::version::types::{ClientPlatform, ClientVersionQuery, VersionDecision, VersionRecord};

/// Decide the update disposition for a client using a fresh catalog snapshot
pub fn check_client_version<S: CatalogStore + ?Sized>(
    store: &S,
    gate: &VersionGate,
    query: &ClientVersionQuery,
    now: DateTime<Utc>,
) -> Result<VersionDecision, CheckError> {
    let catalog = store.list_records()?;

    let decision = gate.decide(query, &catalog, now)?;

    for id in &decision.excluded_records {
        warn!(
            "Version record {} has a malformed version and was skipped for {} clients",
            id, query.platform
        );
    }

    debug!(
        "{} {} (build {:?}) -> {:?} ({:?}, target {:?})",
        query.platform,
        query.current_version,
        query.current_build_number,
        decision.disposition,
        decision.reason,
        decision.target_record.as_ref().map(|r| r.id)
    );

    Ok(decision)
}

/// Records visible to a platform (or every record), newest release first
///
/// Records whose version does not parse sort last, by id.
pub fn list_records_for<S: CatalogStore + ?Sized>(
    store: &S,
    platform: Option<ClientPlatform>,
) -> Result<Vec<VersionRecord>, CatalogError> {
    let mut records: Vec<(VersionRecord, Option<SemanticVersion>)> = store
        .list_records()?
        .into_iter()
        .filter(|r| platform.is_none_or(|p| r.applies_to(p)))
        .map(|r| {
            let parsed = SemanticVersion::parse(&r.version).ok();
            (r, parsed)
        })
        .collect();

    records.sort_by(|(a, a_version), (b, b_version)| match (a_version, b_version) {
        (Some(av), Some(bv)) => compare_releases(bv, b.build_number, av, a.build_number)
            .then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.cmp(&b.id),
    });

    Ok(records.into_iter().map(|(r, _)| r).collect())
}
