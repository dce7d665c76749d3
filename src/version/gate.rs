//! Update gating: picks the authoritative record for a client and decides
//! whether the client must update.
//!
//! Everything here is a pure function of the query, the catalog snapshot and
//! the evaluation time. No I/O, no logging, no mutation of the inputs.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::version::error::GateError;
use crate::version::semver::{SemanticVersion, compare_releases};
use crate::version::types::{
    ClientVersionQuery, DecisionReason, Disposition, UpdateType, VersionDecision, VersionRecord,
};

/// What to do with a candidate record whose version string does not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRecordPolicy {
    /// Skip the record and report its id in the decision
    #[default]
    Exclude,
    /// Fail the whole decision
    Abort,
}

/// Decision engine configured with a malformed-record policy
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionGate {
    policy: MalformedRecordPolicy,
}

/// A record that passed filtering, with its version already parsed
struct Candidate<'a> {
    record: &'a VersionRecord,
    version: SemanticVersion,
}

impl VersionGate {
    pub fn new(policy: MalformedRecordPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MalformedRecordPolicy {
        self.policy
    }

    /// Decide the update disposition for `query` against `catalog` at `now`.
    pub fn decide(
        &self,
        query: &ClientVersionQuery,
        catalog: &[VersionRecord],
        now: DateTime<Utc>,
    ) -> Result<VersionDecision, GateError> {
        let client_version = SemanticVersion::parse(&query.current_version)
            .map_err(GateError::InvalidClientVersion)?;

        let mut excluded_records = Vec::new();
        let mut candidates = Vec::new();
        for record in catalog
            .iter()
            .filter(|r| r.is_active && r.applies_to(query.platform) && r.is_released(now))
        {
            match SemanticVersion::parse(&record.version) {
                Ok(version) => candidates.push(Candidate { record, version }),
                Err(source) => match self.policy {
                    MalformedRecordPolicy::Exclude => excluded_records.push(record.id),
                    MalformedRecordPolicy::Abort => {
                        return Err(GateError::InvalidRecordVersion {
                            record_id: record.id,
                            source,
                        });
                    }
                },
            }
        }

        let Some(selected) = candidates.into_iter().max_by(rank_candidates) else {
            return Ok(VersionDecision {
                disposition: Disposition::UpToDate,
                target_record: None,
                reason: DecisionReason::NoApplicableVersion,
                excluded_records,
            });
        };

        let client_vs_target = compare_releases(
            &client_version,
            query.current_build_number,
            &selected.version,
            selected.record.build_number,
        );

        let (disposition, reason) = if client_vs_target.is_ge() {
            (Disposition::UpToDate, DecisionReason::ClientCurrent)
        } else {
            disposition_for_outdated(selected.record, now)
        };

        Ok(VersionDecision {
            disposition,
            target_record: Some(selected.record.clone()),
            reason,
            excluded_records,
        })
    }
}

/// Decide with the default policy (malformed records are excluded).
pub fn decide_version(
    query: &ClientVersionQuery,
    catalog: &[VersionRecord],
    now: DateTime<Utc>,
) -> Result<VersionDecision, GateError> {
    VersionGate::default().decide(query, catalog, now)
}

/// Ordering used to pick the authoritative record; the greatest wins.
///
/// `isLatest` first, then newer release, then higher priority, then the
/// lowest id.
fn rank_candidates(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.record
        .is_latest
        .cmp(&b.record.is_latest)
        .then_with(|| {
            compare_releases(
                &a.version,
                a.record.build_number,
                &b.version,
                b.record.build_number,
            )
        })
        .then_with(|| a.record.priority.cmp(&b.record.priority))
        .then_with(|| b.record.id.cmp(&a.record.id))
}

fn disposition_for_outdated(
    record: &VersionRecord,
    now: DateTime<Utc>,
) -> (Disposition, DecisionReason) {
    match record.update_type {
        UpdateType::Maintenance => (Disposition::Maintenance, DecisionReason::MaintenanceWindow),
        UpdateType::Forced => (Disposition::ForcedUpdate, DecisionReason::BelowMinimum),
        UpdateType::Optional
            if record
                .force_update_date_threshold
                .is_some_and(|threshold| now >= threshold) =>
        {
            (Disposition::ForcedUpdate, DecisionReason::GracePeriodExpired)
        }
        UpdateType::Optional => (Disposition::OptionalUpdate, DecisionReason::NewerAvailable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::error::VersionError;
    use crate::version::types::{ClientPlatform, Platform};
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 9, 30, 0).unwrap()
    }

    fn record(id: i64, platform: Platform, version: &str) -> VersionRecord {
        VersionRecord {
            id,
            platform,
            version: version.to_string(),
            build_number: None,
            update_type: UpdateType::Optional,
            is_active: true,
            is_latest: false,
            priority: 0,
            release_date: None,
            force_update_date_threshold: None,
            compatibility: Default::default(),
            minimum_os_version: None,
            release_notes: None,
            download_url: None,
        }
    }

    fn android(version: &str) -> ClientVersionQuery {
        ClientVersionQuery::new(ClientPlatform::Android, version)
    }

    fn target_id(decision: &VersionDecision) -> Option<i64> {
        decision.target_record.as_ref().map(|r| r.id)
    }

    #[test]
    fn client_on_latest_version_is_up_to_date() {
        let catalog = vec![VersionRecord {
            is_latest: true,
            ..record(1, Platform::Android, "1.0.0")
        }];

        let decision = decide_version(&android("1.0.0"), &catalog, now()).unwrap();

        assert_eq!(decision.disposition, Disposition::UpToDate);
        assert_eq!(decision.reason, DecisionReason::ClientCurrent);
        assert_eq!(target_id(&decision), Some(1));
    }

    #[test]
    fn forced_record_newer_than_client_forces_update() {
        let catalog = vec![VersionRecord {
            is_latest: true,
            update_type: UpdateType::Forced,
            ..record(1, Platform::Android, "2.0.0")
        }];

        let decision = decide_version(&android("1.0.0"), &catalog, now()).unwrap();

        assert_eq!(decision.disposition, Disposition::ForcedUpdate);
        assert_eq!(decision.reason, DecisionReason::BelowMinimum);
        assert_eq!(decision.target_record.unwrap().version, "2.0.0");
    }

    #[test]
    fn record_for_all_platforms_offers_optional_update() {
        let catalog = vec![VersionRecord {
            is_latest: true,
            ..record(1, Platform::All, "1.5.0")
        }];

        let decision = decide_version(&android("1.0.0"), &catalog, now()).unwrap();

        assert_eq!(decision.disposition, Disposition::OptionalUpdate);
        assert_eq!(decision.reason, DecisionReason::NewerAvailable);
    }

    #[test]
    fn no_applicable_records_means_up_to_date_without_target() {
        let catalog = vec![
            record(1, Platform::Ios, "9.0.0"),
            VersionRecord {
                is_active: false,
                ..record(2, Platform::Android, "9.0.0")
            },
        ];

        let decision = decide_version(&android("1.0.0"), &catalog, now()).unwrap();

        assert_eq!(
            decision,
            VersionDecision {
                disposition: Disposition::UpToDate,
                target_record: None,
                reason: DecisionReason::NoApplicableVersion,
                excluded_records: vec![],
            }
        );
    }

    #[test]
    fn empty_catalog_means_no_applicable_version() {
        let decision = decide_version(&android("1.0.0"), &[], now()).unwrap();
        assert_eq!(decision.reason, DecisionReason::NoApplicableVersion);
    }

    #[rstest]
    #[case(Some(-1), Disposition::ForcedUpdate, DecisionReason::GracePeriodExpired)]
    #[case(Some(0), Disposition::ForcedUpdate, DecisionReason::GracePeriodExpired)]
    #[case(Some(1), Disposition::OptionalUpdate, DecisionReason::NewerAvailable)]
    #[case(None, Disposition::OptionalUpdate, DecisionReason::NewerAvailable)]
    fn optional_update_escalates_after_grace_period(
        #[case] threshold_offset_days: Option<i64>,
        #[case] expected_disposition: Disposition,
        #[case] expected_reason: DecisionReason,
    ) {
        let catalog = vec![VersionRecord {
            force_update_date_threshold: threshold_offset_days.map(|d| now() + Duration::days(d)),
            ..record(1, Platform::Android, "1.1.0")
        }];

        let decision = decide_version(&android("1.0.0"), &catalog, now()).unwrap();

        assert_eq!(decision.disposition, expected_disposition);
        assert_eq!(decision.reason, expected_reason);
    }

    #[test]
    fn expired_grace_period_is_ignored_for_current_clients() {
        let catalog = vec![VersionRecord {
            force_update_date_threshold: Some(now() - Duration::days(30)),
            ..record(1, Platform::Android, "1.1.0")
        }];

        let decision = decide_version(&android("1.1.0"), &catalog, now()).unwrap();

        assert_eq!(decision.disposition, Disposition::UpToDate);
    }

    #[test]
    fn maintenance_record_reports_maintenance_window() {
        let catalog = vec![VersionRecord {
            update_type: UpdateType::Maintenance,
            force_update_date_threshold: Some(now() - Duration::days(1)),
            ..record(1, Platform::Android, "3.0")
        }];

        let decision = decide_version(&android("2.9.9"), &catalog, now()).unwrap();

        assert_eq!(decision.disposition, Disposition::Maintenance);
        assert_eq!(decision.reason, DecisionReason::MaintenanceWindow);
    }

    #[test]
    fn client_newer_than_every_record_is_current() {
        let catalog = vec![VersionRecord {
            update_type: UpdateType::Forced,
            ..record(1, Platform::Android, "2.0.0")
        }];

        let decision = decide_version(&android("2.0.1"), &catalog, now()).unwrap();

        assert_eq!(decision.disposition, Disposition::UpToDate);
        assert_eq!(decision.reason, DecisionReason::ClientCurrent);
        assert_eq!(target_id(&decision), Some(1));
    }

    #[test]
    fn unreleased_records_are_invisible() {
        let catalog = vec![
            VersionRecord {
                is_latest: true,
                update_type: UpdateType::Forced,
                release_date: Some(now() + Duration::hours(1)),
                ..record(1, Platform::Android, "5.0.0")
            },
            record(2, Platform::Android, "1.2.0"),
        ];

        let decision = decide_version(&android("1.0.0"), &catalog, now()).unwrap();

        assert_eq!(target_id(&decision), Some(2));
        assert_eq!(decision.disposition, Disposition::OptionalUpdate);
    }

    #[test]
    fn latest_flag_beats_newer_version() {
        let catalog = vec![
            record(1, Platform::Android, "3.0.0"),
            VersionRecord {
                is_latest: true,
                ..record(2, Platform::Android, "2.0.0")
            },
        ];

        let decision = decide_version(&android("2.5.0"), &catalog, now()).unwrap();

        assert_eq!(target_id(&decision), Some(2));
        assert_eq!(decision.disposition, Disposition::UpToDate);
    }

    #[test]
    fn newer_version_wins_among_equal_latest_flags() {
        let catalog = vec![
            VersionRecord {
                is_latest: true,
                priority: 100,
                ..record(1, Platform::Android, "1.9.0")
            },
            VersionRecord {
                is_latest: true,
                ..record(2, Platform::Android, "1.10.0")
            },
        ];

        let decision = decide_version(&android("1.0.0"), &catalog, now()).unwrap();

        assert_eq!(target_id(&decision), Some(2));
    }

    #[test]
    fn build_number_breaks_equal_versions() {
        let catalog = vec![
            VersionRecord {
                build_number: Some(41),
                ..record(1, Platform::Android, "2.0")
            },
            VersionRecord {
                build_number: Some(42),
                update_type: UpdateType::Forced,
                ..record(2, Platform::Android, "2.0.0")
            },
        ];

        let decision = decide_version(&android("2.0.0").with_build_number(41), &catalog, now())
            .unwrap();

        assert_eq!(target_id(&decision), Some(2));
        assert_eq!(decision.disposition, Disposition::ForcedUpdate);
    }

    #[test]
    fn client_with_same_version_and_missing_build_is_behind_a_built_record() {
        let catalog = vec![VersionRecord {
            build_number: Some(7),
            ..record(1, Platform::Android, "2.0.0")
        }];

        let decision = decide_version(&android("2.0.0"), &catalog, now()).unwrap();

        assert_eq!(decision.disposition, Disposition::OptionalUpdate);
    }

    #[test]
    fn priority_breaks_equal_releases() {
        let catalog = vec![
            VersionRecord {
                priority: 10,
                update_type: UpdateType::Forced,
                ..record(1, Platform::Android, "2.0.0")
            },
            VersionRecord {
                priority: 90,
                ..record(2, Platform::All, "2.0.0")
            },
        ];

        let decision = decide_version(&android("1.0.0"), &catalog, now()).unwrap();

        assert_eq!(target_id(&decision), Some(2));
        assert_eq!(decision.disposition, Disposition::OptionalUpdate);
    }

    #[test]
    fn lowest_id_breaks_remaining_ties_regardless_of_order() {
        let a = VersionRecord {
            is_latest: true,
            ..record(7, Platform::Android, "2.0.0")
        };
        let b = VersionRecord {
            is_latest: true,
            ..record(3, Platform::Android, "2.0.0")
        };

        let forward = decide_version(&android("1.0.0"), &[a.clone(), b.clone()], now()).unwrap();
        let backward = decide_version(&android("1.0.0"), &[b, a], now()).unwrap();

        assert_eq!(target_id(&forward), Some(3));
        assert_eq!(forward, backward);
    }

    #[test]
    fn compatibility_set_extends_record_to_other_platforms() {
        let catalog = vec![VersionRecord {
            compatibility: [Platform::Android].into_iter().collect(),
            update_type: UpdateType::Forced,
            ..record(1, Platform::Ios, "4.0.0")
        }];

        let decision = decide_version(&android("3.0.0"), &catalog, now()).unwrap();

        assert_eq!(decision.disposition, Disposition::ForcedUpdate);
    }

    #[test]
    fn malformed_client_version_is_an_error() {
        let catalog = vec![record(1, Platform::Android, "1.0.0")];

        let result = decide_version(&android("latest"), &catalog, now());

        assert_eq!(
            result,
            Err(GateError::InvalidClientVersion(
                VersionError::InvalidVersionFormat {
                    input: "latest".to_string()
                }
            ))
        );
    }

    #[test]
    fn exclude_policy_skips_malformed_records_and_reports_them() {
        let catalog = vec![
            VersionRecord {
                is_latest: true,
                ..record(1, Platform::Android, "2.x")
            },
            record(2, Platform::Android, "1.5.0"),
        ];

        let decision = VersionGate::new(MalformedRecordPolicy::Exclude)
            .decide(&android("1.0.0"), &catalog, now())
            .unwrap();

        assert_eq!(target_id(&decision), Some(2));
        assert_eq!(decision.excluded_records, vec![1]);
        assert_eq!(decision.disposition, Disposition::OptionalUpdate);
    }

    #[test]
    fn exclude_policy_reports_exclusions_even_without_candidates() {
        let catalog = vec![record(4, Platform::Android, "")];

        let decision = decide_version(&android("1.0.0"), &catalog, now()).unwrap();

        assert_eq!(decision.reason, DecisionReason::NoApplicableVersion);
        assert_eq!(decision.excluded_records, vec![4]);
    }

    #[test]
    fn abort_policy_fails_on_malformed_record() {
        let catalog = vec![
            record(1, Platform::Android, "1.5.0"),
            record(2, Platform::Android, "1.a"),
        ];

        let result =
            VersionGate::new(MalformedRecordPolicy::Abort).decide(&android("1.0.0"), &catalog, now());

        assert_eq!(
            result,
            Err(GateError::InvalidRecordVersion {
                record_id: 2,
                source: VersionError::InvalidVersionFormat {
                    input: "1.a".to_string()
                },
            })
        );
    }

    #[test]
    fn malformed_records_outside_the_filter_are_not_inspected() {
        let catalog = vec![
            VersionRecord {
                is_active: false,
                ..record(1, Platform::Android, "broken")
            },
            record(2, Platform::Ios, "broken"),
            record(3, Platform::Android, "1.0.0"),
        ];

        let decision = VersionGate::new(MalformedRecordPolicy::Abort)
            .decide(&android("1.0.0"), &catalog, now())
            .unwrap();

        assert!(decision.excluded_records.is_empty());
        assert_eq!(target_id(&decision), Some(3));
    }

    #[test]
    fn decide_is_idempotent() {
        let catalog = vec![
            VersionRecord {
                is_latest: true,
                ..record(1, Platform::All, "1.4.2")
            },
            record(2, Platform::Android, "1.5"),
            record(3, Platform::Android, "bad"),
        ];
        let query = android("1.0.0").with_build_number(3);

        let first = decide_version(&query, &catalog, now()).unwrap();
        let second = decide_version(&query, &catalog, now()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn policy_deserializes_from_lowercase_names() {
        assert_eq!(
            serde_json::from_str::<MalformedRecordPolicy>("\"abort\"").unwrap(),
            MalformedRecordPolicy::Abort
        );
        assert_eq!(VersionGate::default().policy(), MalformedRecordPolicy::Exclude);
    }
}
