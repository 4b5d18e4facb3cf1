//! Change detection, trigger predicate, and cooldown gate.
//!
//! A fresh fingerprint set is diffed against the last persisted one. A
//! resource counts as changed when at least one field path present in both
//! its prior and fresh fingerprints hashes differently. Paths that appear
//! or disappear do not count; a prior fingerprint with no fresh
//! counterpart (a newly added reference) is skipped entirely, so a
//! reference's first appearance can never fire.

use super::Poller;
use crate::crd::{ChangeTriggeredJob, ResourceFingerprint, TriggerCondition};
use crate::error::OperatorResult;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::time::Duration;

/// Per-tick change counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Resources with at least one changed field.
    pub changed_resources: usize,
    /// Resources polled this tick.
    pub polled_resources: usize,
}

/// Poll every referenced resource in spec order and decide whether the
/// trigger fires.
///
/// Returns `(changed, fresh_fingerprints)`. The first poll error aborts
/// the whole detection; no fingerprints are emitted. When no baseline is
/// established yet (`status.resourceHashes` is null), `changed` is always
/// false.
pub async fn detect(
    poller: &Poller,
    trigger: &ChangeTriggeredJob,
) -> OperatorResult<(bool, Vec<ResourceFingerprint>)> {
    let mut fresh = Vec::with_capacity(trigger.spec.resources.len());
    for reference in &trigger.spec.resources {
        fresh.push(poller.poll(reference).await?);
    }

    let Some(prior) = trigger
        .status
        .as_ref()
        .and_then(|status| status.resource_hashes.as_ref())
    else {
        tracing::debug!("Establishing baseline, no change evaluation");
        return Ok((false, fresh));
    };

    let summary = diff_fingerprints(prior, &fresh);
    let changed = predicate(summary, trigger.spec.condition());
    if summary.changed_resources > 0 {
        tracing::debug!(
            changed = summary.changed_resources,
            polled = summary.polled_resources,
            fired = changed,
            "Watched resources changed"
        );
    }
    Ok((changed, fresh))
}

/// Count resources whose fingerprints differ from their prior entries.
///
/// Prior entries are matched by identity tuple. A fresh fingerprint with
/// no prior entry is skipped (first appearance); a prior field path absent
/// from the fresh fingerprint is skipped (disappearance is not a change).
pub fn diff_fingerprints(
    prior: &[ResourceFingerprint],
    fresh: &[ResourceFingerprint],
) -> ChangeSummary {
    let mut changed_resources = 0;
    for current in fresh {
        let Some(last) = prior.iter().find(|p| {
            p.api_version == current.api_version
                && p.kind == current.kind
                && p.namespace == current.namespace
                && p.name == current.name
        }) else {
            continue;
        };

        let changed = last.fields.iter().any(|field| {
            current
                .hash_for(&field.path)
                .is_some_and(|hash| hash != field.hash)
        });
        if changed {
            changed_resources += 1;
        }
    }

    ChangeSummary {
        changed_resources,
        polled_resources: fresh.len(),
    }
}

/// Trigger predicate over resource-level change counts.
pub fn predicate(summary: ChangeSummary, condition: TriggerCondition) -> bool {
    match condition {
        TriggerCondition::Any => summary.changed_resources > 0,
        TriggerCondition::All => {
            summary.changed_resources > 0
                && summary.changed_resources == summary.polled_resources
        }
    }
}

/// Whether firing is presently permitted by the cooldown.
pub fn cooldown_elapsed(
    last_triggered: Option<&Time>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> bool {
    match last_triggered {
        None => true,
        Some(last) => {
            let elapsed = now.signed_duration_since(last.0);
            elapsed
                >= chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::MAX)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::FieldHash;
    use chrono::TimeZone;

    fn fingerprint(name: &str, fields: &[(&str, &str)]) -> ResourceFingerprint {
        ResourceFingerprint {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            name: name.to_string(),
            namespace: Some("default".to_string()),
            fields: fields
                .iter()
                .map(|(path, hash)| FieldHash {
                    path: path.to_string(),
                    hash: hash.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn unchanged_hashes_count_nothing() {
        let prior = vec![fingerprint("cm", &[("data.config", "h1")])];
        let fresh = vec![fingerprint("cm", &[("data.config", "h1")])];

        let summary = diff_fingerprints(&prior, &fresh);
        assert_eq!(summary.changed_resources, 0);
        assert_eq!(summary.polled_resources, 1);
    }

    #[test]
    fn hash_mismatch_marks_resource_changed() {
        let prior = vec![fingerprint("cm", &[("data.config", "h1")])];
        let fresh = vec![fingerprint("cm", &[("data.config", "h2")])];

        assert_eq!(diff_fingerprints(&prior, &fresh).changed_resources, 1);
    }

    #[test]
    fn multiple_changed_fields_count_one_resource() {
        let prior = vec![fingerprint("cm", &[("data.a", "h1"), ("data.b", "h2")])];
        let fresh = vec![fingerprint("cm", &[("data.a", "x1"), ("data.b", "x2")])];

        assert_eq!(diff_fingerprints(&prior, &fresh).changed_resources, 1);
    }

    #[test]
    fn newly_added_reference_is_skipped() {
        let prior = vec![fingerprint("cm1", &[("data.a", "h1")])];
        let fresh = vec![
            fingerprint("cm1", &[("data.a", "h1")]),
            fingerprint("cm2", &[("data.a", "zz")]),
        ];

        let summary = diff_fingerprints(&prior, &fresh);
        assert_eq!(summary.changed_resources, 0);
        assert_eq!(summary.polled_resources, 2);
    }

    #[test]
    fn disappeared_path_is_not_a_change() {
        let prior = vec![fingerprint("cm", &[("data.gone", "h1")])];
        let fresh = vec![fingerprint("cm", &[])];

        assert_eq!(diff_fingerprints(&prior, &fresh).changed_resources, 0);
    }

    #[test]
    fn appeared_path_is_not_a_change() {
        let prior = vec![fingerprint("cm", &[])];
        let fresh = vec![fingerprint("cm", &[("data.new", "h1")])];

        assert_eq!(diff_fingerprints(&prior, &fresh).changed_resources, 0);
    }

    #[test]
    fn identity_matching_distinguishes_namespaces() {
        let mut other = fingerprint("cm", &[("data.a", "h2")]);
        other.namespace = Some("prod".to_string());
        let prior = vec![other];
        let fresh = vec![fingerprint("cm", &[("data.a", "h1")])];

        // Different namespace means no prior entry, so no change counted.
        assert_eq!(diff_fingerprints(&prior, &fresh).changed_resources, 0);
    }

    #[test]
    fn any_fires_on_first_change() {
        let one_of_two = ChangeSummary {
            changed_resources: 1,
            polled_resources: 2,
        };
        assert!(predicate(one_of_two, TriggerCondition::Any));
        assert!(!predicate(one_of_two, TriggerCondition::All));
    }

    #[test]
    fn all_requires_every_resource() {
        let two_of_two = ChangeSummary {
            changed_resources: 2,
            polled_resources: 2,
        };
        assert!(predicate(two_of_two, TriggerCondition::All));
        assert!(predicate(two_of_two, TriggerCondition::Any));
    }

    #[test]
    fn nothing_changed_never_fires() {
        let none = ChangeSummary {
            changed_resources: 0,
            polled_resources: 2,
        };
        assert!(!predicate(none, TriggerCondition::Any));
        assert!(!predicate(none, TriggerCondition::All));

        let empty = ChangeSummary {
            changed_resources: 0,
            polled_resources: 0,
        };
        assert!(!predicate(empty, TriggerCondition::All));
    }

    #[test]
    fn cooldown_allows_first_fire() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert!(cooldown_elapsed(None, Duration::from_secs(60), now));
    }

    #[test]
    fn cooldown_blocks_inside_window() {
        let last = Time(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 30).unwrap();
        assert!(!cooldown_elapsed(Some(&last), Duration::from_secs(60), now));
    }

    #[test]
    fn cooldown_opens_at_boundary() {
        let last = Time(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let boundary = Utc.with_ymd_and_hms(2025, 6, 1, 12, 1, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 6, 1, 12, 1, 1).unwrap();

        assert!(cooldown_elapsed(Some(&last), Duration::from_secs(60), boundary));
        assert!(cooldown_elapsed(Some(&last), Duration::from_secs(60), after));
    }

    #[test]
    fn zero_cooldown_always_allows() {
        let last = Time(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert!(cooldown_elapsed(Some(&last), Duration::ZERO, now));
    }
}
