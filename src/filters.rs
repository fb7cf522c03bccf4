use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{HelmDeployment, RegistryTaggedImage, TaggedImage};

const SECONDS_PER_DAY: i64 = 86_400;

/// Select stored images that belong to an actively deployed repository but
/// whose tag is not running anywhere.
///
/// Repositories with no running entry at all are left out: images that are
/// not under Kubernetes management here may belong to some other process,
/// and deleting them is not this tool's call.
pub fn filter_inactive(
    registry_images: &HashSet<RegistryTaggedImage>,
    running_images: &HashSet<TaggedImage>,
) -> HashSet<RegistryTaggedImage> {
    let mut running_tags: HashMap<&str, HashSet<&str>> = HashMap::new();
    for image in running_images {
        running_tags
            .entry(image.name.as_str())
            .or_default()
            .insert(image.tag.as_str());
    }

    registry_images
        .iter()
        .filter(|stored| {
            running_tags
                .get(stored.name.as_str())
                .map_or(false, |tags| !tags.contains(stored.tag.as_str()))
        })
        .cloned()
        .collect()
}

/// Select images at least `min_age_days` whole days old as of `at`.
///
/// A whole day is 86,400 seconds measured from the creation instant (floor
/// division, not calendar truncation), so an image created exactly
/// `min_age_days` days before `at` is included.
pub fn filter_aged_at(
    registry_images: &HashSet<RegistryTaggedImage>,
    min_age_days: u64,
    at: DateTime<Utc>,
) -> HashSet<RegistryTaggedImage> {
    registry_images
        .iter()
        .filter(|image| {
            let age_secs = (at - image.created_on).num_seconds();
            age_secs.div_euclid(SECONDS_PER_DAY) >= min_age_days as i64
        })
        .cloned()
        .collect()
}

/// [`filter_aged_at`] evaluated against a single `Utc::now()` captured here,
/// so every image in the pass is measured against the same instant.
pub fn filter_aged(
    registry_images: &HashSet<RegistryTaggedImage>,
    min_age_days: u64,
) -> HashSet<RegistryTaggedImage> {
    filter_aged_at(registry_images, min_age_days, Utc::now())
}

/// Keep at most the `n` most recent revisions per (namespace, lineage) group.
///
/// Recency is numeric revision order, not storage-name order; the names are
/// not zero-padded and would sort `v9` above `v10`. Fails if any deployment's
/// storage name does not carry a parseable lineage and revision.
pub fn retain_release_ancestors(
    deployments: &HashSet<HelmDeployment>,
    n: usize,
) -> Result<HashSet<HelmDeployment>, AppError> {
    let mut groups: HashMap<(&str, &str), Vec<(u64, &HelmDeployment)>> = HashMap::new();
    for deployment in deployments {
        let key = (deployment.namespace.as_str(), deployment.lineage()?);
        groups
            .entry(key)
            .or_default()
            .push((deployment.revision()?, deployment));
    }

    let mut retained = HashSet::new();
    for group in groups.values_mut() {
        group.sort_by_key(|(revision, _)| Reverse(*revision));
        retained.extend(group.iter().take(n).map(|(_, d)| (*d).clone()));
    }

    Ok(retained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stored(name: &str, tag: &str, created_on: DateTime<Utc>) -> RegistryTaggedImage {
        RegistryTaggedImage {
            registry: "registry.example.com".into(),
            name: name.into(),
            tag: tag.into(),
            created_on,
        }
    }

    fn running(name: &str, tag: &str) -> TaggedImage {
        TaggedImage {
            registry: "registry.example.com".into(),
            name: name.into(),
            tag: tag.into(),
        }
    }

    fn release(namespace: &str, lineage: &str, revision: u64) -> HelmDeployment {
        HelmDeployment {
            namespace: namespace.into(),
            name: format!("sh.helm.release.v1.{}.v{}", lineage, revision),
            status: "superseded".into(),
            created_at: "2024-01-01T00:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_inactive_keeps_undeployed_tags_of_deployed_repos() {
        let now = Utc::now();
        let registry: HashSet<_> = [
            stored("app", "v1", now),
            stored("app", "v2", now),
            stored("app", "v3", now),
            stored("other", "v1", now),
        ]
        .into();
        let running: HashSet<_> = [running("app", "v2")].into();

        let inactive = filter_inactive(&registry, &running);

        let tags: HashSet<_> = inactive.iter().map(|i| i.tag.as_str()).collect();
        assert_eq!(inactive.len(), 2);
        assert_eq!(tags, HashSet::from(["v1", "v3"]));
        // `other` is not deployed anywhere, so it is not ours to touch
        assert!(inactive.iter().all(|i| i.name == "app"));
    }

    #[test]
    fn test_inactive_never_returns_running_pair() {
        let now = Utc::now();
        let registry: HashSet<_> = [stored("app", "v1", now), stored("app", "v2", now)].into();
        let running: HashSet<_> = [running("app", "v1"), running("app", "v2")].into();

        assert!(filter_inactive(&registry, &running).is_empty());
    }

    #[test]
    fn test_inactive_is_pure() {
        let now = Utc::now();
        let registry: HashSet<_> = [stored("app", "v1", now), stored("app", "v2", now)].into();
        let running: HashSet<_> = [running("app", "v2")].into();

        let first = filter_inactive(&registry, &running);
        let second = filter_inactive(&registry, &running);
        assert_eq!(first, second);
    }

    #[test]
    fn test_aged_boundary_is_inclusive() {
        let at: DateTime<Utc> = "2024-06-15T12:00:00Z".parse().unwrap();
        let exactly = stored("app", "v1", at - Duration::days(7));
        let one_second_under = stored("app", "v2", at - Duration::days(7) + Duration::seconds(1));
        let registry: HashSet<_> = [exactly.clone(), one_second_under].into();

        let aged = filter_aged_at(&registry, 7, at);

        assert_eq!(aged.len(), 1);
        assert!(aged.contains(&exactly));
    }

    #[test]
    fn test_aged_seven_day_image_excluded_at_eight() {
        let at: DateTime<Utc> = "2024-06-15T12:00:00Z".parse().unwrap();
        let registry: HashSet<_> = [stored("app", "v1", at - Duration::days(7))].into();

        assert_eq!(filter_aged_at(&registry, 7, at).len(), 1);
        assert!(filter_aged_at(&registry, 8, at).is_empty());
    }

    #[test]
    fn test_aged_zero_days_excludes_future_timestamps() {
        let at: DateTime<Utc> = "2024-06-15T12:00:00Z".parse().unwrap();
        let registry: HashSet<_> = [stored("app", "v1", at + Duration::hours(1))].into();

        assert!(filter_aged_at(&registry, 0, at).is_empty());
    }

    #[test]
    fn test_ancestors_keep_n_most_recent() {
        let deployments: HashSet<_> =
            [release("ns", "app", 1), release("ns", "app", 2), release("ns", "app", 3)].into();

        let kept = retain_release_ancestors(&deployments, 2).unwrap();
        let revisions: HashSet<_> = kept.iter().map(|d| d.revision().unwrap()).collect();
        assert_eq!(revisions, HashSet::from([2, 3]));

        let kept = retain_release_ancestors(&deployments, 1).unwrap();
        let revisions: HashSet<_> = kept.iter().map(|d| d.revision().unwrap()).collect();
        assert_eq!(revisions, HashSet::from([3]));
    }

    #[test]
    fn test_ancestors_order_numerically_not_lexicographically() {
        // Lexicographic storage-name order would rank v9 above v10.
        let deployments: HashSet<_> =
            [release("ns", "app", 9), release("ns", "app", 10), release("ns", "app", 11)].into();

        let kept = retain_release_ancestors(&deployments, 2).unwrap();
        let revisions: HashSet<_> = kept.iter().map(|d| d.revision().unwrap()).collect();
        assert_eq!(revisions, HashSet::from([10, 11]));
    }

    #[test]
    fn test_ancestors_groups_are_independent() {
        let deployments: HashSet<_> = [
            release("ns-a", "app", 1),
            release("ns-a", "app", 2),
            release("ns-b", "app", 7),
            release("ns-a", "web", 4),
        ]
        .into();

        let kept = retain_release_ancestors(&deployments, 1).unwrap();

        assert_eq!(kept.len(), 3);
        assert!(kept.contains(&release("ns-a", "app", 2)));
        assert!(kept.contains(&release("ns-b", "app", 7)));
        assert!(kept.contains(&release("ns-a", "web", 4)));
    }

    #[test]
    fn test_ancestors_reject_malformed_names() {
        let mut bad = release("ns", "app", 1);
        bad.name = "not-a-release-name".into();
        let deployments: HashSet<_> = [bad].into();

        assert!(retain_release_ancestors(&deployments, 3).is_err());
    }
}
