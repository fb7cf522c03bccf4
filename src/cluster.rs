use std::collections::HashSet;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ClusterConfig;
use crate::error::AppError;
use crate::models::{HelmDeployment, TaggedImage};

/// Lists every container and init-container image reference across all
/// namespaces, whitespace-separated.
pub const CONTAINER_DISCOVERY_COMMAND: &str = r#"kubectl get pod --all-namespaces -o jsonpath="{.items[*].spec['initContainers', 'containers'][*].image}""#;

/// Lists every Helm release secret as one `namespace,name,status,timestamp`
/// line.
pub const RELEASE_DISCOVERY_COMMAND: &str = r#"kubectl get secret --all-namespaces -l owner=helm -o jsonpath='{range .items[*]}{.metadata.namespace}{","}{.metadata.name}{","}{.metadata.labels.status}{","}{.metadata.creationTimestamp}{"\n"}{end}'"#;

/// Runs a shell command inside a cluster and returns its combined stdout.
///
/// Implementations own connection, auth, and any retry policy; a failure
/// here is fatal for the run.
#[async_trait]
pub trait ClusterCommandRunner {
    async fn run_command(&self, cluster: &ClusterConfig, command: &str)
        -> Result<String, AppError>;
}

/// Production runner: shells out to `az aks command invoke`, which executes
/// the command on the managed cluster and relays its output.
pub struct AzCommandRunner {
    verbose: bool,
}

impl AzCommandRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl ClusterCommandRunner for AzCommandRunner {
    async fn run_command(
        &self,
        cluster: &ClusterConfig,
        command: &str,
    ) -> Result<String, AppError> {
        if self.verbose {
            eprintln!(
                "[DEBUG] az aks command invoke on {} (resource group {})",
                cluster.name, cluster.resource_group
            );
        }

        let subscription = cluster.subscription_id.to_string();
        let output = Command::new("az")
            .args(["aks", "command", "invoke"])
            .args(["--subscription", subscription.as_str()])
            .args(["--resource-group", cluster.resource_group.as_str()])
            .args(["--name", cluster.name.as_str()])
            .args(["--command", command])
            .args(["--query", "logs", "--output", "tsv"])
            .output()
            .await
            .map_err(|e| {
                AppError::Collaborator(format!(
                    "could not spawn az for cluster {}: {}",
                    cluster.name, e
                ))
            })?;

        if !output.status.success() {
            return Err(AppError::Collaborator(format!(
                "az aks command invoke on {} exited with {}: {}",
                cluster.name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse the container discovery output into a set of running images.
///
/// Entries not starting with `prefix` are discarded before parsing; they
/// belong to registries outside this run's scope. An entry that matches the
/// prefix but does not parse fails the whole call: silently skipping it
/// could hide a running tag and get it deleted.
pub fn parse_image_listing(logs: &str, prefix: &str) -> Result<HashSet<TaggedImage>, AppError> {
    logs.split_whitespace()
        .filter(|entry| entry.starts_with(prefix))
        .map(TaggedImage::parse)
        .collect()
}

/// Parse the release discovery output. Unless `include_all_statuses` is set,
/// only `deployed` and `superseded` releases are kept.
pub fn parse_release_listing(
    logs: &str,
    include_all_statuses: bool,
) -> Result<HashSet<HelmDeployment>, AppError> {
    let mut releases = HashSet::new();
    for line in logs.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let release = HelmDeployment::from_csv_line(line)?;
        if include_all_statuses || release.is_retainable() {
            releases.insert(release);
        }
    }
    Ok(releases)
}

/// Run container discovery against one cluster and parse the result.
pub async fn discover_running_images<R: ClusterCommandRunner + ?Sized>(
    runner: &R,
    cluster: &ClusterConfig,
    prefix: &str,
) -> Result<HashSet<TaggedImage>, AppError> {
    let logs = runner.run_command(cluster, CONTAINER_DISCOVERY_COMMAND).await?;
    parse_image_listing(&logs, prefix)
}

/// Run Helm release discovery against one cluster and parse the result.
pub async fn discover_helm_releases<R: ClusterCommandRunner + ?Sized>(
    runner: &R,
    cluster: &ClusterConfig,
    include_all_statuses: bool,
) -> Result<HashSet<HelmDeployment>, AppError> {
    let logs = runner.run_command(cluster, RELEASE_DISCOVERY_COMMAND).await?;
    parse_release_listing(&logs, include_all_statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct CannedRunner {
        logs: String,
    }

    #[async_trait]
    impl ClusterCommandRunner for CannedRunner {
        async fn run_command(
            &self,
            _cluster: &ClusterConfig,
            _command: &str,
        ) -> Result<String, AppError> {
            Ok(self.logs.clone())
        }
    }

    fn cluster() -> ClusterConfig {
        ClusterConfig {
            name: "test-aks".into(),
            subscription_id: Uuid::nil(),
            resource_group: "rg-test".into(),
        }
    }

    #[test]
    fn test_image_listing_applies_prefix_before_parsing() {
        let logs = "registry.example.com/app:v1 mcr.microsoft.com/pause:3.9 \
                    registry.example.com/web:2024-06-01";
        let images = parse_image_listing(logs, "registry.example.com").unwrap();

        assert_eq!(images.len(), 2);
        assert!(images.contains(&TaggedImage::parse("registry.example.com/app:v1").unwrap()));
        assert!(images
            .contains(&TaggedImage::parse("registry.example.com/web:2024-06-01").unwrap()));
    }

    #[test]
    fn test_image_listing_fails_on_malformed_prefixed_entry() {
        // untagged reference inside our registry scope: refuse to guess
        let logs = "registry.example.com/app";
        assert!(parse_image_listing(logs, "registry.example.com").is_err());
    }

    #[test]
    fn test_image_listing_empty_logs() {
        assert!(parse_image_listing("", "registry.example.com").unwrap().is_empty());
        assert!(parse_image_listing("  \n ", "registry.example.com").unwrap().is_empty());
    }

    #[test]
    fn test_release_listing_filters_statuses() {
        let logs = "\
ns,sh.helm.release.v1.app.v1,deployed,2024-01-01T00:00:00Z
ns,sh.helm.release.v1.app.v2,superseded,2024-01-02T00:00:00Z
ns,sh.helm.release.v1.app.v3,failed,2024-01-03T00:00:00Z

ns,sh.helm.release.v1.app.v4,pending-install,2024-01-04T00:00:00Z
";
        let releases = parse_release_listing(logs, false).unwrap();
        assert_eq!(releases.len(), 2);

        let all = parse_release_listing(logs, true).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_release_listing_fails_on_malformed_line() {
        assert!(parse_release_listing("ns,only-two-fields,deployed", false).is_err());
    }

    #[tokio::test]
    async fn test_discovery_through_runner() {
        let runner = CannedRunner {
            logs: "registry.example.com/app:v1 other.io/x:y".into(),
        };
        let images = discover_running_images(&runner, &cluster(), "registry.example.com")
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
    }

    #[tokio::test]
    async fn test_release_discovery_through_runner() {
        let runner = CannedRunner {
            logs: "ns,sh.helm.release.v1.app.v1,deployed,2024-01-01T00:00:00Z\n".into(),
        };
        let releases = discover_helm_releases(&runner, &cluster(), false).await.unwrap();
        assert_eq!(releases.len(), 1);
    }
}
