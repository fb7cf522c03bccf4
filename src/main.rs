mod cli;
mod cluster;
mod config;
mod error;
mod filters;
mod models;
mod output;
mod registry;

use std::collections::HashSet;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;

use cli::Cli;
use cluster::AzCommandRunner;
use config::Config;
use error::AppError;
use filters::{filter_aged, filter_inactive, retain_release_ancestors};
use models::{RegistryTaggedImage, TaggedImage};
use registry::RegistryClient;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Configuration failures abort here, before any cluster or registry call.
    let config = Config::load(&cli.config_file)?;

    let protect = cli
        .protect
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(AppError::InvalidPattern)?;

    let runner = AzCommandRunner::new(cli.verbose);
    let prefix = cli
        .prefix
        .clone()
        .unwrap_or_else(|| config.container_registry.url.clone());

    // Discovery must complete across every cluster before filtering starts:
    // an image running on a not-yet-queried cluster would otherwise look
    // inactive.
    let mut running: HashSet<TaggedImage> = HashSet::new();
    for (alias, cluster_config) in &config.kubernetes_clusters {
        println!(
            "Retrieving images running on cluster {} ({})...",
            alias, cluster_config.name
        );
        let cluster_running = cluster::discover_running_images(&runner, cluster_config, &prefix)
            .await
            .with_context(|| format!("Image discovery failed for cluster {}", alias))?;
        println!("  found {} running image references", cluster_running.len());
        running.extend(cluster_running);
    }
    println!(
        "Discovered {} unique image tags running across {} clusters.",
        running.len(),
        config.kubernetes_clusters.len()
    );

    if let Some(n) = cli.keep_releases {
        for (alias, cluster_config) in &config.kubernetes_clusters {
            let releases =
                cluster::discover_helm_releases(&runner, cluster_config, cli.all_statuses)
                    .await
                    .with_context(|| format!("Release discovery failed for cluster {}", alias))?;
            let retained = retain_release_ancestors(&releases, n as usize)?;
            output::print_release_report(alias, &releases, &retained);
        }
    }

    let client = RegistryClient::new(&config.container_registry, cli.verbose);
    let stored = client
        .stored_images()
        .await
        .context("Failed to list stored registry images")?;
    println!("{} unique image tags stored in the registry.", stored.len());

    let inactive = filter_inactive(&stored, &running);
    println!(
        "Filtered down to {} with repositories used by Kubernetes but tags not currently running.",
        inactive.len()
    );

    let aged = filter_aged(&inactive, cli.min_age_days);
    println!(
        "Filtered down to {} that are at least {} whole days old.",
        aged.len(),
        cli.min_age_days
    );

    let mut candidates: Vec<RegistryTaggedImage> = Vec::new();
    let mut protected = 0usize;
    for image in aged {
        match &protect {
            Some(re) if re.is_match(&image.tag) => protected += 1,
            _ => candidates.push(image),
        }
    }
    if protected > 0 {
        println!("{} candidates protected by --protect.", protected);
    }
    candidates.sort_by(|a, b| {
        (a.name.as_str(), a.tag.as_str()).cmp(&(b.name.as_str(), b.tag.as_str()))
    });

    output::print_plan(&candidates, cli.dry_run);

    if cli.dry_run {
        output::print_summary(candidates.len(), 0, true);
        return Ok(());
    }

    let mut deleted = 0usize;
    let mut errors = 0usize;
    for image in &candidates {
        println!("Removing image {}...", image);
        match client.delete_image(image).await {
            Ok(()) => deleted += 1,
            Err(e) => {
                eprintln!("[ERROR] Failed to delete {}: {:#}", image, e);
                errors += 1;
                if cli.fail_fast {
                    output::print_summary(deleted, errors, false);
                    return Err(AppError::Deletion {
                        image: image.to_string(),
                        reason: format!("{:#}", e),
                    }
                    .into());
                }
            }
        }
    }

    output::print_summary(deleted, errors, false);
    println!("Cleanup complete, {} deleted.", deleted);

    if errors > 0 {
        process::exit(1);
    }

    Ok(())
}
