use std::collections::HashSet;

use colored::Colorize;

use crate::models::{HelmDeployment, RegistryTaggedImage};

/// Print the deletion plan: every image that survived the filters.
pub fn print_plan(images: &[RegistryTaggedImage], dry_run: bool) {
    let header = if dry_run {
        format!(" {} ", "DRY RUN".yellow().bold())
    } else {
        String::new()
    };

    println!(
        "\n{}Deletion candidates{}",
        header,
        if dry_run { " (no changes will be made)" } else { "" }
    );
    println!("{}", "─".repeat(60));

    if images.is_empty() {
        println!("  {}", "Nothing to delete.".green());
        return;
    }

    println!("  {} ({}):", "TO DELETE".red().bold(), images.len());
    for image in images {
        println!(
            "    [{}] {:<50} {}",
            "DELETE".red().bold(),
            image.to_string(),
            image
                .created_on
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
                .dimmed(),
        );
    }
}

/// Print the Helm retention report for one cluster: which release revisions
/// fall inside the retention window and which are stale.
pub fn print_release_report(
    alias: &str,
    all: &HashSet<HelmDeployment>,
    retained: &HashSet<HelmDeployment>,
) {
    println!("\nHelm releases on cluster {}", alias.bold());
    println!("{}", "─".repeat(60));

    let mut stale: Vec<&HelmDeployment> = all.difference(retained).collect();
    let mut kept: Vec<&HelmDeployment> = retained.iter().collect();
    stale.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    kept.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));

    if !kept.is_empty() {
        println!("  {} ({}):", "RETAINED".green().bold(), kept.len());
        for release in &kept {
            print_release_line(release);
        }
    }

    if stale.is_empty() {
        println!("  {}", "No stale release revisions.".green());
    } else {
        println!("  {} ({}):", "STALE".yellow().bold(), stale.len());
        for release in &stale {
            print_release_line(release);
        }
    }
}

fn print_release_line(release: &HelmDeployment) {
    println!(
        "    {:<16} {:<50} {} {}",
        release.namespace,
        release.name,
        release.status.dimmed(),
        release
            .created_at
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string()
            .dimmed(),
    );
}

/// Print final summary
pub fn print_summary(deleted: usize, errors: usize, dry_run: bool) {
    println!("\n{}", "═".repeat(60));
    if dry_run {
        println!(
            "{} Would delete {} images, {} errors",
            "DRY RUN SUMMARY:".yellow().bold(),
            deleted.to_string().red().bold(),
            errors
        );
    } else {
        println!(
            "{} Deleted {} images, {} errors",
            "SUMMARY:".bold(),
            deleted.to_string().red().bold(),
            if errors > 0 {
                errors.to_string().red().bold().to_string()
            } else {
                errors.to_string()
            }
        );
    }
}
