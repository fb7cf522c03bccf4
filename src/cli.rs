use std::path::PathBuf;

use clap::Parser;

/// kubereap — delete registry images your Kubernetes clusters no longer run
#[derive(Parser, Debug)]
#[command(name = "kubereap", version, about)]
pub struct Cli {
    /// Path to the JSON configuration file (clusters + registry)
    pub config_file: PathBuf,

    /// Minimum image age in whole days (86,400 s each) before deletion
    #[arg(default_value_t = 7)]
    pub min_age_days: u64,

    /// Only consider running references starting with this prefix
    /// (defaults to the configured registry URL)
    #[arg(long, env = "KUBEREAP_PREFIX")]
    pub prefix: Option<String>,

    /// Never delete tags matching this regex
    #[arg(long)]
    pub protect: Option<String>,

    /// Also report Helm release retention, keeping N revisions per
    /// (namespace, release) group
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub keep_releases: Option<u64>,

    /// Consider all Helm release statuses, not just deployed/superseded
    #[arg(long, default_value_t = false)]
    pub all_statuses: bool,

    /// Preview deletions without performing them
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Abort on the first failed deletion instead of continuing
    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}
