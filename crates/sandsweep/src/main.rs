//! sandsweep: destroys every resource in a sandbox AWS account
//!
//! Default mode is a dry run that scans and prints what would be deleted;
//! `--no-dry-run` performs the actual deletion.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use sandsweep::aws::{Account, Session};
use sandsweep::region::GLOBAL_REGION;
use sandsweep::{resource, Region, ResolveError, RunError, Sweeper, SweeperParams};
use sandsweep_common::{Collection, Config, ConfigError};

#[derive(Parser, Debug)]
#[command(name = "sandsweep")]
#[command(about = "Destroys every resource in a sandbox AWS account")]
#[command(version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// AWS credentials profile to authenticate with
    #[arg(long)]
    profile: Option<String>,

    /// Actually delete resources (default is a dry run)
    #[arg(long)]
    no_dry_run: bool,

    /// Only consider this resource type (repeatable)
    #[arg(long = "target")]
    targets: Vec<String>,

    /// Never consider this resource type (repeatable)
    #[arg(long = "exclude")]
    excludes: Vec<String>,

    /// Do not print filtered items during the scan
    #[arg(long)]
    quiet: bool,

    /// Abort after this many sweeps that only wait on the provider (0 disables)
    #[arg(long, default_value_t = 0)]
    max_wait_retries: u32,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        report_failure(&e);
        std::process::exit(1);
    }
}

/// Render a fatal error: the cause chain, plus a next-step hint when the
/// failure is one of the engine's own kinds.
fn report_failure(err: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "sandsweep: error: {err}");
    for cause in err.chain().skip(1) {
        let _ = writeln!(stderr, "  caused by: {cause}");
    }

    if let Some(hint) = failure_hint(err) {
        let _ = writeln!(stderr, "  hint: {hint}");
    }
}

fn failure_hint(err: &anyhow::Error) -> Option<&'static str> {
    if err.is::<ConfigError>() {
        return Some("check the accounts section of the config against the live credentials");
    }
    if err.is::<ResolveError>() {
        return Some("kind names are case-sensitive; compare --target/--exclude and the config against the registered kinds");
    }
    match err.downcast_ref::<RunError>() {
        Some(RunError::FailStall) => {
            Some("the failed items listed above name what the provider refused to delete")
        }
        Some(RunError::WaitStall(_)) => {
            Some("raise --max-wait-retries or give the provider time to finish tearing down, then rerun")
        }
        Some(RunError::Cancelled) | None => None,
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    println!("sandsweep {}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = Config::load(&args.config)?;

    // Resolve the live identity against any real region; the pseudo-region
    // for global services cannot sign STS calls.
    let bootstrap_region = config
        .regions
        .iter()
        .find(|r| r.as_str() != GLOBAL_REGION)
        .cloned()
        .unwrap_or_else(|| "us-east-1".to_string());
    let session = Session::new(&bootstrap_region, args.profile.clone());
    let account = Account::resolve(&session).await?;

    let regions = config
        .regions
        .iter()
        .map(|name| Arc::new(Region::new(name, args.profile.clone())))
        .collect();

    let params = SweeperParams {
        targets: Collection::from(args.targets),
        excludes: Collection::from(args.excludes),
        no_dry_run: args.no_dry_run,
        quiet: args.quiet,
        max_wait_retries: args.max_wait_retries,
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing the current sweep before exiting");
                cancel.cancel();
            }
        });
    }

    let mut sweeper = Sweeper::new(
        params,
        config,
        account,
        Arc::clone(resource::builtin()),
        regions,
    );
    sweeper.run(&cancel).await
}
